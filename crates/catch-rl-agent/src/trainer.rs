//! Training loop
//!
//! Each iteration collects `minibatch` rollouts, keeps the best of them,
//! updates the critic and then the policy on the kept trajectories, and
//! writes checkpoints when they are due.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

use catch_rl_core::{
    CheckedEnvironment, Environment, Memory, ObservationSpec, Result, ReturnEstimator,
};

use crate::actor::{Actor, ActorConfig, NetworkRole, UpdateSummary};
use crate::checkpoint::{CheckpointDue, Checkpointer};
use crate::collector::TrajectoryCollector;
use crate::config::TrainConfig;
use crate::loss::PolicyLoss;
use crate::selection::{best_of_batch, MAX_SELECTED};

/// Trailing window for the minibatch shrink check
const SHRINK_WINDOW: usize = 20;
/// Trailing mean reward above which the minibatch shrinks
const SHRINK_THRESHOLD: f64 = 15.0;

/// Where the loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Networks built, nothing collected yet
    Init,
    /// Rolling out the policy
    Collect,
    /// Picking trajectories for the update
    Select,
    /// Applying gradients
    Update,
    /// Writing artifacts
    Checkpoint,
    /// Episode budget spent
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Collect => "collect",
            Phase::Select => "select",
            Phase::Update => "update",
            Phase::Checkpoint => "checkpoint",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Mutable state of one training run
pub struct TrainingSession {
    /// Sampling RNG
    pub rng: StdRng,
    /// Total reward of every trajectory used for an update
    pub rewards: Vec<f64>,
    /// Mean gradient component of every policy update
    pub gradient_history: Vec<f64>,
    /// Rollouts per iteration
    pub minibatch: usize,
    /// Trajectories used for updates so far
    pub episode: usize,
    /// Iterations completed
    pub iteration: usize,
    /// Environment steps taken
    pub steps: usize,
    /// Current phase
    pub phase: Phase,
    memory: Memory,
    max_steps: usize,
}

impl TrainingSession {
    fn new(rng: StdRng, minibatch: usize, max_steps: usize) -> Self {
        Self {
            rng,
            rewards: Vec::new(),
            gradient_history: Vec::new(),
            minibatch,
            episode: 0,
            iteration: 0,
            steps: 0,
            phase: Phase::Init,
            memory: Memory::new(minibatch, max_steps),
            max_steps,
        }
    }

    /// Shrink to at most [`MAX_SELECTED`] rollouts once recent rewards are high
    fn maybe_shrink(&mut self) {
        if self.minibatch <= MAX_SELECTED {
            return;
        }
        if trailing_mean(&self.rewards, SHRINK_WINDOW).is_some_and(|m| m > SHRINK_THRESHOLD) {
            info!(from = self.minibatch, to = MAX_SELECTED, "shrinking minibatch");
            self.minibatch = MAX_SELECTED;
            self.memory.resize(self.minibatch, self.max_steps);
        }
    }
}

fn enter(current: &mut Phase, iteration: usize, next: Phase) {
    debug!(iteration, from = %current, to = %next, "phase");
    *current = next;
}

fn trailing_mean(values: &[f64], window: usize) -> Option<f64> {
    let tail = &values[values.len().saturating_sub(window)..];
    if tail.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = tail.len() as f64;
    Some(tail.iter().sum::<f64>() / n)
}

/// Outcome of one iteration
#[derive(Debug, Clone)]
pub struct IterationReport {
    /// Episode counter after this iteration
    pub episode: usize,
    /// 1-based iteration number
    pub iteration: usize,
    /// Total rewards of the trajectories used, best first
    pub selected_rewards: Vec<f64>,
    /// Policy step, `None` when frozen
    pub policy: Option<UpdateSummary>,
    /// Critic step, `None` without a critic or when frozen
    pub critic: Option<UpdateSummary>,
    /// Checkpoints written after this iteration
    pub due: CheckpointDue,
}

/// Owns the environment, both networks and the session
pub struct Trainer<E> {
    config: TrainConfig,
    env: CheckedEnvironment<E>,
    policy: Actor,
    critic: Option<Actor>,
    collector: TrajectoryCollector,
    checkpointer: Checkpointer,
    session: TrainingSession,
}

impl<E: Environment> Trainer<E> {
    /// Validate the configuration and build everything a run needs
    pub async fn new(config: TrainConfig, env: E) -> Result<Self> {
        config.validate()?;

        let spec = ObservationSpec::new(config.observation_type, config.rows, config.columns);
        let env = CheckedEnvironment::new(env, spec)?;
        let estimator = ReturnEstimator::new(config.gamma, config.bootstrap())?;

        let mut policy = Actor::new(ActorConfig {
            role: NetworkRole::Policy,
            spec,
            hidden_dims: config.hidden_dims.clone(),
            learning_rate: config.policy_learning_rate,
            estimator,
            baseline: config.mode.baseline,
            policy_loss: config.policy_loss(),
            ppo: config.ppo_objective(),
            training: config.training,
            seed: config.seed,
        })?;
        if let Some(path) = &config.policy_weights {
            policy.load_weights(path).await?;
        }

        let critic = if config.mode.needs_critic() {
            let mut critic = Actor::new(ActorConfig {
                role: NetworkRole::Critic,
                spec,
                hidden_dims: config.hidden_dims.clone(),
                learning_rate: config.critic_learning_rate,
                estimator,
                baseline: false,
                policy_loss: PolicyLoss::default(),
                ppo: None,
                training: config.training,
                seed: config.seed,
            })?;
            if let Some(path) = &config.critic_weights {
                critic.load_weights(path).await?;
            }
            Some(critic)
        } else {
            if config.critic_weights.is_some() {
                warn!("critic weights given but this run mode trains no critic");
            }
            None
        };

        let rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let collector = TrajectoryCollector {
            max_steps: config.max_steps,
            record_distributions: config.mode.ppo,
        };
        let checkpointer = Checkpointer::new(config.output_dir.clone(), config.stamp.clone());
        let session = TrainingSession::new(rng, config.minibatch, config.max_steps);

        info!(
            mode = %config.mode,
            observation = %config.observation_type,
            episodes = config.n_episodes,
            minibatch = config.minibatch,
            critic = critic.is_some(),
            "trainer ready"
        );

        Ok(Self {
            config,
            env,
            policy,
            critic,
            collector,
            checkpointer,
            session,
        })
    }

    /// Run configuration
    #[must_use]
    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Session state
    #[must_use]
    pub fn session(&self) -> &TrainingSession {
        &self.session
    }

    /// Policy network
    #[must_use]
    pub fn policy(&self) -> &Actor {
        &self.policy
    }

    /// Critic network, when the run mode needs one
    #[must_use]
    pub fn critic(&self) -> Option<&Actor> {
        self.critic.as_ref()
    }

    /// Artifact writer
    #[must_use]
    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    /// Train until the episode budget is spent and return the reward history
    pub async fn run(&mut self) -> Result<Vec<f64>> {
        let started = Instant::now();
        self.log_run_start().await;

        while self.session.episode < self.config.n_episodes {
            self.step_iteration().await?;
        }

        enter(&mut self.session.phase, self.session.iteration, Phase::Done);
        self.save_snapshot().await;

        let average = trailing_mean(&self.session.rewards, self.session.rewards.len()).unwrap_or(0.0);
        self.log_line(&format!("{} ... Avg reward: {average}", self.config.stamp))
            .await;
        info!(
            episodes = self.session.episode,
            iterations = self.session.iteration,
            steps = self.session.steps,
            average_reward = average,
            elapsed = ?started.elapsed(),
            "training finished"
        );

        Ok(self.session.rewards.clone())
    }

    /// One collect, select, update and checkpoint cycle
    pub async fn step_iteration(&mut self) -> Result<IterationReport> {
        self.session.maybe_shrink();
        self.session.memory.clear();
        self.session.episode += self.session.minibatch.min(MAX_SELECTED);
        self.session.iteration += 1;

        enter(&mut self.session.phase, self.session.iteration, Phase::Collect);
        self.collector
            .collect_into(
                &mut self.session.memory,
                &mut self.env,
                &self.policy,
                self.critic.as_ref(),
                &mut self.session.rng,
            )
            .await?;
        self.session.steps += self
            .session
            .memory
            .trajectories
            .iter()
            .map(catch_rl_core::Trajectory::len)
            .sum::<usize>();

        enter(&mut self.session.phase, self.session.iteration, Phase::Select);
        let selected = best_of_batch(&self.session.memory);
        let selected_rewards: Vec<f64> = selected.iter().map(|t| t.total_reward).collect();
        self.session.rewards.extend(&selected_rewards);
        info!(
            episode = self.session.episode,
            step = self.session.steps,
            rewards = ?selected_rewards,
            "iteration {}",
            self.session.iteration
        );

        enter(&mut self.session.phase, self.session.iteration, Phase::Update);
        let critic = match self.critic.as_mut() {
            Some(critic) => critic.update(&selected)?,
            None => None,
        };
        let policy = self.policy.update(&selected)?;
        if let Some(summary) = &policy {
            self.session.gradient_history.push(summary.grad_mean);
            debug!(loss = summary.mean_loss, grad_mean = summary.grad_mean, "policy updated");
        }
        if let Some(summary) = &critic {
            debug!(loss = summary.mean_loss, "critic updated");
        }

        enter(&mut self.session.phase, self.session.iteration, Phase::Checkpoint);
        let due = CheckpointDue::at(self.session.episode);
        if due.history {
            if let Err(e) = self
                .checkpointer
                .save_history(&self.session.rewards, &self.session.gradient_history)
                .await
            {
                warn!(error = %e, "failed to save reward history");
            }
        }
        if due.weights {
            self.save_snapshot().await;
        }

        Ok(IterationReport {
            episode: self.session.episode,
            iteration: self.session.iteration,
            selected_rewards,
            policy,
            critic,
            due,
        })
    }

    async fn save_snapshot(&self) {
        if let Err(e) = self
            .checkpointer
            .save_snapshot(
                &self.policy,
                self.critic.as_ref(),
                &self.session.rewards,
                &self.session.gradient_history,
            )
            .await
        {
            warn!(error = %e, "failed to save snapshot");
        }
    }

    async fn log_run_start(&self) {
        match serde_json::to_string(&self.config) {
            Ok(params) => self.log_line(&format!("\n\nRunning on {params}")).await,
            Err(e) => warn!(error = %e, "failed to serialize run parameters"),
        }
    }

    async fn log_line(&self, line: &str) {
        if let Err(e) = self.checkpointer.append_run_log(line).await {
            warn!(error = %e, "failed to append to run log");
        }
    }
}
