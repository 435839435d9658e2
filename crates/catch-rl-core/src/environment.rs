//! Environment trait and contract checking

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{CatchAction, Observation, ObservationSpec, RLError, Reward};

/// Result of a single environment step
#[derive(Debug, Clone)]
pub struct Step {
    /// Observation after the move
    pub observation: Observation,
    /// Reward signal
    pub reward: Reward,
    /// Whether the episode is done
    pub done: bool,
}

/// Summary of the episode currently running in a [`CheckedEnvironment`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Total reward so far
    pub total_reward: f64,
    /// Number of steps taken
    pub steps: usize,
    /// Whether the environment reported the end of the episode
    pub finished: bool,
}

/// Core environment trait
///
/// Implementations must produce observations of the shape described by
/// [`Environment::observation_spec`] on every `reset` and `step`.
#[async_trait]
pub trait Environment: Send + Sync {
    /// Shape of the observations this environment produces
    fn observation_spec(&self) -> ObservationSpec;

    /// Reset the environment
    async fn reset(&mut self) -> crate::Result<Observation>;

    /// Take a step in the environment
    async fn step(&mut self, action: CatchAction) -> crate::Result<Step>;
}

/// Wrapper that enforces the reset/step contract and tracks the episode
///
/// Any observation of the wrong shape, non-finite observation or reward, or
/// a `step` before `reset` is reported as [`RLError::Environment`].
pub struct CheckedEnvironment<E> {
    /// Inner environment
    pub env: E,
    spec: ObservationSpec,
    episode: Option<Episode>,
}

impl<E: Environment> CheckedEnvironment<E> {
    /// Wrap an environment, expecting observations matching `spec`
    pub fn new(env: E, spec: ObservationSpec) -> crate::Result<Self> {
        let produced = env.observation_spec();
        if produced.shape() != spec.shape() {
            return Err(RLError::Configuration(format!(
                "environment produces {:?} observations but {:?} were configured",
                produced.shape(),
                spec.shape()
            )));
        }
        Ok(Self {
            env,
            spec,
            episode: None,
        })
    }

    /// Current episode info
    #[must_use]
    pub fn episode_info(&self) -> Option<&Episode> {
        self.episode.as_ref()
    }
}

fn violation(error: RLError) -> RLError {
    warn!(%error, "environment contract violated");
    error
}

#[async_trait]
impl<E: Environment> Environment for CheckedEnvironment<E> {
    fn observation_spec(&self) -> ObservationSpec {
        self.spec
    }

    async fn reset(&mut self) -> crate::Result<Observation> {
        let observation = self.env.reset().await?;
        self.spec.check(&observation).map_err(violation)?;
        if !observation.is_finite() {
            return Err(violation(RLError::Environment(
                "reset produced a non-finite observation".into(),
            )));
        }
        self.episode = Some(Episode::default());
        Ok(observation)
    }

    async fn step(&mut self, action: CatchAction) -> crate::Result<Step> {
        let episode = match self.episode.as_mut() {
            Some(episode) if !episode.finished => episode,
            Some(_) => {
                return Err(violation(RLError::Environment(
                    "step called after the episode ended".into(),
                )))
            }
            None => {
                return Err(violation(RLError::Environment(
                    "step called before reset".into(),
                )))
            }
        };

        let step = self.env.step(action).await?;
        self.spec.check(&step.observation).map_err(violation)?;
        if !step.observation.is_finite() {
            return Err(violation(RLError::Environment(
                "step produced a non-finite observation".into(),
            )));
        }
        if !step.reward.is_finite() {
            return Err(violation(RLError::Environment(format!(
                "step produced a non-finite reward {}",
                step.reward.0
            ))));
        }

        episode.total_reward += f64::from(step.reward);
        episode.steps += 1;
        episode.finished = step.done;

        Ok(step)
    }
}
