//! Training configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use catch_rl_core::{Bootstrap, ObservationType, RLError, Result, DEFAULT_GAMMA};

use crate::loss::{PolicyLoss, PpoObjective};

/// How returns are formed during training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    /// Full discounted episode returns
    MonteCarlo,
    /// n-step returns bootstrapped off the critic
    NStep,
}

/// Run mode selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMode {
    /// Return estimator
    pub returns: ReturnMode,
    /// Subtract the critic's value from returns
    pub baseline: bool,
    /// Use the clipped-surrogate objective
    pub ppo: bool,
}

impl Default for RunMode {
    /// n-step returns with a baseline
    fn default() -> Self {
        Self {
            returns: ReturnMode::NStep,
            baseline: true,
            ppo: false,
        }
    }
}

impl RunMode {
    /// PPO mode, which implies n-step returns and a baseline
    #[must_use]
    pub fn ppo() -> Self {
        Self {
            returns: ReturnMode::NStep,
            baseline: true,
            ppo: true,
        }
    }

    /// Whether a critic network has to be trained alongside the policy
    #[must_use]
    pub fn needs_critic(&self) -> bool {
        self.returns == ReturnMode::NStep || self.baseline
    }

    /// Reject inconsistent combinations
    pub fn validate(&self) -> Result<()> {
        if self.ppo && !(self.returns == ReturnMode::NStep && self.baseline) {
            return Err(RLError::Configuration(
                "PPO requires n-step returns with a baseline".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.returns {
            ReturnMode::MonteCarlo => f.write_str("monte-carlo")?,
            ReturnMode::NStep => f.write_str("n-step")?,
        }
        if self.baseline {
            f.write_str(" + baseline")?;
        }
        if self.ppo {
            f.write_str(" + ppo")?;
        }
        Ok(())
    }
}

/// Every knob of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Episodes to train for, counted as trajectories used for updates
    pub n_episodes: usize,
    /// Policy network learning rate
    pub policy_learning_rate: f64,
    /// Critic network learning rate
    pub critic_learning_rate: f64,
    /// Board rows
    pub rows: usize,
    /// Board columns
    pub columns: usize,
    /// Observation encoding
    pub observation_type: ObservationType,
    /// Misses before an episode ends
    pub max_misses: usize,
    /// Steps before an episode is cut off
    pub max_steps: usize,
    /// Horizon of n-step returns
    pub n_step: usize,
    /// Ball drop rate
    pub speed: f64,
    /// Trajectories sampled per iteration
    pub minibatch: usize,
    /// Entropy coefficient
    pub eta: f64,
    /// Discount factor
    pub gamma: f64,
    /// PPO ratio clip range
    pub ppo_clip: f64,
    /// Weight of the critic error inside the PPO loss
    pub ppo_critic_coef: f64,
    /// Hidden layer sizes of both networks
    pub hidden_dims: Vec<usize>,
    /// Seed for initialization, sampling and the environment
    pub seed: Option<u64>,
    /// Tag for persisted artifacts
    pub stamp: String,
    /// Pre-trained policy weights
    pub policy_weights: Option<PathBuf>,
    /// Pre-trained critic weights
    pub critic_weights: Option<PathBuf>,
    /// When false, updates are skipped
    pub training: bool,
    /// Directory for checkpoints and the run log
    pub output_dir: PathBuf,
    /// Return estimator, baseline and PPO selection
    pub mode: RunMode,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            n_episodes: 300,
            policy_learning_rate: 0.01,
            critic_learning_rate: 0.05,
            rows: 7,
            columns: 7,
            observation_type: ObservationType::Pixel,
            max_misses: 10,
            max_steps: 250,
            n_step: 5,
            speed: 1.0,
            minibatch: 4,
            eta: 0.01,
            gamma: DEFAULT_GAMMA,
            ppo_clip: 0.8,
            ppo_critic_coef: 0.5,
            hidden_dims: vec![64, 32],
            seed: None,
            stamp: "run".to_string(),
            policy_weights: None,
            critic_weights: None,
            training: true,
            output_dir: PathBuf::from("."),
            mode: RunMode::default(),
        }
    }
}

impl TrainConfig {
    /// Load a JSON configuration; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Check the configuration before anything is built
    pub fn validate(&self) -> Result<()> {
        self.mode.validate()?;
        if self.minibatch == 0 {
            return Err(RLError::Configuration("minibatch must be at least 1".into()));
        }
        if self.max_steps == 0 {
            return Err(RLError::Configuration("max_steps must be at least 1".into()));
        }
        if self.mode.returns == ReturnMode::NStep && self.n_step == 0 {
            return Err(RLError::Configuration("n_step must be at least 1".into()));
        }
        for (name, lr) in [
            ("policy", self.policy_learning_rate),
            ("critic", self.critic_learning_rate),
        ] {
            if !(lr.is_finite() && lr > 0.0) {
                return Err(RLError::Configuration(format!(
                    "{name} learning rate must be positive, got {lr}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(RLError::Configuration(format!(
                "gamma {} is outside [0, 1]",
                self.gamma
            )));
        }
        if !(self.ppo_clip > 0.0 && self.ppo_clip < 1.0) {
            return Err(RLError::Configuration(format!(
                "PPO clip {} must lie in (0, 1)",
                self.ppo_clip
            )));
        }
        if self.stamp.is_empty() {
            return Err(RLError::Configuration("run stamp must not be empty".into()));
        }
        Ok(())
    }

    /// Return formula for this run
    #[must_use]
    pub fn bootstrap(&self) -> Bootstrap {
        match self.mode.returns {
            ReturnMode::MonteCarlo => Bootstrap::MonteCarlo,
            ReturnMode::NStep => Bootstrap::NStep(self.n_step),
        }
    }

    /// Policy-gradient loss settings
    #[must_use]
    pub fn policy_loss(&self) -> PolicyLoss {
        PolicyLoss { eta: self.eta }
    }

    /// PPO settings when PPO is enabled
    #[must_use]
    pub fn ppo_objective(&self) -> Option<PpoObjective> {
        self.mode.ppo.then_some(PpoObjective {
            clip: self.ppo_clip,
            critic_coef: self.ppo_critic_coef,
        })
    }
}
