// Catch trainer CLI
// Trains a policy-gradient agent on the Catch game and writes checkpoints

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use catch_rl_agent::{ReturnMode, RunMode, TrainConfig, Trainer};
use catch_rl_core::ObservationType;
use catch_rl_env::{CatchConfig, CatchEnv};

#[derive(Parser, Debug)]
#[command(name = "catch-rl")]
#[command(about = "Policy-gradient training on the Catch game", version)]
struct Cli {
    /// Monte Carlo returns
    #[arg(long, conflicts_with = "n_step")]
    mc: bool,

    /// n-step returns bootstrapped off the critic
    #[arg(long)]
    n_step: bool,

    /// Subtract the critic's value from returns
    #[arg(long)]
    baseline: bool,

    /// Clipped-surrogate objective; implies n-step returns with a baseline
    #[arg(long, conflicts_with = "mc")]
    ppo: bool,

    /// JSON configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of training episodes
    #[arg(short, long)]
    episodes: Option<usize>,

    /// Observation encoding (pixel, vector)
    #[arg(long)]
    observation: Option<ObservationType>,

    /// Seed for initialization, sampling and the environment
    #[arg(long)]
    seed: Option<u64>,

    /// Trajectories sampled per iteration [default: 4, or 1 with --mc]
    #[arg(short, long)]
    minibatch: Option<usize>,

    /// Directory for checkpoints and the run log
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Pre-trained policy weights
    #[arg(long)]
    policy_weights: Option<PathBuf>,

    /// Pre-trained critic weights
    #[arg(long)]
    critic_weights: Option<PathBuf>,

    /// Run the policy without updating it
    #[arg(long)]
    no_train: bool,
}

impl Cli {
    /// Mode chosen by the flags, if any mode flag was given
    fn run_mode(&self) -> Option<RunMode> {
        if self.ppo {
            return Some(RunMode::ppo());
        }
        if !(self.mc || self.n_step || self.baseline) {
            return None;
        }
        let returns = if self.mc {
            ReturnMode::MonteCarlo
        } else {
            ReturnMode::NStep
        };
        Some(RunMode {
            returns,
            baseline: self.baseline,
            ppo: false,
        })
    }

    fn into_config(self) -> Result<TrainConfig> {
        let from_file = self.config.is_some();
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => TrainConfig::default(),
        };

        if let Some(mode) = self.run_mode() {
            config.mode = mode;
        }
        if let Some(minibatch) = self.minibatch {
            config.minibatch = minibatch;
        } else if !from_file && config.mode.returns == ReturnMode::MonteCarlo {
            config.minibatch = 1;
        }
        if let Some(episodes) = self.episodes {
            config.n_episodes = episodes;
        }
        if let Some(observation) = self.observation {
            config.observation_type = observation;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if self.policy_weights.is_some() {
            config.policy_weights = self.policy_weights;
        }
        if self.critic_weights.is_some() {
            config.critic_weights = self.critic_weights;
        }
        if self.no_train {
            config.training = false;
        }
        config.stamp = Local::now().format("%d_%H%M%S").to_string();
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    config.validate().context("invalid training configuration")?;

    let env = CatchEnv::new(CatchConfig {
        rows: config.rows,
        columns: config.columns,
        speed: config.speed,
        max_steps: config.max_steps,
        max_misses: config.max_misses,
        observation_type: config.observation_type,
        seed: config.seed,
    })
    .context("failed to build the Catch environment")?;

    info!(
        mode = %config.mode,
        episodes = config.n_episodes,
        minibatch = config.minibatch,
        stamp = %config.stamp,
        "starting training"
    );
    let mut trainer = Trainer::new(config, env)
        .await
        .context("failed to set up the trainer")?;
    let rewards = trainer.run().await.context("training failed")?;

    println!(
        "Finished {} episodes, {} rewards recorded",
        trainer.session().episode,
        rewards.len()
    );
    Ok(())
}
