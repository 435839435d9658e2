//! Reward and gradient history, weight snapshots and the run log

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use catch_rl_core::Result;

use crate::actor::Actor;

/// File the run parameters and final averages are appended to
pub const RUN_LOG: &str = "run_log.txt";

/// What is due after a given episode count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckpointDue {
    /// Lightweight reward and gradient history
    pub history: bool,
    /// Network weights plus stamped history
    pub weights: bool,
}

impl CheckpointDue {
    /// Cadence keyed on the episode counter after its increment
    #[must_use]
    pub fn at(episode: usize) -> Self {
        Self {
            history: episode > 0 && episode % 10 == 0,
            weights: episode >= 100 && episode % 50 == 0,
        }
    }
}

/// Writes run artifacts into one directory, tagged by a run stamp
#[derive(Debug, Clone)]
pub struct Checkpointer {
    dir: PathBuf,
    stamp: String,
}

impl Checkpointer {
    /// Artifacts go to `dir`
    pub fn new(dir: impl Into<PathBuf>, stamp: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            stamp: stamp.into(),
        }
    }

    /// Output directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Policy weights file
    #[must_use]
    pub fn policy_path(&self) -> PathBuf {
        self.dir.join(format!("w_P_{}.json", self.stamp))
    }

    /// Critic weights file
    #[must_use]
    pub fn critic_path(&self) -> PathBuf {
        self.dir.join(format!("w_V_{}.json", self.stamp))
    }

    /// Stamped reward history file
    #[must_use]
    pub fn rewards_path(&self) -> PathBuf {
        self.dir.join(format!("r_{}.json", self.stamp))
    }

    /// Stamped gradient history file
    #[must_use]
    pub fn grads_path(&self) -> PathBuf {
        self.dir.join(format!("g_{}.json", self.stamp))
    }

    /// Overwrite `tmp_reward.json` and `tmp_grads.json`
    pub async fn save_history(&self, rewards: &[f64], grads: &[f64]) -> Result<()> {
        self.write_json(&self.dir.join("tmp_reward.json"), &rewards).await?;
        self.write_json(&self.dir.join("tmp_grads.json"), &grads).await
    }

    /// Write both networks and the stamped histories
    pub async fn save_snapshot(
        &self,
        policy: &Actor,
        critic: Option<&Actor>,
        rewards: &[f64],
        grads: &[f64],
    ) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        policy.save(self.policy_path()).await?;
        if let Some(critic) = critic {
            critic.save(self.critic_path()).await?;
        }
        self.write_json(&self.rewards_path(), &rewards).await?;
        self.write_json(&self.grads_path(), &grads).await?;
        info!(stamp = %self.stamp, dir = %self.dir.display(), "saved snapshot");
        Ok(())
    }

    /// Append one line to the run log
    pub async fn append_run_log(&self, line: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(RUN_LOG))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(path, serde_json::to_vec(value)?).await?;
        Ok(())
    }
}
