//! Policy-gradient agents for the Catch game
//!
//! This crate provides:
//! - A small feed-forward network with an explicit backward pass and Adam
//! - The entropy-regularized policy-gradient and PPO losses
//! - The [`Actor`] wrapper owning a policy or critic network
//! - Rollout collection, best-of-batch selection and checkpointing
//! - The [`Trainer`] driving a complete run

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actor;
pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod loss;
pub mod nn;
pub mod optim;
pub mod selection;
pub mod trainer;

// Re-export the training surface
pub use actor::{Actor, ActorConfig, NetworkRole, Prediction, UpdateSummary};
pub use checkpoint::{CheckpointDue, Checkpointer};
pub use collector::{sample_action, TrajectoryCollector};
pub use config::{ReturnMode, RunMode, TrainConfig};
pub use loss::{categorical_entropy, PolicyLoss, PpoObjective};
pub use nn::{Activation, Gradients, Mlp, MlpConfig, OutputHead};
pub use optim::Adam;
pub use selection::{best_of_batch, select_top};
pub use trainer::{IterationReport, Phase, Trainer, TrainingSession};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{Actor, NetworkRole, RunMode, TrainConfig, Trainer};
    pub use catch_rl_core::prelude::*;
}
