//! The Catch game environment
//!
//! A single paddle-and-falling-balls game used as the training ground for
//! the policy-gradient agents in `catch-rl-agent`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catch;

pub use catch::{CatchConfig, CatchEnv};

// Re-export core types
pub use catch_rl_core::{
    CatchAction, CheckedEnvironment, Environment, Episode, Observation, ObservationSpec,
    ObservationType, Reward, Step,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{CatchConfig, CatchEnv};
    pub use catch_rl_core::prelude::*;
}
