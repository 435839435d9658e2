//! Core types for policy-gradient training on the Catch game
//!
//! This crate provides the pieces every other crate in the workspace
//! shares: the paddle action set, observation tensors, the environment
//! contract, recorded trajectories and the return estimator.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod environment;
pub mod error;
pub mod observation;
pub mod returns;
pub mod reward;
pub mod trajectory;

// Re-export core traits and types
pub use action::{ActionCounts, CatchAction};
pub use environment::{CheckedEnvironment, Environment, Episode, Step};
pub use error::{RLError, Result};
pub use observation::{Observation, ObservationSpec, ObservationType};
pub use returns::{advantages, Bootstrap, ReturnEstimator, DEFAULT_GAMMA};
pub use reward::Reward;
pub use trajectory::{Memory, Trajectory, Transition};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Bootstrap, CatchAction, Environment, Observation, ObservationSpec, ObservationType,
        Result, ReturnEstimator, Reward, Step, Trajectory,
    };
}
