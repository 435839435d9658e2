//! Paddle actions and their index mapping
//!
//! The environment speaks in paddle *effects* (`-1`, `0`, `1`); networks
//! speak in output *indices* (`0`, `1`, `2`). Every conversion between the
//! two goes through [`CatchAction`] so the loss and any stored PPO
//! distribution agree on which column belongs to which move.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{RLError, Result};

/// A move of the paddle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatchAction {
    /// Move one column to the left (effect `-1`, index `0`)
    Left,
    /// Stay in place (effect `0`, index `1`)
    Idle,
    /// Move one column to the right (effect `1`, index `2`)
    Right,
}

impl CatchAction {
    /// Number of discrete actions
    pub const COUNT: usize = 3;

    /// All actions in index order
    pub const ALL: [CatchAction; Self::COUNT] =
        [CatchAction::Left, CatchAction::Idle, CatchAction::Right];

    /// Horizontal displacement applied to the paddle
    #[must_use]
    pub fn effect(self) -> i32 {
        match self {
            CatchAction::Left => -1,
            CatchAction::Idle => 0,
            CatchAction::Right => 1,
        }
    }

    /// Parse a paddle effect in `{-1, 0, 1}`
    pub fn from_effect(effect: i32) -> Result<Self> {
        match effect {
            -1 => Ok(CatchAction::Left),
            0 => Ok(CatchAction::Idle),
            1 => Ok(CatchAction::Right),
            other => Err(RLError::InvalidAction(format!(
                "effect {other} is not one of -1, 0, 1"
            ))),
        }
    }

    /// Column of this action in a network output
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            CatchAction::Left => 0,
            CatchAction::Idle => 1,
            CatchAction::Right => 2,
        }
    }

    /// Action for a network output column
    pub fn from_index(index: usize) -> Result<Self> {
        Self::ALL.get(index).copied().ok_or_else(|| {
            RLError::InvalidAction(format!("index {index} is out of range 0..{}", Self::COUNT))
        })
    }
}

impl fmt::Display for CatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatchAction::Left => f.write_str("left"),
            CatchAction::Idle => f.write_str("idle"),
            CatchAction::Right => f.write_str("right"),
        }
    }
}

/// Per-action counts over a sequence of moves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    /// Moves to the left
    pub left: usize,
    /// Idle steps
    pub idle: usize,
    /// Moves to the right
    pub right: usize,
}

impl<'a> FromIterator<&'a CatchAction> for ActionCounts {
    fn from_iter<I: IntoIterator<Item = &'a CatchAction>>(iter: I) -> Self {
        let mut counts = ActionCounts::default();
        for action in iter {
            match action {
                CatchAction::Left => counts.left += 1,
                CatchAction::Idle => counts.idle += 1,
                CatchAction::Right => counts.right += 1,
            }
        }
        counts
    }
}
