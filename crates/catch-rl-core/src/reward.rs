//! Reward signals

use serde::{Deserialize, Serialize};

/// Reward for a single step
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Reward(pub f64);

impl Reward {
    /// A ball landed on the paddle
    pub const CATCH: Reward = Reward(1.0);
    /// A ball reached the bottom row away from the paddle
    pub const MISS: Reward = Reward(-1.0);

    /// Whether the signal is usable for training
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl From<Reward> for f64 {
    fn from(reward: Reward) -> Self {
        reward.0
    }
}

impl std::ops::AddAssign for Reward {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_and_miss_cancel() {
        let mut total = Reward::default();
        total += Reward::CATCH;
        total += Reward::MISS;
        total += Reward::CATCH;
        assert_eq!(f64::from(total), 1.0);
    }

    #[test]
    fn test_non_finite_rewards() {
        assert!(Reward::MISS.is_finite());
        assert!(!Reward(f64::INFINITY).is_finite());
        assert!(!Reward(f64::NAN).is_finite());
    }
}
