//! Discounted return and advantage estimation

use serde::{Deserialize, Serialize};

use crate::{RLError, Result};

/// Default discount factor
pub const DEFAULT_GAMMA: f64 = 0.99;

/// How returns are formed from a reward sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bootstrap {
    /// Full discounted sum to the end of the trajectory
    MonteCarlo,
    /// Discounted sum over `n` steps plus a bootstrapped value estimate
    NStep(usize),
}

impl Bootstrap {
    /// Whether value estimates are needed to compute returns
    #[must_use]
    pub fn needs_values(&self) -> bool {
        matches!(self, Bootstrap::NStep(_))
    }
}

/// Computes per-step returns for a trajectory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnEstimator {
    /// Discount factor
    pub gamma: f64,
    /// Return formula
    pub bootstrap: Bootstrap,
}

impl ReturnEstimator {
    /// Create an estimator
    pub fn new(gamma: f64, bootstrap: Bootstrap) -> Result<Self> {
        if !(0.0..=1.0).contains(&gamma) {
            return Err(RLError::Configuration(format!(
                "discount factor {gamma} is outside [0, 1]"
            )));
        }
        if bootstrap == Bootstrap::NStep(0) {
            return Err(RLError::Configuration("n-step horizon must be at least 1".into()));
        }
        Ok(Self { gamma, bootstrap })
    }

    /// Return `G_t` for every start index of `rewards`
    ///
    /// In n-step mode the tail `γ^L · V[t+L-1]` is added for every `t`,
    /// including windows clipped by the end of the trajectory.
    pub fn returns(&self, rewards: &[f64], values: Option<&[f64]>) -> Result<Vec<f64>> {
        match self.bootstrap {
            Bootstrap::MonteCarlo => Ok(self.monte_carlo(rewards)),
            Bootstrap::NStep(n) => {
                let values = values.ok_or_else(|| {
                    RLError::Configuration("n-step returns need value estimates".into())
                })?;
                if values.len() != rewards.len() {
                    return Err(RLError::DimensionMismatch {
                        expected: rewards.len(),
                        actual: values.len(),
                    });
                }
                Ok(self.n_step(rewards, values, n))
            }
        }
    }

    fn monte_carlo(&self, rewards: &[f64]) -> Vec<f64> {
        let mut returns = vec![0.0; rewards.len()];
        let mut running = 0.0;
        for t in (0..rewards.len()).rev() {
            running = rewards[t] + self.gamma * running;
            returns[t] = running;
        }
        returns
    }

    fn n_step(&self, rewards: &[f64], values: &[f64], n: usize) -> Vec<f64> {
        let horizon = rewards.len();
        (0..horizon)
            .map(|t| {
                let len = n.min(horizon - t);
                let mut discount = 1.0;
                let mut ret = 0.0;
                for reward in &rewards[t..t + len] {
                    ret += discount * reward;
                    discount *= self.gamma;
                }
                // `discount` is now γ^len
                ret + discount * values[t + len - 1]
            })
            .collect()
    }
}

/// Subtract the value baseline from returns
pub fn advantages(returns: &[f64], values: &[f64]) -> Result<Vec<f64>> {
    if returns.len() != values.len() {
        return Err(RLError::DimensionMismatch {
            expected: returns.len(),
            actual: values.len(),
        });
    }
    Ok(returns.iter().zip(values).map(|(g, v)| g - v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const GAMMA: f64 = 0.99;

    fn mc() -> ReturnEstimator {
        ReturnEstimator::new(GAMMA, Bootstrap::MonteCarlo).unwrap()
    }

    fn n_step(n: usize) -> ReturnEstimator {
        ReturnEstimator::new(GAMMA, Bootstrap::NStep(n)).unwrap()
    }

    #[test]
    fn test_monte_carlo_three_steps() {
        let returns = mc().returns(&[1.0, 1.0, 1.0], None).unwrap();
        assert_relative_eq!(returns[0], 1.0 + GAMMA + GAMMA * GAMMA, epsilon = 1e-12);
        assert_relative_eq!(returns[1], 1.0 + GAMMA, epsilon = 1e-12);
        assert_relative_eq!(returns[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_monte_carlo_last_step_is_raw_reward() {
        let rewards = [0.3, -1.0, 2.5, -0.75];
        let returns = mc().returns(&rewards, None).unwrap();
        assert_eq!(returns[3], -0.75);
    }

    #[test]
    fn test_n_step_bootstraps_off_window_end() {
        let rewards = [1.0, 0.0, -1.0, 1.0];
        let values = [0.5, 0.25, -0.5, 2.0];
        let returns = n_step(2).returns(&rewards, Some(&values)).unwrap();

        assert_relative_eq!(returns[0], 1.0 + GAMMA * 0.0 + GAMMA.powi(2) * 0.25, epsilon = 1e-12);
        assert_relative_eq!(returns[1], 0.0 + GAMMA * -1.0 + GAMMA.powi(2) * -0.5, epsilon = 1e-12);
        assert_relative_eq!(returns[2], -1.0 + GAMMA * 1.0 + GAMMA.powi(2) * 2.0, epsilon = 1e-12);
        // window clipped to one step, still bootstraps off the final value
        assert_relative_eq!(returns[3], 1.0 + GAMMA * 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_n_step_without_values_is_a_configuration_error() {
        assert!(matches!(
            n_step(3).returns(&[1.0], None),
            Err(RLError::Configuration(_))
        ));
    }

    #[test]
    fn test_n_step_value_length_must_match() {
        assert!(matches!(
            n_step(3).returns(&[1.0, 2.0], Some(&[0.0])),
            Err(RLError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_invalid_estimators() {
        assert!(ReturnEstimator::new(1.5, Bootstrap::MonteCarlo).is_err());
        assert!(ReturnEstimator::new(0.9, Bootstrap::NStep(0)).is_err());
    }

    #[test]
    fn test_advantages_subtract_baseline() {
        let adv = advantages(&[3.0, 2.0, 1.0], &[1.0, 1.0, 1.5]).unwrap();
        assert_eq!(adv, vec![2.0, 1.0, -0.5]);
    }

    #[test]
    fn test_empty_rewards() {
        assert!(mc().returns(&[], None).unwrap().is_empty());
        assert!(n_step(5).returns(&[], Some(&[])).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_zero_rewards_give_zero_returns(len in 0usize..40, n in 1usize..10) {
            let rewards = vec![0.0; len];
            let values = vec![0.0; len];
            for ret in mc().returns(&rewards, None).unwrap() {
                prop_assert_eq!(ret, 0.0);
            }
            for ret in n_step(n).returns(&rewards, Some(&values)).unwrap() {
                prop_assert_eq!(ret, 0.0);
            }
        }

        #[test]
        fn prop_long_n_step_matches_monte_carlo(
            rewards in proptest::collection::vec(-1.0f64..1.0, 1..40),
            extra in 0usize..10,
        ) {
            let n = rewards.len() + extra;
            let zeros = vec![0.0; rewards.len()];
            let boot = n_step(n).returns(&rewards, Some(&zeros)).unwrap();
            let full = mc().returns(&rewards, None).unwrap();
            for (a, b) in boot.iter().zip(&full) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }

        #[test]
        fn prop_monte_carlo_satisfies_recursion(
            rewards in proptest::collection::vec(-1.0f64..1.0, 2..40),
        ) {
            let returns = mc().returns(&rewards, None).unwrap();
            for t in 0..rewards.len() - 1 {
                prop_assert!((returns[t] - (rewards[t] + GAMMA * returns[t + 1])).abs() < 1e-9);
            }
        }
    }
}
