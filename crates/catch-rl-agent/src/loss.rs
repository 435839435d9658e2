//! Policy-gradient, PPO and critic losses
//!
//! Each loss returns its scalar value together with the gradient with
//! respect to the network output, ready for [`crate::nn::Mlp::backward`].

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use catch_rl_core::{CatchAction, RLError, Result};

/// Lower bound applied to probabilities before taking their logarithm
pub const MIN_PROBABILITY: f64 = 1e-8;

/// Scalar loss and `∂loss/∂output`
#[derive(Debug, Clone)]
pub struct LossOutput {
    /// Loss value
    pub value: f64,
    /// Gradient with respect to the network output, same shape as the output
    pub d_output: Array2<f32>,
}

/// Probability assigned to the taken action at each step, clamped to
/// `[MIN_PROBABILITY, 1]`
pub fn select_taken(probs: &Array2<f32>, actions: &[CatchAction]) -> Result<Vec<f64>> {
    check_rows(probs, actions.len())?;
    Ok(actions
        .iter()
        .enumerate()
        .map(|(t, action)| f64::from(probs[[t, action.index()]]).clamp(MIN_PROBABILITY, 1.0))
        .collect())
}

fn check_rows(probs: &Array2<f32>, len: usize) -> Result<()> {
    if probs.ncols() != CatchAction::COUNT {
        return Err(RLError::DimensionMismatch {
            expected: CatchAction::COUNT,
            actual: probs.ncols(),
        });
    }
    if probs.nrows() != len {
        return Err(RLError::DimensionMismatch {
            expected: len,
            actual: probs.nrows(),
        });
    }
    Ok(())
}

fn check_len(name: &str, values: &[f64], len: usize) -> Result<()> {
    if values.len() == len {
        Ok(())
    } else {
        Err(RLError::Agent(format!(
            "{name} has {} entries for {len} steps",
            values.len()
        )))
    }
}

/// Whether the clamp on `p` was inactive, i.e. gradients flow through it
fn unclamped(raw: f32) -> bool {
    f64::from(raw) >= MIN_PROBABILITY
}

/// Entropy-regularized policy-gradient objective
///
/// `gain = Σ_t [-Q_t · ln p_t - η · p_t · ln p_t]` where `p_t` is the
/// probability of the action taken at step `t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyLoss {
    /// Entropy coefficient
    pub eta: f64,
}

impl Default for PolicyLoss {
    fn default() -> Self {
        Self { eta: 0.01 }
    }
}

impl PolicyLoss {
    /// Evaluate the gain and its gradient
    pub fn gain(&self, probs: &Array2<f32>, actions: &[CatchAction], q: &[f64]) -> Result<LossOutput> {
        let taken = select_taken(probs, actions)?;
        check_len("return vector", q, actions.len())?;

        let mut value = 0.0;
        let mut d_output = Array2::zeros(probs.raw_dim());
        for (t, action) in actions.iter().enumerate() {
            let p = taken[t];
            let ln_p = p.ln();
            value += -q[t] * ln_p - self.eta * p * ln_p;

            let col = action.index();
            if unclamped(probs[[t, col]]) {
                #[allow(clippy::cast_possible_truncation)]
                let d = (-q[t] / p - self.eta * (ln_p + 1.0)) as f32;
                d_output[[t, col]] = d;
            }
        }

        Ok(LossOutput { value, d_output })
    }
}

/// Clipped-surrogate objective blended with the critic error and the
/// policy-gradient gain
///
/// `loss = -(mean(min(r·A, clip(r, 1-ε, 1+ε)·A)) + c·mse(G, V) - gain)`
/// with `r = p_new / p_old`. `V` are the critic values recorded during the
/// rollout, so the critic term only shifts the loss value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PpoObjective {
    /// Ratio clip range ε
    pub clip: f64,
    /// Weight of the critic error term
    pub critic_coef: f64,
}

impl Default for PpoObjective {
    fn default() -> Self {
        Self {
            clip: 0.8,
            critic_coef: 0.5,
        }
    }
}

/// Inputs of [`PpoObjective::loss`] for one trajectory
#[derive(Debug, Clone, Copy)]
pub struct PpoBatch<'a> {
    /// Current policy output, `T x 3`
    pub probs: &'a Array2<f32>,
    /// Rollout policy output, `T x 3`
    pub old_probs: &'a Array2<f32>,
    /// Actions taken
    pub actions: &'a [CatchAction],
    /// Advantages
    pub advantages: &'a [f64],
    /// Returns
    pub returns: &'a [f64],
    /// Critic values recorded during the rollout
    pub values: &'a [f64],
}

impl PpoObjective {
    /// Evaluate the combined loss and its gradient
    pub fn loss(&self, policy: &PolicyLoss, batch: &PpoBatch<'_>) -> Result<LossOutput> {
        let len = batch.actions.len();
        check_rows(batch.old_probs, len)?;
        check_len("advantage vector", batch.advantages, len)?;
        check_len("return vector", batch.returns, len)?;

        let gain = policy.gain(batch.probs, batch.actions, batch.advantages)?;
        if len == 0 {
            return Ok(gain);
        }

        let new_p = select_taken(batch.probs, batch.actions)?;
        let old_p = select_taken(batch.old_probs, batch.actions)?;
        let c_loss = mean_squared_error(batch.values, batch.returns)?;
        let (lo, hi) = (1.0 - self.clip, 1.0 + self.clip);

        #[allow(clippy::cast_precision_loss)]
        let n = len as f64;
        let mut surrogate = 0.0;
        // starts as -∂gain/∂p, flipped at the end
        let mut d_output = -gain.d_output;
        for (t, action) in batch.actions.iter().enumerate() {
            let adv = batch.advantages[t];
            let ratio = new_p[t] / old_p[t];
            let clipped = ratio.clamp(lo, hi);
            let s1 = ratio * adv;
            let s2 = clipped * adv;
            surrogate += s1.min(s2);

            // the clipped branch only passes gradient inside the clip range
            let d_ratio = if s1 <= s2 || (lo..=hi).contains(&ratio) {
                adv
            } else {
                0.0
            };

            let col = action.index();
            if unclamped(batch.probs[[t, col]]) {
                #[allow(clippy::cast_possible_truncation)]
                let d = (d_ratio / old_p[t] / n) as f32;
                d_output[[t, col]] += d;
            }
        }
        d_output.mapv_inplace(|v| -v);

        let value = -(surrogate / n + self.critic_coef * c_loss - gain.value);
        Ok(LossOutput { value, d_output })
    }
}

/// Mean squared error between predictions and targets
pub fn mean_squared_error(predictions: &[f64], targets: &[f64]) -> Result<f64> {
    if predictions.len() != targets.len() {
        return Err(RLError::DimensionMismatch {
            expected: targets.len(),
            actual: predictions.len(),
        });
    }
    if targets.is_empty() {
        return Ok(0.0);
    }
    #[allow(clippy::cast_precision_loss)]
    let n = targets.len() as f64;
    Ok(predictions
        .iter()
        .zip(targets)
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / n)
}

/// Critic regression loss over a `T x 1` output
pub fn critic_loss(output: &Array2<f32>, targets: &[f64]) -> Result<LossOutput> {
    if output.ncols() != 1 {
        return Err(RLError::DimensionMismatch {
            expected: 1,
            actual: output.ncols(),
        });
    }
    let predictions: Vec<f64> = output.column(0).iter().map(|&v| f64::from(v)).collect();
    let value = mean_squared_error(&predictions, targets)?;

    #[allow(clippy::cast_precision_loss)]
    let n = targets.len().max(1) as f64;
    let mut d_output = Array2::zeros(output.raw_dim());
    for (t, (p, g)) in predictions.iter().zip(targets).enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let d = (2.0 * (p - g) / n) as f32;
        d_output[[t, 0]] = d;
    }
    Ok(LossOutput { value, d_output })
}

/// Shannon entropy of a categorical distribution in nats
#[must_use]
pub fn categorical_entropy(dist: &[f32]) -> f64 {
    dist.iter()
        .map(|&p| f64::from(p))
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.ln())
        .sum()
}
