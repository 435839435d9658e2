//! Adam optimizer

use ndarray::Zip;

use catch_rl_core::{RLError, Result};

use crate::nn::{Dense, Gradients, Mlp};

/// Adam with bias-corrected moment estimates
#[derive(Debug, Clone)]
pub struct Adam {
    /// Step size
    pub learning_rate: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: i32,
    m: Vec<Dense>,
    v: Vec<Dense>,
}

impl Adam {
    /// Optimizer state for `network`
    #[must_use]
    pub fn new(network: &Mlp, learning_rate: f32) -> Self {
        let zeros: Vec<Dense> = network.layers().iter().map(Dense::zeros_like).collect();
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            t: 0,
            m: zeros.clone(),
            v: zeros,
        }
    }

    /// Number of steps applied so far
    #[must_use]
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Apply one descent step of `grads` to `network`
    pub fn step(&mut self, network: &mut Mlp, grads: &Gradients) -> Result<()> {
        if grads.layers.len() != self.m.len() {
            return Err(RLError::DimensionMismatch {
                expected: self.m.len(),
                actual: grads.layers.len(),
            });
        }

        self.t += 1;
        let correction1 = 1.0 - self.beta1.powi(self.t);
        let correction2 = 1.0 - self.beta2.powi(self.t);
        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.eps, self.learning_rate);

        let update = |param: &mut f32, m: &mut f32, v: &mut f32, g: &f32| {
            *m = beta1 * *m + (1.0 - beta1) * g;
            *v = beta2 * *v + (1.0 - beta2) * g * g;
            let m_hat = *m / correction1;
            let v_hat = *v / correction2;
            *param -= lr * m_hat / (v_hat.sqrt() + eps);
        };

        for (((layer, m), v), g) in network
            .layers_mut()
            .iter_mut()
            .zip(&mut self.m)
            .zip(&mut self.v)
            .zip(&grads.layers)
        {
            if layer.weights.shape() != g.weights.shape() || layer.bias.len() != g.bias.len() {
                return Err(RLError::DimensionMismatch {
                    expected: layer.weights.len(),
                    actual: g.weights.len(),
                });
            }
            Zip::from(&mut layer.weights)
                .and(&mut m.weights)
                .and(&mut v.weights)
                .and(&g.weights)
                .for_each(update);
            Zip::from(&mut layer.bias)
                .and(&mut m.bias)
                .and(&mut v.bias)
                .and(&g.bias)
                .for_each(update);
        }
        Ok(())
    }
}
