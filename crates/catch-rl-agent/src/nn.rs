//! Feed-forward networks with an explicit backward pass
//!
//! Inputs are batches of flattened observations (`batch x features`). Every
//! layer is dense: `y = x·W + b` with `W` stored as `in x out`.

use ndarray::{Array1, Array2, Axis, Zip};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use catch_rl_core::{RLError, Result};

/// Hidden-layer activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// `max(0, x)`
    #[default]
    Relu,
    /// `tanh(x)`
    Tanh,
    /// Identity
    Linear,
}

impl Activation {
    fn apply(self, x: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => x.mapv(|v| v.max(0.0)),
            Activation::Tanh => x.mapv(f32::tanh),
            Activation::Linear => x.clone(),
        }
    }

    /// Chain `d_out` back through the activation given its pre-activation
    /// input and its output
    fn backward(self, pre: &Array2<f32>, post: &Array2<f32>, d_out: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => {
                Zip::from(d_out)
                    .and(pre)
                    .map_collect(|&d, &z| if z > 0.0 { d } else { 0.0 })
            }
            Activation::Tanh => Zip::from(d_out)
                .and(post)
                .map_collect(|&d, &a| d * (1.0 - a * a)),
            Activation::Linear => d_out.clone(),
        }
    }
}

/// Transformation applied to the final layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputHead {
    /// Row-wise softmax, producing a categorical distribution
    Softmax,
    /// Raw linear output
    Linear,
}

/// Network shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpConfig {
    /// Flattened input dimension
    pub input_dim: usize,
    /// Hidden layer sizes
    pub hidden_dims: Vec<usize>,
    /// Output dimension
    pub output_dim: usize,
    /// Hidden activation
    pub activation: Activation,
    /// Output transformation
    pub head: OutputHead,
}

/// Dense layer parameters; also used to hold their gradients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    /// `in x out` weight matrix
    pub weights: Array2<f32>,
    /// Bias vector of length `out`
    pub bias: Array1<f32>,
}

impl Dense {
    /// Glorot-normal weights and zero bias
    #[allow(clippy::cast_precision_loss)]
    pub fn glorot<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, rng: &mut R) -> Result<Self> {
        let std = (2.0 / (in_dim + out_dim) as f32).sqrt();
        let normal = Normal::new(0.0, std)
            .map_err(|e| RLError::Configuration(format!("invalid initializer: {e}")))?;
        Ok(Self {
            weights: Array2::from_shape_fn((in_dim, out_dim), |_| normal.sample(rng)),
            bias: Array1::zeros(out_dim),
        })
    }

    /// All-zero layer of the same shape
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        Self {
            weights: Array2::zeros(self.weights.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.weights) + &self.bias
    }

    fn same_shape(&self, other: &Dense) -> bool {
        self.weights.shape() == other.weights.shape() && self.bias.len() == other.bias.len()
    }
}

/// Intermediate values of a forward pass, needed by [`Mlp::backward`]
#[derive(Debug, Clone)]
pub struct ForwardCache {
    inputs: Vec<Array2<f32>>,
    pre: Vec<Array2<f32>>,
    output: Array2<f32>,
}

impl ForwardCache {
    /// Network output of the cached pass
    #[must_use]
    pub fn output(&self) -> &Array2<f32> {
        &self.output
    }
}

/// Parameter gradients, one [`Dense`] per layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradients {
    /// Per-layer gradients in forward order
    pub layers: Vec<Dense>,
}

impl Gradients {
    /// Zero gradients matching a network
    #[must_use]
    pub fn zeros_like(network: &Mlp) -> Self {
        Self {
            layers: network.layers.iter().map(Dense::zeros_like).collect(),
        }
    }

    /// Elementwise mean of several gradients of identical shape
    pub fn mean(batch: &[Gradients]) -> Result<Self> {
        let first = batch
            .first()
            .ok_or_else(|| RLError::Agent("cannot average an empty gradient batch".into()))?;

        let mut sum = first.clone();
        for grads in &batch[1..] {
            if grads.layers.len() != sum.layers.len() {
                return Err(RLError::DimensionMismatch {
                    expected: sum.layers.len(),
                    actual: grads.layers.len(),
                });
            }
            for (acc, layer) in sum.layers.iter_mut().zip(&grads.layers) {
                if !acc.same_shape(layer) {
                    return Err(RLError::DimensionMismatch {
                        expected: acc.weights.len(),
                        actual: layer.weights.len(),
                    });
                }
                acc.weights += &layer.weights;
                acc.bias += &layer.bias;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let scale = 1.0 / batch.len() as f32;
        for layer in &mut sum.layers {
            layer.weights *= scale;
            layer.bias *= scale;
        }
        Ok(sum)
    }

    /// Mean over parameter tensors of each tensor's mean value
    #[must_use]
    pub fn mean_component(&self) -> f64 {
        let means: Vec<f64> = self
            .layers
            .iter()
            .flat_map(|layer| [layer.weights.mean(), layer.bias.mean()])
            .map(|m| f64::from(m.unwrap_or(0.0)))
            .collect();
        if means.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = means.len() as f64;
        means.iter().sum::<f64>() / count
    }

    /// Whether every component is finite
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.layers.iter().all(|layer| {
            layer.weights.iter().all(|v| v.is_finite()) && layer.bias.iter().all(|v| v.is_finite())
        })
    }
}

/// Multi-layer perceptron
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    config: MlpConfig,
    layers: Vec<Dense>,
}

impl Mlp {
    /// Build a network with Glorot-normal initialization
    pub fn new<R: Rng + ?Sized>(config: MlpConfig, rng: &mut R) -> Result<Self> {
        if config.input_dim == 0 || config.output_dim == 0 || config.hidden_dims.contains(&0) {
            return Err(RLError::Configuration(format!(
                "network layers must be non-empty: {} -> {:?} -> {}",
                config.input_dim, config.hidden_dims, config.output_dim
            )));
        }

        let mut layers = Vec::with_capacity(config.hidden_dims.len() + 1);
        let mut prev_dim = config.input_dim;
        for &hidden_dim in &config.hidden_dims {
            layers.push(Dense::glorot(prev_dim, hidden_dim, rng)?);
            prev_dim = hidden_dim;
        }
        layers.push(Dense::glorot(prev_dim, config.output_dim, rng)?);

        Ok(Self { config, layers })
    }

    /// Network shape
    #[must_use]
    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    /// Layer parameters in forward order
    #[must_use]
    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Dense] {
        &mut self.layers
    }

    /// Replace all parameters with those of another network of the same shape
    pub fn load_from(&mut self, other: Mlp) -> Result<()> {
        if other.config != self.config {
            return Err(RLError::Configuration(format!(
                "stored network {:?} does not match configured network {:?}",
                other.config, self.config
            )));
        }
        if other.layers.len() != self.layers.len()
            || other.layers.iter().zip(&self.layers).any(|(a, b)| !a.same_shape(b))
        {
            return Err(RLError::Configuration(
                "stored layer shapes do not match the configuration".into(),
            ));
        }
        self.layers = other.layers;
        Ok(())
    }

    /// Forward pass over a batch
    pub fn forward(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        Ok(self.forward_cached(input)?.0)
    }

    /// Forward pass that keeps what the backward pass needs
    pub fn forward_cached(&self, input: &Array2<f32>) -> Result<(Array2<f32>, ForwardCache)> {
        if input.ncols() != self.config.input_dim {
            return Err(RLError::DimensionMismatch {
                expected: self.config.input_dim,
                actual: input.ncols(),
            });
        }

        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut pre = Vec::with_capacity(self.layers.len());
        let mut hidden = input.clone();
        let last = self.layers.len() - 1;

        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&hidden);
            inputs.push(hidden);
            hidden = if i == last {
                match self.config.head {
                    OutputHead::Softmax => softmax_rows(&z),
                    OutputHead::Linear => z.clone(),
                }
            } else {
                self.config.activation.apply(&z)
            };
            pre.push(z);
        }

        let cache = ForwardCache {
            inputs,
            pre,
            output: hidden.clone(),
        };
        Ok((hidden, cache))
    }

    /// Gradients of a scalar loss given `d_output = ∂loss/∂output`
    ///
    /// For a softmax head `d_output` is taken with respect to the
    /// probabilities, not the logits.
    pub fn backward(&self, cache: &ForwardCache, d_output: &Array2<f32>) -> Result<Gradients> {
        if d_output.shape() != cache.output.shape() {
            return Err(RLError::DimensionMismatch {
                expected: cache.output.len(),
                actual: d_output.len(),
            });
        }

        let mut delta = match self.config.head {
            OutputHead::Softmax => softmax_backward(&cache.output, d_output),
            OutputHead::Linear => d_output.clone(),
        };

        let mut grads: Vec<Dense> = Vec::with_capacity(self.layers.len());
        for i in (0..self.layers.len()).rev() {
            let input = &cache.inputs[i];
            grads.push(Dense {
                weights: input.t().dot(&delta),
                bias: delta.sum_axis(Axis(0)),
            });

            if i > 0 {
                let d_hidden = delta.dot(&self.layers[i].weights.t());
                // cache.inputs[i] is the activation output of layer i - 1
                delta = self
                    .config
                    .activation
                    .backward(&cache.pre[i - 1], input, &d_hidden);
            }
        }
        grads.reverse();

        Ok(Gradients { layers: grads })
    }
}

fn softmax_rows(z: &Array2<f32>) -> Array2<f32> {
    let mut out = z.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    out
}

/// `dz_k = p_k (g_k - Σ_j p_j g_j)` per row
fn softmax_backward(probs: &Array2<f32>, d_probs: &Array2<f32>) -> Array2<f32> {
    let dot = (probs * d_probs).sum_axis(Axis(1)).insert_axis(Axis(1));
    probs * &(d_probs - &dot)
}
