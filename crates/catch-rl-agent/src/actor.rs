//! Policy and critic network wrapper

use ndarray::{Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use catch_rl_core::{
    advantages, CatchAction, Observation, ObservationSpec, RLError, Result, ReturnEstimator,
    Trajectory,
};

use crate::loss::{critic_loss, LossOutput, PolicyLoss, PpoBatch, PpoObjective};
use crate::nn::{Activation, Gradients, Mlp, MlpConfig, OutputHead};
use crate::optim::Adam;

/// What a network predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkRole {
    /// Action distribution over left, idle and right
    Policy,
    /// Scalar state value
    Critic,
}

/// Actor construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Policy or critic
    pub role: NetworkRole,
    /// Observations the network consumes
    pub spec: ObservationSpec,
    /// Hidden layer sizes
    pub hidden_dims: Vec<usize>,
    /// Adam step size
    pub learning_rate: f64,
    /// Return formula used for targets
    pub estimator: ReturnEstimator,
    /// Policy only: train on advantages instead of returns
    pub baseline: bool,
    /// Policy only: policy-gradient loss settings
    pub policy_loss: PolicyLoss,
    /// Policy only: clipped-surrogate settings, `None` disables PPO
    pub ppo: Option<PpoObjective>,
    /// When false, [`Actor::update`] does nothing
    pub training: bool,
    /// Initialization seed
    pub seed: Option<u64>,
}

/// Single forward-pass result
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prediction {
    /// Policy output in action-index order
    Distribution([f32; CatchAction::COUNT]),
    /// Critic output
    Value(f32),
}

impl Prediction {
    /// The action distribution of a policy prediction
    pub fn into_distribution(self) -> Result<[f32; CatchAction::COUNT]> {
        match self {
            Prediction::Distribution(dist) => Ok(dist),
            Prediction::Value(_) => Err(RLError::Agent(
                "critic network has no action distribution".into(),
            )),
        }
    }

    /// The value of a critic prediction
    pub fn into_value(self) -> Result<f32> {
        match self {
            Prediction::Value(value) => Ok(value),
            Prediction::Distribution(_) => {
                Err(RLError::Agent("policy network has no value output".into()))
            }
        }
    }
}

/// Result of one optimizer step
#[derive(Debug, Clone)]
pub struct UpdateSummary {
    /// Gradients averaged over the batch, as applied
    pub gradients: Gradients,
    /// Mean loss over the batch
    pub mean_loss: f64,
    /// Mean over parameter tensors of each tensor's mean gradient
    pub grad_mean: f64,
    /// Return targets of each trajectory, before any baseline
    pub targets: Vec<Vec<f64>>,
}

/// Owns one network and its optimizer
pub struct Actor {
    config: ActorConfig,
    network: Mlp,
    optimizer: Adam,
}

impl Actor {
    /// Build a freshly initialized network
    pub fn new(config: ActorConfig) -> Result<Self> {
        let mut rng = config
            .seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        let (output_dim, head) = match config.role {
            NetworkRole::Policy => (CatchAction::COUNT, OutputHead::Softmax),
            NetworkRole::Critic => (1, OutputHead::Linear),
        };
        let network = Mlp::new(
            MlpConfig {
                input_dim: config.spec.flat_dim(),
                hidden_dims: config.hidden_dims.clone(),
                output_dim,
                activation: Activation::Relu,
                head,
            },
            &mut rng,
        )?;

        #[allow(clippy::cast_possible_truncation)]
        let optimizer = Adam::new(&network, config.learning_rate as f32);

        if !config.training {
            info!(role = ?config.role, "network is frozen, updates are skipped");
        }

        Ok(Self {
            config,
            network,
            optimizer,
        })
    }

    /// Construction settings
    #[must_use]
    pub fn config(&self) -> &ActorConfig {
        &self.config
    }

    /// Underlying network
    #[must_use]
    pub fn network(&self) -> &Mlp {
        &self.network
    }

    /// Observation as a single-row batch
    pub fn reshape_state(&self, state: &Observation) -> Result<Array2<f32>> {
        self.config.spec.check(state)?;
        Ok(state.flatten().insert_axis(Axis(0)))
    }

    /// Batch row back to an observation of the configured shape
    pub fn unshape_state(&self, row: ArrayView1<'_, f32>) -> Result<Observation> {
        Observation::unflatten(row, &self.config.spec.shape())
    }

    fn batch_states(&self, trajectory: &Trajectory) -> Result<Array2<f32>> {
        let mut states = Array2::zeros((trajectory.len(), self.config.spec.flat_dim()));
        for (mut row, transition) in states.rows_mut().into_iter().zip(&trajectory.transitions) {
            self.config.spec.check(&transition.state)?;
            row.assign(&transition.state.flatten());
        }
        Ok(states)
    }

    /// Forward pass for one observation
    pub fn predict(&self, state: &Observation) -> Result<Prediction> {
        self.predict_input(&self.reshape_state(state)?)
    }

    /// Forward pass for a row produced by [`Actor::reshape_state`]
    pub fn predict_input(&self, input: &Array2<f32>) -> Result<Prediction> {
        let output = self.network.forward(input)?;
        if output.iter().any(|v| !v.is_finite()) {
            return Err(RLError::Numerical(format!(
                "{:?} network produced a non-finite output",
                self.config.role
            )));
        }

        Ok(match self.config.role {
            NetworkRole::Policy => {
                Prediction::Distribution([output[[0, 0]], output[[0, 1]], output[[0, 2]]])
            }
            NetworkRole::Critic => Prediction::Value(output[[0, 0]]),
        })
    }

    /// Action distribution; fails on a critic
    pub fn predict_distribution(&self, state: &Observation) -> Result<[f32; CatchAction::COUNT]> {
        self.predict(state)?.into_distribution()
    }

    /// State value; fails on a policy
    pub fn predict_value(&self, state: &Observation) -> Result<f32> {
        self.predict(state)?.into_value()
    }

    /// One optimizer step on the gradients averaged over `batch`
    ///
    /// Returns `None` when training is disabled or the batch holds no steps.
    pub fn update(&mut self, batch: &[&Trajectory]) -> Result<Option<UpdateSummary>> {
        if !self.config.training {
            return Ok(None);
        }

        let mut gradients = Vec::with_capacity(batch.len());
        let mut losses = Vec::with_capacity(batch.len());
        let mut targets = Vec::with_capacity(batch.len());

        for trajectory in batch.iter().filter(|t| !t.is_empty()) {
            let returns = self.returns(trajectory)?;
            let states = self.batch_states(trajectory)?;
            let (output, cache) = self.network.forward_cached(&states)?;

            let loss = match self.config.role {
                NetworkRole::Critic => {
                    let counts = trajectory.action_counts();
                    debug!(
                        left = counts.left,
                        idle = counts.idle,
                        right = counts.right,
                        "actions taken"
                    );
                    critic_loss(&output, &returns)?
                }
                NetworkRole::Policy => self.policy_loss(trajectory, &output, &returns)?,
            };

            if !loss.value.is_finite() {
                return Err(RLError::Numerical(format!(
                    "{:?} loss is {}",
                    self.config.role, loss.value
                )));
            }

            gradients.push(self.network.backward(&cache, &loss.d_output)?);
            losses.push(loss.value);
            targets.push(returns);
        }

        if gradients.is_empty() {
            return Ok(None);
        }

        let mean = Gradients::mean(&gradients)?;
        if !mean.is_finite() {
            return Err(RLError::Numerical(format!(
                "{:?} gradients are not finite",
                self.config.role
            )));
        }
        self.optimizer.step(&mut self.network, &mean)?;

        #[allow(clippy::cast_precision_loss)]
        let mean_loss = losses.iter().sum::<f64>() / losses.len() as f64;
        Ok(Some(UpdateSummary {
            grad_mean: mean.mean_component(),
            gradients: mean,
            mean_loss,
            targets,
        }))
    }

    fn returns(&self, trajectory: &Trajectory) -> Result<Vec<f64>> {
        let rewards = trajectory.rewards();
        let values = trajectory.values();
        if self.config.estimator.bootstrap.needs_values() && values.is_none() {
            return Err(RLError::Configuration(
                "n-step returns need critic values recorded for every step".into(),
            ));
        }
        self.config.estimator.returns(&rewards, values.as_deref())
    }

    fn policy_loss(
        &self,
        trajectory: &Trajectory,
        probs: &Array2<f32>,
        returns: &[f64],
    ) -> Result<LossOutput> {
        let actions = trajectory.actions();
        let values = if self.config.baseline || self.config.ppo.is_some() {
            Some(trajectory.values().ok_or_else(|| {
                RLError::Configuration("baseline needs critic values recorded for every step".into())
            })?)
        } else {
            None
        };

        let q = match &values {
            Some(values) if self.config.baseline => advantages(returns, values)?,
            _ => returns.to_vec(),
        };

        match (self.config.ppo, values) {
            (Some(ppo), Some(values)) => {
                let old_probs = trajectory.distributions()?;
                ppo.loss(
                    &self.config.policy_loss,
                    &PpoBatch {
                        probs,
                        old_probs: &old_probs,
                        actions: &actions,
                        advantages: &q,
                        returns,
                        values: &values,
                    },
                )
            }
            _ => self.config.policy_loss.gain(probs, &actions, &q),
        }
    }

    /// Write the network as JSON
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.network)?;
        tokio::fs::write(path.as_ref(), json).await?;
        Ok(())
    }

    /// Replace the network with one written by [`Actor::save`]
    pub async fn load_weights(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let stored: Mlp = serde_json::from_slice(&bytes)?;
        self.network.load_from(stored)?;
        #[allow(clippy::cast_possible_truncation)]
        let lr = self.config.learning_rate as f32;
        self.optimizer = Adam::new(&self.network, lr);
        info!(role = ?self.config.role, path = %path.display(), "loaded pre-trained weights");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use catch_rl_core::{Bootstrap, ObservationType, Reward, Transition};
    use tempfile::tempdir;

    const GAMMA: f64 = 0.99;

    fn spec() -> ObservationSpec {
        ObservationSpec::new(ObservationType::Vector, 7, 7)
    }

    fn config(role: NetworkRole, bootstrap: Bootstrap) -> ActorConfig {
        ActorConfig {
            role,
            spec: spec(),
            hidden_dims: vec![16, 8],
            learning_rate: 0.001,
            estimator: ReturnEstimator::new(GAMMA, bootstrap).unwrap(),
            baseline: false,
            policy_loss: PolicyLoss::default(),
            ppo: None,
            training: true,
            seed: Some(5),
        }
    }

    fn state(x: f32) -> Observation {
        Observation::from_shape_vec(&[3], vec![x, 3.0, 6.0 - x]).unwrap()
    }

    fn trajectory(len: usize, value: Option<f64>, action: CatchAction) -> Trajectory {
        let mut trajectory = Trajectory::new();
        for t in 0..len {
            #[allow(clippy::cast_precision_loss)]
            let x = t as f32;
            trajectory.push(Transition {
                state: state(x),
                action,
                reward: Reward(1.0),
                value,
                distribution: None,
            });
        }
        trajectory
    }

    #[test]
    fn test_reshape_round_trip() {
        let actor = Actor::new(ActorConfig {
            spec: ObservationSpec::new(ObservationType::Pixel, 4, 3),
            ..config(NetworkRole::Policy, Bootstrap::MonteCarlo)
        })
        .unwrap();
        let data: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let obs = Observation::from_shape_vec(&[3, 4, 2], data).unwrap();

        let row = actor.reshape_state(&obs).unwrap();
        assert_eq!(row.shape(), &[1, 24]);
        let back = actor.unshape_state(row.row(0)).unwrap();
        assert_eq!(back, obs);

        assert!(matches!(
            actor.reshape_state(&state(0.0)),
            Err(RLError::Environment(_))
        ));
    }

    #[test]
    fn test_predict_by_role() {
        let policy = Actor::new(config(NetworkRole::Policy, Bootstrap::MonteCarlo)).unwrap();
        let dist = policy.predict_distribution(&state(1.0)).unwrap();
        assert_relative_eq!(dist.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        assert!(policy.predict_value(&state(1.0)).is_err());

        let critic = Actor::new(config(NetworkRole::Critic, Bootstrap::MonteCarlo)).unwrap();
        assert!(critic.predict_value(&state(1.0)).unwrap().is_finite());
        assert!(matches!(
            critic.predict_distribution(&state(1.0)),
            Err(RLError::Agent(_))
        ));
    }

    #[test]
    fn test_seeded_networks_match() {
        let a = Actor::new(config(NetworkRole::Policy, Bootstrap::MonteCarlo)).unwrap();
        let b = Actor::new(config(NetworkRole::Policy, Bootstrap::MonteCarlo)).unwrap();
        assert_eq!(a.network(), b.network());
    }

    #[test]
    fn test_frozen_actor_skips_updates() {
        let mut actor = Actor::new(ActorConfig {
            training: false,
            ..config(NetworkRole::Policy, Bootstrap::MonteCarlo)
        })
        .unwrap();
        let before = actor.network().clone();
        let t = trajectory(3, None, CatchAction::Idle);
        assert!(actor.update(&[&t]).unwrap().is_none());
        assert_eq!(actor.network(), &before);
    }

    #[test]
    fn test_monte_carlo_targets() {
        let mut actor = Actor::new(config(NetworkRole::Policy, Bootstrap::MonteCarlo)).unwrap();
        let t = trajectory(3, None, CatchAction::Idle);
        let summary = actor.update(&[&t]).unwrap().unwrap();

        let targets = &summary.targets[0];
        assert_relative_eq!(targets[0], 1.0 + GAMMA + GAMMA * GAMMA, epsilon = 1e-12);
        assert_relative_eq!(targets[1], 1.0 + GAMMA, epsilon = 1e-12);
        assert_relative_eq!(targets[2], 1.0, epsilon = 1e-12);
        assert!(summary.grad_mean.is_finite());
    }

    #[test]
    fn test_positive_returns_reinforce_taken_action() {
        let mut actor = Actor::new(config(NetworkRole::Policy, Bootstrap::MonteCarlo)).unwrap();
        let probe = state(0.0);
        let before = actor.predict_distribution(&probe).unwrap();

        // one step from x = 0.0 with reward 1
        let t = trajectory(1, None, CatchAction::Right);
        actor.update(&[&t]).unwrap().unwrap();

        let after = actor.predict_distribution(&probe).unwrap();
        assert!(after[2] > before[2]);
    }

    #[test]
    fn test_critic_moves_towards_returns() {
        let mut critic = Actor::new(ActorConfig {
            learning_rate: 0.01,
            ..config(NetworkRole::Critic, Bootstrap::MonteCarlo)
        })
        .unwrap();
        let t = trajectory(4, Some(0.0), CatchAction::Left);

        let first = critic.update(&[&t]).unwrap().unwrap().mean_loss;
        let mut last = first;
        for _ in 0..200 {
            last = critic.update(&[&t]).unwrap().unwrap().mean_loss;
        }
        assert!(last < first);
    }

    #[test]
    fn test_n_step_requires_values() {
        let mut critic = Actor::new(config(NetworkRole::Critic, Bootstrap::NStep(2))).unwrap();
        let t = trajectory(3, None, CatchAction::Idle);
        assert!(matches!(
            critic.update(&[&t]),
            Err(RLError::Configuration(_))
        ));
    }

    #[test]
    fn test_ppo_requires_recorded_distributions() {
        let mut actor = Actor::new(ActorConfig {
            baseline: true,
            ppo: Some(PpoObjective::default()),
            ..config(NetworkRole::Policy, Bootstrap::NStep(2))
        })
        .unwrap();
        let t = trajectory(3, Some(0.5), CatchAction::Idle);
        assert!(matches!(actor.update(&[&t]), Err(RLError::Configuration(_))));

        let mut with_dists = t.clone();
        for transition in &mut with_dists.transitions {
            transition.distribution = Some([0.3, 0.4, 0.3]);
        }
        assert!(actor.update(&[&with_dists]).unwrap().is_some());
    }

    #[test]
    fn test_non_finite_loss_is_not_applied() {
        let mut actor = Actor::new(config(NetworkRole::Policy, Bootstrap::MonteCarlo)).unwrap();
        let before = actor.network().clone();
        let mut t = trajectory(3, None, CatchAction::Right);
        t.transitions[1].reward = Reward(f64::INFINITY);

        assert!(matches!(actor.update(&[&t]), Err(RLError::Numerical(_))));
        assert_eq!(actor.network(), &before);
    }

    #[test]
    fn test_batch_of_empty_trajectories() {
        let mut actor = Actor::new(config(NetworkRole::Policy, Bootstrap::MonteCarlo)).unwrap();
        let empty = Trajectory::new();
        assert!(actor.update(&[&empty]).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("w_P_test.json");

        let trained = {
            let mut actor = Actor::new(config(NetworkRole::Policy, Bootstrap::MonteCarlo)).unwrap();
            let t = trajectory(3, None, CatchAction::Left);
            actor.update(&[&t]).unwrap();
            actor.save(&path).await.unwrap();
            actor
        };

        let mut fresh = Actor::new(ActorConfig {
            seed: Some(99),
            ..config(NetworkRole::Policy, Bootstrap::MonteCarlo)
        })
        .unwrap();
        assert_ne!(fresh.network(), trained.network());
        fresh.load_weights(&path).await.unwrap();
        let loaded = fresh.predict_distribution(&state(1.0)).unwrap();
        let expected = trained.predict_distribution(&state(1.0)).unwrap();
        for (a, b) in loaded.iter().zip(&expected) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[tokio::test]
    async fn test_load_rejects_critic_weights_into_policy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("w_V_test.json");
        let critic = Actor::new(config(NetworkRole::Critic, Bootstrap::MonteCarlo)).unwrap();
        critic.save(&path).await.unwrap();

        let mut policy = Actor::new(config(NetworkRole::Policy, Bootstrap::MonteCarlo)).unwrap();
        assert!(matches!(
            policy.load_weights(&path).await,
            Err(RLError::Configuration(_))
        ));
    }
}
