//! Rollout collection

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use tracing::debug;

use catch_rl_core::{CatchAction, Environment, Memory, RLError, Result, Trajectory, Transition};

use crate::actor::Actor;

/// Runs the current policy in an environment
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryCollector {
    /// Longest rollout
    pub max_steps: usize,
    /// Keep the full action distribution of every step, needed for PPO
    pub record_distributions: bool,
}

impl TrajectoryCollector {
    /// Fill every trajectory slot of `memory` with a fresh rollout
    pub async fn collect_into<E>(
        &self,
        memory: &mut Memory,
        env: &mut E,
        policy: &Actor,
        critic: Option<&Actor>,
        rng: &mut impl Rng,
    ) -> Result<()>
    where
        E: Environment + ?Sized,
    {
        for (slot, trajectory) in memory.trajectories.iter_mut().enumerate() {
            self.rollout(trajectory, env, policy, critic, rng).await?;
            debug!(
                slot,
                steps = trajectory.len(),
                total_reward = trajectory.total_reward,
                "rollout finished"
            );
        }
        Ok(())
    }

    /// Play one episode into `trajectory`, replacing its contents
    pub async fn rollout<E>(
        &self,
        trajectory: &mut Trajectory,
        env: &mut E,
        policy: &Actor,
        critic: Option<&Actor>,
        rng: &mut impl Rng,
    ) -> Result<()>
    where
        E: Environment + ?Sized,
    {
        trajectory.clear();
        let mut state = env.reset().await?;

        for _ in 0..self.max_steps {
            let input = policy.reshape_state(&state)?;
            let distribution = policy.predict_input(&input)?.into_distribution()?;
            let value = match critic {
                Some(critic) => Some(f64::from(critic.predict_input(&input)?.into_value()?)),
                None => None,
            };
            let action = sample_action(&distribution, rng)?;

            let step = env.step(action).await?;
            trajectory.push(Transition {
                state: policy.unshape_state(input.row(0))?,
                action,
                reward: step.reward,
                value,
                distribution: self.record_distributions.then_some(distribution),
            });

            if step.done {
                break;
            }
            state = step.observation;
        }
        Ok(())
    }
}

/// Draw an action from a distribution in action-index order
pub fn sample_action(distribution: &[f32; CatchAction::COUNT], rng: &mut impl Rng) -> Result<CatchAction> {
    let weights = WeightedIndex::new(distribution.iter().copied()).map_err(|e| {
        RLError::Numerical(format!("cannot sample from {distribution:?}: {e}"))
    })?;
    CatchAction::from_index(weights.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorConfig, NetworkRole};
    use crate::loss::PolicyLoss;
    use async_trait::async_trait;
    use catch_rl_core::{
        Bootstrap, Observation, ObservationSpec, ObservationType, ReturnEstimator, Reward, Step,
    };
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Reward 1 per step, done after `len` steps
    struct ConstantEnv {
        len: usize,
        t: usize,
    }

    #[async_trait]
    impl Environment for ConstantEnv {
        fn observation_spec(&self) -> ObservationSpec {
            ObservationSpec::new(ObservationType::Vector, 7, 7)
        }

        async fn reset(&mut self) -> Result<Observation> {
            self.t = 0;
            Observation::from_shape_vec(&[3], vec![3.0, 3.0, 6.0])
        }

        async fn step(&mut self, _action: CatchAction) -> Result<Step> {
            self.t += 1;
            #[allow(clippy::cast_precision_loss)]
            let y = 6.0 - self.t as f32;
            Ok(Step {
                observation: Observation::from_shape_vec(&[3], vec![3.0, 3.0, y])?,
                reward: Reward(1.0),
                done: self.t >= self.len,
            })
        }
    }

    fn actor(role: NetworkRole) -> Actor {
        Actor::new(ActorConfig {
            role,
            spec: ObservationSpec::new(ObservationType::Vector, 7, 7),
            hidden_dims: vec![8],
            learning_rate: 0.01,
            estimator: ReturnEstimator::new(0.99, Bootstrap::MonteCarlo).unwrap(),
            baseline: false,
            policy_loss: PolicyLoss::default(),
            ppo: None,
            training: true,
            seed: Some(1),
        })
        .unwrap()
    }

    #[test]
    fn test_sample_degenerate_distribution() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..20 {
            assert_eq!(
                sample_action(&[0.0, 0.0, 1.0], &mut rng).unwrap(),
                CatchAction::Right
            );
        }
    }

    #[test]
    fn test_sample_rejects_invalid_distribution() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            sample_action(&[0.0, 0.0, 0.0], &mut rng),
            Err(RLError::Numerical(_))
        ));
        assert!(sample_action(&[f32::NAN, 0.5, 0.5], &mut rng).is_err());
    }

    #[test]
    fn test_sample_frequencies() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut idle = 0;
        for _ in 0..2000 {
            if sample_action(&[0.1, 0.8, 0.1], &mut rng).unwrap() == CatchAction::Idle {
                idle += 1;
            }
        }
        assert!((1450..1750).contains(&idle));
    }

    #[tokio::test]
    async fn test_rollout_stops_on_done() {
        let collector = TrajectoryCollector {
            max_steps: 10,
            record_distributions: false,
        };
        let mut env = ConstantEnv { len: 3, t: 0 };
        let mut memory = Memory::new(2, 10);
        let mut rng = StdRng::seed_from_u64(7);

        collector
            .collect_into(&mut memory, &mut env, &actor(NetworkRole::Policy), None, &mut rng)
            .await
            .unwrap();

        for trajectory in &memory.trajectories {
            assert_eq!(trajectory.len(), 3);
            assert_eq!(trajectory.rewards(), vec![1.0, 1.0, 1.0]);
            assert!(trajectory.values().is_none());
            assert!(trajectory.transitions.iter().all(|t| t.distribution.is_none()));
            // first state is the reset observation
            assert_eq!(trajectory.transitions[0].state.flatten().to_vec(), vec![3.0, 3.0, 6.0]);
            assert_eq!(trajectory.transitions[1].state.shape(), &[3]);
        }
    }

    #[tokio::test]
    async fn test_rollout_respects_max_steps_and_records() {
        let collector = TrajectoryCollector {
            max_steps: 4,
            record_distributions: true,
        };
        let mut env = ConstantEnv { len: 100, t: 0 };
        let mut trajectory = Trajectory::new();
        let mut rng = StdRng::seed_from_u64(7);
        let policy = actor(NetworkRole::Policy);
        let critic = actor(NetworkRole::Critic);

        collector
            .rollout(&mut trajectory, &mut env, &policy, Some(&critic), &mut rng)
            .await
            .unwrap();

        assert_eq!(trajectory.len(), 4);
        assert_eq!(trajectory.values().map(|v| v.len()), Some(4));
        let dists = trajectory.distributions().unwrap();
        assert_eq!(dists.shape(), &[4, 3]);

        let first = policy
            .predict_distribution(&trajectory.transitions[0].state)
            .unwrap();
        assert_eq!(trajectory.transitions[0].distribution, Some(first));
    }
}
