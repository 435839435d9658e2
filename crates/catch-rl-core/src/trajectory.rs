//! Trajectory and rollout memory storage

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{ActionCounts, CatchAction, Observation, RLError, Reward};

/// Single recorded step of a rollout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Observation the action was chosen from
    pub state: Observation,
    /// Action taken
    pub action: CatchAction,
    /// Reward received
    pub reward: Reward,
    /// Critic estimate for `state`, when a critic is trained
    pub value: Option<f64>,
    /// Full action distribution the rollout policy produced for `state`
    pub distribution: Option<[f32; CatchAction::COUNT]>,
}

/// Complete trajectory of one rollout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trajectory {
    /// Sequence of transitions
    pub transitions: Vec<Transition>,
    /// Total reward
    pub total_reward: f64,
}

impl Trajectory {
    /// Create a new empty trajectory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty trajectory with room for `capacity` steps
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            transitions: Vec::with_capacity(capacity),
            total_reward: 0.0,
        }
    }

    /// Add a transition to the trajectory
    pub fn push(&mut self, transition: Transition) {
        self.total_reward += f64::from(transition.reward);
        self.transitions.push(transition);
    }

    /// Get the length of the trajectory
    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Check if trajectory is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Remove all transitions
    pub fn clear(&mut self) {
        self.transitions.clear();
        self.total_reward = 0.0;
    }

    /// Raw rewards in step order
    #[must_use]
    pub fn rewards(&self) -> Vec<f64> {
        self.transitions.iter().map(|t| f64::from(t.reward)).collect()
    }

    /// Actions in step order
    #[must_use]
    pub fn actions(&self) -> Vec<CatchAction> {
        self.transitions.iter().map(|t| t.action).collect()
    }

    /// How often each action was taken
    #[must_use]
    pub fn action_counts(&self) -> ActionCounts {
        self.transitions.iter().map(|t| &t.action).collect()
    }

    /// Value estimates, present only if every transition carries one
    #[must_use]
    pub fn values(&self) -> Option<Vec<f64>> {
        self.transitions.iter().map(|t| t.value).collect()
    }

    /// Recorded rollout distributions as a `len x 3` matrix
    ///
    /// Fails if any transition was recorded without its distribution.
    pub fn distributions(&self) -> crate::Result<Array2<f32>> {
        let mut out = Array2::zeros((self.len(), CatchAction::COUNT));
        for (i, transition) in self.transitions.iter().enumerate() {
            let dist = transition.distribution.ok_or_else(|| {
                RLError::Configuration(format!(
                    "transition {i} has no recorded action distribution"
                ))
            })?;
            for (j, p) in dist.iter().enumerate() {
                out[[i, j]] = *p;
            }
        }
        Ok(out)
    }
}

/// One trajectory per minibatch member, rebuilt every iteration
#[derive(Debug, Clone, Default)]
pub struct Memory {
    /// Trajectories in collection order
    pub trajectories: Vec<Trajectory>,
}

impl Memory {
    /// Create a memory with `size` empty trajectories
    #[must_use]
    pub fn new(size: usize, max_steps: usize) -> Self {
        Self {
            trajectories: (0..size).map(|_| Trajectory::with_capacity(max_steps)).collect(),
        }
    }

    /// Number of trajectory slots
    #[must_use]
    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    /// Whether there are no slots
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    /// Empty every trajectory, keeping the number of slots
    pub fn clear(&mut self) {
        for trajectory in &mut self.trajectories {
            trajectory.clear();
        }
    }

    /// Change the number of slots, dropping surplus trajectories
    pub fn resize(&mut self, size: usize, max_steps: usize) {
        self.trajectories
            .resize_with(size, || Trajectory::with_capacity(max_steps));
    }

    /// Total reward of each trajectory
    #[must_use]
    pub fn total_rewards(&self) -> Vec<f64> {
        self.trajectories.iter().map(|t| t.total_reward).collect()
    }

    /// Trajectories at the given indices
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Vec<&Trajectory> {
        indices
            .iter()
            .filter_map(|&i| self.trajectories.get(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(reward: f64, value: Option<f64>) -> Transition {
        Transition {
            state: Observation::from_shape_vec(&[3], vec![0.0; 3]).unwrap(),
            action: CatchAction::Idle,
            reward: Reward(reward),
            value,
            distribution: None,
        }
    }

    #[test]
    fn test_total_reward_tracks_pushes() {
        let mut trajectory = Trajectory::new();
        trajectory.push(transition(1.0, None));
        trajectory.push(transition(-1.0, None));
        trajectory.push(transition(1.0, None));
        assert_eq!(trajectory.len(), 3);
        assert!((trajectory.total_reward - 1.0).abs() < f64::EPSILON);
        assert_eq!(trajectory.rewards(), vec![1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_values_require_every_step() {
        let mut trajectory = Trajectory::new();
        trajectory.push(transition(0.0, Some(0.5)));
        trajectory.push(transition(0.0, Some(0.25)));
        assert_eq!(trajectory.values(), Some(vec![0.5, 0.25]));

        trajectory.push(transition(0.0, None));
        assert_eq!(trajectory.values(), None);
    }

    #[test]
    fn test_missing_distribution_is_reported() {
        let mut trajectory = Trajectory::new();
        trajectory.push(transition(0.0, None));
        assert!(matches!(
            trajectory.distributions(),
            Err(RLError::Configuration(_))
        ));
    }

    #[test]
    fn test_distributions_matrix() {
        let mut trajectory = Trajectory::new();
        let mut t = transition(0.0, None);
        t.distribution = Some([0.2, 0.3, 0.5]);
        trajectory.push(t);
        let dists = trajectory.distributions().unwrap();
        assert_eq!(dists.shape(), &[1, 3]);
        assert!((dists[[0, 2]] - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_memory_clear_and_resize() {
        let mut memory = Memory::new(4, 10);
        memory.trajectories[1].push(transition(2.0, None));
        assert_eq!(memory.total_rewards(), vec![0.0, 2.0, 0.0, 0.0]);

        memory.clear();
        assert!(memory.trajectories.iter().all(Trajectory::is_empty));

        memory.resize(2, 10);
        assert_eq!(memory.len(), 2);
    }
}
