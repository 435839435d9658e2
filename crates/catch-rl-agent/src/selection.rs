//! Best-of-batch trajectory selection

use catch_rl_core::{Memory, Trajectory};

/// Most trajectories ever used for one update
pub const MAX_SELECTED: usize = 2;

/// Indices of the `top` highest scores, best first
///
/// Equal scores keep their original order, so the earliest index wins a tie.
#[must_use]
pub fn select_top(scores: &[f64], top: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // stable sort
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order.truncate(top);
    order
}

/// Trajectories to train on: the best `min(len, MAX_SELECTED)` by total reward
#[must_use]
pub fn best_of_batch(memory: &Memory) -> Vec<&Trajectory> {
    let top = memory.len().min(MAX_SELECTED);
    memory.select(&select_top(&memory.total_rewards(), top))
}

#[cfg(test)]
mod tests {
    use super::*;
    use catch_rl_core::{CatchAction, Observation, Reward, Transition};

    #[test]
    fn test_ties_go_to_the_earliest_index() {
        assert_eq!(select_top(&[5.0, 20.0, 1.0, 20.0], 2), vec![1, 3]);
    }

    #[test]
    fn test_descending_order() {
        assert_eq!(select_top(&[-3.0, 4.0, 0.5, 9.0], 3), vec![3, 1, 2]);
    }

    #[test]
    fn test_top_larger_than_batch() {
        assert_eq!(select_top(&[1.0], 2), vec![0]);
        assert!(select_top(&[], 2).is_empty());
    }

    #[test]
    fn test_scores_are_not_mutated() {
        let scores = vec![2.0, 2.0, 2.0];
        assert_eq!(select_top(&scores, 2), vec![0, 1]);
        assert_eq!(scores, vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_best_of_batch_picks_by_total_reward() {
        let mut memory = Memory::new(4, 5);
        for (slot, reward) in [0.0, 3.0, -1.0, 2.0].into_iter().enumerate() {
            memory.trajectories[slot].push(Transition {
                state: Observation::from_shape_vec(&[3], vec![0.0; 3]).unwrap(),
                action: CatchAction::Idle,
                reward: Reward(reward),
                value: None,
                distribution: None,
            });
        }

        let best = best_of_batch(&memory);
        assert_eq!(best.len(), 2);
        assert!((best[0].total_reward - 3.0).abs() < f64::EPSILON);
        assert!((best[1].total_reward - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_slot() {
        let memory = Memory::new(1, 5);
        assert_eq!(best_of_batch(&memory).len(), 1);
    }
}
