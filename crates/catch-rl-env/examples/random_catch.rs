//! Example: Random paddle playing Catch

use catch_rl_core::{CatchAction, CheckedEnvironment, Environment};
use catch_rl_env::{CatchConfig, CatchEnv};
use rand::seq::SliceRandom;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let env = CatchEnv::new(CatchConfig {
        seed: Some(42),
        ..CatchConfig::default()
    })?;
    let spec = env.observation_spec();
    let mut env = CheckedEnvironment::new(env, spec)?;

    let mut rng = rand::thread_rng();
    let num_episodes = 10;
    let mut episode_rewards = Vec::new();

    for episode in 0..num_episodes {
        env.reset().await?;
        loop {
            let action = *CatchAction::ALL.choose(&mut rng).unwrap_or(&CatchAction::Idle);
            if env.step(action).await?.done {
                break;
            }
        }

        let info = env.episode_info().cloned().unwrap_or_default();
        episode_rewards.push(info.total_reward);
        println!(
            "Episode {}: Total Reward = {:.2}, Steps = {}",
            episode + 1,
            info.total_reward,
            info.steps
        );
    }

    let avg_reward: f64 = episode_rewards.iter().sum::<f64>() / episode_rewards.len() as f64;
    println!("\nAverage Reward over {num_episodes} episodes: {avg_reward:.2}");

    Ok(())
}
