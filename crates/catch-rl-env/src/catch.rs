//! The Catch game
//!
//! A paddle sits on the bottom row of a `rows x columns` board. Balls are
//! dropped from the top row at random columns and fall one row per step.
//! Catching a ball (paddle under it when it reaches the bottom) gives `+1`,
//! missing it gives `-1`. The episode ends after `max_steps` steps or once
//! `max_misses` balls have been missed.

use async_trait::async_trait;
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use catch_rl_core::{
    CatchAction, Environment, Observation, ObservationSpec, ObservationType, RLError, Result,
    Reward, Step,
};

/// Catch game configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchConfig {
    /// Board rows; the paddle lives on row 0, balls appear on row `rows - 1`
    pub rows: usize,
    /// Board columns
    pub columns: usize,
    /// Ball drop rate; at 1.0 a new ball appears as the previous one lands
    pub speed: f64,
    /// Steps before the episode is cut off
    pub max_steps: usize,
    /// Misses before the episode ends
    pub max_misses: usize,
    /// Observation encoding
    pub observation_type: ObservationType,
    /// Seed for ball placement
    pub seed: Option<u64>,
}

impl Default for CatchConfig {
    fn default() -> Self {
        Self {
            rows: 7,
            columns: 7,
            speed: 1.0,
            max_steps: 250,
            max_misses: 10,
            observation_type: ObservationType::Pixel,
            seed: None,
        }
    }
}

impl CatchConfig {
    fn validate(&self) -> Result<()> {
        if self.rows < 2 || self.columns == 0 {
            return Err(RLError::Configuration(format!(
                "board must be at least 2x1, got {}x{}",
                self.rows, self.columns
            )));
        }
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return Err(RLError::Configuration(format!(
                "speed must be positive, got {}",
                self.speed
            )));
        }
        if self.max_steps == 0 || self.max_misses == 0 {
            return Err(RLError::Configuration(
                "max_steps and max_misses must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Steps between two ball drops
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn drop_interval(&self) -> usize {
        let interval = ((self.rows - 1) as f64 / self.speed).round();
        (interval as usize).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ball {
    x: usize,
    y: usize,
}

/// Catch environment
pub struct CatchEnv {
    config: CatchConfig,
    rng: StdRng,
    paddle_x: usize,
    balls: Vec<Ball>,
    steps: usize,
    misses: usize,
    since_drop: usize,
    drop_interval: usize,
}

impl CatchEnv {
    /// Create a new Catch environment
    pub fn new(config: CatchConfig) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let drop_interval = config.drop_interval();
        Ok(Self {
            paddle_x: config.columns / 2,
            config,
            rng,
            balls: Vec::new(),
            steps: 0,
            misses: 0,
            since_drop: 0,
            drop_interval,
        })
    }

    /// Configuration this environment was built from
    #[must_use]
    pub fn config(&self) -> &CatchConfig {
        &self.config
    }

    /// Balls missed in the current episode
    #[must_use]
    pub fn misses(&self) -> usize {
        self.misses
    }

    fn drop_ball(&mut self) {
        let x = self.rng.gen_range(0..self.config.columns);
        self.balls.push(Ball {
            x,
            y: self.config.rows - 1,
        });
    }

    fn is_done(&self) -> bool {
        self.steps >= self.config.max_steps || self.misses >= self.config.max_misses
    }

    #[allow(clippy::cast_precision_loss)]
    fn observation(&self) -> Result<Observation> {
        match self.config.observation_type {
            ObservationType::Pixel => {
                let mut board = Array3::<f32>::zeros((self.config.columns, self.config.rows, 2));
                board[[self.paddle_x, 0, 0]] = 1.0;
                for ball in &self.balls {
                    board[[ball.x, ball.y, 1]] = 1.0;
                }
                Ok(Observation::new(board.into_dyn()))
            }
            ObservationType::Vector => {
                // Lowest ball; with none on the board it hovers above the paddle.
                let (ball_x, ball_y) = self
                    .balls
                    .iter()
                    .min_by_key(|b| b.y)
                    .map_or((self.paddle_x, self.config.rows), |b| (b.x, b.y));
                Observation::from_shape_vec(
                    &[3],
                    vec![self.paddle_x as f32, ball_x as f32, ball_y as f32],
                )
            }
        }
    }
}

#[async_trait]
impl Environment for CatchEnv {
    fn observation_spec(&self) -> ObservationSpec {
        ObservationSpec::new(
            self.config.observation_type,
            self.config.rows,
            self.config.columns,
        )
    }

    async fn reset(&mut self) -> Result<Observation> {
        self.paddle_x = self.config.columns / 2;
        self.balls.clear();
        self.steps = 0;
        self.misses = 0;
        self.since_drop = 0;
        self.drop_ball();

        self.observation()
    }

    async fn step(&mut self, action: CatchAction) -> Result<Step> {
        let max_x = self.config.columns - 1;
        self.paddle_x = match action.effect() {
            -1 => self.paddle_x.saturating_sub(1),
            1 => (self.paddle_x + 1).min(max_x),
            _ => self.paddle_x,
        };

        let mut reward = Reward::default();
        for ball in &mut self.balls {
            ball.y -= 1;
        }
        let paddle_x = self.paddle_x;
        let mut missed = 0;
        self.balls.retain(|ball| {
            if ball.y > 0 {
                return true;
            }
            if ball.x == paddle_x {
                reward += Reward::CATCH;
            } else {
                reward += Reward::MISS;
                missed += 1;
            }
            false
        });
        self.misses += missed;

        self.steps += 1;
        self.since_drop += 1;
        if self.since_drop >= self.drop_interval {
            self.since_drop = 0;
            self.drop_ball();
        }

        let done = self.is_done();
        trace!(
            step = self.steps,
            %action,
            reward = reward.0,
            misses = self.misses,
            done,
            "catch step"
        );

        Ok(Step {
            observation: self.observation()?,
            reward,
            done,
        })
    }
}
