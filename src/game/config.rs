use serde::{Deserialize, Serialize};

/// Configuration for the game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Width of the game grid
    pub grid_width: usize,
    /// Height of the game grid
    pub grid_height: usize,
    /// Initial length of the snake
    pub initial_snake_length: usize,

    // Rewards (for RL)
    /// Reward for eating an apple
    pub apple_reward: f64,
    /// Reward for dying (negative)
    pub death_penalty: f64,
    /// Reward for any other step
    pub step_reward: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid_width: 10,
            grid_height: 10,
            initial_snake_length: 1,
            apple_reward: 1.0,
            death_penalty: -1.0,
            step_reward: 0.0,
        }
    }
}

impl GameConfig {
    /// Create a new configuration with custom grid size
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            grid_width: width,
            grid_height: height,
            ..Default::default()
        }
    }

    /// Square grid of side `size`
    pub fn square(size: usize) -> Self {
        Self::new(size, size)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.grid_width < 2 || self.grid_height < 2 {
            return Err(format!(
                "grid must be at least 2x2, got {}x{}",
                self.grid_width, self.grid_height
            ));
        }
        if self.initial_snake_length == 0 || self.initial_snake_length >= self.grid_width {
            return Err(format!(
                "initial_snake_length must be in 1..{}, got {}",
                self.grid_width, self.initial_snake_length
            ));
        }
        if !(self.apple_reward.is_finite() && self.death_penalty.is_finite() && self.step_reward.is_finite()) {
            return Err("rewards must be finite".to_string());
        }
        Ok(())
    }
}
