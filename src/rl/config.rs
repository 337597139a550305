//! DQN hyperparameter configuration

use serde::{Deserialize, Serialize};

use crate::memory::MemoryKind;
use crate::nn::{OptimizerConfig, TopologyPreset};

/// Configuration for the DQN agent
///
/// This struct contains all hyperparameters used by the Q-learning loop.
///
/// # Example
///
/// ```rust
/// use conv_snake::rl::DqnConfig;
///
/// // Use default hyperparameters
/// let config = DqnConfig::default();
///
/// // Or customize specific parameters
/// let config = DqnConfig {
///     batch_size: 16,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DqnConfig {
    /// Transitions sampled per gradient step
    ///
    /// Default: 32
    pub batch_size: usize,

    /// Capacity of each replay memory
    ///
    /// Default: 10000
    pub replay_capacity: usize,

    /// Sampling policy of the replay memories
    ///
    /// Default: prioritized
    pub memory: MemoryKind,

    /// Discount factor for future rewards (gamma)
    ///
    /// Default: 0.95
    pub gamma: f64,

    /// Exploration rate at step 0
    ///
    /// Default: 0.9
    pub epsilon_start: f64,

    /// Exploration rate approached as training goes on
    ///
    /// Default: 0.05
    pub epsilon_end: f64,

    /// Exponential decay rate of exploration per gradient step
    ///
    /// Default: 1e-4
    pub epsilon_decay: f64,

    /// Adaptive step-size rule
    pub optimizer: OptimizerConfig,

    /// Error magnitude beyond which the loss turns linear
    ///
    /// Default: 1.0
    pub huber_delta: f64,

    /// How strongly sampling favours high-error transitions
    ///
    /// Default: 0.6
    pub priority_alpha: f64,

    /// Added to every error so no transition loses all sampling mass
    ///
    /// Default: 1e-6
    pub priority_epsilon: f64,

    /// Priority given to freshly played transitions so they get sampled soon
    ///
    /// Default: 100.0
    pub fresh_priority: f64,

    /// Train two networks with swapped select/evaluate roles
    ///
    /// Default: true
    pub double: bool,

    /// Layer preset of the Q-networks
    ///
    /// Default: strided
    pub topology: TopologyPreset,

    /// Moves an episode may last before scoring anything
    ///
    /// Default: 10
    pub starvation_base: usize,

    /// Extra moves allowed per point scored
    ///
    /// Default: 30
    pub starvation_per_point: usize,
}

impl DqnConfig {
    /// Create a new configuration with default hyperparameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Exploration rate after `step` gradient steps
    ///
    /// `end + (start − end)·exp(−step·decay)`
    pub fn epsilon(&self, step: u64) -> f64 {
        self.epsilon_end
            + (self.epsilon_start - self.epsilon_end) * (-(step as f64) * self.epsilon_decay).exp()
    }

    /// Number of moves after which an episode with `score` points is cut
    pub fn starvation_limit(&self, score: f64) -> usize {
        self.starvation_base + self.starvation_per_point * score.max(0.0) as usize
    }

    /// Validate configuration parameters
    ///
    /// Checks that all hyperparameters are in valid ranges.
    ///
    /// # Returns
    ///
    /// `Ok(())` if all parameters are valid, `Err(String)` with an error message otherwise.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }

        if self.replay_capacity == 0 {
            return Err("replay_capacity must be at least 1".to_string());
        }

        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(format!("gamma must be in [0, 1], got {}", self.gamma));
        }

        for (name, value) in [
            ("epsilon_start", self.epsilon_start),
            ("epsilon_end", self.epsilon_end),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be in [0, 1], got {value}"));
            }
        }

        if self.epsilon_decay < 0.0 {
            return Err(format!(
                "epsilon_decay must be non-negative, got {}",
                self.epsilon_decay
            ));
        }

        self.optimizer.validate()?;

        if self.huber_delta <= 0.0 {
            return Err(format!(
                "huber_delta must be positive, got {}",
                self.huber_delta
            ));
        }

        if self.priority_alpha < 0.0 {
            return Err(format!(
                "priority_alpha must be non-negative, got {}",
                self.priority_alpha
            ));
        }

        if self.priority_epsilon <= 0.0 {
            return Err(format!(
                "priority_epsilon must be positive, got {}",
                self.priority_epsilon
            ));
        }

        if !(self.fresh_priority.is_finite() && self.fresh_priority > 0.0) {
            return Err(format!(
                "fresh_priority must be positive, got {}",
                self.fresh_priority
            ));
        }

        if self.starvation_base == 0 {
            return Err("starvation_base must be at least 1".to_string());
        }

        Ok(())
    }
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            replay_capacity: 10_000,
            memory: MemoryKind::Prioritized,
            gamma: 0.95,
            epsilon_start: 0.9,
            epsilon_end: 0.05,
            epsilon_decay: 1e-4,
            optimizer: OptimizerConfig::default(),
            huber_delta: 1.0,
            priority_alpha: 0.6,
            priority_epsilon: 1e-6,
            fresh_priority: 100.0,
            double: true,
            topology: TopologyPreset::Strided,
            starvation_base: 10,
            starvation_per_point: 30,
        }
    }
}
