//! Training mode for the DQN agent
//!
//! This module implements the training loop. It fills the replay memories
//! with random play, then runs episodes in which every move is stored and
//! followed by one gradient step. Progress is logged periodically and the
//! weights of every network are dumped at checkpoints and at the end.
//!
//! # Example
//!
//! ```rust,no_run
//! use conv_snake::modes::{TrainConfig, TrainMode};
//! use std::path::PathBuf;
//!
//! let config = TrainConfig::new(500, PathBuf::from("models/weights.txt"));
//! let mut train_mode = TrainMode::new(config)?;
//! train_mode.run()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::game::GameConfig;
use crate::memory::Transition;
use crate::metrics::TrainingStats;
use crate::nn::save_weights;
use crate::rl::{DqnAgent, DqnConfig, Environment, SnakeEnvironment};

/// Configuration for training mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Number of episodes to train
    pub num_episodes: usize,

    /// Where the final weights of the first network go; further networks
    /// get a numbered sibling file
    pub save_path: PathBuf,

    /// Save a checkpoint every N episodes
    pub checkpoint_frequency: usize,

    /// Log training progress every N episodes
    pub log_frequency: usize,

    /// Episodes and updates averaged in progress lines
    pub stats_window: usize,

    /// Seed for the agent; the environment uses the next value
    pub seed: u64,

    /// Game configuration (grid size, rewards)
    pub game_config: GameConfig,

    /// DQN hyperparameters
    pub dqn_config: DqnConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            num_episodes: 10_000,
            save_path: PathBuf::from("models/weights.txt"),
            checkpoint_frequency: 1000,
            log_frequency: 100,
            stats_window: 100,
            seed: 0,
            game_config: GameConfig::default(),
            dqn_config: DqnConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Create a new training configuration with defaults
    ///
    /// # Arguments
    ///
    /// * `num_episodes` - Number of episodes to train
    /// * `save_path` - Path of the final weight file
    ///
    /// # Example
    ///
    /// ```rust
    /// use conv_snake::modes::TrainConfig;
    /// use std::path::PathBuf;
    ///
    /// let config = TrainConfig::new(10000, PathBuf::from("models/weights.txt"));
    /// assert_eq!(config.num_episodes, 10000);
    /// ```
    pub fn new(num_episodes: usize, save_path: PathBuf) -> Self {
        Self {
            num_episodes,
            save_path,
            ..Default::default()
        }
    }

    /// Read a configuration from a JSON file; missing fields keep their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file {:?}", path))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.checkpoint_frequency == 0 {
            return Err("checkpoint_frequency must be at least 1".to_string());
        }
        if self.log_frequency == 0 {
            return Err("log_frequency must be at least 1".to_string());
        }
        self.game_config.validate()?;
        self.dqn_config.validate()
    }
}

/// Weight file of network `index`: `save_path` itself, then `<stem>_2.<ext>`, ...
pub fn network_path(save_path: &Path, index: usize) -> PathBuf {
    if index == 0 {
        return save_path.to_path_buf();
    }
    let stem = save_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "weights".to_string());
    let name = match save_path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, index + 1, ext.to_string_lossy()),
        None => format!("{}_{}", stem, index + 1),
    };
    save_path.with_file_name(name)
}

/// Training mode for the DQN agent
///
/// Runs the training loop, storing experience and taking one gradient step
/// per move. Periodically logs progress and saves checkpoints.
pub struct TrainMode {
    /// Agent being trained
    agent: DqnAgent,

    /// Snake environment for experience collection
    env: SnakeEnvironment,

    /// Training statistics tracker
    stats: TrainingStats,

    /// Training configuration
    config: TrainConfig,

    /// Current episode number
    current_episode: usize,
}

impl TrainMode {
    /// Create a new training mode
    ///
    /// Fails if the configuration is invalid or the network topology does
    /// not fit the grid.
    pub fn new(config: TrainConfig) -> Result<Self> {
        config
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid training configuration")?;

        let agent = DqnAgent::new(
            config.dqn_config.clone(),
            config.game_config.grid_height,
            config.game_config.grid_width,
            config.seed,
        )
        .context("Failed to create agent")?;

        let env = SnakeEnvironment::new(config.game_config.clone(), config.seed.wrapping_add(1));
        let stats = TrainingStats::new(config.stats_window);

        Ok(Self {
            agent,
            env,
            stats,
            config,
            current_episode: 0,
        })
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    pub fn agent(&self) -> &DqnAgent {
        &self.agent
    }

    /// Run the training loop
    ///
    /// Trains the agent for the configured number of episodes, logging
    /// progress and saving checkpoints periodically.
    pub fn run(&mut self) -> Result<()> {
        self.log_header();

        self.agent
            .prefill(&mut self.env)
            .context("Failed to fill replay memory")?;
        info!(
            transitions = self.agent.memories().iter().map(|m| m.len()).sum::<usize>(),
            "Replay memory filled with random play"
        );

        for episode in 0..self.config.num_episodes {
            self.current_episode = episode;

            let (episode_reward, episode_steps, episode_score) = self.run_episode()?;
            self.stats
                .record_episode(episode_reward, episode_steps, episode_score);
            debug!(
                episode = episode + 1,
                score = episode_score,
                steps = episode_steps,
                "Episode finished"
            );

            if (episode + 1) % self.config.log_frequency == 0 {
                self.log_progress(episode + 1);
            }

            if (episode + 1) % self.config.checkpoint_frequency == 0 {
                self.save_checkpoint()?;
            }
        }

        self.save_final()?;

        info!(path = ?self.config.save_path, "Training complete");
        info!("Final statistics: {}", self.stats.format_summary());

        Ok(())
    }

    /// Run a single training episode
    ///
    /// # Returns
    ///
    /// A tuple containing:
    /// - Total episode reward
    /// - Number of steps in the episode
    /// - Final score (apples eaten)
    fn run_episode(&mut self) -> Result<(f64, usize, u32)> {
        self.env.initialize();
        let mut episode_reward = 0.0;

        loop {
            let state = self.env.state();
            let action = self
                .agent
                .select_action(&state)
                .context("Failed to select action")?;

            let transition = Transition::observe(&mut self.env, action);
            episode_reward += transition.reward;
            let done = transition.terminal || self.agent.is_starving(&self.env);

            self.agent
                .remember(transition)
                .context("Failed to store transition")?;
            let loss = self.agent.learn().context("Gradient step failed")?;
            self.stats.record_update(loss, self.agent.epsilon());

            if done {
                break;
            }
        }

        Ok((episode_reward, self.env.steps(), self.env.game().score))
    }

    /// Dump every network under `base`
    fn save_networks(&self, base: &Path) -> Result<()> {
        for (index, network) in self.agent.networks().iter().enumerate() {
            let path = network_path(base, index);
            save_weights(network, &path)
                .with_context(|| format!("Failed to save weights to {:?}", path))?;
        }
        Ok(())
    }

    /// Save a checkpoint of the current weights
    fn save_checkpoint(&self) -> Result<()> {
        let extension = self
            .config
            .save_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let checkpoint_path = self
            .config
            .save_path
            .parent()
            .unwrap_or(Path::new("."))
            .join(format!(
                "checkpoint_ep{}{}",
                self.current_episode + 1,
                extension
            ));

        self.save_networks(&checkpoint_path)?;
        info!(path = ?checkpoint_path, "Checkpoint saved");

        Ok(())
    }

    /// Save the final trained weights
    fn save_final(&self) -> Result<()> {
        self.save_networks(&self.config.save_path)
    }

    /// Log training header information
    fn log_header(&self) {
        let game = &self.config.game_config;
        let dqn = &self.config.dqn_config;
        info!(
            episodes = self.config.num_episodes,
            grid = %format!("{}x{}", game.grid_width, game.grid_height),
            seed = self.config.seed,
            "DQN training - conv snake"
        );
        info!(
            topology = ?dqn.topology,
            parameters = self.agent.networks()[0].parameter_count(),
            networks = self.agent.networks().len(),
            "Network"
        );
        info!(
            memory = %dqn.memory,
            capacity = dqn.replay_capacity,
            batch_size = dqn.batch_size,
            gamma = dqn.gamma,
            epsilon_start = dqn.epsilon_start,
            epsilon_end = dqn.epsilon_end,
            epsilon_decay = dqn.epsilon_decay,
            momentum = dqn.optimizer.momentum,
            smoothing = dqn.optimizer.smoothing,
            "Hyperparameters"
        );
        info!(
            checkpoint_frequency = self.config.checkpoint_frequency,
            log_frequency = self.config.log_frequency,
            save_path = ?self.config.save_path,
            "Output"
        );
    }

    /// Log training progress
    fn log_progress(&self, episode: usize) {
        info!(
            "[Episode {}/{}] {}",
            episode,
            self.config.num_episodes,
            self.stats.format_summary()
        );
    }
}
