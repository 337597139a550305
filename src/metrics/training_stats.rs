//! Training statistics tracking for DQN
//!
//! This module provides utilities for tracking and monitoring training progress,
//! including episode rewards, lengths, scores, losses and the exploration rate.

use std::collections::VecDeque;

/// Training statistics tracker with rolling averages
///
/// Tracks episode-level metrics (rewards, lengths, scores) and update-level
/// metrics (Huber loss) using rolling windows for smoothed statistics.
///
/// # Example
///
/// ```rust
/// use conv_snake::metrics::TrainingStats;
///
/// let mut stats = TrainingStats::new(100);
///
/// // Record an episode
/// stats.record_episode(3.0, 150, 4);
///
/// // Record a gradient step
/// stats.record_update(0.02, 0.5);
///
/// // Get statistics
/// println!("Mean score: {}", stats.mean_episode_score());
/// println!("{}", stats.format_summary());
/// ```
#[derive(Debug, Clone)]
pub struct TrainingStats {
    /// Episode rewards (rolling window)
    episode_rewards: VecDeque<f64>,

    /// Episode lengths in steps (rolling window)
    episode_lengths: VecDeque<usize>,

    /// Episode scores (apples eaten) (rolling window)
    episode_scores: VecDeque<u32>,

    /// Mean batch losses (rolling window)
    losses: VecDeque<f64>,

    /// Exploration rate at the latest update
    epsilon: f64,

    /// Highest score seen so far
    best_score: u32,

    /// Total number of episodes completed
    total_episodes: usize,

    /// Total number of environment steps taken
    total_steps: usize,

    /// Total number of gradient steps taken
    total_updates: usize,

    /// Window size for rolling averages
    window_size: usize,
}

impl TrainingStats {
    /// Create a new training statistics tracker
    ///
    /// # Arguments
    ///
    /// * `window_size` - Number of recent values to keep for rolling averages
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            episode_rewards: VecDeque::with_capacity(window_size),
            episode_lengths: VecDeque::with_capacity(window_size),
            episode_scores: VecDeque::with_capacity(window_size),
            losses: VecDeque::with_capacity(window_size),
            epsilon: 1.0,
            best_score: 0,
            total_episodes: 0,
            total_steps: 0,
            total_updates: 0,
            window_size,
        }
    }

    /// Record the completion of an episode
    ///
    /// # Arguments
    ///
    /// * `reward` - Total reward accumulated during the episode
    /// * `length` - Number of steps taken in the episode
    /// * `score` - Final score (number of apples eaten)
    ///
    /// # Example
    ///
    /// ```rust
    /// use conv_snake::metrics::TrainingStats;
    ///
    /// let mut stats = TrainingStats::new(100);
    /// stats.record_episode(2.0, 150, 3);
    ///
    /// assert_eq!(stats.total_episodes(), 1);
    /// assert_eq!(stats.total_steps(), 150);
    /// assert_eq!(stats.best_score(), 3);
    /// ```
    pub fn record_episode(&mut self, reward: f64, length: usize, score: u32) {
        Self::push_deque(&mut self.episode_rewards, reward, self.window_size);
        Self::push_deque(&mut self.episode_lengths, length, self.window_size);
        Self::push_deque(&mut self.episode_scores, score, self.window_size);
        self.best_score = self.best_score.max(score);
        self.total_episodes += 1;
        self.total_steps += length;
    }

    /// Record a gradient step
    ///
    /// # Arguments
    ///
    /// * `loss` - Mean Huber loss of the batch
    /// * `epsilon` - Exploration rate in effect
    pub fn record_update(&mut self, loss: f64, epsilon: f64) {
        Self::push_deque(&mut self.losses, loss, self.window_size);
        self.epsilon = epsilon;
        self.total_updates += 1;
    }

    /// Get the mean episode reward over the rolling window
    ///
    /// # Returns
    ///
    /// The average reward, or 0.0 if no episodes have been recorded
    pub fn mean_episode_reward(&self) -> f64 {
        Self::mean(&self.episode_rewards)
    }

    /// Get the mean episode length over the rolling window
    pub fn mean_episode_length(&self) -> f64 {
        let sum: usize = self.episode_lengths.iter().sum();
        if self.episode_lengths.is_empty() {
            0.0
        } else {
            sum as f64 / self.episode_lengths.len() as f64
        }
    }

    /// Get the mean episode score over the rolling window
    pub fn mean_episode_score(&self) -> f64 {
        let sum: u32 = self.episode_scores.iter().sum();
        if self.episode_scores.is_empty() {
            0.0
        } else {
            sum as f64 / self.episode_scores.len() as f64
        }
    }

    /// Get the mean loss over the rolling window
    pub fn mean_loss(&self) -> f64 {
        Self::mean(&self.losses)
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn best_score(&self) -> u32 {
        self.best_score
    }

    /// Get the total number of episodes completed
    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }

    /// Get the total number of environment steps taken
    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn total_updates(&self) -> usize {
        self.total_updates
    }

    /// Get the window size for rolling averages
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Format a summary of the current statistics
    ///
    /// # Example
    ///
    /// ```rust
    /// use conv_snake::metrics::TrainingStats;
    ///
    /// let mut stats = TrainingStats::new(100);
    /// stats.record_episode(2.0, 150, 3);
    /// stats.record_update(0.02, 0.5);
    ///
    /// println!("{}", stats.format_summary());
    /// // Output: Episodes: 1 | Steps: 150 | Reward: 2.00 | Score: 3.00 | Best: 3 | Len: 150.0 | Loss: 0.0200 | Eps: 0.500
    /// ```
    pub fn format_summary(&self) -> String {
        format!(
            "Episodes: {} | Steps: {} | Reward: {:.2} | Score: {:.2} | Best: {} | Len: {:.1} | Loss: {:.4} | Eps: {:.3}",
            self.total_episodes,
            self.total_steps,
            self.mean_episode_reward(),
            self.mean_episode_score(),
            self.best_score,
            self.mean_episode_length(),
            self.mean_loss(),
            self.epsilon,
        )
    }

    /// Helper function to compute mean of a VecDeque<f64>
    fn mean(deque: &VecDeque<f64>) -> f64 {
        if deque.is_empty() {
            0.0
        } else {
            deque.iter().sum::<f64>() / deque.len() as f64
        }
    }

    /// Helper function to push to a deque with size limit
    fn push_deque<T>(deque: &mut VecDeque<T>, value: T, window_size: usize) {
        if deque.len() >= window_size {
            deque.pop_front();
        }
        deque.push_back(value);
    }
}
