//! Reinforcement learning on top of the snake game
//!
//! Provides:
//! - Single-channel, head-centred grid observations
//! - An `Environment` trait and its snake implementation
//! - DQN hyperparameter configuration
//! - A double-network DQN agent trained from replay memory

pub mod agent;
pub mod config;
pub mod environment;
pub mod observation;

pub use agent::{AgentError, DqnAgent};
pub use config::DqnConfig;
pub use environment::{Environment, SnakeEnvironment};
pub use observation::create_observation;
