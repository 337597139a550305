//! Conv Snake - deep Q-learning on a toroidal Snake board
//!
//! This library provides:
//! - A convolutional network with hand-written backpropagation (nn module)
//! - Uniform and prioritized experience replay (memory module)
//! - Core game logic (game module)
//! - The DQN agent and its environment (rl module)
//! - Training statistics (metrics module)
//! - TUI rendering (render module)
//! - Execution modes (train, visualize)

pub mod game;
pub mod memory;
pub mod metrics;
pub mod modes;
pub mod nn;
pub mod render;
pub mod rl;
