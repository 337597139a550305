//! Execution modes: train an agent, or watch one play

pub mod train;
pub mod visualize;

pub use train::{network_path, TrainConfig, TrainMode};
pub use visualize::{VisualizationSpeed, VisualizeMode};
