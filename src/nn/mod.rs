//! Hand-written convolutional Q-network
//!
//! This module contains the numeric engine:
//! - Dense H×W×D tensors
//! - Strided, zero-padded convolution and its transpose
//! - Layered networks with forward evaluation, backpropagation and an
//!   adaptive per-parameter optimizer
//! - Named layer presets and flat weight dumps

pub mod conv;
pub mod error;
pub mod gradients;
pub mod layer;
pub mod network;
pub mod optimizer;
pub mod persistence;
pub mod tensor;
pub mod topology;

pub use conv::{convolve, deconvolve, kernel_gradients, output_size, relu};
pub use error::{NetworkError, ShapeError};
pub use gradients::{Gradients, LayerGradient};
pub use layer::{Kernel, Layer};
pub use network::{huber_gradient, huber_loss, Network};
pub use optimizer::OptimizerConfig;
pub use persistence::{load_weights, read_weights, save_weights, weight_count, write_weights};
pub use tensor::Tensor;
pub use topology::{LayerSpec, Topology, TopologyPreset};
