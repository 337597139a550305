//! Error types for tensor primitives and network configuration

use thiserror::Error;

/// Shape inconsistency detected by a convolution primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("convolution needs at least one kernel")]
    NoKernels,

    #[error("kernel {index} has shape {found:?}, expected {expected:?}")]
    KernelShape {
        index: usize,
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    #[error("kernel depth {kernel} does not match input depth {input}")]
    DepthMismatch { kernel: usize, input: usize },

    #[error("stride must be at least 1")]
    ZeroStride,

    #[error("kernel {kernel:?} does not fit a {input:?} input with padding {padding}")]
    KernelTooLarge {
        kernel: (usize, usize),
        input: (usize, usize),
        padding: usize,
    },

    #[error("output gradient has shape {found:?}, expected {expected:?}")]
    GradientShape {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },
}

/// Failure while configuring, evaluating, updating or loading a [`Network`](super::Network)
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("invalid layer: {0}")]
    InvalidLayer(&'static str),

    #[error("layer {layer} expects input depth {expected}, but receives depth {found}")]
    DepthMismatch {
        layer: usize,
        expected: usize,
        found: usize,
    },

    #[error("network is frozen: layers cannot be added after training has started")]
    Frozen,

    #[error("network has no layers")]
    Empty,

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("network output has shape {found:?}, expected 1x1x{expected}")]
    OutputShape {
        expected: usize,
        found: (usize, usize, usize),
    },

    #[error("activation stack holds {found} tensors, network needs {expected}")]
    StackLength { expected: usize, found: usize },

    #[error("gradient does not match the network at layer {layer}")]
    GradientShape { layer: usize },

    #[error("weight file holds {found} values, network needs {expected}")]
    WeightCount { expected: usize, found: usize },

    #[error("weight file line {line}: cannot parse {text:?}")]
    WeightParse { line: usize, text: String },

    #[error("weight file line {line}: {reason}")]
    WeightLayout { line: usize, reason: String },

    #[error("weight file I/O failed")]
    Io(#[from] std::io::Error),
}
