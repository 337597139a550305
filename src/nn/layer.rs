//! Convolution kernels and layers

use ndarray::Array3;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::Rng;

use super::conv::output_size;
use super::error::NetworkError;
use super::tensor::Tensor;

/// One convolution filter with its optimizer state
///
/// The accumulators hold the running second moments of the gradient and of
/// the applied update, one pair per weight plus one pair for the bias.
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    pub weights: Tensor,
    pub bias: f64,
    pub(crate) weights_avg_grad: Tensor,
    pub(crate) weights_avg_update: Tensor,
    pub(crate) bias_avg_grad: f64,
    pub(crate) bias_avg_update: f64,
}

impl Kernel {
    /// Create a kernel with zeroed optimizer state
    pub fn new(weights: Tensor, bias: f64) -> Self {
        let (h, w, d) = weights.dims();
        Self {
            weights,
            bias,
            weights_avg_grad: Tensor::zeros(h, w, d),
            weights_avg_update: Tensor::zeros(h, w, d),
            bias_avg_grad: 0.0,
            bias_avg_update: 0.0,
        }
    }

    /// Variance-scaling initialisation
    ///
    /// Every weight is an independent standard normal sample multiplied by
    /// `2 / (height · width · depth)`; the bias starts at zero.
    pub fn random<R: Rng + ?Sized>(height: usize, width: usize, depth: usize, rng: &mut R) -> Self {
        let fan_in = (height * width * depth) as f64;
        let weights = Array3::<f64>::random_using((height, width, depth), StandardNormal, rng)
            * (2.0 / fan_in);
        Self::new(Tensor::from_array(weights), 0.0)
    }

    /// `(height, width, depth)` of the weight tensor
    pub fn dims(&self) -> (usize, usize, usize) {
        self.weights.dims()
    }
}

/// An ordered set of same-shaped kernels plus stride and padding
///
/// The output depth equals the number of kernels; the expected input depth is
/// the kernels' channel dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub(crate) kernels: Vec<Kernel>,
    pub(crate) stride: usize,
    pub(crate) padding: usize,
}

impl Layer {
    /// Build a layer from explicit kernels, validating their shapes
    pub fn new(kernels: Vec<Kernel>, stride: usize, padding: usize) -> Result<Self, NetworkError> {
        if stride == 0 {
            return Err(NetworkError::InvalidLayer("stride must be at least 1"));
        }
        let first = kernels
            .first()
            .ok_or(NetworkError::InvalidLayer("a layer needs at least one kernel"))?;
        let (h, w, d) = first.dims();
        if h == 0 || w == 0 || d == 0 {
            return Err(NetworkError::InvalidLayer("kernel dimensions must be non-zero"));
        }
        if kernels.iter().any(|k| k.dims() != (h, w, d)) {
            return Err(NetworkError::InvalidLayer("all kernels of a layer must share one shape"));
        }

        Ok(Self {
            kernels,
            stride,
            padding,
        })
    }

    /// Build a layer of randomly initialised kernels
    pub fn random<R: Rng + ?Sized>(
        nb_kernels: usize,
        kernel_height: usize,
        kernel_width: usize,
        input_depth: usize,
        stride: usize,
        padding: usize,
        rng: &mut R,
    ) -> Result<Self, NetworkError> {
        let kernels = (0..nb_kernels)
            .map(|_| Kernel::random(kernel_height, kernel_width, input_depth, rng))
            .collect();
        Self::new(kernels, stride, padding)
    }

    pub fn kernels(&self) -> &[Kernel] {
        &self.kernels
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Number of kernels, i.e. the depth of this layer's output
    pub fn output_depth(&self) -> usize {
        self.kernels.len()
    }

    /// Depth this layer expects from its input
    pub fn input_depth(&self) -> usize {
        self.kernels[0].dims().2
    }

    /// `(height, width)` shared by all kernels
    pub fn kernel_size(&self) -> (usize, usize) {
        let (h, w, _) = self.kernels[0].dims();
        (h, w)
    }

    /// Scalar parameters: every weight plus one bias per kernel
    pub fn parameter_count(&self) -> usize {
        self.kernels.iter().map(|k| k.weights.len() + 1).sum()
    }

    /// Spatial output size for an input of `(height, width)`
    pub fn output_dims(&self, height: usize, width: usize) -> Option<(usize, usize)> {
        let (kh, kw) = self.kernel_size();
        Some((
            output_size(height, kh, self.stride, self.padding)?,
            output_size(width, kw, self.stride, self.padding)?,
        ))
    }
}
