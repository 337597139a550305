//! Strided, zero-padded 2D convolution, its transpose, and rectification
//!
//! Convolution is computed by unrolling every receptive field into one column
//! of a matrix (im2col), multiplying by the matrix of flattened kernel weights,
//! and folding the product back into a tensor. The transpose runs the same
//! unrolling backwards: multiply the output gradient by the transposed weight
//! matrix and scatter-add every column into the receptive field it came from
//! (col2im). Both directions walk receptive fields through [`receptive_field`],
//! so their indexing is exactly inverse.
//!
//! Matrix row `r` of an unrolled receptive field corresponds to kernel offset
//! `(m, n, c)` with `r = (m * kernel_width + n) * depth + c`, which is also the
//! row-major order of a kernel's weight tensor.

use ndarray::{Array2, Axis};

use super::error::ShapeError;
use super::layer::Kernel;
use super::tensor::Tensor;

/// Spatial output size of a convolution along one axis
///
/// `⌊(dim − kernel + 2·padding) / stride⌋ + 1`, or `None` when the kernel
/// does not fit the padded input or the stride is zero.
pub fn output_size(dim: usize, kernel: usize, stride: usize, padding: usize) -> Option<usize> {
    if stride == 0 {
        return None;
    }
    let padded = dim + 2 * padding;
    if padded < kernel {
        return None;
    }
    Some((padded - kernel) / stride + 1)
}

/// Shared `(height, width, depth)` of a kernel set
fn kernel_shape(kernels: &[Kernel]) -> Result<(usize, usize, usize), ShapeError> {
    let first = kernels.first().ok_or(ShapeError::NoKernels)?;
    let expected = first.weights.dims();

    for (index, kernel) in kernels.iter().enumerate().skip(1) {
        let found = kernel.weights.dims();
        if found != expected {
            return Err(ShapeError::KernelShape {
                index,
                expected,
                found,
            });
        }
    }

    Ok(expected)
}

/// Geometry of one convolution, validated against its input size
#[derive(Debug, Clone, Copy)]
struct Geometry {
    kernel_height: usize,
    kernel_width: usize,
    depth: usize,
    output_height: usize,
    output_width: usize,
    stride: usize,
    padding: usize,
}

impl Geometry {
    fn new(
        input: (usize, usize),
        kernel: (usize, usize, usize),
        stride: usize,
        padding: usize,
    ) -> Result<Self, ShapeError> {
        if stride == 0 {
            return Err(ShapeError::ZeroStride);
        }
        let (kernel_height, kernel_width, depth) = kernel;
        let too_large = || ShapeError::KernelTooLarge {
            kernel: (kernel_height, kernel_width),
            input,
            padding,
        };
        let output_height = output_size(input.0, kernel_height, stride, padding).ok_or_else(too_large)?;
        let output_width = output_size(input.1, kernel_width, stride, padding).ok_or_else(too_large)?;

        Ok(Self {
            kernel_height,
            kernel_width,
            depth,
            output_height,
            output_width,
            stride,
            padding,
        })
    }

    fn field_len(&self) -> usize {
        self.kernel_height * self.kernel_width * self.depth
    }

    fn positions(&self) -> usize {
        self.output_height * self.output_width
    }

    /// Matrix of flattened kernel weights, one row per kernel
    fn weight_matrix(&self, kernels: &[Kernel]) -> Array2<f64> {
        let mut matrix = Array2::zeros((kernels.len(), self.field_len()));
        for (mut row, kernel) in matrix.rows_mut().into_iter().zip(kernels) {
            for (dst, &src) in row.iter_mut().zip(kernel.weights.iter()) {
                *dst = src;
            }
        }
        matrix
    }

    /// Unroll every receptive field of `input` into one matrix column (im2col)
    fn unroll(&self, input: &Tensor) -> Array2<f64> {
        let kernel_width = self.kernel_width;
        let depth = self.depth;
        let mut columns = Array2::zeros((self.field_len(), self.positions()));
        receptive_field(self, |column, m, n, x, y| {
            let base = (m * kernel_width + n) * depth;
            for c in 0..depth {
                columns[(base + c, column)] = input.get_padded(x, y, c);
            }
        });
        columns
    }

    /// Output gradient as a (kernels × positions) matrix, laid out like the forward product
    fn gradient_matrix(&self, output_gradient: &Tensor, kernels: usize) -> Result<Array2<f64>, ShapeError> {
        let expected = (self.output_height, self.output_width, kernels);
        if output_gradient.dims() != expected {
            return Err(ShapeError::GradientShape {
                expected,
                found: output_gradient.dims(),
            });
        }
        let width = self.output_width;
        Ok(Array2::from_shape_fn((kernels, self.positions()), |(k, column)| {
            output_gradient[(column / width, column % width, k)]
        }))
    }
}

/// Visit every (output position, kernel offset) pair of a convolution
///
/// The callback receives the im2col column (`i * output_width + j`), the
/// kernel offset `(m, n)`, and the input coordinate
/// `(i·stride + m − padding, j·stride + n − padding)`, which may lie outside
/// the input.
fn receptive_field<F>(geometry: &Geometry, mut visit: F)
where
    F: FnMut(usize, usize, usize, isize, isize),
{
    let stride = geometry.stride as isize;
    let padding = geometry.padding as isize;

    for i in 0..geometry.output_height {
        for j in 0..geometry.output_width {
            let column = i * geometry.output_width + j;
            for m in 0..geometry.kernel_height {
                let x = i as isize * stride + m as isize - padding;
                for n in 0..geometry.kernel_width {
                    let y = j as isize * stride + n as isize - padding;
                    visit(column, m, n, x, y);
                }
            }
        }
    }
}

/// Convolve `input` with every kernel, producing one output channel per kernel
///
/// All kernels must share one shape whose depth equals the input depth.
/// Receptive-field positions that fall into the padding read as zero, and
/// each kernel's bias is added to its whole output channel.
///
/// # Example
///
/// ```rust
/// use conv_snake::nn::{convolve, Kernel, Tensor};
///
/// let input = Tensor::from_fn(3, 3, 1, |i, j, _| (i * 3 + j) as f64);
/// let kernel = Kernel::new(Tensor::from_fn(2, 2, 1, |_, _, _| 1.0), 0.5);
///
/// let output = convolve(&input, &[kernel], 1, 0).unwrap();
/// assert_eq!(output.dims(), (2, 2, 1));
/// assert_eq!(output[(0, 0, 0)], 0.0 + 1.0 + 3.0 + 4.0 + 0.5);
/// ```
pub fn convolve(
    input: &Tensor,
    kernels: &[Kernel],
    stride: usize,
    padding: usize,
) -> Result<Tensor, ShapeError> {
    let shape = kernel_shape(kernels)?;
    if shape.2 != input.depth() {
        return Err(ShapeError::DepthMismatch {
            kernel: shape.2,
            input: input.depth(),
        });
    }
    let geometry = Geometry::new((input.height(), input.width()), shape, stride, padding)?;

    let columns = geometry.unroll(input);
    let product = geometry.weight_matrix(kernels).dot(&columns);

    Ok(Tensor::from_fn(
        geometry.output_height,
        geometry.output_width,
        kernels.len(),
        |i, j, k| product[(k, i * geometry.output_width + j)] + kernels[k].bias,
    ))
}

/// Transpose of [`convolve`]: map a gradient over the convolution's output to
/// a gradient over its input
///
/// `input_dims` is the `(height, width)` of the tensor that was convolved; it
/// is needed because strided convolution floors away trailing rows/columns,
/// so the input size is not recoverable from the output alone. Every product
/// `output_gradient(i, j, k) · weight_k(m, n, c)` is added at input position
/// `(i·stride + m − padding, j·stride + n − padding, c)`; targets that fall
/// into the padding are dropped.
pub fn deconvolve(
    output_gradient: &Tensor,
    kernels: &[Kernel],
    stride: usize,
    padding: usize,
    input_dims: (usize, usize),
) -> Result<Tensor, ShapeError> {
    let shape = kernel_shape(kernels)?;
    let geometry = Geometry::new(input_dims, shape, stride, padding)?;

    let gradient = geometry.gradient_matrix(output_gradient, kernels.len())?;
    let columns = geometry.weight_matrix(kernels).t().dot(&gradient);

    let kernel_width = geometry.kernel_width;
    let depth = geometry.depth;
    let mut input_gradient = Tensor::zeros(input_dims.0, input_dims.1, depth);
    receptive_field(&geometry, |column, m, n, x, y| {
        if x < 0 || y < 0 || x as usize >= input_dims.0 || y as usize >= input_dims.1 {
            return;
        }
        let base = (m * kernel_width + n) * depth;
        for c in 0..depth {
            input_gradient[(x as usize, y as usize, c)] += columns[(base + c, column)];
        }
    });

    Ok(input_gradient)
}

/// Gradient of a convolution's weights and biases
///
/// Given the (already rectified) tensor that was convolved and the gradient
/// over the convolution's output, returns one weight-gradient tensor per
/// kernel, where offset `(m, n, c)` of kernel `k` accumulates
/// `output_gradient(i, j, k) · input(i·stride + m − padding, j·stride + n − padding, c)`
/// over every output position, and one bias gradient per kernel (the sum of
/// its output-gradient channel). Padding positions contribute nothing.
pub fn kernel_gradients(
    input: &Tensor,
    output_gradient: &Tensor,
    kernels: &[Kernel],
    stride: usize,
    padding: usize,
) -> Result<(Vec<Tensor>, Vec<f64>), ShapeError> {
    let shape = kernel_shape(kernels)?;
    if shape.2 != input.depth() {
        return Err(ShapeError::DepthMismatch {
            kernel: shape.2,
            input: input.depth(),
        });
    }
    let geometry = Geometry::new((input.height(), input.width()), shape, stride, padding)?;

    let gradient = geometry.gradient_matrix(output_gradient, kernels.len())?;
    let product = gradient.dot(&geometry.unroll(input).t());

    let (kernel_height, kernel_width, depth) = shape;
    let weights = (0..kernels.len())
        .map(|k| {
            Tensor::from_fn(kernel_height, kernel_width, depth, |m, n, c| {
                product[(k, (m * kernel_width + n) * depth + c)]
            })
        })
        .collect();
    let biases = gradient.sum_axis(Axis(1)).to_vec();

    Ok((weights, biases))
}

/// Elementwise `max(x, 0)`
pub fn relu(input: &Tensor) -> Tensor {
    Tensor::from_array(input.as_array().mapv(|v| v.max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_tensor(rng: &mut StdRng, h: usize, w: usize, d: usize) -> Tensor {
        Tensor::from_fn(h, w, d, |_, _, _| rng.gen_range(-1.0..1.0))
    }

    fn random_kernels(rng: &mut StdRng, count: usize, h: usize, w: usize, d: usize) -> Vec<Kernel> {
        (0..count)
            .map(|_| Kernel::new(random_tensor(rng, h, w, d), rng.gen_range(-1.0..1.0)))
            .collect()
    }

    /// Direct nested-loop convolution used as a reference for the im2col path
    fn naive_convolve(input: &Tensor, kernels: &[Kernel], stride: usize, padding: usize) -> Tensor {
        let (kh, kw, kd) = kernels[0].weights.dims();
        let oh = output_size(input.height(), kh, stride, padding).unwrap();
        let ow = output_size(input.width(), kw, stride, padding).unwrap();
        Tensor::from_fn(oh, ow, kernels.len(), |i, j, k| {
            let mut sum = kernels[k].bias;
            for m in 0..kh {
                for n in 0..kw {
                    for c in 0..kd {
                        let x = (i * stride + m) as isize - padding as isize;
                        let y = (j * stride + n) as isize - padding as isize;
                        sum += kernels[k].weights[(m, n, c)] * input.get_padded(x, y, c);
                    }
                }
            }
            sum
        })
    }

    fn inner(a: &Tensor, b: &Tensor) -> f64 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_output_size_law() {
        assert_eq!(output_size(10, 3, 1, 0), Some(8));
        assert_eq!(output_size(10, 4, 2, 0), Some(4));
        assert_eq!(output_size(5, 3, 2, 1), Some(3));
        assert_eq!(output_size(5, 2, 2, 0), Some(2));
        assert_eq!(output_size(2, 5, 1, 1), None);
        assert_eq!(output_size(2, 1, 0, 0), None);
    }

    #[test]
    fn test_convolve_shape_law_per_axis() {
        let mut rng = StdRng::seed_from_u64(1);
        for &(h, w, kh, kw, s, p) in &[
            (10, 10, 3, 3, 1, 0),
            (10, 7, 4, 2, 2, 0),
            (9, 6, 3, 3, 2, 1),
            (5, 8, 1, 1, 3, 2),
        ] {
            let input = random_tensor(&mut rng, h, w, 2);
            let kernels = random_kernels(&mut rng, 3, kh, kw, 2);
            let output = convolve(&input, &kernels, s, p).unwrap();
            assert_eq!(output.height(), (h - kh + 2 * p) / s + 1);
            assert_eq!(output.width(), (w - kw + 2 * p) / s + 1);
            assert_eq!(output.depth(), 3);
        }
    }

    #[test]
    fn test_convolve_matches_naive_reference() {
        let mut rng = StdRng::seed_from_u64(7);
        let input = random_tensor(&mut rng, 7, 6, 3);
        let kernels = random_kernels(&mut rng, 4, 3, 2, 3);

        for &(s, p) in &[(1, 0), (2, 1), (3, 2)] {
            let fast = convolve(&input, &kernels, s, p).unwrap();
            let slow = naive_convolve(&input, &kernels, s, p);
            assert_eq!(fast.dims(), slow.dims());
            for (a, b) in fast.iter().zip(slow.iter()) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_padding_reads_zero() {
        let input = Tensor::from_fn(1, 1, 1, |_, _, _| 2.0);
        let kernel = Kernel::new(Tensor::from_fn(3, 3, 1, |_, _, _| 1.0), 0.0);
        let output = convolve(&input, &[kernel], 1, 1).unwrap();
        assert_eq!(output.dims(), (1, 1, 1));
        assert_eq!(output[(0, 0, 0)], 2.0);
    }

    #[test]
    fn test_convolve_rejects_depth_mismatch() {
        let input = Tensor::zeros(4, 4, 2);
        let kernel = Kernel::new(Tensor::zeros(2, 2, 1), 0.0);
        assert_eq!(
            convolve(&input, &[kernel], 1, 0),
            Err(ShapeError::DepthMismatch { kernel: 1, input: 2 })
        );
    }

    #[test]
    fn test_convolve_rejects_mixed_kernel_shapes() {
        let input = Tensor::zeros(4, 4, 1);
        let kernels = vec![
            Kernel::new(Tensor::zeros(2, 2, 1), 0.0),
            Kernel::new(Tensor::zeros(3, 2, 1), 0.0),
        ];
        assert!(matches!(
            convolve(&input, &kernels, 1, 0),
            Err(ShapeError::KernelShape { index: 1, .. })
        ));
    }

    #[test]
    fn test_convolve_rejects_oversized_kernel_and_zero_stride() {
        let input = Tensor::zeros(2, 2, 1);
        let kernel = Kernel::new(Tensor::zeros(3, 3, 1), 0.0);
        assert!(matches!(
            convolve(&input, std::slice::from_ref(&kernel), 1, 0),
            Err(ShapeError::KernelTooLarge { .. })
        ));
        assert_eq!(convolve(&input, &[kernel], 0, 1), Err(ShapeError::ZeroStride));
        assert_eq!(convolve(&input, &[], 1, 0), Err(ShapeError::NoKernels));
    }

    #[test]
    fn test_deconvolve_restores_input_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        for &(h, w, kh, kw, s, p) in &[
            (10, 10, 4, 4, 2, 0),
            (5, 5, 2, 2, 2, 0),
            (9, 7, 3, 3, 2, 1),
            (6, 6, 1, 1, 1, 0),
        ] {
            let x = random_tensor(&mut rng, h, w, 2);
            let kernels = random_kernels(&mut rng, 3, kh, kw, 2);
            let y = convolve(&x, &kernels, s, p).unwrap();
            let back = deconvolve(&y, &kernels, s, p, (h, w)).unwrap();
            assert_eq!(back.dims(), x.dims());
        }
    }

    #[test]
    fn test_deconvolve_is_adjoint_of_convolve() {
        // <conv(x) - bias, g> == <x, deconv(g)> for the linear part of the convolution
        let mut rng = StdRng::seed_from_u64(11);
        let x = random_tensor(&mut rng, 7, 8, 2);
        let mut kernels = random_kernels(&mut rng, 3, 3, 3, 2);
        for kernel in &mut kernels {
            kernel.bias = 0.0;
        }

        for &(s, p) in &[(1, 0), (2, 1), (3, 2)] {
            let y = convolve(&x, &kernels, s, p).unwrap();
            let g = random_tensor(&mut rng, y.height(), y.width(), y.depth());
            let back = deconvolve(&g, &kernels, s, p, (7, 8)).unwrap();
            assert!((inner(&y, &g) - inner(&x, &back)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_deconvolve_scatter_values() {
        // Single 1x1 output with a 2x2 kernel spreads the gradient over the kernel footprint
        let kernel = Kernel::new(Tensor::from_fn(2, 2, 1, |m, n, _| (m * 2 + n + 1) as f64), 0.0);
        let g = Tensor::from_fn(1, 1, 1, |_, _, _| 2.0);
        let back = deconvolve(&g, &[kernel], 1, 0, (2, 2)).unwrap();
        assert_eq!(back[(0, 0, 0)], 2.0);
        assert_eq!(back[(0, 1, 0)], 4.0);
        assert_eq!(back[(1, 0, 0)], 6.0);
        assert_eq!(back[(1, 1, 0)], 8.0);
    }

    #[test]
    fn test_deconvolve_rejects_wrong_gradient_shape() {
        let kernel = Kernel::new(Tensor::zeros(2, 2, 1), 0.0);
        let g = Tensor::zeros(2, 2, 1);
        assert!(matches!(
            deconvolve(&g, &[kernel], 1, 0, (4, 4)),
            Err(ShapeError::GradientShape { .. })
        ));
    }

    #[test]
    fn test_kernel_gradients_match_direct_sum() {
        let mut rng = StdRng::seed_from_u64(21);
        let input = random_tensor(&mut rng, 6, 5, 2);
        let kernels = random_kernels(&mut rng, 3, 3, 2, 2);
        let (stride, padding) = (2, 1);

        let out = convolve(&input, &kernels, stride, padding).unwrap();
        let g = random_tensor(&mut rng, out.height(), out.width(), out.depth());
        let (weights, biases) = kernel_gradients(&input, &g, &kernels, stride, padding).unwrap();

        for k in 0..3 {
            let mut bias = 0.0;
            for i in 0..out.height() {
                for j in 0..out.width() {
                    bias += g[(i, j, k)];
                }
            }
            assert!((biases[k] - bias).abs() < 1e-12);

            for m in 0..3 {
                for n in 0..2 {
                    for c in 0..2 {
                        let mut sum = 0.0;
                        for i in 0..out.height() {
                            for j in 0..out.width() {
                                let x = (i * stride + m) as isize - padding as isize;
                                let y = (j * stride + n) as isize - padding as isize;
                                sum += g[(i, j, k)] * input.get_padded(x, y, c);
                            }
                        }
                        assert!((weights[k][(m, n, c)] - sum).abs() < 1e-12);
                    }
                }
            }
        }
    }

    #[test]
    fn test_relu_clamps_negatives() {
        let t = Tensor::from_fn(1, 3, 1, |_, j, _| j as f64 - 1.0);
        let r = relu(&t);
        assert_eq!(r[(0, 0, 0)], 0.0);
        assert_eq!(r[(0, 1, 0)], 0.0);
        assert_eq!(r[(0, 2, 0)], 1.0);
    }
}
