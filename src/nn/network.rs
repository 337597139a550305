//! Layered convolutional Q-network: forward, backward and optimizer step
//!
//! # Architecture
//!
//! ```text
//! stack[0] = input                                  [H, W, 1]
//! stack[1] = conv(relu(stack[0]), layer 0)           [H1, W1, K0]
//!   ...
//! stack[L] = conv(relu(stack[L-1]), layer L-1)       [1, 1, 4]  action values
//! ```
//!
//! ReLU is applied to each layer's input rather than its output, so the raw
//! input is also clamped at zero and the final layer is linear.

use rand::Rng;

use super::conv::{convolve, deconvolve, kernel_gradients, relu};
use super::error::NetworkError;
use super::gradients::{Gradients, LayerGradient};
use super::layer::Layer;
use super::optimizer::{adaptive_step, OptimizerConfig};
use super::tensor::Tensor;

/// Derivative of the Huber loss with respect to the prediction
///
/// The raw difference inside `[-delta, delta]`, clamped to `±delta` outside.
pub fn huber_gradient(difference: f64, delta: f64) -> f64 {
    if difference.abs() > delta {
        delta * difference.signum()
    } else {
        difference
    }
}

/// Huber loss summed over action units
///
/// Quadratic (`d²/2`) for `|d| ≤ delta`, linear (`delta·(|d| − delta/2)`) beyond.
pub fn huber_loss(predicted: &[f64], target: &[f64], delta: f64) -> f64 {
    predicted
        .iter()
        .zip(target)
        .map(|(p, t)| {
            let d = (p - t).abs();
            if d <= delta {
                0.5 * d * d
            } else {
                delta * (d - 0.5 * delta)
            }
        })
        .sum()
}

/// An ordered stack of convolution layers
///
/// Built once by appending layers, then trained through repeated
/// [`forward`](Self::forward) / [`backward`](Self::backward) /
/// [`apply_gradient`](Self::apply_gradient) calls. The first optimizer step
/// freezes the layout: later `add_layer` calls fail with
/// [`NetworkError::Frozen`].
///
/// # Example
///
/// ```rust
/// use conv_snake::nn::{Network, Tensor};
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let mut rng = StdRng::seed_from_u64(0);
/// let mut network = Network::new();
/// network.add_layer(8, 4, 4, 1, 2, 0, &mut rng).unwrap();
/// network.add_layer(4, 4, 4, 8, 1, 0, &mut rng).unwrap();
///
/// let stack = network.forward(&Tensor::zeros(10, 10, 1)).unwrap();
/// assert_eq!(stack.len(), 3);
/// assert_eq!(stack[2].dims(), (1, 1, 4));
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Network {
    layers: Vec<Layer>,
    frozen: bool,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer of `nb_kernels` randomly initialised kernels
    ///
    /// `input_depth` must equal the previous layer's kernel count.
    pub fn add_layer<R: Rng + ?Sized>(
        &mut self,
        nb_kernels: usize,
        kernel_height: usize,
        kernel_width: usize,
        input_depth: usize,
        stride: usize,
        padding: usize,
        rng: &mut R,
    ) -> Result<(), NetworkError> {
        self.check_appendable(input_depth)?;
        let layer = Layer::random(
            nb_kernels,
            kernel_height,
            kernel_width,
            input_depth,
            stride,
            padding,
            rng,
        )?;
        self.layers.push(layer);
        Ok(())
    }

    /// Append an explicitly built layer
    pub fn push_layer(&mut self, layer: Layer) -> Result<(), NetworkError> {
        self.check_appendable(layer.input_depth())?;
        self.layers.push(layer);
        Ok(())
    }

    fn check_appendable(&self, input_depth: usize) -> Result<(), NetworkError> {
        if self.frozen {
            return Err(NetworkError::Frozen);
        }
        if let Some(previous) = self.layers.last() {
            if previous.output_depth() != input_depth {
                return Err(NetworkError::DepthMismatch {
                    layer: self.layers.len(),
                    expected: input_depth,
                    found: previous.output_depth(),
                });
            }
        }
        Ok(())
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Whether an optimizer step has been taken
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Depth the first layer expects
    pub fn input_depth(&self) -> Option<usize> {
        self.layers.first().map(Layer::input_depth)
    }

    /// Depth of the final activation
    pub fn output_depth(&self) -> Option<usize> {
        self.layers.last().map(Layer::output_depth)
    }

    /// Shape of the final activation for an input of `(height, width)`
    pub fn output_dims(&self, height: usize, width: usize) -> Option<(usize, usize, usize)> {
        let (mut h, mut w) = (height, width);
        for layer in &self.layers {
            (h, w) = layer.output_dims(h, w)?;
        }
        Some((h, w, self.output_depth()?))
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    /// Evaluate the network, keeping every intermediate activation
    ///
    /// `stack[0]` is the input and `stack[i] = convolve(relu(stack[i-1]), layer i-1)`.
    /// The whole stack is needed by [`backward`](Self::backward).
    pub fn forward(&self, input: &Tensor) -> Result<Vec<Tensor>, NetworkError> {
        if self.layers.is_empty() {
            return Err(NetworkError::Empty);
        }

        let mut stack = Vec::with_capacity(self.layers.len() + 1);
        stack.push(input.clone());

        for (index, layer) in self.layers.iter().enumerate() {
            let previous = &stack[index];
            if previous.depth() != layer.input_depth() {
                return Err(NetworkError::DepthMismatch {
                    layer: index,
                    expected: layer.input_depth(),
                    found: previous.depth(),
                });
            }
            let next = convolve(&relu(previous), &layer.kernels, layer.stride, layer.padding)?;
            stack.push(next);
        }

        Ok(stack)
    }

    /// Action values for `input`: the channel vector of the 1×1 final activation
    pub fn predict(&self, input: &Tensor) -> Result<Vec<f64>, NetworkError> {
        let stack = self.forward(input)?;
        let output = stack.last().ok_or(NetworkError::Empty)?;
        if output.height() != 1 || output.width() != 1 {
            return Err(NetworkError::OutputShape {
                expected: output.depth(),
                found: output.dims(),
            });
        }
        Ok(output.channels_at_origin())
    }

    /// Gradients of the Huber loss between the final activation and `target`
    ///
    /// `stack` must come from [`forward`](Self::forward) on this network and
    /// end in a 1×1 activation with one channel per target entry. Output
    /// deltas are `predicted − target`, clamped to `±huber_delta`; they are
    /// propagated down with [`deconvolve`] and gated to zero wherever the
    /// forward pre-activation was `≤ 0`.
    pub fn backward(
        &self,
        stack: &[Tensor],
        target: &[f64],
        huber_delta: f64,
    ) -> Result<Gradients, NetworkError> {
        let depth = self.layers.len();
        if depth == 0 {
            return Err(NetworkError::Empty);
        }
        if stack.len() != depth + 1 {
            return Err(NetworkError::StackLength {
                expected: depth + 1,
                found: stack.len(),
            });
        }

        let output = &stack[depth];
        if output.dims() != (1, 1, target.len()) {
            return Err(NetworkError::OutputShape {
                expected: target.len(),
                found: output.dims(),
            });
        }

        let mut delta = Tensor::zeros(1, 1, target.len());
        for (unit, &goal) in target.iter().enumerate() {
            delta[(0, 0, unit)] = huber_gradient(output[(0, 0, unit)] - goal, huber_delta);
        }

        let mut layers = vec![LayerGradient::default(); depth];
        for l in (0..depth).rev() {
            let layer = &self.layers[l];
            let input = &stack[l];

            let (weights, biases) =
                kernel_gradients(&relu(input), &delta, &layer.kernels, layer.stride, layer.padding)?;
            layers[l] = LayerGradient { weights, biases };

            if l > 0 {
                let mut below = deconvolve(
                    &delta,
                    &layer.kernels,
                    layer.stride,
                    layer.padding,
                    (input.height(), input.width()),
                )?;
                for (d, &pre) in below.iter_mut().zip(input.iter()) {
                    if pre <= 0.0 {
                        *d = 0.0;
                    }
                }
                delta = below;
            }
        }

        Ok(Gradients::new(layers))
    }

    /// Take one optimizer step on every weight and bias
    ///
    /// The gradient layout is checked in full before any parameter changes.
    pub fn apply_gradient(
        &mut self,
        gradients: &Gradients,
        config: &OptimizerConfig,
    ) -> Result<(), NetworkError> {
        if gradients.layers().len() != self.layers.len() {
            return Err(NetworkError::GradientShape {
                layer: gradients.layers().len().min(self.layers.len()),
            });
        }
        for (index, (layer, grad)) in self.layers.iter().zip(gradients.layers()).enumerate() {
            let fits = grad.weights.len() == layer.kernels.len()
                && grad.biases.len() == layer.kernels.len()
                && grad
                    .weights
                    .iter()
                    .zip(&layer.kernels)
                    .all(|(g, k)| g.dims() == k.dims());
            if !fits {
                return Err(NetworkError::GradientShape { layer: index });
            }
        }

        for (layer, grad) in self.layers.iter_mut().zip(gradients.layers()) {
            for (kernel, (weight_grad, &bias_grad)) in layer
                .kernels
                .iter_mut()
                .zip(grad.weights.iter().zip(&grad.biases))
            {
                adaptive_step(
                    &mut kernel.bias,
                    &mut kernel.bias_avg_grad,
                    &mut kernel.bias_avg_update,
                    bias_grad,
                    config,
                );

                let params = kernel.weights.iter_mut();
                let avg_grads = kernel.weights_avg_grad.iter_mut();
                let avg_updates = kernel.weights_avg_update.iter_mut();
                for (((w, g2), u2), &g) in params.zip(avg_grads).zip(avg_updates).zip(weight_grad.iter()) {
                    adaptive_step(w, g2, u2, g, config);
                }
            }
        }

        self.frozen = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::Kernel;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn random_tensor(rng: &mut StdRng, h: usize, w: usize, d: usize) -> Tensor {
        Tensor::from_fn(h, w, d, |_, _, _| rng.gen_range(-1.0..1.0))
    }

    fn random_layer(rng: &mut StdRng, count: usize, k: usize, depth: usize, stride: usize, padding: usize) -> Layer {
        let kernels = (0..count)
            .map(|_| Kernel::new(random_tensor(rng, k, k, depth), rng.gen_range(-0.5..0.5)))
            .collect();
        Layer::new(kernels, stride, padding).unwrap()
    }

    /// 5x5x1 → 5x5x3 → 2x2x2 → 1x1x4, with O(1) weights so every layer matters
    fn gradient_check_network(rng: &mut StdRng) -> Network {
        let mut network = Network::new();
        network.push_layer(random_layer(rng, 3, 3, 1, 1, 1)).unwrap();
        network.push_layer(random_layer(rng, 2, 3, 3, 2, 0)).unwrap();
        network.push_layer(random_layer(rng, 4, 2, 2, 1, 0)).unwrap();
        network
    }

    fn single_unit_network(weight: f64, bias: f64) -> Network {
        let kernel = Kernel::new(Tensor::from_fn(1, 1, 1, |_, _, _| weight), bias);
        let mut network = Network::new();
        network.push_layer(Layer::new(vec![kernel], 1, 0).unwrap()).unwrap();
        network
    }

    fn loss(network: &Network, input: &Tensor, target: &[f64], delta: f64) -> f64 {
        huber_loss(&network.predict(input).unwrap(), target, delta)
    }

    fn assert_close(analytic: f64, numeric: f64) {
        let tolerance = 1e-4 * (1.0 + analytic.abs() + numeric.abs());
        assert!(
            (analytic - numeric).abs() < tolerance,
            "analytic {analytic} vs numeric {numeric}"
        );
    }

    #[test]
    fn test_add_layer_checks_depth_chain() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut network = Network::new();
        network.add_layer(16, 3, 3, 1, 1, 0, &mut rng).unwrap();
        let err = network.add_layer(8, 3, 3, 32, 1, 0, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            NetworkError::DepthMismatch {
                layer: 1,
                expected: 32,
                found: 16
            }
        ));
        assert_eq!(network.len(), 1);
    }

    #[test]
    fn test_add_layer_rejects_invalid_geometry() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut network = Network::new();
        assert!(network.add_layer(0, 3, 3, 1, 1, 0, &mut rng).is_err());
        assert!(network.add_layer(4, 3, 3, 1, 0, 0, &mut rng).is_err());
        assert!(network.is_empty());
    }

    #[test]
    fn test_forward_stack_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut network = Network::new();
        network.add_layer(32, 4, 4, 1, 2, 0, &mut rng).unwrap();
        network.add_layer(32, 2, 2, 32, 1, 0, &mut rng).unwrap();
        network.add_layer(128, 3, 3, 32, 1, 0, &mut rng).unwrap();
        network.add_layer(4, 1, 1, 128, 1, 0, &mut rng).unwrap();

        let stack = network.forward(&random_tensor(&mut rng, 10, 10, 1)).unwrap();
        let dims: Vec<_> = stack.iter().map(Tensor::dims).collect();
        assert_eq!(
            dims,
            vec![(10, 10, 1), (4, 4, 32), (3, 3, 32), (1, 1, 128), (1, 1, 4)]
        );
        assert_eq!(network.output_dims(10, 10), Some((1, 1, 4)));
    }

    #[test]
    fn test_forward_rejects_wrong_input_depth() {
        let network = single_unit_network(1.0, 0.0);
        assert!(matches!(
            network.forward(&Tensor::zeros(1, 1, 2)),
            Err(NetworkError::DepthMismatch { layer: 0, .. })
        ));
        assert!(matches!(Network::new().forward(&Tensor::zeros(1, 1, 1)), Err(NetworkError::Empty)));
    }

    #[test]
    fn test_forward_clamps_raw_input() {
        let network = single_unit_network(1.0, 0.25);
        let input = Tensor::from_fn(1, 1, 1, |_, _, _| -3.0);
        assert_eq!(network.predict(&input).unwrap(), vec![0.25]);
    }

    #[test]
    fn test_single_unit_scenario() {
        let network = single_unit_network(1.0, 0.0);
        let input = Tensor::from_fn(1, 1, 1, |_, _, _| 5.0);

        let stack = network.forward(&input).unwrap();
        assert_eq!(stack[1][(0, 0, 0)], 5.0);

        // |5 - 3| = 2 exceeds the Huber delta of 1, so the output delta is exactly 1
        let grads = network.backward(&stack, &[3.0], 1.0).unwrap();
        assert_eq!(grads.layers()[0].biases[0], 1.0);
        assert_eq!(grads.layers()[0].weights[0][(0, 0, 0)], 5.0);
    }

    #[test]
    fn test_huber_clamp_uses_sign_of_difference() {
        assert_eq!(huber_gradient(2.0, 1.0), 1.0);
        assert_eq!(huber_gradient(-2.5, 1.0), -1.0);
        assert_eq!(huber_gradient(0.5, 1.0), 0.5);
        assert_eq!(huber_gradient(-0.75, 1.0), -0.75);

        let network = single_unit_network(1.0, 0.0);
        let stack = network.forward(&Tensor::from_fn(1, 1, 1, |_, _, _| 1.0)).unwrap();
        let grads = network.backward(&stack, &[4.0], 0.5).unwrap();
        assert_eq!(grads.layers()[0].biases[0], -0.5);
    }

    #[test]
    fn test_huber_loss_regions() {
        assert_eq!(huber_loss(&[1.5], &[1.0], 1.0), 0.125);
        assert_eq!(huber_loss(&[4.0], &[1.0], 1.0), 2.5);
        assert_eq!(huber_loss(&[0.0, 0.0], &[-4.0, 0.5], 2.0), 6.0 + 0.125);
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(42);
        let network = gradient_check_network(&mut rng);
        let input = random_tensor(&mut rng, 5, 5, 1);
        let target: Vec<f64> = (0..4).map(|_| rng.gen_range(-2.0..2.0)).collect();
        let delta = 1.0;

        let stack = network.forward(&input).unwrap();
        let grads = network.backward(&stack, &target, delta).unwrap();
        let h = 1e-6;

        for l in 0..network.len() {
            for k in 0..network.layers[l].kernels.len() {
                let (kh, kw, kd) = network.layers[l].kernels[k].dims();
                for m in 0..kh {
                    for n in 0..kw {
                        for c in 0..kd {
                            let mut plus = network.clone();
                            plus.layers[l].kernels[k].weights[(m, n, c)] += h;
                            let mut minus = network.clone();
                            minus.layers[l].kernels[k].weights[(m, n, c)] -= h;
                            let numeric = (loss(&plus, &input, &target, delta)
                                - loss(&minus, &input, &target, delta))
                                / (2.0 * h);
                            assert_close(grads.layers()[l].weights[k][(m, n, c)], numeric);
                        }
                    }
                }

                let mut plus = network.clone();
                plus.layers[l].kernels[k].bias += h;
                let mut minus = network.clone();
                minus.layers[l].kernels[k].bias -= h;
                let numeric = (loss(&plus, &input, &target, delta)
                    - loss(&minus, &input, &target, delta))
                    / (2.0 * h);
                assert_close(grads.layers()[l].biases[k], numeric);
            }
        }
    }

    #[test]
    fn test_backward_rejects_mismatched_inputs() {
        let network = single_unit_network(1.0, 0.0);
        let stack = network.forward(&Tensor::zeros(1, 1, 1)).unwrap();
        assert!(matches!(
            network.backward(&stack, &[1.0, 2.0], 1.0),
            Err(NetworkError::OutputShape { .. })
        ));
        assert!(matches!(
            network.backward(&stack[..1], &[1.0], 1.0),
            Err(NetworkError::StackLength { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_apply_gradient_reduces_loss() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut network = gradient_check_network(&mut rng);
        let input = random_tensor(&mut rng, 5, 5, 1);
        let target = vec![0.5, -0.5, 1.0, 0.0];
        let config = OptimizerConfig::new(0.9, 1e-6);

        let before = loss(&network, &input, &target, 1.0);
        for _ in 0..3 {
            let stack = network.forward(&input).unwrap();
            let grads = network.backward(&stack, &target, 1.0).unwrap();
            network.apply_gradient(&grads, &config).unwrap();
        }
        let after = loss(&network, &input, &target, 1.0);
        assert!(after < before, "loss went from {before} to {after}");
    }

    #[test]
    fn test_apply_gradient_freezes_layout() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut network = single_unit_network(1.0, 0.0);
        let grads = Gradients::zeros_for(&network);
        network.apply_gradient(&grads, &OptimizerConfig::default()).unwrap();

        assert!(network.is_frozen());
        assert!(matches!(
            network.add_layer(1, 1, 1, 1, 1, 0, &mut rng),
            Err(NetworkError::Frozen)
        ));
    }

    #[test]
    fn test_apply_gradient_rejects_foreign_layout_without_mutating() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut network = gradient_check_network(&mut rng);
        let snapshot = network.clone();

        let mut other = Network::new();
        other.add_layer(3, 3, 3, 1, 1, 1, &mut rng).unwrap();
        other.add_layer(2, 3, 3, 3, 2, 0, &mut rng).unwrap();
        other.add_layer(5, 2, 2, 2, 1, 0, &mut rng).unwrap();
        let foreign = Gradients::zeros_for(&other);

        assert!(matches!(
            network.apply_gradient(&foreign, &OptimizerConfig::default()),
            Err(NetworkError::GradientShape { layer: 2 })
        ));
        assert_eq!(network, snapshot);
    }
}
