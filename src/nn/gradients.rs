//! Weight and bias gradients mirroring a network's layout

use super::error::NetworkError;
use super::network::Network;
use super::tensor::Tensor;

/// Gradient of one layer: a weight tensor and a bias per kernel
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerGradient {
    pub weights: Vec<Tensor>,
    pub biases: Vec<f64>,
}

impl LayerGradient {
    fn matches(&self, other: &LayerGradient) -> bool {
        self.biases.len() == other.biases.len()
            && self.weights.len() == other.weights.len()
            && self
                .weights
                .iter()
                .zip(&other.weights)
                .all(|(a, b)| a.dims() == b.dims())
    }
}

/// Per-layer gradients for every parameter of a [`Network`]
///
/// Produced by [`Network::backward`], averaged over a batch, and consumed by
/// [`Network::apply_gradient`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Gradients {
    layers: Vec<LayerGradient>,
}

impl Gradients {
    pub fn new(layers: Vec<LayerGradient>) -> Self {
        Self { layers }
    }

    /// All-zero gradients shaped like `network`
    pub fn zeros_for(network: &Network) -> Self {
        let layers = network
            .layers()
            .iter()
            .map(|layer| LayerGradient {
                weights: layer
                    .kernels()
                    .iter()
                    .map(|k| {
                        let (h, w, d) = k.dims();
                        Tensor::zeros(h, w, d)
                    })
                    .collect(),
                biases: vec![0.0; layer.output_depth()],
            })
            .collect();
        Self { layers }
    }

    pub fn layers(&self) -> &[LayerGradient] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&LayerGradient> {
        self.layers.get(index)
    }

    /// Elementwise `self += other`; both must have the same layout
    pub fn accumulate(&mut self, other: &Gradients) -> Result<(), NetworkError> {
        if self.layers.len() != other.layers.len() {
            return Err(NetworkError::GradientShape {
                layer: self.layers.len().min(other.layers.len()),
            });
        }
        if let Some(layer) = self
            .layers
            .iter()
            .zip(&other.layers)
            .position(|(a, b)| !a.matches(b))
        {
            return Err(NetworkError::GradientShape { layer });
        }

        for (mine, theirs) in self.layers.iter_mut().zip(&other.layers) {
            for (w, ow) in mine.weights.iter_mut().zip(&theirs.weights) {
                w.scaled_add(1.0, ow);
            }
            for (b, ob) in mine.biases.iter_mut().zip(&theirs.biases) {
                *b += ob;
            }
        }
        Ok(())
    }

    /// Multiply every entry by `factor`
    pub fn scale(&mut self, factor: f64) {
        for layer in &mut self.layers {
            for w in &mut layer.weights {
                w.scale(factor);
            }
            for b in &mut layer.biases {
                *b *= factor;
            }
        }
    }

    /// Average of a batch of gradients for `network`
    ///
    /// An empty batch averages to zero.
    pub fn mean_of<'a, I>(network: &Network, batch: I) -> Result<Gradients, NetworkError>
    where
        I: IntoIterator<Item = &'a Gradients>,
    {
        let mut total = Gradients::zeros_for(network);
        let mut count = 0usize;
        for gradients in batch {
            total.accumulate(gradients)?;
            count += 1;
        }
        if count > 0 {
            total.scale(1.0 / count as f64);
        }
        Ok(total)
    }

    /// Sum of squared entries, useful for monitoring update magnitude
    pub fn squared_norm(&self) -> f64 {
        self.layers
            .iter()
            .map(|layer| {
                layer
                    .weights
                    .iter()
                    .flat_map(|w| w.iter())
                    .map(|v| v * v)
                    .sum::<f64>()
                    + layer.biases.iter().map(|b| b * b).sum::<f64>()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_network() -> Network {
        let mut rng = StdRng::seed_from_u64(2);
        let mut network = Network::new();
        network.add_layer(2, 2, 2, 1, 1, 0, &mut rng).unwrap();
        network.add_layer(3, 1, 1, 2, 1, 0, &mut rng).unwrap();
        network
    }

    #[test]
    fn test_zeros_for_mirrors_network() {
        let network = small_network();
        let grads = Gradients::zeros_for(&network);
        assert_eq!(grads.layers().len(), 2);
        assert_eq!(grads.layers()[0].weights.len(), 2);
        assert_eq!(grads.layers()[0].weights[0].dims(), (2, 2, 1));
        assert_eq!(grads.layers()[1].biases, vec![0.0; 3]);
        assert_eq!(grads.squared_norm(), 0.0);
    }

    #[test]
    fn test_mean_averages_entries() {
        let network = small_network();
        let mut a = Gradients::zeros_for(&network);
        let mut b = Gradients::zeros_for(&network);
        a.layers[1].biases[0] = 1.0;
        b.layers[1].biases[0] = 3.0;
        a.layers[0].weights[1][(1, 0, 0)] = -2.0;

        let mean = Gradients::mean_of(&network, [&a, &b]).unwrap();
        assert_eq!(mean.layers()[1].biases[0], 2.0);
        assert_eq!(mean.layers()[0].weights[1][(1, 0, 0)], -1.0);
    }

    #[test]
    fn test_mean_of_nothing_is_zero() {
        let network = small_network();
        let mean = Gradients::mean_of(&network, std::iter::empty()).unwrap();
        assert_eq!(mean, Gradients::zeros_for(&network));
    }

    #[test]
    fn test_accumulate_rejects_other_layouts() {
        let network = small_network();
        let mut a = Gradients::zeros_for(&network);
        let mut b = Gradients::zeros_for(&network);
        b.layers[1].biases.push(0.0);
        assert!(matches!(
            a.accumulate(&b),
            Err(NetworkError::GradientShape { layer: 1 })
        ));
        assert!(a.accumulate(&Gradients::default()).is_err());
    }
}
