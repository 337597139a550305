//! Named layer presets for the snake Q-network

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::conv::output_size;
use super::error::NetworkError;
use super::network::Network;

/// Geometry of one convolution layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub kernels: usize,
    pub kernel_height: usize,
    pub kernel_width: usize,
    pub stride: usize,
    pub padding: usize,
}

impl LayerSpec {
    /// Square kernel with padding 0
    pub const fn square(kernels: usize, size: usize, stride: usize) -> Self {
        Self {
            kernels,
            kernel_height: size,
            kernel_width: size,
            stride,
            padding: 0,
        }
    }
}

/// Available network presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TopologyPreset {
    /// One strided layer followed by small kernels
    #[default]
    Strided,
    /// Six unstrided layers
    Deep,
}

impl TopologyPreset {
    pub fn topology(self, input_depth: usize) -> Topology {
        match self {
            TopologyPreset::Strided => Topology::strided(input_depth),
            TopologyPreset::Deep => Topology::deep(input_depth),
        }
    }
}

impl std::str::FromStr for TopologyPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strided" => Ok(TopologyPreset::Strided),
            "deep" => Ok(TopologyPreset::Deep),
            other => Err(format!("unknown topology '{other}', expected strided or deep")),
        }
    }
}

/// A list of layer specs over an input of a given depth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub input_depth: usize,
    pub layers: Vec<LayerSpec>,
}

impl Topology {
    /// 32·4×4/2 → 32·2×2 → 128·3×3 → 4·1×1
    ///
    /// Maps a 10×10 grid to 1×1×4.
    pub fn strided(input_depth: usize) -> Self {
        Self {
            input_depth,
            layers: vec![
                LayerSpec::square(32, 4, 2),
                LayerSpec::square(32, 2, 1),
                LayerSpec::square(128, 3, 1),
                LayerSpec::square(4, 1, 1),
            ],
        }
    }

    /// 16·3×3 → 32·3×3 → 64·6×6 → 128·1×1 → 256·1×1 → 4·1×1
    ///
    /// Maps a 10×10 grid to 1×1×4.
    pub fn deep(input_depth: usize) -> Self {
        Self {
            input_depth,
            layers: vec![
                LayerSpec::square(16, 3, 1),
                LayerSpec::square(32, 3, 1),
                LayerSpec::square(64, 6, 1),
                LayerSpec::square(128, 1, 1),
                LayerSpec::square(256, 1, 1),
                LayerSpec::square(4, 1, 1),
            ],
        }
    }

    /// Final activation shape for a `(height, width)` input, if every layer fits
    pub fn output_dims(&self, height: usize, width: usize) -> Option<(usize, usize, usize)> {
        let (mut h, mut w) = (height, width);
        for spec in &self.layers {
            h = output_size(h, spec.kernel_height, spec.stride, spec.padding)?;
            w = output_size(w, spec.kernel_width, spec.stride, spec.padding)?;
        }
        Some((h, w, self.layers.last()?.kernels))
    }

    /// Construct a randomly initialised network with these layers
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Network, NetworkError> {
        let mut network = Network::new();
        let mut depth = self.input_depth;
        for spec in &self.layers {
            network.add_layer(
                spec.kernels,
                spec.kernel_height,
                spec.kernel_width,
                depth,
                spec.stride,
                spec.padding,
                rng,
            )?;
            depth = spec.kernels;
        }
        Ok(network)
    }
}
