//! Per-parameter adaptive step-size rule
//!
//! Every scalar parameter keeps two running second moments: one of its
//! gradient and one of the updates applied to it. The step is the gradient
//! scaled by the ratio of their (smoothed) square roots, so each parameter
//! gets its own learning rate and no global rate constant is needed:
//!
//! ```text
//! avg_grad   = ρ·avg_grad   + (1 − ρ)·g²
//! step       = −sqrt((avg_update + ε) / (avg_grad + ε)) · g
//! avg_update = ρ·avg_update + (1 − ρ)·step²
//! param     += step
//! ```

use serde::{Deserialize, Serialize};

/// Hyperparameters of the adaptive step rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Decay ρ of both running averages, in `[0, 1)`
    ///
    /// Default: 0.95
    pub momentum: f64,

    /// Smoothing ε added to both averages; sets the scale of the first steps
    ///
    /// Default: 1e-6
    pub smoothing: f64,
}

impl OptimizerConfig {
    pub fn new(momentum: f64, smoothing: f64) -> Self {
        Self {
            momentum,
            smoothing,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(format!("momentum must be in [0, 1), got {}", self.momentum));
        }
        if self.smoothing <= 0.0 {
            return Err(format!("smoothing must be positive, got {}", self.smoothing));
        }
        Ok(())
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            momentum: 0.95,
            smoothing: 1e-6,
        }
    }
}

/// Apply one adaptive step to a single parameter and its accumulators
pub(crate) fn adaptive_step(
    param: &mut f64,
    avg_grad: &mut f64,
    avg_update: &mut f64,
    grad: f64,
    config: &OptimizerConfig,
) {
    let rho = config.momentum;
    let eps = config.smoothing;

    *avg_grad = rho * *avg_grad + (1.0 - rho) * grad * grad;
    // Rounding can push the ratio a hair below zero
    let ratio = ((*avg_update + eps) / (*avg_grad + eps)).max(0.0);
    let step = -ratio.sqrt() * grad;
    *avg_update = rho * *avg_update + (1.0 - rho) * step * step;

    *param += step;
}
