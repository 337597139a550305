//! Experience replay
//!
//! Two sampling policies behind one [`ReplayMemory`] value, chosen at
//! construction:
//! - [`UniformMemory`]: circular buffer, uniform sampling without replacement
//! - [`SumTree`]: priority-proportional sampling with replacement

pub mod sum_tree;
pub mod transition;
pub mod uniform;

pub use sum_tree::SumTree;
pub use transition::Transition;
pub use uniform::UniformMemory;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sampling failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MemoryError {
    #[error("cannot sample from an empty replay memory")]
    Empty,

    #[error("priority must be finite and non-negative, got {0}")]
    InvalidPriority(f64),

    #[error("slot {slot} holds no transition")]
    Vacant { slot: usize },
}

/// Which sampling policy a [`ReplayMemory`] uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Uniform,
    #[default]
    Prioritized,
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(MemoryKind::Uniform),
            "prioritized" | "priority" => Ok(MemoryKind::Prioritized),
            other => Err(format!("unknown memory '{other}', expected uniform or prioritized")),
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryKind::Uniform => write!(f, "uniform"),
            MemoryKind::Prioritized => write!(f, "prioritized"),
        }
    }
}

/// Replay memory with an interchangeable sampling policy
///
/// Samples are slot indices; read them back with [`get`](Self::get) and
/// report new errors with [`update_priority`](Self::update_priority), which
/// the uniform policy ignores.
///
/// # Example
///
/// ```rust
/// use conv_snake::game::Direction;
/// use conv_snake::memory::{MemoryKind, ReplayMemory, Transition};
/// use conv_snake::nn::Tensor;
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
///
/// let mut rng = StdRng::seed_from_u64(0);
/// let mut memory = ReplayMemory::new(MemoryKind::Prioritized, 8);
/// let t = Transition::new(Tensor::zeros(3, 3, 1), Direction::Left, 1.0, Tensor::zeros(3, 3, 1), false);
/// memory.push(t, 2.0).unwrap();
///
/// let slots = memory.sample(4, &mut rng).unwrap();
/// assert_eq!(slots, vec![0; 4]);
/// assert_eq!(memory.get(0).unwrap().reward, 1.0);
/// ```
#[derive(Debug, Clone)]
pub enum ReplayMemory {
    Uniform(UniformMemory),
    Prioritized(SumTree<Transition>),
}

impl ReplayMemory {
    pub fn new(kind: MemoryKind, capacity: usize) -> Self {
        match kind {
            MemoryKind::Uniform => ReplayMemory::Uniform(UniformMemory::new(capacity)),
            MemoryKind::Prioritized => ReplayMemory::Prioritized(SumTree::new(capacity)),
        }
    }

    pub fn kind(&self) -> MemoryKind {
        match self {
            ReplayMemory::Uniform(_) => MemoryKind::Uniform,
            ReplayMemory::Prioritized(_) => MemoryKind::Prioritized,
        }
    }

    /// Slots available before the oldest transition is overwritten
    pub fn capacity(&self) -> usize {
        match self {
            ReplayMemory::Uniform(memory) => memory.capacity(),
            ReplayMemory::Prioritized(tree) => tree.leaf_count(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ReplayMemory::Uniform(memory) => memory.len(),
            ReplayMemory::Prioritized(tree) => tree.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Store a transition, returning its slot; `priority` only matters when prioritized
    pub fn push(&mut self, transition: Transition, priority: f64) -> Result<usize, MemoryError> {
        match self {
            ReplayMemory::Uniform(memory) => Ok(memory.push(transition)),
            ReplayMemory::Prioritized(tree) => tree.push(transition, priority),
        }
    }

    /// Draw `n` slots according to the memory's policy
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Vec<usize>, MemoryError> {
        match self {
            ReplayMemory::Uniform(memory) => memory.sample(n, rng),
            ReplayMemory::Prioritized(tree) => tree.sample(n, rng),
        }
    }

    pub fn get(&self, slot: usize) -> Option<&Transition> {
        match self {
            ReplayMemory::Uniform(memory) => memory.get(slot),
            ReplayMemory::Prioritized(tree) => tree.get(slot),
        }
    }

    pub fn update_priority(&mut self, slot: usize, priority: f64) -> Result<(), MemoryError> {
        match self {
            ReplayMemory::Uniform(_) => Ok(()),
            ReplayMemory::Prioritized(tree) => tree.set_priority(slot, priority),
        }
    }
}

/// Sampling priority for a prediction error: `(|error| + epsilon)^alpha`
pub fn priority(error: f64, alpha: f64, epsilon: f64) -> f64 {
    (error.abs() + epsilon).powf(alpha)
}
