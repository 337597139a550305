//! Fixed-capacity circular buffer with uniform sampling

use rand::seq::index;
use rand::Rng;

use super::{MemoryError, Transition};

/// FIFO replay buffer
///
/// Appends until `capacity` transitions are stored, then overwrites the
/// oldest one at a rotating cursor.
#[derive(Debug, Clone)]
pub struct UniformMemory {
    capacity: usize,
    cursor: usize,
    transitions: Vec<Transition>,
}

impl UniformMemory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            cursor: 0,
            transitions: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Store `transition`, returning the slot it occupies
    pub fn push(&mut self, transition: Transition) -> usize {
        let slot = self.cursor;
        if self.transitions.len() < self.capacity {
            self.transitions.push(transition);
        } else {
            self.transitions[slot] = transition;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
        slot
    }

    pub fn get(&self, slot: usize) -> Option<&Transition> {
        self.transitions.get(slot)
    }

    /// `n` distinct slots drawn uniformly, or every slot when `n ≥ len`
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Vec<usize>, MemoryError> {
        if self.is_empty() {
            return Err(MemoryError::Empty);
        }
        if n >= self.len() {
            return Ok((0..self.len()).collect());
        }
        Ok(index::sample(rng, self.len(), n).into_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Direction;
    use crate::nn::Tensor;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn marked(reward: f64) -> Transition {
        Transition::new(
            Tensor::zeros(2, 2, 1),
            Direction::Up,
            reward,
            Tensor::zeros(2, 2, 1),
            false,
        )
    }

    fn rewards(memory: &UniformMemory) -> Vec<f64> {
        let mut all: Vec<f64> = (0..memory.len())
            .filter_map(|slot| memory.get(slot))
            .map(|t| t.reward)
            .collect();
        all.sort_by(f64::total_cmp);
        all
    }

    #[test]
    fn test_push_until_full() {
        let mut memory = UniformMemory::new(3);
        assert!(memory.is_empty());
        assert_eq!(memory.push(marked(0.0)), 0);
        assert_eq!(memory.push(marked(1.0)), 1);
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn test_fifo_eviction_keeps_most_recent() {
        let mut memory = UniformMemory::new(4);
        for i in 0..7 {
            memory.push(marked(i as f64));
        }
        assert_eq!(memory.len(), 4);
        assert_eq!(rewards(&memory), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_sample_returns_distinct_slots() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut memory = UniformMemory::new(50);
        for i in 0..40 {
            memory.push(marked(i as f64));
        }
        for _ in 0..20 {
            let slots = memory.sample(10, &mut rng).unwrap();
            assert_eq!(slots.len(), 10);
            let unique: HashSet<_> = slots.iter().collect();
            assert_eq!(unique.len(), 10);
            assert!(slots.iter().all(|&s| s < 40));
        }
    }

    #[test]
    fn test_oversized_sample_returns_everything() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut memory = UniformMemory::new(10);
        for i in 0..4 {
            memory.push(marked(i as f64));
        }
        let mut slots = memory.sample(9, &mut rng).unwrap();
        slots.sort_unstable();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_sample_empty_fails() {
        let mut rng = StdRng::seed_from_u64(3);
        let memory = UniformMemory::new(10);
        assert!(matches!(memory.sample(1, &mut rng), Err(MemoryError::Empty)));
    }
}
