//! Sum-tree for priority-proportional sampling
//!
//! A complete binary tree stored in a flat array of `2·L − 1` nodes, where the
//! `L` leaves (a power of two) occupy the tail. Node `i` has children
//! `2i + 1` and `2i + 2` and parent `(i − 1) / 2`. Every internal node holds
//! the sum of its two children, so the root is the total priority mass and a
//! uniform draw in `[0, root)` can be routed to a leaf in `O(log L)`.

use rand::Rng;

use super::MemoryError;

/// Flat-array sum-tree whose leaves own one item each
///
/// Items are written at a rotating cursor, so once every leaf is occupied
/// the oldest item is overwritten first.
#[derive(Debug, Clone)]
pub struct SumTree<T> {
    nodes: Vec<f64>,
    items: Vec<Option<T>>,
    cursor: usize,
    len: usize,
}

impl<T> SumTree<T> {
    /// Create a tree with room for at least `capacity` items
    ///
    /// The leaf count is the smallest power of two `≥ capacity` (and at least 1).
    pub fn new(capacity: usize) -> Self {
        let leaves = capacity.max(1).next_power_of_two();
        Self {
            nodes: vec![0.0; 2 * leaves - 1],
            items: (0..leaves).map(|_| None).collect(),
            cursor: 0,
            len: 0,
        }
    }

    /// Number of leaves
    pub fn leaf_count(&self) -> usize {
        self.items.len()
    }

    /// Number of occupied leaves
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total priority mass (the root)
    pub fn total(&self) -> f64 {
        self.nodes[0]
    }

    fn first_leaf(&self) -> usize {
        self.leaf_count() - 1
    }

    /// Store `item` at the cursor with `priority`, returning its leaf index
    pub fn push(&mut self, item: T, priority: f64) -> Result<usize, MemoryError> {
        check_priority(priority)?;
        let leaf = self.cursor;
        if self.items[leaf].replace(item).is_none() {
            self.len += 1;
        }
        self.write(leaf, priority);
        self.cursor = (self.cursor + 1) % self.leaf_count();
        Ok(leaf)
    }

    /// Replace the priority of an occupied leaf
    ///
    /// Leaf indices wrap modulo the leaf count.
    pub fn set_priority(&mut self, leaf: usize, priority: f64) -> Result<(), MemoryError> {
        check_priority(priority)?;
        let leaf = leaf % self.leaf_count();
        if self.items[leaf].is_none() {
            return Err(MemoryError::Vacant { slot: leaf });
        }
        self.write(leaf, priority);
        Ok(())
    }

    /// Set a leaf and refresh every ancestor from its two children
    ///
    /// Recomputing each sum (instead of adding the delta) keeps internal
    /// nodes equal to the exact sum of their children.
    fn write(&mut self, leaf: usize, priority: f64) {
        let mut node = self.first_leaf() + leaf;
        self.nodes[node] = priority;
        while node > 0 {
            node = (node - 1) / 2;
            self.nodes[node] = self.nodes[2 * node + 1] + self.nodes[2 * node + 2];
        }
    }

    /// Priority of a leaf (0 for vacant leaves)
    pub fn priority(&self, leaf: usize) -> f64 {
        self.nodes[self.first_leaf() + leaf % self.leaf_count()]
    }

    pub fn get(&self, leaf: usize) -> Option<&T> {
        self.items.get(leaf)?.as_ref()
    }

    /// Leaf reached by routing `value` down from the root
    ///
    /// At each internal node the walk goes left when the left subtree's mass
    /// covers the remaining value, otherwise it subtracts that mass and goes
    /// right. Zero-mass subtrees are never entered while the sibling holds
    /// mass, so rounding at the boundaries cannot land on a vacant leaf.
    pub fn retrieve(&self, mut value: f64) -> usize {
        let first_leaf = self.first_leaf();
        let mut node = 0;
        while node < first_leaf {
            let left = 2 * node + 1;
            let right = left + 1;
            let go_left = if self.nodes[left] <= 0.0 {
                false
            } else if self.nodes[right] <= 0.0 {
                true
            } else {
                self.nodes[left] >= value
            };
            if go_left {
                node = left;
            } else {
                value -= self.nodes[left];
                node = right;
            }
        }
        node - first_leaf
    }

    /// Draw `n` leaf indices with probability proportional to priority
    ///
    /// Draws are independent, so a leaf may be returned more than once.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Vec<usize>, MemoryError> {
        let total = self.total();
        if self.is_empty() || !(total > 0.0) {
            return Err(MemoryError::Empty);
        }
        Ok((0..n).map(|_| self.retrieve(rng.gen_range(0.0..total))).collect())
    }

    #[cfg(test)]
    pub(crate) fn nodes(&self) -> &[f64] {
        &self.nodes
    }
}

fn check_priority(priority: f64) -> Result<(), MemoryError> {
    if priority.is_finite() && priority >= 0.0 {
        Ok(())
    } else {
        Err(MemoryError::InvalidPriority(priority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn assert_sums(tree: &SumTree<usize>) {
        let nodes = tree.nodes();
        for i in 0..tree.first_leaf() {
            assert_eq!(nodes[i], nodes[2 * i + 1] + nodes[2 * i + 2], "node {i}");
        }
    }

    #[test]
    fn test_leaf_count_rounds_up_to_power_of_two() {
        assert_eq!(SumTree::<usize>::new(5).leaf_count(), 8);
        assert_eq!(SumTree::<usize>::new(8).leaf_count(), 8);
        assert_eq!(SumTree::<usize>::new(1).leaf_count(), 1);
        assert_eq!(SumTree::<usize>::new(0).leaf_count(), 1);
        assert_eq!(SumTree::<usize>::new(5).nodes().len(), 15);
    }

    #[test]
    fn test_push_accumulates_total() {
        let mut tree = SumTree::new(4);
        tree.push(0, 1.0).unwrap();
        tree.push(1, 2.5).unwrap();
        assert_eq!(tree.total(), 3.5);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get(1), Some(&1));
        assert_eq!(tree.get(2), None);
    }

    #[test]
    fn test_push_overwrites_oldest_leaf() {
        let mut tree = SumTree::new(2);
        assert_eq!(tree.push(10, 1.0).unwrap(), 0);
        assert_eq!(tree.push(11, 1.0).unwrap(), 1);
        assert_eq!(tree.push(12, 5.0).unwrap(), 0);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get(0), Some(&12));
        assert_eq!(tree.total(), 6.0);
    }

    #[test]
    fn test_set_priority_wraps_and_rejects_vacant() {
        let mut tree = SumTree::new(4);
        tree.push(0, 1.0).unwrap();
        tree.set_priority(4, 3.0).unwrap();
        assert_eq!(tree.priority(0), 3.0);
        assert_eq!(tree.total(), 3.0);

        assert!(matches!(tree.set_priority(2, 1.0), Err(MemoryError::Vacant { slot: 2 })));
        assert!(matches!(tree.set_priority(0, -1.0), Err(MemoryError::InvalidPriority(_))));
        assert!(tree.push(1, f64::NAN).is_err());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_invariant_holds_over_random_operations() {
        let mut rng = StdRng::seed_from_u64(17);
        let mut tree = SumTree::new(13);
        for step in 0..2000 {
            if tree.is_empty() || rng.gen_bool(0.4) {
                tree.push(step, rng.gen_range(0.0..10.0)).unwrap();
            } else {
                let leaf = rng.gen_range(0..tree.len());
                tree.set_priority(leaf, rng.gen_range(0.0..10.0)).unwrap();
            }
            assert_sums(&tree);
        }
    }

    #[test]
    fn test_retrieve_routes_by_cumulative_mass() {
        let mut tree = SumTree::new(4);
        for (item, p) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            tree.push(item, p).unwrap();
        }
        assert_eq!(tree.retrieve(0.5), 0);
        assert_eq!(tree.retrieve(1.0), 0);
        assert_eq!(tree.retrieve(1.5), 1);
        assert_eq!(tree.retrieve(3.5), 2);
        assert_eq!(tree.retrieve(9.9), 3);
    }

    #[test]
    fn test_retrieve_skips_zero_mass_leaves() {
        let mut tree = SumTree::new(4);
        tree.push(0, 0.0).unwrap();
        tree.push(1, 2.0).unwrap();
        assert_eq!(tree.retrieve(0.0), 1);
        // Vacant leaves 2 and 3 hold no mass
        assert_eq!(tree.retrieve(2.0), 1);
    }

    #[test]
    fn test_sample_frequencies_follow_priorities() {
        let mut rng = StdRng::seed_from_u64(99);
        let mut tree = SumTree::new(4);
        let priorities = [1.0, 2.0, 3.0, 4.0];
        for (item, &p) in priorities.iter().enumerate() {
            tree.push(item, p).unwrap();
        }

        let draws = 100_000;
        let mut counts = [0usize; 4];
        for leaf in tree.sample(draws, &mut rng).unwrap() {
            counts[leaf] += 1;
        }
        for (leaf, &p) in priorities.iter().enumerate() {
            let observed = counts[leaf] as f64 / draws as f64;
            assert!((observed - p / 10.0).abs() < 0.01, "leaf {leaf}: {observed}");
        }
    }

    #[test]
    fn test_sample_without_mass_is_empty_error() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut tree = SumTree::new(4);
        assert!(matches!(tree.sample(1, &mut rng), Err(MemoryError::Empty)));
        tree.push(0, 0.0).unwrap();
        assert!(matches!(tree.sample(1, &mut rng), Err(MemoryError::Empty)));
    }
}
