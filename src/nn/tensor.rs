//! Dense height × width × depth tensor used for activations, weights and gradients

use std::ops::{Index, IndexMut};

use ndarray::Array3;

/// A dense rectangular multi-channel array of `f64` values
///
/// Elements are addressed by `(row, column, channel)`. Cloning yields an
/// independent value; a freshly constructed tensor is all zeros.
///
/// # Example
///
/// ```rust
/// use conv_snake::nn::Tensor;
///
/// let mut t = Tensor::zeros(2, 3, 1);
/// t[(1, 2, 0)] = 4.0;
///
/// assert_eq!(t.height(), 2);
/// assert_eq!(t.width(), 3);
/// assert_eq!(t[(1, 2, 0)], 4.0);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tensor {
    data: Array3<f64>,
}

impl Tensor {
    /// Create an all-zero tensor
    pub fn zeros(height: usize, width: usize, depth: usize) -> Self {
        Self {
            data: Array3::zeros((height, width, depth)),
        }
    }

    /// Wrap an existing `(height, width, depth)` array
    pub fn from_array(data: Array3<f64>) -> Self {
        Self { data }
    }

    /// Build a tensor by evaluating `f(row, column, channel)` for every element
    pub fn from_fn<F>(height: usize, width: usize, depth: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize) -> f64,
    {
        Self {
            data: Array3::from_shape_fn((height, width, depth), |(i, j, k)| f(i, j, k)),
        }
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn depth(&self) -> usize {
        self.data.dim().2
    }

    /// `(height, width, depth)`
    pub fn dims(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Bounds-checked read
    pub fn get(&self, row: usize, col: usize, channel: usize) -> Option<f64> {
        self.data.get((row, col, channel)).copied()
    }

    /// Read with signed coordinates, treating anything outside the grid as zero
    ///
    /// This is the zero-padding rule shared by convolution and its transpose.
    pub fn get_padded(&self, row: isize, col: isize, channel: usize) -> f64 {
        if row < 0 || col < 0 {
            return 0.0;
        }
        self.get(row as usize, col as usize, channel).unwrap_or(0.0)
    }

    pub fn as_array(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn as_array_mut(&mut self) -> &mut Array3<f64> {
        &mut self.data
    }

    pub fn into_array(self) -> Array3<f64> {
        self.data
    }

    /// Iterate over elements in `(row, column, channel)` order
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.data.iter_mut()
    }

    /// Number of scalar elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Elementwise `self += other * scale`; shapes must match
    pub fn scaled_add(&mut self, scale: f64, other: &Tensor) {
        self.data.scaled_add(scale, &other.data);
    }

    /// Multiply every element by `factor`
    pub fn scale(&mut self, factor: f64) {
        self.data.mapv_inplace(|v| v * factor);
    }

    /// Values of the `(0, 0, ·)` column, i.e. the channel vector at the origin
    ///
    /// For a network's 1×1×N output this is the action-value vector.
    pub fn channels_at_origin(&self) -> Vec<f64> {
        (0..self.depth()).map(|k| self.data[(0, 0, k)]).collect()
    }
}

impl Index<(usize, usize, usize)> for Tensor {
    type Output = f64;

    fn index(&self, index: (usize, usize, usize)) -> &f64 {
        &self.data[index]
    }
}

impl IndexMut<(usize, usize, usize)> for Tensor {
    fn index_mut(&mut self, index: (usize, usize, usize)) -> &mut f64 {
        &mut self.data[index]
    }
}

impl From<Array3<f64>> for Tensor {
    fn from(data: Array3<f64>) -> Self {
        Self::from_array(data)
    }
}
