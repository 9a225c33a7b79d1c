//! Index transform between filter tensors and their BCCB matrix form
//!
//! A filter tensor always uses the axis order
//! `(spatial1, spatial2, channel_in, channel_out)`, i.e. shape `(k1, k2, n, n)`.
//!
//! The matching block-circulant-with-circulant-blocks (BCCB) matrix has size
//! `k1*k2*n` square. Channels are the outermost block level: block
//! `(channel_in, channel_out)` is a `k1*k2` square matrix, which is itself
//! circulant over `k1` in blocks of `k2`, each of those blocks circulant over
//! `k2`. Inside a channel block, row `a*k2 + c` and column `b*k2 + d` hold the
//! filter tap at the cyclically wrapped offset `((a - b) mod k1, (c - d) mod k2)`.
//! This matches `T ⊗ Q` for a channel matrix `T` and a spatial matrix `Q`.

use std::collections::HashMap;
use std::sync::Arc;

use ndarray::{Array2, Array4, ArrayView2, ArrayView4};
use tracing::debug;

use crate::error::{OrthoConvError, Result};

/// Dimensions `(k1, k2, n)` of a filter and its BCCB matrix
///
/// Enough on its own to read a filter back out of a matrix; only
/// [`BccbLayout`] pays for the gather table the other direction needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BccbShape {
    k1: usize,
    k2: usize,
    n: usize,
}

impl BccbShape {
    pub fn new(k1: usize, k2: usize, n: usize) -> Result<Self> {
        for (name, value) in [("k1", k1), ("k2", k2), ("n", n)] {
            if value == 0 {
                return Err(OrthoConvError::invalid_parameter(
                    name.to_string(),
                    "must be at least 1".to_string(),
                ));
            }
        }
        Ok(BccbShape { k1, k2, n })
    }

    /// Filter shape `(k1, k2, n, n)`
    pub fn filter_shape(&self) -> (usize, usize, usize, usize) {
        (self.k1, self.k2, self.n, self.n)
    }

    /// Side length `k1*k2*n` of the BCCB matrix
    pub fn matrix_size(&self) -> usize {
        self.k1 * self.k2 * self.n
    }

    /// BCCB matrix → filter
    ///
    /// Every row of a circulant block is a cyclic shift of the others, so the
    /// first column of each channel block already carries the whole filter.
    pub fn backward<T: Copy>(&self, matrix: ArrayView2<T>) -> Result<Array4<T>> {
        let size = self.matrix_size();
        if matrix.dim() != (size, size) {
            return Err(OrthoConvError::dimension_mismatch(
                format!("{}x{} matrix", size, size),
                format!("{}x{}", matrix.nrows(), matrix.ncols()),
            ));
        }

        let spatial = self.k1 * self.k2;
        let k2 = self.k2;
        Ok(Array4::from_shape_fn(
            self.filter_shape(),
            |(a, c, n_in, n_out)| matrix[[n_in * spatial + a * k2 + c, n_out * spatial]],
        ))
    }
}

/// Precomputed gather table for one `(k1, k2, n)` triple
#[derive(Debug, Clone, PartialEq)]
pub struct BccbLayout {
    shape: BccbShape,
    /// For every matrix entry (row-major), the flat row-major filter index it copies
    gather: Vec<usize>,
}

impl BccbLayout {
    /// Build the layout for filters of shape `(k1, k2, n, n)`
    pub fn new(k1: usize, k2: usize, n: usize) -> Result<Self> {
        let shape = BccbShape::new(k1, k2, n)?;
        let size = shape.matrix_size();
        let mut gather = Vec::with_capacity(size * size);
        for n_in in 0..n {
            for a in 0..k1 {
                for c in 0..k2 {
                    for n_out in 0..n {
                        for b in 0..k1 {
                            for d in 0..k2 {
                                let p = (a + k1 - b) % k1;
                                let q = (c + k2 - d) % k2;
                                gather.push(((p * k2 + q) * n + n_in) * n + n_out);
                            }
                        }
                    }
                }
            }
        }

        Ok(BccbLayout { shape, gather })
    }

    pub fn shape(&self) -> BccbShape {
        self.shape
    }

    /// Filter shape `(k1, k2, n, n)` this layout handles
    pub fn filter_shape(&self) -> (usize, usize, usize, usize) {
        self.shape.filter_shape()
    }

    /// Side length `k1*k2*n` of the BCCB matrix
    pub fn matrix_size(&self) -> usize {
        self.shape.matrix_size()
    }

    /// Filter → BCCB matrix
    pub fn forward<T: Copy>(&self, filter: ArrayView4<T>) -> Result<Array2<T>> {
        if filter.dim() != self.filter_shape() {
            return Err(OrthoConvError::dimension_mismatch(
                format!("filter of shape {:?}", self.filter_shape()),
                format!("{:?}", filter.dim()),
            ));
        }

        let flat: Vec<T> = filter.iter().copied().collect();
        let size = self.matrix_size();
        let data = self.gather.iter().map(|&idx| flat[idx]).collect();
        Array2::from_shape_vec((size, size), data)
            .map_err(|e| OrthoConvError::NumericalError(e.to_string()))
    }

    /// BCCB matrix → filter, see [`BccbShape::backward`]
    pub fn backward<T: Copy>(&self, matrix: ArrayView2<T>) -> Result<Array4<T>> {
        self.shape.backward(matrix)
    }

    /// For each spatial position, the position holding its cyclic negation
    ///
    /// Entry `p*k2 + q` maps to `((-p) mod k1)*k2 + ((-q) mod k2)`. This is the
    /// first row of the single-channel BCCB matrix built from the position
    /// indices themselves, and it is an involution.
    pub fn mirror_indices(&self) -> Vec<usize> {
        // First row of the first channel block, one channel pair per tap.
        (0..self.shape.k1 * self.shape.k2)
            .map(|col| self.gather[col] / (self.shape.n * self.shape.n))
            .collect()
    }
}

/// Layouts keyed by `(k1, k2, n)`, built once and shared
#[derive(Debug, Default)]
pub struct LayoutCache {
    layouts: HashMap<(usize, usize, usize), Arc<BccbLayout>>,
}

impl LayoutCache {
    pub fn new() -> Self {
        LayoutCache::default()
    }

    /// Fetch the layout for `(k1, k2, n)`, building it on first use
    pub fn get(&mut self, k1: usize, k2: usize, n: usize) -> Result<Arc<BccbLayout>> {
        if let Some(layout) = self.layouts.get(&(k1, k2, n)) {
            return Ok(Arc::clone(layout));
        }

        let layout = Arc::new(BccbLayout::new(k1, k2, n)?);
        debug!(k1, k2, n, entries = layout.gather.len(), "built BCCB layout");
        self.layouts.insert((k1, k2, n), Arc::clone(&layout));
        Ok(layout)
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}
