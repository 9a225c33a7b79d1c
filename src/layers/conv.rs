//! Convolution with fractional strides
//!
//! Strides of one or more run a regular "SAME" convolution. Strides below
//! one are upsampling factors: `0.5` doubles the spatial size. Those are
//! realized with a transposed convolution, which swaps the in/out channel
//! roles of the filter.
//!
//! ```
//! use ndarray::Array4;
//! use orthoconv::layers::conv::GeneralizedConvolution;
//!
//! let input = Array4::<f32>::ones((1, 8, 8, 4)).into_dyn();
//! let filter = Array4::<f32>::ones((3, 3, 4, 4)).into_dyn();
//!
//! let conv: GeneralizedConvolution = GeneralizedConvolution::default();
//! let output = conv
//!     .apply(input.view(), filter.view(), &[3, 3, 4, 4], &[Some(0.5), Some(0.5)])
//!     .unwrap();
//! assert_eq!(output.shape(), &[1, 16, 16, 4]);
//! ```

use ndarray::{ArrayD, ArrayViewD, Axis, Dimension, IxDyn};
use tracing::debug;

use super::backend::{ConvBackend, NdarrayBackend, Padding};
use crate::error::{OrthoConvError, Result};

/// Spatial arrangement of a convolution, resolved from the filter rank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvKind {
    /// Rank 3 filter `[w, in, out]`
    OneD,
    /// Rank 4 filter `[h, w, in, out]`
    TwoD,
    /// Rank 5 filter `[d, h, w, in, out]`
    ThreeD,
}

impl ConvKind {
    pub fn from_filter_rank(rank: usize) -> Result<Self> {
        match rank {
            3 => Ok(ConvKind::OneD),
            4 => Ok(ConvKind::TwoD),
            5 => Ok(ConvKind::ThreeD),
            _ => Err(OrthoConvError::UnsupportedRank { rank }),
        }
    }

    pub fn spatial_dims(&self) -> usize {
        match self {
            ConvKind::OneD => 1,
            ConvKind::TwoD => 2,
            ConvKind::ThreeD => 3,
        }
    }
}

/// Integer strides a convolution call resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StridePlan {
    /// Regular convolution stepping by these factors
    Downsample(Vec<usize>),
    /// Transposed convolution growing each axis by these factors
    Upsample(Vec<usize>),
}

/// Turn per-dimension strides into a [`StridePlan`]
///
/// `None` means "no override" and counts as one. An empty list is unit
/// stride everywhere. Strides above and below one cannot be mixed; a stride
/// of exactly one is compatible with both.
pub fn resolve_strides(strides: &[Option<f64>], spatial_dims: usize) -> Result<StridePlan> {
    if !strides.is_empty() && strides.len() != spatial_dims {
        return Err(OrthoConvError::invalid_parameter(
            "strides".to_string(),
            format!("expected {} entries, got {}", spatial_dims, strides.len()),
        ));
    }
    for s in strides.iter().flatten() {
        if !s.is_finite() || *s <= 0.0 {
            return Err(OrthoConvError::invalid_parameter(
                "strides".to_string(),
                format!("stride {} is not a positive number", s),
            ));
        }
    }

    let given: Vec<f64> = strides.iter().flatten().copied().collect();
    let upsampling = given.iter().any(|&s| s < 1.0);

    if !upsampling {
        let mut factors = vec![1; spatial_dims];
        for (factor, s) in factors.iter_mut().zip(strides) {
            if let Some(s) = s {
                if s.fract() != 0.0 {
                    return Err(OrthoConvError::invalid_parameter(
                        "strides".to_string(),
                        format!("downsampling stride {} is not an integer", s),
                    ));
                }
                *factor = to_index(*s)?;
            }
        }
        return Ok(StridePlan::Downsample(factors));
    }

    if given.iter().any(|&s| s > 1.0) {
        return Err(OrthoConvError::MixedStride {
            strides: strides.to_vec(),
        });
    }

    let factors = strides
        .iter()
        .map(|s| match s {
            Some(s) => to_index((1.0 / s).round()),
            None => Ok(1),
        })
        .collect::<Result<Vec<usize>>>()?;
    Ok(StridePlan::Upsample(factors))
}

/// Convert a non-negative whole number to `usize`, rejecting values that would saturate
fn to_index(value: f64) -> Result<usize> {
    if value >= usize::MAX as f64 {
        return Err(OrthoConvError::invalid_parameter(
            "strides".to_string(),
            format!("{} does not fit in an index", value),
        ));
    }
    Ok(value as usize)
}

/// Convolution helper that accepts strides below one
#[derive(Debug, Clone, Default)]
pub struct GeneralizedConvolution<B = NdarrayBackend> {
    backend: B,
}

impl<B: ConvBackend> GeneralizedConvolution<B> {
    pub fn new(backend: B) -> Self {
        GeneralizedConvolution { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Convolve `input` with `filter` using "SAME" padding
    ///
    /// `filter_shape` is the declared filter shape and must agree with
    /// `filter`. `strides` holds one entry per spatial dimension, or none.
    pub fn apply(
        &self,
        input: ArrayViewD<f32>,
        filter: ArrayViewD<f32>,
        filter_shape: &[usize],
        strides: &[Option<f64>],
    ) -> Result<ArrayD<f32>> {
        let kind = ConvKind::from_filter_rank(filter_shape.len())?;
        if filter.shape() != filter_shape {
            return Err(OrthoConvError::dimension_mismatch(
                format!("filter of shape {:?}", filter_shape),
                format!("{:?}", filter.shape()),
            ));
        }
        let spatial = kind.spatial_dims();
        if input.ndim() != spatial + 2 {
            return Err(OrthoConvError::dimension_mismatch(
                format!("rank {} input", spatial + 2),
                format!("rank {}", input.ndim()),
            ));
        }

        let factors = match resolve_strides(strides, spatial)? {
            StridePlan::Downsample(factors) => {
                debug!(?kind, ?factors, "strided convolution");
                return self.backend.convolution(input, filter, &factors, Padding::Same);
            }
            StridePlan::Upsample(factors) => factors,
        };

        let mut output_shape = Vec::with_capacity(spatial + 2);
        output_shape.push(input.shape()[0]);
        for (d, &size) in input.shape()[1..=spatial].iter().enumerate() {
            let grown = match strides.get(d).copied().flatten() {
                Some(s) => to_index((size as f64 / s).round())?,
                None => size,
            };
            output_shape.push(grown);
        }
        output_shape.push(filter_shape[filter_shape.len() - 1]);
        let allocatable = IxDyn(&output_shape)
            .size_checked()
            .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
            .map_or(false, |bytes| bytes <= isize::MAX as usize);
        if !allocatable {
            return Err(OrthoConvError::invalid_parameter(
                "strides".to_string(),
                format!("upsampled shape {:?} is too large", output_shape),
            ));
        }
        debug!(?kind, ?factors, ?output_shape, "transposed convolution");

        // Swap in/out channels into the transposed filter layout
        let mut filter = filter;
        filter.swap_axes(spatial, spatial + 1);

        match kind {
            ConvKind::OneD => {
                let input = input.insert_axis(Axis(1));
                let filter = filter.insert_axis(Axis(0));
                let mut lifted_shape = output_shape.clone();
                lifted_shape.insert(1, 1);
                let lifted = self.backend.conv2d_transpose(
                    input,
                    filter,
                    &lifted_shape,
                    &[1, factors[0]],
                    Padding::Same,
                )?;
                Ok(lifted.index_axis_move(Axis(1), 0))
            }
            ConvKind::TwoD => {
                self.backend
                    .conv2d_transpose(input, filter, &output_shape, &factors, Padding::Same)
            }
            ConvKind::ThreeD => {
                self.backend
                    .conv3d_transpose(input, filter, &output_shape, &factors, Padding::Same)
            }
        }
    }
}

/// [`GeneralizedConvolution::apply`] on the default ndarray backend
pub fn convolution_same(
    input: ArrayViewD<f32>,
    filter: ArrayViewD<f32>,
    filter_shape: &[usize],
    strides: &[Option<f64>],
) -> Result<ArrayD<f32>> {
    GeneralizedConvolution::new(NdarrayBackend).apply(input, filter, filter_shape, strides)
}
