//! Convolution primitives the strided helper dispatches to
//!
//! All tensors are channels-last: inputs are `[batch, spatial..., channels]`
//! and forward filters are `[spatial..., in_channels, out_channels]`.
//! Transposed filters swap the last two axes: `[spatial..., out_channels, in_channels]`,
//! where `in_channels` matches the channels of the tensor being upsampled.

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::counter::MultiDimCounter;
use crate::error::{OrthoConvError, Result};

/// Padding kind used in the convolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Padding {
    /// Output spatial size is `ceil(input / stride)`
    Same,
    /// No padding, the kernel only visits full windows
    Valid,
}

impl Padding {
    /// Output size and leading padding of a forward convolution along one axis
    pub fn forward_geometry(&self, input: usize, kernel: usize, stride: usize) -> Result<(usize, usize)> {
        if stride == 0 {
            return Err(OrthoConvError::invalid_parameter(
                "strides".to_string(),
                "strides must be at least 1".to_string(),
            ));
        }
        match self {
            Padding::Same => {
                let output = input.div_ceil(stride);
                let total = output
                    .saturating_sub(1)
                    .checked_mul(stride)
                    .and_then(|span| span.checked_add(kernel))
                    .ok_or_else(|| {
                        OrthoConvError::invalid_parameter(
                            "strides".to_string(),
                            format!("stride {} with kernel {} overflows the padded size", stride, kernel),
                        )
                    })?
                    .saturating_sub(input);
                Ok((output, total / 2))
            }
            Padding::Valid => {
                if input < kernel {
                    Ok((0, 0))
                } else {
                    Ok(((input - kernel) / stride + 1, 0))
                }
            }
        }
    }
}

/// The tensor runtime a convolution is delegated to
///
/// Strides are given per spatial dimension only.
pub trait ConvBackend {
    /// Forward convolution with 1, 2 or 3 spatial dimensions
    fn convolution(
        &self,
        input: ArrayViewD<f32>,
        filter: ArrayViewD<f32>,
        strides: &[usize],
        padding: Padding,
    ) -> Result<ArrayD<f32>>;

    /// Transposed 2D convolution producing a tensor of `output_shape`
    fn conv2d_transpose(
        &self,
        input: ArrayViewD<f32>,
        filter: ArrayViewD<f32>,
        output_shape: &[usize],
        strides: &[usize],
        padding: Padding,
    ) -> Result<ArrayD<f32>>;

    /// Transposed 3D convolution producing a tensor of `output_shape`
    fn conv3d_transpose(
        &self,
        input: ArrayViewD<f32>,
        filter: ArrayViewD<f32>,
        output_shape: &[usize],
        strides: &[usize],
        padding: Padding,
    ) -> Result<ArrayD<f32>>;
}

/// Direct loop implementation of [`ConvBackend`] on ndarray tensors
#[derive(Debug, Clone, Copy, Default)]
pub struct NdarrayBackend;

impl NdarrayBackend {
    pub fn new() -> Self {
        NdarrayBackend
    }
}

impl ConvBackend for NdarrayBackend {
    fn convolution(
        &self,
        input: ArrayViewD<f32>,
        filter: ArrayViewD<f32>,
        strides: &[usize],
        padding: Padding,
    ) -> Result<ArrayD<f32>> {
        let spatial = filter.ndim().saturating_sub(2);
        if !(1..=3).contains(&spatial) {
            return Err(OrthoConvError::UnsupportedRank { rank: filter.ndim() });
        }
        let geometry = Geometry::check(&input, &filter, strides)?;

        let in_channels = filter.shape()[spatial];
        let out_channels = filter.shape()[spatial + 1];
        if geometry.channels != in_channels {
            return Err(OrthoConvError::dimension_mismatch(
                format!("{} input channels", in_channels),
                format!("{}", geometry.channels),
            ));
        }

        let mut out_spatial = Vec::with_capacity(spatial);
        let mut pad = Vec::with_capacity(spatial);
        for d in 0..spatial {
            let (size, before) =
                padding.forward_geometry(geometry.spatial[d], geometry.kernel[d], strides[d])?;
            out_spatial.push(size);
            pad.push(before);
        }

        let mut out_shape = vec![geometry.batch];
        out_shape.extend_from_slice(&out_spatial);
        out_shape.push(out_channels);
        let mut output = ArrayD::<f32>::zeros(IxDyn(&out_shape));

        let mut in_idx = vec![0usize; spatial + 2];
        let mut out_idx = vec![0usize; spatial + 2];
        let mut f_idx = vec![0usize; spatial + 2];

        for b in 0..geometry.batch {
            in_idx[0] = b;
            out_idx[0] = b;
            for out_pos in MultiDimCounter::over_extents(&out_spatial) {
                out_idx[1..=spatial].copy_from_slice(&out_pos);
                for k_pos in MultiDimCounter::over_extents(&geometry.kernel) {
                    // Position in the unpadded input, skipped when it falls in the padding
                    let inside = (0..spatial).all(|d| {
                        let p = out_pos[d] * strides[d] + k_pos[d];
                        p >= pad[d] && p - pad[d] < geometry.spatial[d]
                    });
                    if !inside {
                        continue;
                    }
                    for d in 0..spatial {
                        in_idx[d + 1] = out_pos[d] * strides[d] + k_pos[d] - pad[d];
                    }
                    f_idx[..spatial].copy_from_slice(&k_pos);

                    for ci in 0..in_channels {
                        in_idx[spatial + 1] = ci;
                        f_idx[spatial] = ci;
                        let x = input[&in_idx[..]];
                        if x == 0.0 {
                            continue;
                        }
                        for co in 0..out_channels {
                            f_idx[spatial + 1] = co;
                            out_idx[spatial + 1] = co;
                            output[&out_idx[..]] += x * filter[&f_idx[..]];
                        }
                    }
                }
            }
        }

        Ok(output)
    }

    fn conv2d_transpose(
        &self,
        input: ArrayViewD<f32>,
        filter: ArrayViewD<f32>,
        output_shape: &[usize],
        strides: &[usize],
        padding: Padding,
    ) -> Result<ArrayD<f32>> {
        if filter.ndim() != 4 {
            return Err(OrthoConvError::dimension_mismatch(
                "rank 4 filter".to_string(),
                format!("rank {}", filter.ndim()),
            ));
        }
        conv_transpose(input, filter, output_shape, strides, padding)
    }

    fn conv3d_transpose(
        &self,
        input: ArrayViewD<f32>,
        filter: ArrayViewD<f32>,
        output_shape: &[usize],
        strides: &[usize],
        padding: Padding,
    ) -> Result<ArrayD<f32>> {
        if filter.ndim() != 5 {
            return Err(OrthoConvError::dimension_mismatch(
                "rank 5 filter".to_string(),
                format!("rank {}", filter.ndim()),
            ));
        }
        conv_transpose(input, filter, output_shape, strides, padding)
    }
}

/// Shapes shared by the forward and transposed loops
struct Geometry {
    batch: usize,
    spatial: Vec<usize>,
    channels: usize,
    kernel: Vec<usize>,
}

impl Geometry {
    fn check(input: &ArrayViewD<f32>, filter: &ArrayViewD<f32>, strides: &[usize]) -> Result<Self> {
        let spatial = filter.ndim() - 2;
        if input.ndim() != spatial + 2 {
            return Err(OrthoConvError::dimension_mismatch(
                format!("rank {} input for a rank {} filter", spatial + 2, filter.ndim()),
                format!("rank {}", input.ndim()),
            ));
        }
        if strides.len() != spatial {
            return Err(OrthoConvError::invalid_parameter(
                "strides".to_string(),
                format!("expected {} entries, got {}", spatial, strides.len()),
            ));
        }
        if strides.iter().any(|&s| s == 0) {
            return Err(OrthoConvError::invalid_parameter(
                "strides".to_string(),
                "strides must be at least 1".to_string(),
            ));
        }

        let shape = input.shape();
        Ok(Geometry {
            batch: shape[0],
            spatial: shape[1..=spatial].to_vec(),
            channels: shape[spatial + 1],
            kernel: filter.shape()[..spatial].to_vec(),
        })
    }
}

/// Adjoint of the forward convolution that maps `output_shape` onto `input`'s shape
fn conv_transpose(
    input: ArrayViewD<f32>,
    filter: ArrayViewD<f32>,
    output_shape: &[usize],
    strides: &[usize],
    padding: Padding,
) -> Result<ArrayD<f32>> {
    let spatial = filter.ndim() - 2;
    let geometry = Geometry::check(&input, &filter, strides)?;

    let out_channels = filter.shape()[spatial];
    let in_channels = filter.shape()[spatial + 1];
    if geometry.channels != in_channels {
        return Err(OrthoConvError::dimension_mismatch(
            format!("{} input channels", in_channels),
            format!("{}", geometry.channels),
        ));
    }
    if output_shape.len() != spatial + 2
        || output_shape[0] != geometry.batch
        || output_shape[spatial + 1] != out_channels
    {
        return Err(OrthoConvError::dimension_mismatch(
            format!(
                "output shape [{}, <{} spatial>, {}]",
                geometry.batch, spatial, out_channels
            ),
            format!("{:?}", output_shape),
        ));
    }

    // The forward convolution of `output_shape` must land exactly on the input
    let out_spatial = &output_shape[1..=spatial];
    let mut pad = Vec::with_capacity(spatial);
    for d in 0..spatial {
        let (size, before) =
            padding.forward_geometry(out_spatial[d], geometry.kernel[d], strides[d])?;
        if size != geometry.spatial[d] {
            return Err(OrthoConvError::dimension_mismatch(
                format!("input size {} along spatial axis {}", size, d),
                format!("{}", geometry.spatial[d]),
            ));
        }
        pad.push(before);
    }

    let mut output = ArrayD::<f32>::zeros(IxDyn(output_shape));

    let mut in_idx = vec![0usize; spatial + 2];
    let mut out_idx = vec![0usize; spatial + 2];
    let mut f_idx = vec![0usize; spatial + 2];

    for b in 0..geometry.batch {
        in_idx[0] = b;
        out_idx[0] = b;
        for in_pos in MultiDimCounter::over_extents(&geometry.spatial) {
            in_idx[1..=spatial].copy_from_slice(&in_pos);
            for k_pos in MultiDimCounter::over_extents(&geometry.kernel) {
                let inside = (0..spatial).all(|d| {
                    let p = in_pos[d] * strides[d] + k_pos[d];
                    p >= pad[d] && p - pad[d] < out_spatial[d]
                });
                if !inside {
                    continue;
                }
                for d in 0..spatial {
                    out_idx[d + 1] = in_pos[d] * strides[d] + k_pos[d] - pad[d];
                }
                f_idx[..spatial].copy_from_slice(&k_pos);

                for ci in 0..in_channels {
                    in_idx[spatial + 1] = ci;
                    f_idx[spatial + 1] = ci;
                    let x = input[&in_idx[..]];
                    if x == 0.0 {
                        continue;
                    }
                    for co in 0..out_channels {
                        f_idx[spatial] = co;
                        out_idx[spatial + 1] = co;
                        output[&out_idx[..]] += x * filter[&f_idx[..]];
                    }
                }
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, Array4, Array5};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    #[test]
    fn test_same_geometry() {
        assert_eq!(Padding::Same.forward_geometry(8, 3, 1).unwrap(), (8, 1));
        assert_eq!(Padding::Same.forward_geometry(8, 3, 2).unwrap(), (4, 0));
        assert_eq!(Padding::Same.forward_geometry(7, 3, 2).unwrap(), (4, 1));
        assert_eq!(Padding::Same.forward_geometry(16, 3, 2).unwrap(), (8, 0));
        assert_eq!(Padding::Valid.forward_geometry(8, 3, 1).unwrap(), (6, 0));
        assert_eq!(Padding::Valid.forward_geometry(2, 3, 1).unwrap(), (0, 0));
    }

    #[test]
    fn test_geometry_with_extreme_strides() {
        assert_eq!(Padding::Same.forward_geometry(8, 3, usize::MAX).unwrap(), (1, 0));
        assert_eq!(Padding::Same.forward_geometry(usize::MAX, 1, 2).unwrap().0, usize::MAX / 2 + 1);
        assert!(matches!(
            Padding::Same.forward_geometry(usize::MAX, 3, 2),
            Err(OrthoConvError::InvalidParameter { .. })
        ));
        assert!(Padding::Valid.forward_geometry(8, 3, 0).is_err());
    }

    #[test]
    fn test_identity_kernel() {
        // 1x1 identity filter leaves the input unchanged
        let input = Array4::random((2, 5, 5, 3), Uniform::new(-1.0f32, 1.0)).into_dyn();
        let mut filter = Array4::<f32>::zeros((1, 1, 3, 3));
        for c in 0..3 {
            filter[[0, 0, c, c]] = 1.0;
        }
        let out = NdarrayBackend
            .convolution(input.view(), filter.into_dyn().view(), &[1, 1], Padding::Same)
            .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_box_filter_values() {
        // 3x3 ones on a 3x3 ones image: corner 4, edge 6, center 9
        let input = Array::ones((1, 3, 3, 1)).into_dyn();
        let filter = Array::ones((3, 3, 1, 1)).into_dyn();
        let out = NdarrayBackend
            .convolution(input.view(), filter.view(), &[1, 1], Padding::Same)
            .unwrap();
        let expected = [4.0, 6.0, 4.0, 6.0, 9.0, 6.0, 4.0, 6.0, 4.0];
        assert_eq!(out.iter().copied().collect::<Vec<f32>>(), expected);

        let out = NdarrayBackend
            .convolution(input.view(), filter.view(), &[1, 1], Padding::Valid)
            .unwrap();
        assert_eq!(out.shape(), &[1, 1, 1, 1]);
        assert_eq!(out[[0, 0, 0, 0]], 9.0);
    }

    #[test]
    fn test_transpose_is_adjoint() {
        // <conv(x), y> == <x, conv_transpose(y)>
        let x = Array4::random((1, 7, 6, 2), Uniform::new(-1.0f32, 1.0)).into_dyn();
        let f = Array4::random((3, 2, 2, 3), Uniform::new(-1.0f32, 1.0)).into_dyn();
        let y_shape = [1, 4, 3, 3];
        let y = Array4::random((1, 4, 3, 3), Uniform::new(-1.0f32, 1.0)).into_dyn();

        let conv = NdarrayBackend
            .convolution(x.view(), f.view(), &[2, 2], Padding::Same)
            .unwrap();
        assert_eq!(conv.shape(), &y_shape);
        let back = NdarrayBackend
            .conv2d_transpose(y.view(), f.view(), x.shape(), &[2, 2], Padding::Same)
            .unwrap();

        let lhs: f32 = conv.iter().zip(y.iter()).map(|(a, b)| a * b).sum();
        let rhs: f32 = x.iter().zip(back.iter()).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs).abs() < 1e-3, "{} vs {}", lhs, rhs);
    }

    #[test]
    fn test_transpose_3d_is_adjoint() {
        let x = Array5::random((2, 5, 4, 3, 2), Uniform::new(-1.0f32, 1.0)).into_dyn();
        let f = Array5::random((3, 2, 2, 2, 3), Uniform::new(-1.0f32, 1.0)).into_dyn();
        let y = Array5::random((2, 3, 2, 2, 3), Uniform::new(-1.0f32, 1.0)).into_dyn();

        let conv = NdarrayBackend
            .convolution(x.view(), f.view(), &[2, 2, 2], Padding::Same)
            .unwrap();
        assert_eq!(conv.shape(), y.shape());
        let back = NdarrayBackend
            .conv3d_transpose(y.view(), f.view(), x.shape(), &[2, 2, 2], Padding::Same)
            .unwrap();
        assert_eq!(back.shape(), x.shape());

        let lhs: f32 = conv.iter().zip(y.iter()).map(|(a, b)| a * b).sum();
        let rhs: f32 = x.iter().zip(back.iter()).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs).abs() < 1e-3, "{} vs {}", lhs, rhs);
    }

    #[test]
    fn test_transpose_rejects_inconsistent_output_shape() {
        let y = Array4::<f32>::zeros((1, 4, 4, 2)).into_dyn();
        let f = Array4::<f32>::zeros((3, 3, 2, 2)).into_dyn();
        let result = NdarrayBackend.conv2d_transpose(y.view(), f.view(), &[1, 12, 8, 2], &[2, 2], Padding::Same);
        assert!(matches!(result, Err(OrthoConvError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_channel_mismatch() {
        let x = Array4::<f32>::zeros((1, 4, 4, 3)).into_dyn();
        let f = Array4::<f32>::zeros((3, 3, 2, 2)).into_dyn();
        assert!(NdarrayBackend
            .convolution(x.view(), f.view(), &[1, 1], Padding::Same)
            .is_err());
    }
}
