//! Weight initializers for convolution filters
//!
//! Two families live here:
//!
//! - [`WeightInit`] - element-wise random schemes (Xavier, He, modified Xavier, ...)
//! - [`PseudoOrthogonalInit`] - block-circulant filters that are orthogonal as
//!   a linear operator under circular convolution
//!
//! Both are driven by an explicit seeded generator and exposed through the
//! [`Initializer`] trait, so the same seed always reproduces the same weights.

use ndarray::{Array2, Array4, ArrayD, IxDyn};
use ndarray_rand::rand_distr::{Normal, Uniform};
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::circulant::{BccbShape, KroneckerComposer, LayoutCache};
use crate::error::{OrthoConvError, Result};

/// Scalar types an initializer can emit
pub trait Element: Copy + 'static {
    fn from_f64(value: f64) -> Self;
}

impl Element for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Element for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// Provider of initial parameter values for a requested shape
pub trait Initializer {
    /// Produce a fresh tensor of the given shape in double precision
    fn sample(&mut self, shape: &[usize]) -> Result<ArrayD<f64>>;
}

/// Typed access to any [`Initializer`], including trait objects
pub trait InitializerExt: Initializer {
    /// Produce a fresh tensor of the given shape, cast to `T`
    fn initialize<T: Element>(&mut self, shape: &[usize]) -> Result<ArrayD<T>> {
        Ok(self.sample(shape)?.mapv(T::from_f64))
    }
}

impl<I: Initializer + ?Sized> InitializerExt for I {}

impl<I: Initializer + ?Sized> Initializer for Box<I> {
    fn sample(&mut self, shape: &[usize]) -> Result<ArrayD<f64>> {
        (**self).sample(shape)
    }
}

pub(crate) fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Weight initialization strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WeightInit {
    /// Xavier/Glorot uniform initialization
    XavierUniform,

    /// Xavier/Glorot normal initialization
    XavierNormal,

    /// He/Kaiming uniform initialization (for ReLU)
    HeUniform,

    /// He/Kaiming normal initialization (for ReLU)
    HeNormal,

    /// Glorot variant scaled by a caller-supplied element count
    ///
    /// Uniform: `U(-sqrt(3/num_elements), sqrt(3/num_elements))`.
    /// Normal: `N(0, 1.3/num_elements)` truncated at two standard deviations.
    ModifiedXavier { num_elements: usize, uniform: bool },

    /// Uniform distribution with custom range
    Uniform { min: f64, max: f64 },

    /// Normal distribution with custom mean and std
    Normal { mean: f64, std: f64 },

    /// All zeros
    Zeros,

    /// All ones
    Ones,
}

/// Fan-in and fan-out of a weight tensor
///
/// Matrices are `(fan_in, fan_out)`; convolution filters are
/// `(spatial..., in, out)` with the receptive field folded into both fans.
pub fn compute_fans(shape: &[usize]) -> (usize, usize) {
    match shape.len() {
        0 => (1, 1),
        1 => (shape[0], shape[0]),
        2 => (shape[0], shape[1]),
        rank => {
            let receptive: usize = shape[..rank - 2].iter().product();
            (receptive * shape[rank - 2], receptive * shape[rank - 1])
        }
    }
}

impl WeightInit {
    /// Initialize weights of any rank
    pub fn initialize_weights<R: Rng + ?Sized>(
        &self,
        shape: &[usize],
        rng: &mut R,
    ) -> Result<ArrayD<f64>> {
        let (fan_in, fan_out) = compute_fans(shape);
        let dim = IxDyn(shape);

        match self {
            WeightInit::XavierUniform => {
                let limit = (6.0 / positive_fan(fan_in + fan_out)?).sqrt();
                Ok(ArrayD::random_using(dim, Uniform::new(-limit, limit), rng))
            }

            WeightInit::XavierNormal => {
                let std = (2.0 / positive_fan(fan_in + fan_out)?).sqrt();
                Ok(ArrayD::random_using(dim, normal(0.0, std)?, rng))
            }

            WeightInit::HeUniform => {
                let limit = (6.0 / positive_fan(fan_in)?).sqrt();
                Ok(ArrayD::random_using(dim, Uniform::new(-limit, limit), rng))
            }

            WeightInit::HeNormal => {
                let std = (2.0 / positive_fan(fan_in)?).sqrt();
                Ok(ArrayD::random_using(dim, normal(0.0, std)?, rng))
            }

            WeightInit::ModifiedXavier { num_elements, uniform: true } => {
                let limit = (3.0 / positive_fan(*num_elements)?).sqrt();
                Ok(ArrayD::random_using(dim, Uniform::new(-limit, limit), rng))
            }

            WeightInit::ModifiedXavier { num_elements, uniform: false } => {
                let std = (1.3 / positive_fan(*num_elements)?).sqrt();
                truncated_normal(dim, 0.0, std, rng)
            }

            WeightInit::Uniform { min, max } => {
                if !(min < max) {
                    return Err(OrthoConvError::invalid_parameter(
                        "Uniform".to_string(),
                        format!("min {} must be below max {}", min, max),
                    ));
                }
                if !(max - min).is_finite() {
                    return Err(OrthoConvError::invalid_parameter(
                        "Uniform".to_string(),
                        format!("range [{}, {}) is not finite", min, max),
                    ));
                }
                Ok(ArrayD::random_using(dim, Uniform::new(*min, *max), rng))
            }

            WeightInit::Normal { mean, std } => {
                Ok(ArrayD::random_using(dim, normal(*mean, *std)?, rng))
            }

            WeightInit::Zeros => Ok(ArrayD::zeros(dim)),

            WeightInit::Ones => Ok(ArrayD::ones(dim)),
        }
    }
}

fn positive_fan(fan: usize) -> Result<f64> {
    if fan == 0 {
        return Err(OrthoConvError::invalid_parameter(
            "fan".to_string(),
            "cannot scale by an empty fan".to_string(),
        ));
    }
    Ok(fan as f64)
}

fn normal(mean: f64, std: f64) -> Result<Normal<f64>> {
    Normal::new(mean, std)
        .map_err(|e| OrthoConvError::invalid_parameter("Normal".to_string(), e.to_string()))
}

/// Normal samples redrawn until they fall within two standard deviations
fn truncated_normal<R: Rng + ?Sized>(
    dim: IxDyn,
    mean: f64,
    std: f64,
    rng: &mut R,
) -> Result<ArrayD<f64>> {
    let dist = normal(mean, std)?;
    let bound = 2.0 * std;
    Ok(ArrayD::from_shape_simple_fn(dim, || loop {
        let x: f64 = dist.sample(&mut *rng);
        if (x - mean).abs() <= bound {
            break x;
        }
    }))
}

/// A [`WeightInit`] scheme bound to its own generator
#[derive(Debug, Clone)]
pub struct SeededInit {
    scheme: WeightInit,
    rng: StdRng,
}

impl SeededInit {
    pub fn new(scheme: WeightInit, seed: Option<u64>) -> Self {
        SeededInit {
            scheme,
            rng: rng_from_seed(seed),
        }
    }

    pub fn scheme(&self) -> &WeightInit {
        &self.scheme
    }
}

impl Initializer for SeededInit {
    fn sample(&mut self, shape: &[usize]) -> Result<ArrayD<f64>> {
        self.scheme.initialize_weights(shape, &mut self.rng)
    }
}

/// Pseudo-orthogonal block-circulant filter initialization
///
/// Produces `(k1, k2, n, n)` filters whose BCCB matrix is `T ⊗ Q`, an exactly
/// orthogonal matrix. The convolution is only an orthogonal operator when it
/// is circular and the signal has the same spatial size as the filter; on
/// larger signals or with zero padding it is only approximately orthogonal.
/// Meeting that condition is up to the caller.
#[derive(Debug)]
pub struct PseudoOrthogonalInit {
    rng: StdRng,
    cache: LayoutCache,
}

impl PseudoOrthogonalInit {
    /// Create an initializer, seeded for reproducibility or from entropy
    pub fn new(seed: Option<u64>) -> Self {
        Self::with_rng(rng_from_seed(seed))
    }

    pub fn with_rng(rng: StdRng) -> Self {
        PseudoOrthogonalInit {
            rng,
            cache: LayoutCache::new(),
        }
    }

    /// Check that `shape` is a square-channel 2D convolution filter
    pub fn validate_shape(shape: &[usize]) -> Result<(usize, usize, usize)> {
        if shape.len() != 4 {
            return Err(OrthoConvError::unsupported_shape(
                shape,
                format!(
                    "only 2d convolution filters of rank 4 are supported, got rank {}",
                    shape.len()
                ),
            ));
        }
        if shape[2] != shape[3] {
            return Err(OrthoConvError::unsupported_shape(
                shape,
                format!(
                    "in channels ({}) must equal out channels ({})",
                    shape[2], shape[3]
                ),
            ));
        }
        if shape.iter().any(|&d| d == 0) {
            return Err(OrthoConvError::unsupported_shape(shape, "empty dimension"));
        }
        Ok((shape[0], shape[1], shape[2]))
    }

    /// Draw a filter together with its BCCB matrix
    pub fn sample_with_matrix(&mut self, shape: &[usize]) -> Result<(Array4<f64>, Array2<f64>)> {
        let (k1, k2, n) = Self::validate_shape(shape)?;
        debug!(k1, k2, n, "pseudo-orthogonal filter requested");

        let composer = KroneckerComposer::from_cache(&mut self.cache, n, k1, k2)?;
        let matrix = composer.compose(&mut self.rng)?;
        let filter = BccbShape::new(k1, k2, n)?.backward(matrix.view())?;
        Ok((filter, matrix))
    }

    /// Draw only the BCCB matrix a filter of `shape` would be built from
    pub fn bccb_matrix(&mut self, shape: &[usize]) -> Result<Array2<f64>> {
        Ok(self.sample_with_matrix(shape)?.1)
    }
}

impl Initializer for PseudoOrthogonalInit {
    fn sample(&mut self, shape: &[usize]) -> Result<ArrayD<f64>> {
        Ok(self.sample_with_matrix(shape)?.0.into_dyn())
    }
}
