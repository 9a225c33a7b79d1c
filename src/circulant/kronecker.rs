//! Channel mixing of orthogonal BCCB matrices

use ndarray::Array2;
use rand::Rng;
use tracing::debug;

use super::index::LayoutCache;
use super::skew::SkewCirculantGenerator;
use crate::error::{OrthoConvError, Result};
use crate::linalg;

/// Builds the full `k1*k2*n` square orthogonal BCCB weight matrix
///
/// The result is `T ⊗ Q` where `T` is a Haar-random `n x n` orthogonal
/// matrix and `Q` comes from [`SkewCirculantGenerator`]. The Kronecker
/// product of two orthogonal matrices is orthogonal.
#[derive(Debug, Clone)]
pub struct KroneckerComposer {
    generator: SkewCirculantGenerator,
    channels: usize,
}

impl KroneckerComposer {
    pub fn new(channels: usize, k1: usize, k2: usize) -> Result<Self> {
        Self::build(channels, SkewCirculantGenerator::new(k1, k2)?)
    }

    pub fn from_cache(cache: &mut LayoutCache, channels: usize, k1: usize, k2: usize) -> Result<Self> {
        Self::build(channels, SkewCirculantGenerator::from_cache(cache, k1, k2)?)
    }

    fn build(channels: usize, generator: SkewCirculantGenerator) -> Result<Self> {
        if channels == 0 {
            return Err(OrthoConvError::invalid_parameter(
                "channels".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        Ok(KroneckerComposer { generator, channels })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Draw a fresh weight matrix `W`
    pub fn compose<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Array2<f64>> {
        let q = self.generator.generate(rng)?;
        if self.channels == 1 {
            return Ok(q);
        }

        let t = linalg::haar_orthogonal(self.channels, rng)?;
        debug!(
            channels = self.channels,
            spatial = self.generator.size(),
            "composed BCCB weight matrix"
        );
        Ok(linalg::kron(t.view(), q.view()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_composed_matrix_is_orthogonal() {
        let mut rng = StdRng::seed_from_u64(1);
        for n in [1, 2, 4] {
            let composer = KroneckerComposer::new(n, 3, 3).unwrap();
            let w = composer.compose(&mut rng).unwrap();
            assert_eq!(w.dim(), (9 * n, 9 * n));
            assert!(linalg::orthogonality_residual(w.view()) < 1e-4);
        }
    }

    #[test]
    fn test_single_channel_is_plain_q() {
        let composer = KroneckerComposer::new(1, 3, 3).unwrap();
        let generator = SkewCirculantGenerator::new(3, 3).unwrap();
        let w = composer.compose(&mut StdRng::seed_from_u64(8)).unwrap();
        let q = generator.generate(&mut StdRng::seed_from_u64(8)).unwrap();
        assert_eq!(w, q);
    }

    #[test]
    fn test_zero_channels_rejected() {
        assert!(KroneckerComposer::new(0, 3, 3).is_err());
    }
}
