//! # orthoconv - Orthogonal Filters and Fractional-Stride Convolution
//!
//! Numeric support routines for building convolutional networks:
//!
//! - **Pseudo-orthogonal initialization**: `(k1, k2, n, n)` filters whose
//!   block-circulant matrix is exactly orthogonal, built from the Cayley
//!   transform of a skew-symmetric circulant seed and a Haar-random channel
//!   rotation
//! - **Generalized convolution**: "SAME" convolutions whose strides may drop
//!   below one, realized as transposed convolutions for 1D, 2D and 3D inputs
//! - **Multi-dimensional counting**: odometer enumeration of index boxes
//!
//! All randomness flows through explicitly seeded generators, so the same
//! seed reproduces the same weights bit for bit.
//!
//! ## Quick Start
//!
//! ```rust
//! use orthoconv::layers::{convolution_same, InitializerExt, PseudoOrthogonalInit};
//! use ndarray::Array4;
//!
//! // 3x3 filter mixing 4 channels
//! let mut init = PseudoOrthogonalInit::new(Some(42));
//! let filter = init.initialize::<f32>(&[3, 3, 4, 4]).unwrap();
//!
//! // Upsample an 8x8 feature map to 16x16
//! let input = Array4::<f32>::ones((1, 8, 8, 4)).into_dyn();
//! let output = convolution_same(input.view(), filter.view(), &[3, 3, 4, 4], &[Some(0.5), Some(0.5)]).unwrap();
//! assert_eq!(output.shape(), &[1, 16, 16, 4]);
//! ```
//!
//! ## Module Organization
//!
//! - [`circulant`] - BCCB layouts, skew-circulant Cayley generator, Kronecker composition
//! - [`config`] - Serializable initializer and convolution settings
//! - [`counter`] - Multi-dimensional index enumeration
//! - [`error`] - Error types and result handling
//! - [`layers`] - Initializers, convolution backend and the strided convolution helper
//! - [`linalg`] - nalgebra-backed LU solve, Kronecker product, Haar-random orthogonal matrices

pub mod circulant;
pub mod config;
pub mod counter;
pub mod error;
pub mod layers;
pub mod linalg;

pub use error::{OrthoConvError, Result};

#[cfg(test)]
mod tests;
