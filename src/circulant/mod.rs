//! Block-circulant orthogonal matrices
//!
//! - [`index`] - filter tensor ↔ BCCB matrix layouts
//! - [`skew`] - Cayley transform of skew-symmetric circulant seeds
//! - [`kronecker`] - channel mixing with a Haar-random orthogonal matrix

pub mod index;
pub mod kronecker;
pub mod skew;

pub use index::{BccbLayout, BccbShape, LayoutCache};
pub use kronecker::KroneckerComposer;
pub use skew::{cayley, SkewCirculantGenerator};
