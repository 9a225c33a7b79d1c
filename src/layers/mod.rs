pub mod backend;
pub mod conv;
pub mod initialization;

pub use backend::{ConvBackend, NdarrayBackend, Padding};
pub use conv::{convolution_same, resolve_strides, ConvKind, GeneralizedConvolution, StridePlan};
pub use initialization::{
    compute_fans, Element, Initializer, InitializerExt, PseudoOrthogonalInit, SeededInit, WeightInit,
};
