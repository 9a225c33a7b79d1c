use std::fmt;

/// Result type for orthoconv operations
pub type Result<T> = std::result::Result<T, OrthoConvError>;

/// Main error type for the orthoconv library
#[derive(Debug, Clone, PartialEq)]
pub enum OrthoConvError {
    /// Initializer asked for a shape the construction cannot represent
    UnsupportedShape {
        shape: Vec<usize>,
        reason: String,
    },

    /// Strides above and below one requested in the same convolution
    MixedStride {
        strides: Vec<Option<f64>>,
    },

    /// Convolution filter rank outside of {3, 4, 5}
    UnsupportedRank {
        rank: usize,
    },

    /// Invalid dimensions for operations
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid parameter value
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Numerical computation errors
    NumericalError(String),

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),
}

impl fmt::Display for OrthoConvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrthoConvError::UnsupportedShape { shape, reason } => {
                write!(f, "Unsupported shape {:?}: {}", shape, reason)
            }
            OrthoConvError::MixedStride { strides } => {
                write!(
                    f,
                    "Mixes of strides above and below 1 for one convolution are not supported: {:?}",
                    strides
                )
            }
            OrthoConvError::UnsupportedRank { rank } => {
                write!(
                    f,
                    "Convolution is not implemented for a rank {} filter ({} spatial dimensions)",
                    rank,
                    rank.saturating_sub(2)
                )
            }
            OrthoConvError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            OrthoConvError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            OrthoConvError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
            OrthoConvError::IoError(msg) => write!(f, "IO error: {}", msg),
            OrthoConvError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for OrthoConvError {}

// Conversion from std::io::Error
impl From<std::io::Error> for OrthoConvError {
    fn from(err: std::io::Error) -> Self {
        OrthoConvError::IoError(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for OrthoConvError {
    fn from(err: serde_json::Error) -> Self {
        OrthoConvError::SerializationError(err.to_string())
    }
}

// Helper functions for common error patterns
impl OrthoConvError {
    pub fn unsupported_shape<S: Into<String>>(shape: &[usize], reason: S) -> Self {
        OrthoConvError::UnsupportedShape {
            shape: shape.to_vec(),
            reason: reason.into(),
        }
    }

    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        OrthoConvError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        OrthoConvError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
