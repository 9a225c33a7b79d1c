//! Serializable configuration for initializers and the strided convolution
//!
//! ```
//! use orthoconv::config::InitConfig;
//! use orthoconv::layers::InitializerExt;
//!
//! let config = InitConfig::from_json(r#"{ "seed": 7, "scheme": "PseudoOrthogonal" }"#).unwrap();
//! let mut init = config.build();
//! let filter = init.initialize::<f32>(&[3, 3, 2, 2]).unwrap();
//! assert_eq!(filter.shape(), &[3, 3, 2, 2]);
//! ```

use std::fs;
use std::path::Path;

use ndarray::{ArrayD, ArrayViewD};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layers::conv::convolution_same;
use crate::layers::initialization::{Initializer, PseudoOrthogonalInit, SeededInit, WeightInit};

/// Which initializer to build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InitScheme {
    /// Block-circulant pseudo-orthogonal filters
    PseudoOrthogonal,
    /// Any element-wise scheme
    Random(WeightInit),
}

/// Initializer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitConfig {
    /// Fixed seed for reproducible weights; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
    pub scheme: InitScheme,
}

impl InitConfig {
    pub fn pseudo_orthogonal(seed: Option<u64>) -> Self {
        InitConfig {
            seed,
            scheme: InitScheme::PseudoOrthogonal,
        }
    }

    pub fn random(scheme: WeightInit, seed: Option<u64>) -> Self {
        InitConfig {
            seed,
            scheme: InitScheme::Random(scheme),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Instantiate the configured initializer
    pub fn build(&self) -> Box<dyn Initializer> {
        match &self.scheme {
            InitScheme::PseudoOrthogonal => Box::new(PseudoOrthogonalInit::new(self.seed)),
            InitScheme::Random(scheme) => Box::new(SeededInit::new(scheme.clone(), self.seed)),
        }
    }
}

/// Strides for [`convolution_same`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvConfig {
    /// One entry per spatial dimension; `null` leaves that dimension at one
    #[serde(default)]
    pub strides: Vec<Option<f64>>,
}

impl ConvConfig {
    pub fn new(strides: Vec<Option<f64>>) -> Self {
        ConvConfig { strides }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Convolve with the configured strides on the ndarray backend
    pub fn apply(&self, input: ArrayViewD<f32>, filter: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let filter_shape = filter.shape().to_vec();
        convolution_same(input, filter, &filter_shape, &self.strides)
    }
}
