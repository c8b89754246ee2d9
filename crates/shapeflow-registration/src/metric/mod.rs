//! Similarity losses.
//!
//! [`SimilarityConfig`] resolves a string key from a task file into a boxed
//! [`SimilarityLoss`]. Third-party losses implement the trait directly and are
//! handed to the model instead.

pub mod gaussian_kernel;
pub mod l2;
pub mod trait_;

use std::fmt;
use std::str::FromStr;

use burn::config::Config;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};

pub use gaussian_kernel::GaussianKernelDistance;
pub use l2::L2Distance;
pub use trait_::{FeatureAttr, PairFeatureExtractor, PointFeatureExtractor, SimilarityLoss};

/// Boxed similarity backend.
pub type BoxedSimilarity<B> = Box<dyn SimilarityLoss<B>>;

/// Built-in similarity backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SimilarityKind {
    #[default]
    L2,
    GaussianKernel,
}

impl FromStr for SimilarityKind {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "mse" | "l2_distance" => Ok(Self::L2),
            "gaussian" | "gaussian_kernel" | "mmd" => Ok(Self::GaussianKernel),
            other => Err(RegistrationError::invalid_configuration(format!(
                "unknown similarity loss '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SimilarityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::L2 => "l2",
            Self::GaussianKernel => "gaussian_kernel",
        })
    }
}

/// Similarity loss settings.
#[derive(Config, Debug, PartialEq)]
pub struct SimilarityConfig {
    #[config(default = "SimilarityKind::L2")]
    pub kind: SimilarityKind,
    #[config(default = "FeatureAttr::Points")]
    pub attr: FeatureAttr,
    /// Kernel width of the gaussian kernel loss.
    #[config(default = 0.1)]
    pub blur: f64,
}

impl SimilarityConfig {
    pub fn init<B: Backend>(&self) -> Result<BoxedSimilarity<B>> {
        let loss: BoxedSimilarity<B> = match self.kind {
            SimilarityKind::L2 => Box::new(L2Distance::new(self.attr)),
            SimilarityKind::GaussianKernel => Box::new(GaussianKernelDistance::new(self.blur, self.attr)?),
        };
        Ok(loss)
    }
}
