//! Error types for shape and kernel operations.
//!
//! Errors name the component that raised them (kernel, shape, sampler, ...)
//! together with the offending tensor dimensions so that failures deep in a
//! registration run can be traced back to their origin.

use thiserror::Error;

/// Main error type for geometry operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Two tensors that must agree on batch, point count or dimension do not.
    #[error("Shape mismatch in {component}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        component: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A tensor does not have the layout a shape requires.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Numerical instability detected.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// Host-side tensor data could not be read or converted.
    #[error("Data error: {0}")]
    Data(String),
}

/// Result type for geometry operations.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

impl CoreError {
    /// Create a shape mismatch error for `component`.
    pub fn shape_mismatch(
        component: impl Into<String>,
        expected: impl Into<Vec<usize>>,
        actual: impl Into<Vec<usize>>,
    ) -> Self {
        Self::ShapeMismatch {
            component: component.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an invalid shape error.
    pub fn invalid_shape(msg: impl Into<String>) -> Self {
        Self::InvalidShape(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a numerical instability error.
    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }
}
