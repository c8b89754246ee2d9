//! Error types for registration operations.
//!
//! Geometry-level failures from `shapeflow-core` are wrapped unchanged, so a
//! shape mismatch raised by a kernel still names the kernel.

use shapeflow_core::CoreError;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Error raised by a shape, kernel or sampler.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error in similarity or regularization evaluation.
    #[error("Metric error: {0}")]
    MetricError(String),

    /// Error in optimizer operation.
    #[error("Optimizer error: {0}")]
    OptimizerError(String),

    /// Error in the ODE integrator.
    #[error("Integrator error: {0}")]
    IntegratorError(String),

    /// Numerical instability detected.
    #[error("Numerical instability in {component}: {message}")]
    NumericalInstability { component: String, message: String },

    /// Convergence failure.
    #[error("Convergence failure: {0}")]
    ConvergenceFailure(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Shape mismatch.
    #[error("Shape mismatch in {component}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        component: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Result type for registration operations.
pub type Result<T, E = RegistrationError> = std::result::Result<T, E>;

impl RegistrationError {
    /// Create a metric error.
    pub fn metric(msg: impl Into<String>) -> Self {
        Self::MetricError(msg.into())
    }

    /// Create an optimizer error.
    pub fn optimizer(msg: impl Into<String>) -> Self {
        Self::OptimizerError(msg.into())
    }

    /// Create an integrator error.
    pub fn integrator(msg: impl Into<String>) -> Self {
        Self::IntegratorError(msg.into())
    }

    /// Create a numerical instability error for `component`.
    pub fn numerical_instability(component: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::NumericalInstability {
            component: component.into(),
            message: msg.into(),
        }
    }

    /// Create a convergence failure error.
    pub fn convergence_failure(msg: impl Into<String>) -> Self {
        Self::ConvergenceFailure(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

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

    /// Whether the error reports a diverged (non-finite) computation.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            Self::NumericalInstability { .. } | Self::Core(CoreError::NumericalInstability(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RegistrationError::metric("test error");
        assert!(matches!(err, RegistrationError::MetricError(_)));
    }

    #[test]
    fn test_error_display() {
        let err = RegistrationError::metric("test error");
        assert_eq!(err.to_string(), "Metric error: test error");
    }

    #[test]
    fn test_shape_mismatch() {
        let err = RegistrationError::shape_mismatch("integrator", [1, 10, 3], [1, 5, 3]);
        let err_str = err.to_string();
        assert!(err_str.contains("integrator"));
        assert!(err_str.contains("expected"));
        assert!(err_str.contains("got"));
    }

    #[test]
    fn test_core_error_is_wrapped() {
        let err: RegistrationError = CoreError::invalid_shape("empty").into();
        assert!(matches!(err, RegistrationError::Core(CoreError::InvalidShape(_))));
        assert_eq!(err.to_string(), "Invalid shape: empty");
    }

    #[test]
    fn test_numerical_classification() {
        assert!(RegistrationError::numerical_instability("loss", "nan").is_numerical());
        assert!(!RegistrationError::optimizer("x").is_numerical());
    }
}
