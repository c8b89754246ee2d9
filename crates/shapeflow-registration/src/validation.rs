//! Validation utilities for registration operations.
//!
//! Configuration checks run when a solver or model is built; tensor checks
//! run inside the optimization loop so that a diverged run stops before its
//! corrupted state reaches the caller.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use shapeflow_core::geometry::all_finite;

use crate::error::{RegistrationError, Result};

/// Fail with `NumericalInstability` if `tensor` holds a NaN or infinity.
pub fn ensure_finite<B: Backend, const D: usize>(component: &str, tensor: &Tensor<B, D>) -> Result<()> {
    if all_finite(tensor) {
        Ok(())
    } else {
        Err(RegistrationError::numerical_instability(
            component,
            format!("non-finite values in tensor of shape {:?}", tensor.dims()),
        ))
    }
}

/// Fail with `NumericalInstability` if a scalar loss is not finite.
pub fn ensure_finite_scalar(component: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(RegistrationError::numerical_instability(
            component,
            format!("value is {}", value),
        ))
    }
}

/// Validate learning rate.
pub fn validate_learning_rate(lr: f64) -> Result<()> {
    if !(lr > 0.0) {
        return Err(RegistrationError::invalid_configuration(format!(
            "Learning rate must be positive, got {}",
            lr
        )));
    }

    if lr > 10.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Learning rate too large: {}",
            lr
        )));
    }

    if lr < 1e-10 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Learning rate too small: {}",
            lr
        )));
    }

    Ok(())
}

/// Validate iteration count.
pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations == 0 {
        return Err(RegistrationError::invalid_configuration(
            "Iterations must be positive",
        ));
    }

    if iterations > 1_000_000 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Iterations too large: {}",
            iterations
        )));
    }

    Ok(())
}

/// Validate L-BFGS history size.
pub fn validate_lbfgs_history_size(history_size: usize) -> Result<()> {
    if history_size < 1 {
        return Err(RegistrationError::invalid_configuration(
            "L-BFGS history size must be at least 1",
        ));
    }

    if history_size > 100 {
        return Err(RegistrationError::invalid_configuration(format!(
            "L-BFGS history size too large: {}",
            history_size
        )));
    }

    Ok(())
}

/// Check that a per-scale schedule has one entry per scale.
pub fn validate_schedule_length(name: &str, len: usize, num_scales: usize) -> Result<()> {
    if len != num_scales {
        return Err(RegistrationError::invalid_configuration(format!(
            "{} has {} entries for {} scales",
            name, len, num_scales
        )));
    }
    Ok(())
}

/// Relative function tolerance test between consecutive losses.
///
/// Converged when `|f_prev - f| <= ftol * max(|f_prev|, |f|)`. The test stays
/// relative for small losses; two equal losses, zero included, always count
/// as converged.
pub fn rel_ftol_converged(previous: f64, current: f64, ftol: f64) -> bool {
    let diff = (previous - current).abs();
    diff == 0.0 || diff <= ftol * previous.abs().max(current.abs())
}
