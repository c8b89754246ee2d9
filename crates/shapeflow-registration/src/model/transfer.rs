//! Momentum transfer between scales.
//!
//! The momentum of a coarse solution is interpolated onto the control points
//! of the next scale and rescaled so that the total momentum magnitude
//! survives the change of resolution.

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use shapeflow_core::geometry::max_abs_diff;
use shapeflow_core::kernel::{GaussianKernelConfig, InterpolatorKernel};
use shapeflow_core::{GaussianKernel, KernelInterpolator, KernelInterpolatorConfig};

use crate::error::{RegistrationError, Result};

/// How the per-point rescaling of the upsampled momentum is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleRatio {
    /// Solve the kernel-weighted consistency between both point sets.
    #[default]
    KernelConsistency,
    /// `N_low / N_high` for every point.
    PointCount,
}

/// Settings of the momentum transfer.
#[derive(Config, Debug, PartialEq)]
pub struct MomentumTransferConfig {
    #[config(default = "ScaleRatio::KernelConsistency")]
    pub ratio: ScaleRatio,
    /// Interpolation kernel. The LDDMM kernel, un-normalised, when unset.
    pub interpolator: Option<KernelInterpolatorConfig>,
    /// Control point sets closer than this (max coordinate difference) are
    /// treated as the same support and keep their momentum.
    #[config(default = 1e-5)]
    pub same_support_tol: f64,
}

impl MomentumTransferConfig {
    /// # Errors
    /// Returns `InvalidConfiguration` for a negative `same_support_tol`.
    pub fn init<B: Backend>(&self, lddmm_kernel: &GaussianKernel) -> Result<MomentumTransfer<B>> {
        if !(self.same_support_tol >= 0.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "same_support_tol must be non-negative, got {}",
                self.same_support_tol
            )));
        }
        let interpolator = match &self.interpolator {
            Some(config) => config.init()?,
            None => KernelInterpolatorConfig::new()
                .with_kernel(InterpolatorKernel::Gaussian(
                    GaussianKernelConfig::new()
                        .with_sigmas(lddmm_kernel.sigmas().to_vec())
                        .with_weights(Some(lddmm_kernel.weights().to_vec())),
                ))
                .init()?,
        };
        Ok(MomentumTransfer {
            interpolator,
            ratio: self.ratio,
            same_support_tol: self.same_support_tol,
        })
    }
}

/// Upsamples momentum from one control point set to another.
#[derive(Debug, Clone)]
pub struct MomentumTransfer<B: Backend> {
    interpolator: KernelInterpolator<B>,
    ratio: ScaleRatio,
    same_support_tol: f64,
}

impl<B: Backend> MomentumTransfer<B> {
    /// Momentum on `control_high` derived from `momentum_low` on `control_low`.
    ///
    /// The result is detached. Control point sets that agree within
    /// `same_support_tol` return the momentum unchanged, so re-running a
    /// scale at the same resolution does not perturb its solution.
    pub fn transfer(
        &self,
        control_low: Tensor<B, 3>,
        control_high: Tensor<B, 3>,
        momentum_low: Tensor<B, 3>,
    ) -> Result<Tensor<B, 3>> {
        let control_low = control_low.detach();
        let control_high = control_high.detach();
        let momentum_low = momentum_low.detach();
        if self.same_support(&control_low, &control_high) {
            return Ok(momentum_low);
        }
        let upsampled = self
            .interpolator
            .convolve(control_high.clone(), control_low.clone(), momentum_low)?;
        let ratio = self.scale_ratio(control_low, control_high)?;
        Ok((upsampled * ratio).detach())
    }

    fn same_support(&self, control_low: &Tensor<B, 3>, control_high: &Tensor<B, 3>) -> bool {
        control_low.dims() == control_high.dims() && max_abs_diff(control_low, control_high) <= self.same_support_tol
    }

    /// Per-point factor `[B, N_high, 1]` applied to the upsampled momentum.
    pub fn scale_ratio(&self, control_low: Tensor<B, 3>, control_high: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let [b, n_low, _] = control_low.dims();
        let [_, n_high, _] = control_high.dims();
        let device = control_low.device();
        match self.ratio {
            ScaleRatio::PointCount => {
                Ok(Tensor::ones([b, n_high, 1], &device).mul_scalar(n_low as f64 / n_high as f64))
            }
            ScaleRatio::KernelConsistency => {
                let ones_low = Tensor::<B, 3>::ones([b, n_low, 1], &device);
                let interp = &self.interpolator;
                let weight_low = interp.convolve(control_low.clone(), control_low.clone(), ones_low.clone())?;
                let weight_high_low = interp.convolve(control_high.clone(), control_low.clone(), ones_low)?;
                let weight_low_new = interp.convolve(control_low.clone(), control_high.clone(), weight_high_low)?;
                let correction = weight_low / weight_low_new.clamp_min(1e-12);
                Ok(interp.convolve(control_high, control_low, correction)?.clamp(0.0, 1.0))
            }
        }
    }
}
