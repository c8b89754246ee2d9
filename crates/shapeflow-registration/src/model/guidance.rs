//! Gradient-flow guidance.
//!
//! Every few iterations the flowed points take one explicit gradient step of
//! a fresh, sharper kernel discrepancy towards the target. The result is
//! cached and used as the similarity target until the next update, giving the
//! momentum a locally optimal transport target instead of the raw target.

use burn::config::Config;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};
use shapeflow_core::Shape;

use crate::error::{RegistrationError, Result};
use crate::metric::{FeatureAttr, GaussianKernelDistance, SimilarityLoss};

/// Settings of the gradient-flow guidance.
#[derive(Config, Debug, PartialEq)]
pub struct GradFlowGuidanceConfig {
    #[config(default = false)]
    pub enabled: bool,
    /// Refresh the guided target every `update_every_n_step` global iterations.
    #[config(default = 10)]
    pub update_every_n_step: usize,
    #[config(default = 0.5)]
    pub blur_init: f64,
    /// Per-update decay of the blur.
    #[config(default = 0.5)]
    pub blur_ratio: f64,
    #[config(default = 0.5)]
    pub blur_min: f64,
}

impl GradFlowGuidanceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.update_every_n_step == 0 {
            return Err(RegistrationError::invalid_configuration(
                "gradient flow guidance needs update_every_n_step > 0",
            ));
        }
        if !(self.blur_init > 0.0 && self.blur_min > 0.0 && self.blur_ratio > 0.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "gradient flow blur settings must be positive, got init={} ratio={} min={}",
                self.blur_init, self.blur_ratio, self.blur_min
            )));
        }
        Ok(())
    }

    /// `max(blur_init * blur_ratio^(iter / n), blur_min)`
    pub fn blur_at(&self, global_iter: usize) -> f64 {
        let n_update = global_iter as f64 / self.update_every_n_step as f64;
        (self.blur_init * self.blur_ratio.powf(n_update)).max(self.blur_min)
    }

    /// Whether the cached target must be recomputed.
    pub fn needs_update(&self, global_iter: usize, has_cache: bool) -> bool {
        !has_cache || global_iter % self.update_every_n_step == 0
    }
}

/// One explicit gradient-flow step of `flowed` towards `target`.
///
/// Works on a detached copy: the returned shape carries no gradient. Each
/// point moves by `-∇_x L / w`, so the step does not depend on the point
/// masses.
///
/// # Returns
/// The moved shape, with the discrepancy before and after the step.
pub fn gradient_flow_step<B: AutodiffBackend>(
    flowed: &Shape<B>,
    target: &Shape<B>,
    blur: f64,
) -> Result<(Shape<B>, f64, f64)> {
    let loss_fn = GaussianKernelDistance::new(blur, FeatureAttr::Points)?;
    let points = flowed.points().clone().detach().require_grad();
    let moving = Shape::with_reference(points.clone(), flowed)?;
    let loss = loss_fn.forward(&moving, target)?;
    let before = loss.clone().into_scalar().elem::<f64>();

    let grads = loss.backward();
    let grad = points
        .grad(&grads)
        .ok_or_else(|| RegistrationError::metric("gradient flow: no gradient for the flowed points"))?;
    let grad = Tensor::<B, 3>::from_inner(grad);
    let mass = flowed.weights().clone().detach().clamp_min(1e-12);
    let moved = (points.detach() - grad / mass).detach();

    let guided = Shape::with_reference(moved, flowed)?;
    let after = loss_fn.forward(&guided, target)?.into_scalar().elem::<f64>();
    Ok((guided, before, after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type B = Autodiff<NdArray<f32>>;

    #[test]
    fn test_blur_schedule() {
        let config = GradFlowGuidanceConfig::new().with_blur_init(1.0).with_blur_min(0.1);
        assert_eq!(config.blur_at(0), 1.0);
        assert!((config.blur_at(10) - 0.5).abs() < 1e-12);
        assert_eq!(config.blur_at(1000), 0.1);
        assert!(config.needs_update(20, true));
        assert!(!config.needs_update(21, true));
        assert!(config.needs_update(21, false));
    }

    #[test]
    fn test_step_reduces_discrepancy() {
        let device = Default::default();
        let points = Tensor::<B, 3>::from_data(
            TensorData::from([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]]),
            &device,
        );
        let flowed = Shape::new(points.clone()).unwrap();
        let target = Shape::new(points.add_scalar(0.2)).unwrap();
        let (guided, before, after) = gradient_flow_step(&flowed, &target, 0.5).unwrap();
        assert!(after < before, "{} -> {}", before, after);
        assert_eq!(guided.points().dims(), [1, 4, 2]);
    }
}
