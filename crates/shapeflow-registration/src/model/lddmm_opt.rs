//! Optimization-based LDDMM.
//!
//! The source shape is fixed and the geodesic path starts from it. The
//! initial momentum on the control points is the only unknown:
//!
//! 1. shooting integrates momentum and control points to `t = 1`
//! 2. flow advects the shape to move (skipped in dense mode)
//! 3. the loss compares the flowed shape with the target and adds the
//!    kinetic energy of the momentum
//!
//! With gradient-flow guidance enabled, step 3 compares the flowed shape with
//! a cached gradient-flow step of itself instead of the raw target.

use burn::config::Config;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};
use shapeflow_core::{RegParam, Shape, ShapePair};

use super::guidance::{gradient_flow_step, GradFlowGuidanceConfig};
use super::transfer::{MomentumTransfer, MomentumTransferConfig};
use super::{LossBreakdown, RegistrationModel};
use crate::error::{RegistrationError, Result};
use crate::integrator::{OdeIntegrator, OdeIntegratorConfig};
use crate::lddmm::{FlowMode, LddmmModule, LddmmModuleConfig};
use crate::metric::{BoxedSimilarity, PairFeatureExtractor, PointFeatureExtractor, SimilarityConfig};
use crate::optimizer::OptimizerConfig;
use crate::regularization::{GeodesicDistance, RegFactorScheduleConfig, Regularizer};
use crate::validation::{ensure_finite, ensure_finite_scalar};

/// Configuration for [`LddmmOpt`].
#[derive(Config, Debug, PartialEq)]
pub struct LddmmOptConfig {
    #[config(default = "LddmmModuleConfig::new()")]
    pub module: LddmmModuleConfig,
    #[config(default = "OdeIntegratorConfig::new()")]
    pub integrator: OdeIntegratorConfig,
    #[config(default = "SimilarityConfig::new()")]
    pub sim_loss: SimilarityConfig,
    #[config(default = "RegFactorScheduleConfig::new()")]
    pub factors: RegFactorScheduleConfig,
    #[config(default = "GradFlowGuidanceConfig::new()")]
    pub gradflow: GradFlowGuidanceConfig,
    #[config(default = "MomentumTransferConfig::new()")]
    pub transfer: MomentumTransferConfig,
    /// Optimizer owned by the model, used when the solver defers to it.
    pub optimizer: Option<OptimizerConfig>,
    /// Standard deviation of the initial momentum.
    #[config(default = 1e-7)]
    pub init_std: f64,
    /// Log the loss breakdown every `print_step` local iterations.
    #[config(default = 10)]
    pub print_step: usize,
}

impl LddmmOptConfig {
    /// Validate every part and build the model.
    pub fn init<B: AutodiffBackend>(&self) -> Result<LddmmOpt<B>> {
        self.factors.validate()?;
        if self.gradflow.enabled {
            self.gradflow.validate()?;
        }
        if let Some(optimizer) = &self.optimizer {
            optimizer.validate()?;
        }
        if !(self.init_std >= 0.0) {
            return Err(RegistrationError::invalid_configuration(format!(
                "init_std must be non-negative, got {}",
                self.init_std
            )));
        }
        let module = self.module.init()?;
        let transfer = self.transfer.init(module.kernel())?;
        if self.gradflow.enabled {
            tracing::info!("gradient flow guidance enabled for lddmm optimization");
        }
        Ok(LddmmOpt {
            regularizer: GeodesicDistance::new(module.kernel().clone()),
            integrator: self.integrator.init()?,
            sim_loss: self.sim_loss.init()?,
            module,
            transfer,
            feature_extractor: None,
            config: self.clone(),
            local_iter: 0,
            global_iter: 0,
            gradflowed: None,
        })
    }
}

/// LDDMM registration with the momentum as optimization variable.
pub struct LddmmOpt<B: AutodiffBackend> {
    config: LddmmOptConfig,
    module: LddmmModule,
    integrator: OdeIntegrator,
    sim_loss: BoxedSimilarity<B>,
    regularizer: GeodesicDistance,
    transfer: MomentumTransfer<B>,
    feature_extractor: Option<Box<dyn PairFeatureExtractor<B>>>,
    local_iter: usize,
    global_iter: usize,
    gradflowed: Option<Shape<B>>,
}

impl<B: AutodiffBackend> LddmmOpt<B> {
    /// Populate `pointfea` with an external extractor before the similarity.
    ///
    /// # Errors
    /// Gradient-flow guidance moves raw points, so it cannot be combined with
    /// a feature extractor.
    pub fn with_feature_extractor(mut self, extractor: Box<dyn PairFeatureExtractor<B>>) -> Result<Self> {
        if self.config.gradflow.enabled {
            return Err(RegistrationError::invalid_configuration(
                "gradient flow guidance cannot be combined with a feature extractor",
            ));
        }
        self.feature_extractor = Some(extractor);
        Ok(self)
    }

    /// Replace the similarity backend.
    pub fn set_loss_fn(&mut self, loss: BoxedSimilarity<B>) {
        self.sim_loss = loss;
    }

    pub fn config(&self) -> &LddmmOptConfig {
        &self.config
    }

    pub fn module(&self) -> &LddmmModule {
        &self.module
    }

    pub fn local_iter(&self) -> usize {
        self.local_iter
    }

    pub fn global_iter(&self) -> usize {
        self.global_iter
    }

    fn momentum(pair: &ShapePair<B>) -> Result<Tensor<B, 3>> {
        pair.reg_param()
            .map(RegParam::val)
            .ok_or_else(|| RegistrationError::invalid_configuration("the shape pair has no reg_param, call init_reg_param first"))
    }

    fn extract_fea(&self, flowed: Shape<B>, target: Shape<B>) -> Result<(Shape<B>, Shape<B>)> {
        match &self.feature_extractor {
            Some(extractor) => extractor.extract(flowed, target),
            None => PointFeatureExtractor.extract(flowed, target),
        }
    }

    /// Cached gradient-flow target, refreshed on schedule.
    fn guided_target(&mut self, flowed: &Shape<B>, target: &Shape<B>) -> Result<Shape<B>> {
        let has_cache = self
            .gradflowed
            .as_ref()
            .is_some_and(|g| g.points().dims() == flowed.points().dims());
        if !self.config.gradflow.needs_update(self.global_iter, has_cache) {
            if let Some(guided) = &self.gradflowed {
                return Ok(guided.clone());
            }
        }
        let blur = self.config.gradflow.blur_at(self.global_iter);
        let (guided, before, after) = gradient_flow_step(flowed, target, blur)?;
        tracing::info!(
            "{} th step, gradient flow with blur {:.4}: distance to target {:.6} -> {:.6}",
            self.local_iter,
            blur,
            before,
            after
        );
        self.gradflowed = Some(guided.clone());
        Ok(guided)
    }
}

impl<B: AutodiffBackend> RegistrationModel<B> for LddmmOpt<B> {
    fn name(&self) -> &'static str {
        "lddmm_opt"
    }

    fn init_reg_param(&self, pair: &mut ShapePair<B>, force: bool) -> Result<()> {
        if pair.reg_param().is_none() || force {
            let param = RegParam::noise_like(&pair.control_points(), self.config.init_std);
            pair.set_reg_param(param)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.local_iter = 0;
        self.gradflowed = None;
    }

    fn forward(&mut self, pair: &mut ShapePair<B>) -> Result<LossBreakdown<B>> {
        self.shooting(pair)?;
        if !pair.infer_flowed() {
            self.flow(pair)?;
        }
        let flowed = pair
            .flowed()
            .cloned()
            .ok_or_else(|| RegistrationError::integrator("flow pass produced no flowed shape"))?;
        let (flowed, target) = self.extract_fea(flowed, pair.target().clone())?;
        let target = if self.config.gradflow.enabled {
            self.guided_target(&flowed, &target)?
        } else {
            target
        };

        let sim = self.sim_loss.forward(&flowed, &target)?;
        let reg = self.regularizer.compute_loss(Self::momentum(pair)?, pair.control_points());
        let (sim_factor, reg_factor) = self.config.factors.factors(self.local_iter);
        let sim = sim.mul_scalar(sim_factor);
        let reg = reg.mul_scalar(reg_factor);
        let sim_value = sim.clone().into_scalar().elem::<f64>();
        let reg_value = reg.clone().into_scalar().elem::<f64>();
        ensure_finite_scalar("similarity loss", sim_value)?;
        ensure_finite_scalar("regularization loss", reg_value)?;

        if self.config.print_step > 0 && self.local_iter % self.config.print_step == 0 {
            tracing::info!(
                "{} th step, sim_loss is {:.6}, reg_loss is {:.6}, sim_factor is {}, reg_factor is {:.4}",
                self.local_iter,
                sim_value,
                reg_value,
                sim_factor,
                reg_factor
            );
        }
        self.local_iter += 1;
        self.global_iter += 1;

        Ok(LossBreakdown {
            loss: sim + reg,
            sim_loss: sim_value,
            reg_loss: reg_value,
            sim_factor,
            reg_factor,
        })
    }

    fn shooting(&mut self, pair: &mut ShapePair<B>) -> Result<()> {
        let momentum = Self::momentum(pair)?;
        self.module.set_mode(FlowMode::Shooting);
        let state = self.integrator.solve(&self.module, vec![momentum, pair.control_points()])?;
        let flowed_control_points = take_state(state, 1)?;
        pair.set_flowed_control_points(flowed_control_points)?;
        Ok(())
    }

    fn flow(&mut self, pair: &mut ShapePair<B>) -> Result<()> {
        let momentum = Self::momentum(pair)?;
        self.module.set_mode(FlowMode::Flow);
        let state = self
            .integrator
            .solve(&self.module, vec![momentum, pair.control_points(), pair.toflow_points()])?;
        let flowed_points = take_state(state, 2)?;
        ensure_finite("flowed points", &flowed_points)?;
        let flowed = Shape::with_reference(flowed_points, pair.toflow_shape())?;
        pair.set_flowed(flowed)?;
        Ok(())
    }

    fn transfer_reg_param(&self, low: &ShapePair<B>, high: &mut ShapePair<B>) -> Result<()> {
        let momentum_low = Self::momentum(low)?;
        let momentum_high = self
            .transfer
            .transfer(low.control_points(), high.control_points(), momentum_low)?;
        ensure_finite("transferred momentum", &momentum_high)?;
        tracing::debug!(
            "transferred momentum from {:?} to {:?} control points",
            low.control_points().dims(),
            high.control_points().dims()
        );
        high.set_reg_param(RegParam::new(momentum_high))?;
        Ok(())
    }

    fn optimizer_config(&self) -> Option<&OptimizerConfig> {
        self.config.optimizer.as_ref()
    }
}

fn take_state<B: AutodiffBackend>(state: Vec<Tensor<B, 3>>, index: usize) -> Result<Tensor<B, 3>> {
    let len = state.len();
    state
        .into_iter()
        .nth(index)
        .ok_or_else(|| RegistrationError::integrator(format!("state has {} tensors, expected index {}", len, index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{PairFeatureExtractor, PointFeatureExtractor};
    use burn::backend::Autodiff;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;
    use shapeflow_core::geometry::max_abs_diff;

    type B = Autodiff<NdArray<f32>>;

    fn square_pair(device: &<B as burn::tensor::backend::Backend>::Device) -> ShapePair<B> {
        let source = Tensor::<B, 3>::from_data(
            TensorData::from([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]]),
            device,
        );
        let target = source.clone().add_scalar(0.5);
        ShapePair::new(Shape::new(source).unwrap(), Shape::new(target).unwrap()).unwrap()
    }

    #[test]
    fn test_zero_momentum_leaves_points_in_place() {
        let device = Default::default();
        let mut pair = square_pair(&device);
        let toflow = Tensor::<B, 3>::from_data(TensorData::from([[[0.5, 0.5], [0.2, 0.7]]]), &device);
        pair.set_toflow(Shape::new(toflow.clone()).unwrap()).unwrap();
        pair.set_reg_param(RegParam::zeros_like(&pair.control_points())).unwrap();

        let mut model = LddmmOptConfig::new().init::<B>().unwrap();
        model.deform(&mut pair).unwrap();
        let flowed_cp = pair.flowed_control_points().unwrap();
        assert_eq!(max_abs_diff(flowed_cp, &pair.control_points()), 0.0);
        assert_eq!(max_abs_diff(pair.flowed().unwrap().points(), &toflow), 0.0);
    }

    #[test]
    fn test_forward_counts_iterations_and_reset() {
        let device = Default::default();
        let mut pair = square_pair(&device);
        let mut model = LddmmOptConfig::new().init::<B>().unwrap();
        model.init_reg_param(&mut pair, false).unwrap();
        let out = model.forward(&mut pair).unwrap();
        assert!(out.sim_loss > 0.0);
        assert_eq!(out.sim_factor, 100.0);
        assert_eq!(model.local_iter(), 1);
        model.reset();
        assert_eq!(model.local_iter(), 0);
        assert_eq!(model.global_iter(), 1);
    }

    #[test]
    fn test_forward_without_reg_param_fails() {
        let device = Default::default();
        let mut pair = square_pair(&device);
        let mut model = LddmmOptConfig::new().init::<B>().unwrap();
        assert!(matches!(
            model.forward(&mut pair),
            Err(RegistrationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_feature_extractor_with_gradflow_is_rejected() {
        let config = LddmmOptConfig::new().with_gradflow(GradFlowGuidanceConfig::new().with_enabled(true));
        let model = config.init::<B>().unwrap();
        let extractor: Box<dyn PairFeatureExtractor<B>> = Box::new(PointFeatureExtractor);
        assert!(matches!(
            model.with_feature_extractor(extractor),
            Err(RegistrationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_gradflow_guidance_runs_in_forward() {
        let device = Default::default();
        let mut pair = square_pair(&device);
        let config = LddmmOptConfig::new().with_gradflow(GradFlowGuidanceConfig::new().with_enabled(true));
        let mut model = config.init::<B>().unwrap();
        model.init_reg_param(&mut pair, false).unwrap();
        let out = model.forward(&mut pair).unwrap();
        assert!(out.value().is_finite());
        assert!(model.gradflowed.is_some());
    }
}
