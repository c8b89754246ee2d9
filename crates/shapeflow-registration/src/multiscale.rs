//! Multiscale registration.
//!
//! Orchestrates a sequence of scales (coarse to fine control point sets). At
//! each scale the shapes are resampled, the momentum is initialised or
//! transferred from the previous scale, and a single-scale optimization runs
//! until its iteration budget or tolerance is reached.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use burn::config::Config;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use shapeflow_core::shape::PairExport;
use shapeflow_core::{Shape, ShapePair, ShapeSampler};

use crate::error::{RegistrationError, Result};
use crate::model::RegistrationModel;
use crate::optimizer::OptimizerConfig;
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::registration::{Registration, ScaleBudget, ScaleOutcome};
use crate::validation::{validate_iterations, validate_learning_rate, validate_schedule_length};

/// Who provides the optimizer of each scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptimizerStrategy {
    /// The solver's own [`OptimizerConfig`].
    #[default]
    DefinedHere,
    /// The optimizer settings carried by the model.
    FromModel,
}

impl FromStr for OptimizerStrategy {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "use_optimizer_defined_here" | "here" => Ok(Self::DefinedHere),
            "use_optimizer_defined_from_model" | "model" => Ok(Self::FromModel),
            other => Err(RegistrationError::invalid_configuration(format!(
                "unknown optimizer strategy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for OptimizerStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DefinedHere => "use_optimizer_defined_here",
            Self::FromModel => "use_optimizer_defined_from_model",
        })
    }
}

/// What the next scale starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleChaining {
    /// Classic LDDMM: the source stays fixed, only the momentum is refined.
    #[default]
    Fixed,
    /// Discrete flow: the flowed shape becomes the source of the next scale.
    Chained,
}

/// Schedule of the multiscale solver, one entry per scale.
#[derive(Config, Debug, PartialEq)]
pub struct MultiScaleConfig {
    #[config(default = "vec![ShapeSampler::Full]")]
    pub samplers: Vec<ShapeSampler>,
    #[config(default = "vec![100]")]
    pub iter_per_scale: Vec<usize>,
    #[config(default = "vec![1e-4]")]
    pub rel_ftol_per_scale: Vec<f64>,
    #[config(default = "vec![0.01]")]
    pub init_lr_per_scale: Vec<f64>,
    #[config(default = "OptimizerStrategy::DefinedHere")]
    pub strategy: OptimizerStrategy,
    #[config(default = "ScaleChaining::Fixed")]
    pub chaining: ScaleChaining,
    #[config(default = "OptimizerConfig::new()")]
    pub optimizer: OptimizerConfig,
}

impl MultiScaleConfig {
    pub fn num_scales(&self) -> usize {
        self.samplers.len()
    }

    /// Check that every per-scale list has one entry per scale.
    pub fn validate(&self) -> Result<()> {
        let n = self.num_scales();
        if n == 0 {
            return Err(RegistrationError::invalid_configuration(
                "multiscale solver needs at least one scale",
            ));
        }
        validate_schedule_length("iter_per_scale", self.iter_per_scale.len(), n)?;
        validate_schedule_length("rel_ftol_per_scale", self.rel_ftol_per_scale.len(), n)?;
        validate_schedule_length("init_lr_per_scale", self.init_lr_per_scale.len(), n)?;
        for &iterations in &self.iter_per_scale {
            validate_iterations(iterations)?;
        }
        for &lr in &self.init_lr_per_scale {
            validate_learning_rate(lr)?;
        }
        if let Some(ftol) = self.rel_ftol_per_scale.iter().find(|f| !(**f >= 0.0)) {
            return Err(RegistrationError::invalid_configuration(format!(
                "rel_ftol must be non-negative, got {}",
                ftol
            )));
        }
        if self.strategy == OptimizerStrategy::DefinedHere {
            self.optimizer.validate()?;
        }
        Ok(())
    }
}

/// Output of a multiscale run.
#[derive(Debug, Clone)]
pub struct RegistrationResult<B: AutodiffBackend> {
    /// State of the last scale.
    pub pair: ShapePair<B>,
    /// The full-resolution source moved by the final deformation (detached).
    pub flowed: Shape<B>,
    pub scales: Vec<ScaleOutcome>,
}

impl<B: AutodiffBackend> RegistrationResult<B> {
    pub fn final_loss(&self) -> Option<f64> {
        self.scales.last().map(|s| s.final_loss)
    }

    /// Host-side record of the final pair for external writers.
    pub fn export(&self) -> Result<PairExport> {
        Ok(PairExport::from_pair(&self.pair)?)
    }
}

/// Coarse-to-fine solver over a [`RegistrationModel`].
pub struct MultiScaleSolver {
    config: MultiScaleConfig,
    tracker: ProgressTracker,
}

impl MultiScaleSolver {
    /// # Errors
    /// Returns `InvalidConfiguration` when the schedule is inconsistent.
    pub fn new(config: MultiScaleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tracker: ProgressTracker::new(),
        })
    }

    pub fn with_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.tracker.add_callback(callback);
        self
    }

    pub fn config(&self) -> &MultiScaleConfig {
        &self.config
    }

    /// Register `source` onto `target`.
    pub fn solve<B: AutodiffBackend>(
        &mut self,
        model: &mut dyn RegistrationModel<B>,
        source: Shape<B>,
        target: Shape<B>,
    ) -> Result<RegistrationResult<B>> {
        let (optimizer_config, schedule_owner) = match self.config.strategy {
            OptimizerStrategy::DefinedHere => (self.config.optimizer.clone(), "solver"),
            OptimizerStrategy::FromModel => match model.optimizer_config() {
                Some(config) => (config.clone(), model.name()),
                None => {
                    return Err(RegistrationError::invalid_configuration(format!(
                        "model {} does not define an optimizer",
                        model.name()
                    )))
                }
            },
        };
        let num_scales = self.config.num_scales();
        tracing::info!(
            "multiscale registration with {} scales, {} optimizer from {}",
            num_scales,
            optimizer_config.kind,
            schedule_owner
        );

        self.tracker.start();
        let mut baseline = source;
        let mut previous: Option<ShapePair<B>> = None;
        let mut outcomes = Vec::with_capacity(num_scales);

        for scale in 0..num_scales {
            self.tracker.scale_start(scale, num_scales);
            match self.run_scale(model, &optimizer_config, scale, &baseline, &target, previous.as_ref()) {
                Ok((pair, outcome)) => {
                    if self.config.chaining == ScaleChaining::Chained {
                        let flowed = flowed_of(&pair)?;
                        baseline = Shape::with_reference(flowed.points().clone().detach(), &baseline)?;
                    }
                    outcomes.push(outcome);
                    previous = Some(pair);
                }
                Err(err) => {
                    self.tracker.error(&err.to_string());
                    return Err(err);
                }
            }
        }

        let pair = previous.ok_or_else(|| RegistrationError::convergence_failure("no scale was run"))?;
        let flowed = flowed_of(&pair)?;
        let flowed = Shape::with_reference(flowed.points().clone().detach(), flowed)?;
        if let Some(last) = outcomes.last() {
            let lr = self.config.init_lr_per_scale[last.scale];
            self.tracker.complete(last.scale, last.iterations, last.final_loss, lr);
        }
        Ok(RegistrationResult {
            pair,
            flowed,
            scales: outcomes,
        })
    }

    fn run_scale<B: AutodiffBackend>(
        &self,
        model: &mut dyn RegistrationModel<B>,
        optimizer_config: &OptimizerConfig,
        scale: usize,
        baseline: &Shape<B>,
        target: &Shape<B>,
        previous: Option<&ShapePair<B>>,
    ) -> Result<(ShapePair<B>, ScaleOutcome)> {
        let sampler = &self.config.samplers[scale];
        let (source_s, target_s) = if sampler.is_full() {
            (baseline.clone(), target.clone())
        } else {
            (resample(sampler, baseline)?, resample(sampler, target)?)
        };
        tracing::info!(
            "scale {}/{}: {} source points, {} target points",
            scale + 1,
            self.config.num_scales(),
            source_s.npoints(),
            target_s.npoints()
        );
        let mut pair = ShapePair::new(source_s, target_s)?;

        match previous {
            Some(low) if self.config.chaining == ScaleChaining::Fixed => model.transfer_reg_param(low, &mut pair)?,
            _ => model.init_reg_param(&mut pair, true)?,
        }
        model.reset();

        let initial_lr = self.config.init_lr_per_scale[scale];
        let optimizer = optimizer_config.build::<B>(initial_lr)?;
        let budget = ScaleBudget {
            iterations: self.config.iter_per_scale[scale],
            rel_ftol: self.config.rel_ftol_per_scale[scale],
            initial_lr,
        };
        let outcome = Registration::new(optimizer, optimizer_config.schedule).execute(
            model,
            &mut pair,
            budget,
            scale,
            &self.tracker,
        )?;

        if !sampler.is_full() {
            // carry the full-resolution baseline through the final deformation
            pair.set_toflow(baseline.clone())?;
            model.deform(&mut pair)?;
        }
        Ok((pair, outcome))
    }
}

fn resample<B: AutodiffBackend>(sampler: &ShapeSampler, shape: &Shape<B>) -> Result<Shape<B>> {
    let (points, weights) = sampler.sample(shape)?;
    Ok(Shape::set_data(points, Some(weights), None)?)
}

fn flowed_of<B: AutodiffBackend>(pair: &ShapePair<B>) -> Result<&Shape<B>> {
    pair.flowed()
        .ok_or_else(|| RegistrationError::convergence_failure("scale finished without a flowed shape"))
}
