//! Registration models.
//!
//! A model owns the deformation (dynamics, integrator) and the objective
//! (similarity, regularization, factor schedule) and evaluates them on a
//! [`ShapePair`]. Solvers drive any model through [`RegistrationModel`].

pub mod guidance;
pub mod lddmm_opt;
pub mod transfer;

use std::fmt;
use std::str::FromStr;

use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use shapeflow_core::ShapePair;

use crate::error::{RegistrationError, Result};
use crate::optimizer::OptimizerConfig;

pub use guidance::{gradient_flow_step, GradFlowGuidanceConfig};
pub use lddmm_opt::{LddmmOpt, LddmmOptConfig};
pub use transfer::{MomentumTransfer, MomentumTransferConfig, ScaleRatio};

/// Objective of one forward pass, with its parts for reporting.
#[derive(Debug, Clone)]
pub struct LossBreakdown<B: Backend> {
    /// `sim_factor * sim + reg_factor * reg`, differentiable.
    pub loss: Tensor<B, 1>,
    /// Weighted similarity term.
    pub sim_loss: f64,
    /// Weighted regularization term.
    pub reg_loss: f64,
    pub sim_factor: f64,
    pub reg_factor: f64,
}

impl<B: Backend> LossBreakdown<B> {
    pub fn value(&self) -> f64 {
        self.sim_loss + self.reg_loss
    }

    /// Named values for progress reporting.
    pub fn metrics(&self) -> Vec<(String, f64)> {
        vec![
            ("sim_loss".to_string(), self.sim_loss),
            ("reg_loss".to_string(), self.reg_loss),
            ("sim_factor".to_string(), self.sim_factor),
            ("reg_factor".to_string(), self.reg_factor),
        ]
    }
}

/// Interface between solvers and registration models.
pub trait RegistrationModel<B: AutodiffBackend> {
    fn name(&self) -> &'static str;

    /// Give the pair a near-zero momentum unless it has one (or `force`).
    fn init_reg_param(&self, pair: &mut ShapePair<B>, force: bool) -> Result<()>;

    /// Restart the local iteration count and drop cached guidance.
    fn reset(&mut self);

    /// Shooting, flow and loss for the current momentum.
    fn forward(&mut self, pair: &mut ShapePair<B>) -> Result<LossBreakdown<B>>;

    /// Integrate momentum and control points; records the flowed control points.
    fn shooting(&mut self, pair: &mut ShapePair<B>) -> Result<()>;

    /// Advect the `toflow` shape through the current velocity field.
    fn flow(&mut self, pair: &mut ShapePair<B>) -> Result<()>;

    /// Shooting followed by a flow pass when the shot alone does not give
    /// the flowed shape.
    fn deform(&mut self, pair: &mut ShapePair<B>) -> Result<()> {
        self.shooting(pair)?;
        if !pair.infer_flowed() {
            self.flow(pair)?;
        }
        Ok(())
    }

    /// Derive the momentum of `high` from the solution on `low`.
    fn transfer_reg_param(&self, low: &ShapePair<B>, high: &mut ShapePair<B>) -> Result<()>;

    /// Optimizer settings owned by the model, if any.
    fn optimizer_config(&self) -> Option<&OptimizerConfig> {
        None
    }
}

/// Model registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelKind {
    #[default]
    LddmmOpt,
}

impl ModelKind {
    /// Build the model named by this key.
    pub fn build<B: AutodiffBackend>(&self, config: &LddmmOptConfig) -> Result<Box<dyn RegistrationModel<B>>> {
        match self {
            Self::LddmmOpt => Ok(Box::new(config.init::<B>()?)),
        }
    }
}

impl FromStr for ModelKind {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lddmm_opt" | "lddmm" => Ok(Self::LddmmOpt),
            other => Err(RegistrationError::invalid_configuration(format!(
                "unknown registration model '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LddmmOpt => "lddmm_opt",
        })
    }
}
