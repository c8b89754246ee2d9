//! Optimizers for the registration parameter.
//!
//! Gradient descent, momentum and Adam wrap Burn's optimizers; L-BFGS is a
//! custom `SimpleOptimizer`. [`OptimizerConfig`] resolves a string key from a
//! task file into a boxed optimizer.
//!
//! # Examples
//!
//! ```rust,ignore
//! use shapeflow_registration::optimizer::{OptimizerConfig, OptimizerKind};
//!
//! let config = OptimizerConfig::new().with_kind(OptimizerKind::Lbfgs);
//! let optimizer = config.build::<B>(0.1)?;
//! ```

pub mod adapted;
pub mod lbfgs;
pub mod learning_rate;
pub mod trait_;

use std::fmt;
use std::str::FromStr;

use burn::config::Config;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use shapeflow_core::RegParam;

use crate::error::{RegistrationError, Result};
use crate::validation::{validate_lbfgs_history_size, validate_learning_rate};

pub use adapted::{AdamOptimizer, AdaptedOptimizer, GradientDescent, Momentum};
pub use lbfgs::{LbfgsConfig, LbfgsOptimizer};
pub use learning_rate::LearningRateSchedule;
pub use trait_::{LearningRateScheduler, Optimizer};

/// Boxed optimizer over the momentum field.
pub type BoxedOptimizer<B> = Box<dyn Optimizer<RegParam<B>, B>>;

/// Optimization algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptimizerKind {
    #[default]
    GradientDescent,
    Momentum,
    Adam,
    Lbfgs,
}

impl FromStr for OptimizerKind {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gd" | "sgd" | "gradient_descent" => Ok(Self::GradientDescent),
            "momentum" => Ok(Self::Momentum),
            "adam" => Ok(Self::Adam),
            "lbfgs" | "l-bfgs" | "lbfgs_ls" => Ok(Self::Lbfgs),
            other => Err(RegistrationError::invalid_configuration(format!(
                "unknown optimizer '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GradientDescent => "gd",
            Self::Momentum => "momentum",
            Self::Adam => "adam",
            Self::Lbfgs => "lbfgs",
        };
        f.write_str(name)
    }
}

/// Optimizer and learning-rate schedule settings.
#[derive(Config, Debug, PartialEq)]
pub struct OptimizerConfig {
    #[config(default = "OptimizerKind::GradientDescent")]
    pub kind: OptimizerKind,
    #[config(default = "LearningRateSchedule::Constant")]
    pub schedule: LearningRateSchedule,
    /// Momentum factor (momentum optimizer).
    #[config(default = 0.9)]
    pub momentum: f64,
    #[config(default = false)]
    pub nesterov: bool,
    #[config(default = 0.9)]
    pub beta_1: f32,
    #[config(default = 0.999)]
    pub beta_2: f32,
    #[config(default = 1e-8)]
    pub epsilon: f32,
    /// L-BFGS history size.
    #[config(default = 10)]
    pub history_size: usize,
    /// L-BFGS step norm cap.
    #[config(default = 1.0)]
    pub max_step_norm: f64,
}

impl OptimizerConfig {
    /// Check hyperparameters without building an optimizer.
    pub fn validate(&self) -> Result<()> {
        self.schedule.validate()?;
        if !(0.0..1.0).contains(&self.momentum) {
            return Err(RegistrationError::invalid_configuration(format!(
                "momentum must lie in [0, 1), got {}",
                self.momentum
            )));
        }
        if self.kind == OptimizerKind::Lbfgs {
            validate_lbfgs_history_size(self.history_size)?;
            if !(self.max_step_norm > 0.0) {
                return Err(RegistrationError::invalid_configuration(
                    "L-BFGS max_step_norm must be positive",
                ));
            }
        }
        Ok(())
    }

    /// Build the optimizer for the momentum field with learning rate `lr`.
    pub fn build<B: AutodiffBackend>(&self, lr: f64) -> Result<BoxedOptimizer<B>> {
        self.validate()?;
        validate_learning_rate(lr)?;
        let optimizer: BoxedOptimizer<B> = match self.kind {
            OptimizerKind::GradientDescent => Box::new(GradientDescent::<RegParam<B>, B>::gradient_descent(lr)),
            OptimizerKind::Momentum => Box::new(Momentum::<RegParam<B>, B>::momentum(lr, self.momentum, self.nesterov)),
            OptimizerKind::Adam => Box::new(AdamOptimizer::<RegParam<B>, B>::adam(
                lr,
                self.beta_1,
                self.beta_2,
                self.epsilon,
            )),
            OptimizerKind::Lbfgs => Box::new(
                LbfgsConfig::new()
                    .with_history_size(self.history_size)
                    .with_learning_rate(lr)
                    .with_max_step_norm(self.max_step_norm)
                    .init::<B, RegParam<B>>(),
            ),
        };
        tracing::debug!("built {} optimizer with lr {:.3e}", self.kind, lr);
        Ok(optimizer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;

    type B = Autodiff<NdArray<f32>>;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("SGD".parse::<OptimizerKind>().unwrap(), OptimizerKind::GradientDescent);
        assert_eq!("lbfgs".parse::<OptimizerKind>().unwrap(), OptimizerKind::Lbfgs);
        assert!(matches!(
            "newton".parse::<OptimizerKind>(),
            Err(RegistrationError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_build_every_kind() {
        for kind in [
            OptimizerKind::GradientDescent,
            OptimizerKind::Momentum,
            OptimizerKind::Adam,
            OptimizerKind::Lbfgs,
        ] {
            let optimizer = OptimizerConfig::new().with_kind(kind).build::<B>(0.1).unwrap();
            assert_eq!(optimizer.learning_rate(), 0.1);
        }
    }

    #[test]
    fn test_build_rejects_bad_lr() {
        assert!(OptimizerConfig::new().build::<B>(0.0).is_err());
        assert!(OptimizerConfig::new().with_momentum(1.5).build::<B>(0.1).is_err());
    }
}
