//! Learning rate scheduling strategies.
//!
//! The initial learning rate is not part of the schedule: the multiscale
//! solver supplies one per scale and the schedule shapes its decay.

use serde::{Deserialize, Serialize};

use super::trait_::LearningRateScheduler;
use crate::error::{RegistrationError, Result};

/// Learning rate scheduling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum LearningRateSchedule {
    /// Constant learning rate
    #[default]
    Constant,
    /// Step decay: multiply by gamma every step_size iterations
    StepDecay { gamma: f64, step_size: usize },
    /// Exponential decay: multiply by gamma every iteration
    ExponentialDecay { gamma: f64 },
    /// Inverse time decay: lr = initial_lr / (1 + decay_rate * iteration)
    InverseTimeDecay { decay_rate: f64 },
    /// Cosine annealing from the initial rate down to min_lr over max_iterations
    CosineAnnealing { min_lr: f64, max_iterations: usize },
    /// Polynomial decay: lr = end_lr + (initial_lr - end_lr) * (1 - iteration / max_iterations)^power
    PolynomialDecay {
        end_lr: f64,
        max_iterations: usize,
        power: f64,
    },
}

impl LearningRateSchedule {
    /// Create a step decay schedule.
    pub fn step_decay(gamma: f64, step_size: usize) -> Self {
        Self::StepDecay { gamma, step_size }
    }

    /// Create a cosine annealing schedule.
    pub fn cosine_annealing(min_lr: f64, max_iterations: usize) -> Self {
        Self::CosineAnnealing {
            min_lr,
            max_iterations,
        }
    }

    /// Reject parameters that would make the rate grow or divide by zero.
    pub fn validate(&self) -> Result<()> {
        let ok = match self {
            Self::Constant => true,
            Self::StepDecay { gamma, step_size } => *gamma > 0.0 && *gamma <= 1.0 && *step_size > 0,
            Self::ExponentialDecay { gamma } => *gamma > 0.0 && *gamma <= 1.0,
            Self::InverseTimeDecay { decay_rate } => *decay_rate >= 0.0,
            Self::CosineAnnealing {
                min_lr,
                max_iterations,
            } => *min_lr >= 0.0 && *max_iterations > 0,
            Self::PolynomialDecay {
                end_lr,
                max_iterations,
                power,
            } => *end_lr >= 0.0 && *max_iterations > 0 && *power > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(RegistrationError::invalid_configuration(format!(
                "invalid learning rate schedule {:?}",
                self
            )))
        }
    }

    /// Get the learning rate for a given iteration.
    pub fn get_learning_rate(&self, iteration: usize, initial_lr: f64) -> f64 {
        match *self {
            Self::Constant => initial_lr,
            Self::StepDecay { gamma, step_size } => {
                let decay_steps = iteration / step_size.max(1);
                initial_lr * gamma.powi(decay_steps as i32)
            }
            Self::ExponentialDecay { gamma } => initial_lr * gamma.powi(iteration as i32),
            Self::InverseTimeDecay { decay_rate } => initial_lr / (1.0 + decay_rate * iteration as f64),
            Self::CosineAnnealing {
                min_lr,
                max_iterations,
            } => {
                let progress = (iteration as f64 / max_iterations.max(1) as f64).min(1.0);
                let cosine = (1.0 + (std::f64::consts::PI * progress).cos()) / 2.0;
                min_lr + (initial_lr - min_lr) * cosine
            }
            Self::PolynomialDecay {
                end_lr,
                max_iterations,
                power,
            } => {
                let progress = (iteration as f64 / max_iterations.max(1) as f64).min(1.0);
                let decay = (1.0 - progress).powf(power);
                end_lr + (initial_lr - end_lr) * decay
            }
        }
    }
}

impl LearningRateScheduler for LearningRateSchedule {
    fn get_lr(&self, step: usize, initial_lr: f64) -> f64 {
        self.get_learning_rate(step, initial_lr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_schedule() {
        let schedule = LearningRateSchedule::Constant;
        assert_eq!(schedule.get_learning_rate(0, 0.01), 0.01);
        assert_eq!(schedule.get_learning_rate(100, 0.01), 0.01);
    }

    #[test]
    fn test_step_decay() {
        let schedule = LearningRateSchedule::step_decay(0.5, 10);
        assert_eq!(schedule.get_lr(0, 0.1), 0.1);
        assert_eq!(schedule.get_lr(5, 0.1), 0.1);
        assert_eq!(schedule.get_lr(10, 0.1), 0.05);
        assert_eq!(schedule.get_lr(20, 0.1), 0.025);
    }

    #[test]
    fn test_exponential_decay() {
        let schedule = LearningRateSchedule::ExponentialDecay { gamma: 0.99 };
        assert_eq!(schedule.get_learning_rate(0, 0.1), 0.1);
        assert!((schedule.get_learning_rate(100, 0.1) - 0.0366).abs() < 0.001);
    }

    #[test]
    fn test_inverse_time_decay() {
        let schedule = LearningRateSchedule::InverseTimeDecay { decay_rate: 0.01 };
        assert!((schedule.get_learning_rate(100, 0.1) - 0.05).abs() < 0.001);
    }

    #[test]
    fn test_cosine_annealing_stays_at_min_after_horizon() {
        let schedule = LearningRateSchedule::cosine_annealing(0.001, 100);
        assert_eq!(schedule.get_learning_rate(0, 0.1), 0.1);
        assert!((schedule.get_learning_rate(50, 0.1) - 0.0505).abs() < 0.001);
        assert!((schedule.get_learning_rate(100, 0.1) - 0.001).abs() < 1e-9);
        assert!((schedule.get_learning_rate(500, 0.1) - 0.001).abs() < 1e-9);
    }

    #[test]
    fn test_polynomial_decay() {
        let schedule = LearningRateSchedule::PolynomialDecay {
            end_lr: 0.001,
            max_iterations: 100,
            power: 1.0,
        };
        assert!((schedule.get_learning_rate(50, 0.1) - 0.0505).abs() < 0.001);
        assert!((schedule.get_learning_rate(100, 0.1) - 0.001).abs() < 0.001);
    }

    #[test]
    fn test_validate() {
        assert!(LearningRateSchedule::step_decay(1.5, 10).validate().is_err());
        assert!(LearningRateSchedule::step_decay(0.5, 0).validate().is_err());
        assert!(LearningRateSchedule::step_decay(0.5, 10).validate().is_ok());
    }
}
