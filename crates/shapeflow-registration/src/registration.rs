//! Single-scale optimization loop.

use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;
use shapeflow_core::ShapePair;

use crate::error::Result;
use crate::model::RegistrationModel;
use crate::optimizer::{BoxedOptimizer, LearningRateScheduler, LearningRateSchedule};
use crate::progress::ProgressTracker;
use crate::validation::{ensure_finite, rel_ftol_converged, validate_iterations};

/// Stopping criteria of one scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleBudget {
    pub iterations: usize,
    /// Relative function tolerance between consecutive losses.
    pub rel_ftol: f64,
    pub initial_lr: f64,
}

/// What happened during one scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleOutcome {
    pub scale: usize,
    pub iterations: usize,
    pub final_loss: f64,
    pub converged: bool,
    pub num_control_points: usize,
}

/// Gradient-based optimization of the momentum of one shape pair.
pub struct Registration<B: AutodiffBackend> {
    optimizer: BoxedOptimizer<B>,
    schedule: LearningRateSchedule,
}

impl<B: AutodiffBackend> Registration<B> {
    pub fn new(optimizer: BoxedOptimizer<B>, schedule: LearningRateSchedule) -> Self {
        Self { optimizer, schedule }
    }

    /// Run up to `budget.iterations` optimizer steps on `pair`.
    ///
    /// Each iteration evaluates the model, backpropagates into the momentum
    /// and steps the optimizer. The loop exits early once two consecutive
    /// losses agree within `budget.rel_ftol`.
    ///
    /// # Errors
    /// A non-finite loss or momentum aborts the scale with
    /// `NumericalInstability`; the pair keeps its last finite momentum.
    /// On success the flowed shape matches the final momentum.
    pub fn execute(
        &mut self,
        model: &mut dyn RegistrationModel<B>,
        pair: &mut ShapePair<B>,
        budget: ScaleBudget,
        scale: usize,
        tracker: &ProgressTracker,
    ) -> Result<ScaleOutcome> {
        validate_iterations(budget.iterations)?;
        model.init_reg_param(pair, false)?;

        let mut previous: Option<f64> = None;
        let mut final_loss = f64::NAN;
        let mut iterations = 0;
        let mut converged = false;

        for iter in 0..budget.iterations {
            let lr = self.schedule.get_lr(iter, budget.initial_lr);
            self.optimizer.set_learning_rate(lr);

            let breakdown = model.forward(pair)?;
            let value = breakdown.value();
            final_loss = value;
            tracker.update(scale, iter, Some(budget.iterations), value, lr, breakdown.metrics());

            if let Some(prev) = previous {
                if rel_ftol_converged(prev, value, budget.rel_ftol) {
                    tracing::info!(
                        "scale {} converged after {} iterations (loss {:.6})",
                        scale,
                        iter,
                        value
                    );
                    converged = true;
                    break;
                }
            }
            previous = Some(value);

            let grads = breakdown.loss.backward();
            let param = pair.take_reg_param()?;
            let last_finite = param.clone();
            let grads = GradientsParams::from_grads(grads, &param);
            let param = self.optimizer.step(param, grads);
            if let Err(err) = ensure_finite("reg_param", &param.val()) {
                pair.set_reg_param(last_finite)?;
                return Err(err);
            }
            pair.set_reg_param(param)?;
            iterations = iter + 1;
        }

        // flowed results must describe the final momentum
        model.deform(pair)?;

        Ok(ScaleOutcome {
            scale,
            iterations,
            final_loss,
            converged,
            num_control_points: pair.control_points().dims()[1],
        })
    }
}
