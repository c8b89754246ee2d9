//! Optimizer and learning-rate scheduler traits.

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::AutodiffBackend;

/// Updates a differentiable parameter from its gradients.
///
/// In registration `M` is the momentum field of a shape pair; solvers only
/// talk to optimizers through this trait so the algorithm can be picked from
/// a configuration key.
///
/// # Examples
///
/// ```rust,ignore
/// use shapeflow_registration::optimizer::{GradientDescent, Optimizer};
///
/// let mut optimizer = GradientDescent::gradient_descent(0.01);
/// let param = optimizer.step(param, grads);
/// ```
pub trait Optimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    /// Consume the parameter and return its updated value.
    fn step(&mut self, module: M, gradients: GradientsParams) -> M;

    fn learning_rate(&self) -> f64;

    /// Used by the solver to apply its schedule before each step.
    fn set_learning_rate(&mut self, lr: f64);
}

/// Learning rate as a function of the iteration within a scale.
pub trait LearningRateScheduler: Send + Sync {
    fn get_lr(&self, step: usize, initial_lr: f64) -> f64;
}
