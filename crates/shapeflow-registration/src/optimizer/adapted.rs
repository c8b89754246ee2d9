//! First-order optimizers backed by Burn's optimizer adaptor.
//!
//! Burn keeps the per-parameter state (velocity, moment estimates) keyed by
//! the momentum field's parameter id, so one adaptor instance must follow a
//! single shape pair through its scale.

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer as BurnOptimizer, SimpleOptimizer, Sgd, SgdConfig};
use burn::tensor::backend::AutodiffBackend;

use super::Optimizer;

/// A Burn optimizer stepped with an externally scheduled learning rate.
pub struct AdaptedOptimizer<O, M, B>
where
    O: SimpleOptimizer<B::InnerBackend>,
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    optimizer: OptimizerAdaptor<O, M, B>,
    learning_rate: f64,
}

/// Plain gradient descent.
pub type GradientDescent<M, B> = AdaptedOptimizer<Sgd<<B as AutodiffBackend>::InnerBackend>, M, B>;
/// Gradient descent with heavy-ball or Nesterov momentum.
pub type Momentum<M, B> = AdaptedOptimizer<Sgd<<B as AutodiffBackend>::InnerBackend>, M, B>;
pub type AdamOptimizer<M, B> = AdaptedOptimizer<Adam, M, B>;

impl<M: AutodiffModule<B>, B: AutodiffBackend> AdaptedOptimizer<Sgd<B::InnerBackend>, M, B> {
    pub fn gradient_descent(learning_rate: f64) -> Self {
        Self {
            optimizer: SgdConfig::new().init(),
            learning_rate,
        }
    }

    /// # Arguments
    /// * `momentum` - Velocity decay factor in `[0, 1)`
    /// * `nesterov` - Use the look-ahead update
    pub fn momentum(learning_rate: f64, momentum: f64, nesterov: bool) -> Self {
        let momentum = MomentumConfig::new()
            .with_momentum(momentum)
            .with_nesterov(nesterov);
        Self {
            optimizer: SgdConfig::new().with_momentum(Some(momentum)).init(),
            learning_rate,
        }
    }
}

impl<M: AutodiffModule<B>, B: AutodiffBackend> AdaptedOptimizer<Adam, M, B> {
    /// Adam with explicit moment decay rates.
    ///
    /// The per-coordinate scaling keeps the step insensitive to the gradient
    /// magnitude, which changes a lot between coarse and fine scales.
    pub fn adam(learning_rate: f64, beta_1: f32, beta_2: f32, epsilon: f32) -> Self {
        let config = AdamConfig::new()
            .with_beta_1(beta_1)
            .with_beta_2(beta_2)
            .with_epsilon(epsilon);
        Self {
            optimizer: config.init(),
            learning_rate,
        }
    }
}

impl<O, M, B> Optimizer<M, B> for AdaptedOptimizer<O, M, B>
where
    O: SimpleOptimizer<B::InnerBackend>,
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    fn step(&mut self, module: M, gradients: GradientsParams) -> M {
        self.optimizer.step(self.learning_rate, module, gradients)
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }
}
