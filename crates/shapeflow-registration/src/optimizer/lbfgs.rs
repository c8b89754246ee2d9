//! L-BFGS optimizer.
//!
//! Limited-memory BFGS with the standard two-loop recursion. The momentum
//! field is flattened, so the curvature pairs span every control point.

use crate::optimizer::Optimizer;
use burn::config::Config;
use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{GradientsParams, Optimizer as BurnOptimizer, SimpleOptimizer};
use burn::record::Record;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};
use std::marker::PhantomData;

/// L-BFGS configuration.
#[derive(Config, Debug)]
pub struct LbfgsConfig {
    /// Number of curvature pairs kept.
    #[config(default = 10)]
    pub history_size: usize,
    /// Step size along the quasi-Newton direction.
    #[config(default = 1.0)]
    pub learning_rate: f64,
    /// Largest allowed step norm; longer steps are rescaled.
    #[config(default = 1.0)]
    pub max_step_norm: f64,
}

impl LbfgsConfig {
    /// Initialize the L-BFGS optimizer.
    pub fn init<B: AutodiffBackend, M: AutodiffModule<B>>(&self) -> LbfgsOptimizer<M, B> {
        LbfgsOptimizer {
            optimizer: OptimizerAdaptor::from(LbfgsCore::new(self.history_size, self.max_step_norm)),
            learning_rate: self.learning_rate,
        }
    }
}

/// L-BFGS optimizer wrapper.
pub struct LbfgsOptimizer<M: AutodiffModule<B>, B: AutodiffBackend> {
    optimizer: OptimizerAdaptor<LbfgsCore<B::InnerBackend>, M, B>,
    learning_rate: f64,
}

impl<M: AutodiffModule<B>, B: AutodiffBackend> LbfgsOptimizer<M, B> {
    /// Create a new L-BFGS optimizer with the default history.
    pub fn new(learning_rate: f64) -> Self {
        LbfgsConfig::new().with_learning_rate(learning_rate).init()
    }
}

impl<M, B> Optimizer<M, B> for LbfgsOptimizer<M, B>
where
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

#[derive(Clone, Debug)]
struct LbfgsCore<B: Backend> {
    history_size: usize,
    max_step_norm: f64,
    _phantom: PhantomData<B>,
}

impl<B: Backend> LbfgsCore<B> {
    fn new(history_size: usize, max_step_norm: f64) -> Self {
        Self {
            history_size: history_size.max(1),
            max_step_norm,
            _phantom: PhantomData,
        }
    }

    /// Two-loop recursion: approximate `H⁻¹ g` from the stored pairs.
    fn direction(&self, state: &LbfgsState<B>, grad: Tensor<B, 1>) -> Tensor<B, 1> {
        let len = state.s_history.len();
        let mut q = grad;
        let mut alphas = Vec::with_capacity(len);
        for i in (0..len).rev() {
            let alpha = state.rho_history[i].clone() * (state.s_history[i].clone() * q.clone()).sum();
            q = q - state.y_history[i].clone() * alpha.clone();
            alphas.push(alpha);
        }

        let mut r = match (state.s_history.last(), state.y_history.last()) {
            (Some(s), Some(y)) => {
                // γ = sᵀy / yᵀy
                let gamma = (s.clone() * y.clone()).sum() / (y.clone() * y.clone()).sum();
                q * gamma
            }
            _ => q,
        };

        for i in 0..len {
            let alpha = alphas[len - 1 - i].clone();
            let beta = state.rho_history[i].clone() * (state.y_history[i].clone() * r.clone()).sum();
            r = r + state.s_history[i].clone() * (alpha - beta);
        }
        r
    }
}

/// L-BFGS state.
#[derive(Clone, Debug, Record)]
pub struct LbfgsState<B: Backend> {
    /// Parameter differences `x_k - x_{k-1}`.
    pub s_history: Vec<Tensor<B, 1>>,
    /// Gradient differences `g_k - g_{k-1}`.
    pub y_history: Vec<Tensor<B, 1>>,
    /// `1 / yᵀs` for each pair.
    pub rho_history: Vec<Tensor<B, 1>>,
    /// Previous flattened parameter.
    pub prev_param: Tensor<B, 1>,
    /// Previous flattened gradient.
    pub prev_grad: Tensor<B, 1>,
}

type State<B> = LbfgsState<B>;

impl<B: Backend> SimpleOptimizer<B> for LbfgsCore<B> {
    type State<const D: usize> = State<B>;

    fn step<const D: usize>(
        &self,
        lr: f64,
        tensor: Tensor<B, D>,
        grad: Tensor<B, D>,
        state: Option<Self::State<D>>,
    ) -> (Tensor<B, D>, Option<Self::State<D>>) {
        let shape = tensor.shape();
        let size = shape.num_elements();
        let x = tensor.reshape([size]);
        let g = grad.reshape([size]);

        let (direction, mut state) = match state {
            None => (
                g.clone(),
                LbfgsState {
                    s_history: Vec::new(),
                    y_history: Vec::new(),
                    rho_history: Vec::new(),
                    prev_param: x.clone(),
                    prev_grad: g.clone(),
                },
            ),
            Some(mut state) => {
                let s_k = x.clone() - state.prev_param.clone();
                let y_k = g.clone() - state.prev_grad.clone();
                let y_dot_s = (y_k.clone() * s_k.clone()).sum();

                // keep the pair only when the curvature condition holds
                if y_dot_s.clone().into_scalar().elem::<f64>() > 1e-10 {
                    if state.s_history.len() >= self.history_size {
                        state.s_history.remove(0);
                        state.y_history.remove(0);
                        state.rho_history.remove(0);
                    }
                    state.s_history.push(s_k);
                    state.y_history.push(y_k);
                    state.rho_history.push(y_dot_s.recip());
                }
                (self.direction(&state, g.clone()), state)
            }
        };

        let mut step = direction.mul_scalar(lr);
        let norm = step.clone().powf_scalar(2.0).sum().sqrt().into_scalar().elem::<f64>();
        if norm.is_finite() && norm > self.max_step_norm {
            step = step.mul_scalar(self.max_step_norm / norm);
        }
        let new_x = x.clone() - step;

        state.prev_param = x;
        state.prev_grad = g;
        (new_x.reshape(shape), Some(state))
    }

    fn to_device<const D: usize>(state: Self::State<D>, device: &B::Device) -> Self::State<D> {
        let move_all = |v: Vec<Tensor<B, 1>>| -> Vec<Tensor<B, 1>> { v.into_iter().map(|t| t.to_device(device)).collect() };
        LbfgsState {
            s_history: move_all(state.s_history),
            y_history: move_all(state.y_history),
            rho_history: move_all(state.rho_history),
            prev_param: state.prev_param.to_device(device),
            prev_grad: state.prev_grad.to_device(device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn::module::{Module, Param};
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray<f32>>;

    #[derive(Module, Debug)]
    struct Quadratic<B: Backend> {
        weight: Param<Tensor<B, 1>>,
    }

    #[test]
    fn test_lbfgs_quadratic() {
        let device = Default::default();
        let mut model = Quadratic::<TestBackend> {
            weight: Param::from_tensor(Tensor::from_floats([0.0, 0.0], &device).require_grad()),
        };
        let mut optimizer = LbfgsConfig::new().with_max_step_norm(10.0).init();
        let target = Tensor::<TestBackend, 1>::from_floats([2.0, -1.0], &device);
        let scale = Tensor::<TestBackend, 1>::from_floats([1.0, 4.0], &device);

        for _ in 0..25 {
            let diff = model.weight.val() - target.clone();
            let loss = (diff.clone() * diff * scale.clone()).sum();
            let grads = loss.backward();
            let grads_params = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(model, grads_params);
        }

        let result = model.weight.val().into_data().to_vec::<f32>().unwrap();
        assert!((result[0] - 2.0).abs() < 1e-2, "got {:?}", result);
        assert!((result[1] + 1.0).abs() < 1e-2, "got {:?}", result);
    }

    #[test]
    fn test_step_norm_is_capped() {
        let device = Default::default();
        let mut model = Quadratic::<TestBackend> {
            weight: Param::from_tensor(Tensor::from_floats([0.0], &device).require_grad()),
        };
        let mut optimizer = LbfgsConfig::new().with_max_step_norm(0.5).init();
        let loss = (model.weight.val() - Tensor::from_floats([100.0], &device)).powf_scalar(2.0).sum();
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optimizer.step(model, grads);
        let moved = model.weight.val().into_scalar().elem::<f32>();
        assert!((moved - 0.5).abs() < 1e-5);
    }
}
