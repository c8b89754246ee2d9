//! Registration parameter: the momentum field over the control points.

use burn::module::{Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};

/// Trainable momentum attached to the control points of a shape pair.
///
/// The tensor has the `[B, N, D]` layout of the control points. Wrapping it
/// in a `Module` lets the optimizers update it through `GradientsParams`.
#[derive(Module, Debug)]
pub struct RegParam<B: Backend> {
    momentum: Param<Tensor<B, 3>>,
}

impl<B: Backend> RegParam<B> {
    /// Wrap a momentum tensor, enabling gradient tracking on it.
    pub fn new(momentum: Tensor<B, 3>) -> Self {
        Self {
            momentum: Param::from_tensor(momentum.require_grad()),
        }
    }

    /// Near-zero momentum drawn from `N(0, std^2)` with the layout of `control_points`.
    pub fn noise_like(control_points: &Tensor<B, 3>, std: f64) -> Self {
        let momentum = Tensor::random(
            control_points.dims(),
            Distribution::Normal(0.0, std),
            &control_points.device(),
        );
        Self::new(momentum)
    }

    /// Zero momentum with the layout of `control_points`.
    pub fn zeros_like(control_points: &Tensor<B, 3>) -> Self {
        Self::new(control_points.zeros_like())
    }

    /// Current momentum value (tracked by autodiff when the backend supports it).
    pub fn val(&self) -> Tensor<B, 3> {
        self.momentum.val()
    }

    pub fn dims(&self) -> [usize; 3] {
        self.momentum.val().dims()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_noise_like_is_small() {
        let device = Default::default();
        let cp = Tensor::<B, 3>::ones([2, 16, 3], &device);
        let param = RegParam::noise_like(&cp, 1e-7);
        assert_eq!(param.dims(), [2, 16, 3]);
        let max = param.val().abs().max().into_scalar().elem::<f64>();
        assert!(max < 1e-5);
    }
}
