//! Kinetic energy of the initial momentum under the kernel metric.
//!
//! The squared geodesic length of an LDDMM path equals the kinetic energy at
//! `t = 0`:
//!
//! R(p, x) = mean( p ⊙ K(x, x) p )
//!
//! with `p` clamped to `[-1, 1]` like in the dynamics.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use shapeflow_core::{GaussianKernel, Kernel};

use super::trait_::Regularizer;
use crate::lddmm::module::clamp_momentum;

/// Geodesic distance regularizer.
#[derive(Debug, Clone, PartialEq)]
pub struct GeodesicDistance {
    kernel: GaussianKernel,
}

impl GeodesicDistance {
    /// Use the deformation kernel of the LDDMM module.
    pub fn new(kernel: GaussianKernel) -> Self {
        Self { kernel }
    }
}

impl<B: Backend> Regularizer<B> for GeodesicDistance {
    fn compute_loss(&self, momentum: Tensor<B, 3>, control_points: Tensor<B, 3>) -> Tensor<B, 1> {
        let p = clamp_momentum(momentum);
        let kp = Kernel::<B>::convolve(&self.kernel, control_points.clone(), control_points, p.clone());
        (p * kp).mean()
    }

    fn name(&self) -> &'static str {
        "GeodesicDistance"
    }
}
