//! Isotropic multi-bandwidth Gaussian kernel.

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::trait_::Kernel;
use crate::error::{CoreError, Result};
use crate::geometry::pairwise_sq_distances;

/// Configuration for [`GaussianKernel`].
#[derive(Config, Debug, PartialEq)]
pub struct GaussianKernelConfig {
    /// Bandwidths of the mixture components.
    #[config(default = "vec![0.1]")]
    pub sigmas: Vec<f64>,
    /// Mixture weights, one per bandwidth. Uniform `1/S` when unset.
    pub weights: Option<Vec<f64>>,
}

impl GaussianKernelConfig {
    /// Validate the configuration and build the kernel.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` for an empty or non-positive bandwidth
    /// list, or mixture weights that do not match it.
    pub fn init(&self) -> Result<GaussianKernel> {
        if self.sigmas.is_empty() {
            return Err(CoreError::invalid_configuration("gaussian kernel needs at least one sigma"));
        }
        if let Some(sigma) = self.sigmas.iter().find(|s| !(**s > 0.0 && s.is_finite())) {
            return Err(CoreError::invalid_configuration(format!(
                "gaussian kernel sigma must be positive and finite, got {}",
                sigma
            )));
        }
        let weights = match &self.weights {
            Some(weights) => {
                if weights.len() != self.sigmas.len() {
                    return Err(CoreError::invalid_configuration(format!(
                        "gaussian kernel has {} sigmas but {} weights",
                        self.sigmas.len(),
                        weights.len()
                    )));
                }
                if weights.iter().any(|w| *w < 0.0 || !w.is_finite()) {
                    return Err(CoreError::invalid_configuration(
                        "gaussian kernel weights must be non-negative",
                    ));
                }
                weights.clone()
            }
            None => vec![1.0 / self.sigmas.len() as f64; self.sigmas.len()],
        };
        Ok(GaussianKernel {
            sigmas: self.sigmas.clone(),
            weights,
        })
    }
}

/// `k(x, y) = Σ_s w_s exp(-|x - y|² / (2 σ_s²))`
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    sigmas: Vec<f64>,
    weights: Vec<f64>,
}

impl GaussianKernel {
    /// Single-bandwidth kernel.
    pub fn new(sigma: f64) -> Result<Self> {
        GaussianKernelConfig::new().with_sigmas(vec![sigma]).init()
    }

    pub fn sigmas(&self) -> &[f64] {
        &self.sigmas
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Kernel matrix and the matrix of `-∂k/∂(|x-y|²/2)`, from one distance pass.
    ///
    /// The second matrix is `Σ_s w_s exp(-d²/(2σ_s²)) / σ_s²`, so that
    /// `∇_x k(x, y) = -(x - y) G(x, y)`.
    pub fn matrix_and_gradient<B: Backend>(
        &self,
        x: Tensor<B, 3>,
        y: Tensor<B, 3>,
    ) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let d2 = pairwise_sq_distances(x, y);
        let mut matrix = d2.zeros_like();
        let mut gradient = d2.zeros_like();
        for (sigma, weight) in self.sigmas.iter().zip(&self.weights) {
            let k = d2.clone().div_scalar(-2.0 * sigma * sigma).exp().mul_scalar(*weight);
            gradient = gradient + k.clone().div_scalar(sigma * sigma);
            matrix = matrix + k;
        }
        (matrix, gradient)
    }

    /// `G(x, y) = Σ_s w_s exp(-|x-y|²/(2σ_s²)) / σ_s²`, `[B, M, N]`.
    pub fn gradient_matrix<B: Backend>(&self, x: Tensor<B, 3>, y: Tensor<B, 3>) -> Tensor<B, 3> {
        self.matrix_and_gradient(x, y).1
    }
}

impl<B: Backend> Kernel<B> for GaussianKernel {
    fn matrix(&self, x: Tensor<B, 3>, y: Tensor<B, 3>) -> Tensor<B, 3> {
        let d2 = pairwise_sq_distances(x, y);
        let mut out = d2.zeros_like();
        for (sigma, weight) in self.sigmas.iter().zip(&self.weights) {
            out = out + d2.clone().div_scalar(-2.0 * sigma * sigma).exp().mul_scalar(*weight);
        }
        out
    }
}
