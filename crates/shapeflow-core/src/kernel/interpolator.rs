//! Kernel interpolation between point sets.
//!
//! `convolve(x, y, v)[i] = Σ_j w(x_i, y_j) v_j`, optionally normalised by
//! `Σ_j w(x_i, y_j)` (Nadaraya–Watson). Used for velocity fields and for
//! moving momentum between control point sets of different resolution.

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use super::anisotropic::{anisotropic_matrix, estimate_gamma, AnisotropyConfig};
use super::gaussian::{GaussianKernel, GaussianKernelConfig};
use super::trait_::Kernel;
use crate::error::{CoreError, Result};
use crate::geometry::check_compatible;

/// Kernel family used by an interpolator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InterpolatorKernel {
    Gaussian(GaussianKernelConfig),
    Anisotropic(AnisotropyConfig),
}

impl Default for InterpolatorKernel {
    fn default() -> Self {
        Self::Gaussian(GaussianKernelConfig::new())
    }
}

/// Configuration for [`KernelInterpolator`].
#[derive(Config, Debug, PartialEq)]
pub struct KernelInterpolatorConfig {
    #[config(default = "InterpolatorKernel::default()")]
    pub kernel: InterpolatorKernel,
    /// Divide by the kernel mass (Nadaraya–Watson).
    #[config(default = "false")]
    pub normalized: bool,
    /// Floor of the Nadaraya–Watson denominator.
    #[config(default = "1e-7")]
    pub eps: f64,
}

impl KernelInterpolatorConfig {
    pub fn init<B: Backend>(&self) -> Result<KernelInterpolator<B>> {
        if !(self.eps > 0.0) {
            return Err(CoreError::invalid_configuration(format!(
                "interpolator eps must be positive, got {}",
                self.eps
            )));
        }
        let kernel = match &self.kernel {
            InterpolatorKernel::Gaussian(config) => ResolvedKernel::Gaussian(config.init()?),
            InterpolatorKernel::Anisotropic(config) => {
                config.validate()?;
                ResolvedKernel::Anisotropic {
                    config: config.clone(),
                    fixed_gamma: None,
                }
            }
        };
        Ok(KernelInterpolator {
            kernel,
            normalized: self.normalized,
            eps: self.eps,
        })
    }
}

#[derive(Debug, Clone)]
enum ResolvedKernel<B: Backend> {
    Gaussian(GaussianKernel),
    Anisotropic {
        config: AnisotropyConfig,
        fixed_gamma: Option<Tensor<B, 4>>,
    },
}

/// Batched, differentiable kernel convolution.
#[derive(Debug, Clone)]
pub struct KernelInterpolator<B: Backend> {
    kernel: ResolvedKernel<B>,
    normalized: bool,
    eps: f64,
}

impl<B: Backend> KernelInterpolator<B> {
    /// Un-normalised single-bandwidth Gaussian interpolator.
    pub fn gaussian(sigma: f64) -> Result<Self> {
        Ok(Self {
            kernel: ResolvedKernel::Gaussian(GaussianKernel::new(sigma)?),
            normalized: false,
            eps: 1e-7,
        })
    }

    pub fn with_normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Kernel weights `[B, M, N]` between query points and source points.
    pub fn weights(
        &self,
        query: Tensor<B, 3>,
        source: Tensor<B, 3>,
        source_weights: Option<Tensor<B, 3>>,
    ) -> Result<Tensor<B, 3>> {
        check_compatible("kernel interpolator", &query, &source)?;
        match &self.kernel {
            ResolvedKernel::Gaussian(kernel) => Ok(kernel.matrix(query, source)),
            ResolvedKernel::Anisotropic { config, fixed_gamma } => {
                let gamma = match fixed_gamma {
                    Some(gamma) if gamma.dims()[..2] == source.dims()[..2] => gamma.clone(),
                    _ => {
                        let [b, n, _] = source.dims();
                        let mass = source_weights
                            .unwrap_or_else(|| Tensor::ones([b, n, 1], &source.device()).div_scalar(n as f64));
                        estimate_gamma(config, &source, &mass)?
                    }
                };
                anisotropic_matrix(query, source, gamma)
            }
        }
    }

    /// Convolve `values` (`[B, N, C]`) living on `source` onto `query`.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` when batch sizes, dimensions or the value
    /// layout disagree.
    pub fn convolve(&self, query: Tensor<B, 3>, source: Tensor<B, 3>, values: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        self.convolve_weighted(query, source, None, values)
    }

    /// [`KernelInterpolator::convolve`] with explicit source masses for the
    /// anisotropic metric estimate.
    pub fn convolve_weighted(
        &self,
        query: Tensor<B, 3>,
        source: Tensor<B, 3>,
        source_weights: Option<Tensor<B, 3>>,
        values: Tensor<B, 3>,
    ) -> Result<Tensor<B, 3>> {
        let [b, n, _] = source.dims();
        let [vb, vn, _] = values.dims();
        if vb != b || vn != n {
            return Err(CoreError::shape_mismatch(
                "kernel interpolator values",
                [b, n],
                [vb, vn],
            ));
        }
        let w = self.weights(query, source, source_weights)?;
        if self.normalized {
            let mass = w.clone().sum_dim(2).clamp_min(self.eps);
            Ok(w.matmul(values) / mass)
        } else {
            Ok(w.matmul(values))
        }
    }

    /// Freeze the anisotropic metric estimated on `points`.
    ///
    /// Has no effect for isotropic kernels or when the configuration does not
    /// ask for a fixed metric.
    pub fn fix_anisotropy(&mut self, points: &Tensor<B, 3>, weights: &Tensor<B, 3>) -> Result<()> {
        if let ResolvedKernel::Anisotropic { config, fixed_gamma } = &mut self.kernel {
            if config.fixed {
                *fixed_gamma = Some(estimate_gamma(config, points, weights)?);
                tracing::debug!("fixed anisotropic metric on {:?} points", points.dims());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::host_values;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn cloud(device: &<B as Backend>::Device) -> Tensor<B, 3> {
        Tensor::from_data(
            TensorData::from([[[0.0, 0.0], [0.1, 0.0], [0.0, 0.1], [0.2, 0.2]]]),
            device,
        )
    }

    #[test]
    fn test_far_query_does_not_produce_nan() {
        let device = Default::default();
        let interp = KernelInterpolator::<B>::gaussian(0.01).unwrap().with_normalized(true);
        let query = Tensor::<B, 3>::from_data(TensorData::from([[[100.0, 100.0]]]), &device);
        let values = Tensor::<B, 3>::ones([1, 4, 2], &device);
        let out = interp.convolve(query, cloud(&device), values).unwrap();
        let out = host_values(&out).unwrap();
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_rejects_value_layout() {
        let device = Default::default();
        let interp = KernelInterpolator::<B>::gaussian(0.1).unwrap();
        let values = Tensor::<B, 3>::ones([1, 3, 2], &device);
        assert!(matches!(
            interp.convolve(cloud(&device), cloud(&device), values),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_fixed_anisotropy_is_reused() {
        let device = Default::default();
        let config = KernelInterpolatorConfig::new().with_kernel(InterpolatorKernel::Anisotropic(
            AnisotropyConfig::new().with_fixed(true),
        ));
        let mut interp: KernelInterpolator<B> = config.init().unwrap();
        let points = cloud(&device);
        let weights = Tensor::<B, 3>::ones([1, 4, 1], &device).div_scalar(4.0);
        interp.fix_anisotropy(&points, &weights).unwrap();

        // moving the source does not change the frozen metric
        let moved = points.clone().mul_scalar(2.0);
        let w_fixed = interp.weights(points.clone(), points.clone(), None).unwrap();
        let w_moved = interp.weights(points.clone(), moved, None).unwrap();
        assert_eq!(w_fixed.dims(), w_moved.dims());
        assert!(matches!(interp.kernel, ResolvedKernel::Anisotropic { fixed_gamma: Some(_), .. }));
    }
}
