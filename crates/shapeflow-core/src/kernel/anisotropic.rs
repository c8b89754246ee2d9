//! Anisotropic Gaussian kernel shaped by local point-cloud moments.
//!
//! Each source point `y_j` carries a metric `Γ_j` estimated from the
//! Gaussian-weighted covariance of its neighbourhood. The kernel weight is
//! `exp(-0.5 (x - y_j)ᵀ Γ_j (x - y_j))`, so the support stretches along the
//! principal directions of the local structure (e.g. along vessels).
//!
//! `Γ` is computed on the host with `nalgebra` and is never differentiated.

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::error::{CoreError, Result};
use crate::geometry::{check_compatible, host_values, pairwise_differences};

/// Configuration of the local-moment metric.
#[derive(Config, Debug, PartialEq)]
pub struct AnisotropyConfig {
    /// Bandwidth of the neighbourhood used for the local covariance.
    #[config(default = "0.05")]
    pub cov_sigma_scale: f64,
    /// Kernel scale along the principal direction.
    #[config(default = "0.05")]
    pub aniso_kernel_scale: f64,
    /// Floor for the normalised eigenvalues (`λ / λ_max`).
    #[config(default = "0.1")]
    pub eigenvalue_min: f64,
    /// Replace the normalised eigenvalues, largest first.
    pub principal_weight: Option<Vec<f64>>,
    /// Re-estimate the covariance with the first-pass anisotropic weights.
    #[config(default = "false")]
    pub iter_twice: bool,
    /// Blend sparse neighbourhoods toward an isotropic metric by their mass.
    #[config(default = "false")]
    pub leaf_decay: bool,
    /// Center the covariance on the point itself instead of the local mean.
    #[config(default = "false")]
    pub self_center: bool,
    /// Estimate `Γ` once and reuse it while the points move.
    #[config(default = "false")]
    pub fixed: bool,
}

impl AnisotropyConfig {
    /// # Errors
    /// Returns `InvalidConfiguration` for non-positive scales or an eigenvalue
    /// floor outside `(0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if !(self.cov_sigma_scale > 0.0) || !(self.aniso_kernel_scale > 0.0) {
            return Err(CoreError::invalid_configuration(format!(
                "anisotropic kernel scales must be positive, got cov_sigma_scale={} aniso_kernel_scale={}",
                self.cov_sigma_scale, self.aniso_kernel_scale
            )));
        }
        if !(self.eigenvalue_min > 0.0 && self.eigenvalue_min <= 1.0) {
            return Err(CoreError::invalid_configuration(format!(
                "eigenvalue_min must lie in (0, 1], got {}",
                self.eigenvalue_min
            )));
        }
        if let Some(weights) = &self.principal_weight {
            if weights.iter().any(|w| !(*w > 0.0)) {
                return Err(CoreError::invalid_configuration(
                    "principal weights must be positive",
                ));
            }
        }
        Ok(())
    }
}

/// Estimate the per-point metric `Γ`, `[B, N, D, D]`, detached.
///
/// # Arguments
/// * `points` - `[B, N, D]`
/// * `weights` - `[B, N, 1]` point masses
pub fn estimate_gamma<B: Backend>(
    config: &AnisotropyConfig,
    points: &Tensor<B, 3>,
    weights: &Tensor<B, 3>,
) -> Result<Tensor<B, 4>> {
    config.validate()?;
    let [batch, n, dim] = points.dims();
    if weights.dims() != [batch, n, 1] {
        return Err(CoreError::shape_mismatch("anisotropic kernel weights", [batch, n, 1], weights.dims()));
    }
    if let Some(pw) = &config.principal_weight {
        if pw.len() != dim {
            return Err(CoreError::invalid_configuration(format!(
                "{} principal weights given for {}D points",
                pw.len(),
                dim
            )));
        }
    }
    let xs = host_values(&points.clone().detach())?;
    let ws = host_values(&weights.clone().detach())?;

    let mut gamma = Vec::with_capacity(batch * n * dim * dim);
    for b in 0..batch {
        let pts: Vec<DVector<f64>> = (0..n)
            .map(|i| DVector::from_iterator(dim, xs[(b * n + i) * dim..(b * n + i + 1) * dim].iter().map(|v| *v as f64)))
            .collect();
        let mass: Vec<f64> = ws[b * n..(b + 1) * n].iter().map(|v| *v as f64).collect();

        let isotropic = DMatrix::<f64>::identity(dim, dim) / (config.cov_sigma_scale * config.cov_sigma_scale);
        let first = local_metrics(config, &pts, &mass, |_| isotropic.clone());
        let metrics = if config.iter_twice {
            let first_pass: Vec<DMatrix<f64>> = first
                .iter()
                .map(|m| metric_from_spectrum(config, m, config.cov_sigma_scale))
                .collect();
            local_metrics(config, &pts, &mass, |i| first_pass[i].clone())
        } else {
            first
        };

        let max_mass = metrics.iter().map(|m| m.neighbor_mass).fold(0.0f64, f64::max);
        for m in &metrics {
            let mut m = m.clone();
            if config.leaf_decay && max_mass > 0.0 {
                let alpha = (m.neighbor_mass / max_mass).clamp(0.0, 1.0);
                m.normalized = m.normalized.map(|l| alpha * l + (1.0 - alpha));
            }
            let g = metric_from_spectrum(config, &m, config.aniso_kernel_scale);
            // nalgebra is column-major; Γ is symmetric so the order is irrelevant
            gamma.extend(g.iter().map(|v| *v as f32));
        }
    }
    let device = points.device();
    Ok(Tensor::from_data(TensorData::new(gamma, [batch, n, dim, dim]), &device))
}

#[derive(Debug, Clone)]
struct LocalSpectrum {
    eigenvectors: DMatrix<f64>,
    normalized: DVector<f64>,
    neighbor_mass: f64,
}

fn local_metrics<F>(config: &AnisotropyConfig, pts: &[DVector<f64>], mass: &[f64], metric: F) -> Vec<LocalSpectrum>
where
    F: Fn(usize) -> DMatrix<f64>,
{
    let dim = pts.first().map(|p| p.len()).unwrap_or(0);
    pts.iter()
        .enumerate()
        .map(|(i, xi)| {
            let m = metric(i);
            let w: Vec<f64> = pts
                .iter()
                .zip(mass)
                .map(|(xj, mj)| {
                    let d = xj - xi;
                    mj * (-0.5 * d.dot(&(&m * &d))).exp()
                })
                .collect();
            let total: f64 = w.iter().sum();
            let denom = total.max(1e-12);
            let center = if config.self_center {
                xi.clone()
            } else {
                pts.iter().zip(&w).fold(DVector::zeros(dim), |acc, (xj, wj)| acc + xj * *wj) / denom
            };
            let cov = pts.iter().zip(&w).fold(DMatrix::zeros(dim, dim), |acc, (xj, wj)| {
                let d = xj - &center;
                acc + (&d * d.transpose()) * *wj
            }) / denom;

            let eigen = SymmetricEigen::new(cov);
            let lambda_max = eigen.eigenvalues.max();
            let normalized = if lambda_max > 0.0 {
                eigen
                    .eigenvalues
                    .map(|l| (l / lambda_max).max(config.eigenvalue_min))
            } else {
                DVector::from_element(dim, 1.0)
            };
            LocalSpectrum {
                eigenvectors: eigen.eigenvectors,
                normalized,
                neighbor_mass: total,
            }
        })
        .collect()
}

/// `Γ = Σ_k u_k u_kᵀ / (s² λ̂_k)`
fn metric_from_spectrum(config: &AnisotropyConfig, spectrum: &LocalSpectrum, scale: f64) -> DMatrix<f64> {
    let dim = spectrum.normalized.len();
    let lambdas = match &config.principal_weight {
        Some(pw) => {
            let mut order: Vec<usize> = (0..dim).collect();
            order.sort_by(|a, b| {
                spectrum.normalized[*b]
                    .partial_cmp(&spectrum.normalized[*a])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let mut out = DVector::zeros(dim);
            for (rank, idx) in order.into_iter().enumerate() {
                out[idx] = pw[rank];
            }
            out
        }
        None => spectrum.normalized.clone(),
    };
    let mut gamma = DMatrix::zeros(dim, dim);
    for k in 0..dim {
        let u = spectrum.eigenvectors.column(k);
        gamma += (u * u.transpose()) / (scale * scale * lambdas[k]);
    }
    gamma
}

/// Anisotropic weights `exp(-0.5 (x_i - y_j)ᵀ Γ_j (x_i - y_j))`, `[B, M, N]`.
pub fn anisotropic_matrix<B: Backend>(x: Tensor<B, 3>, y: Tensor<B, 3>, gamma: Tensor<B, 4>) -> Result<Tensor<B, 3>> {
    check_compatible("anisotropic kernel", &x, &y)?;
    let [b, n, d] = y.dims();
    if gamma.dims() != [b, n, d, d] {
        return Err(CoreError::shape_mismatch("anisotropic kernel gamma", [b, n, d, d], gamma.dims()));
    }
    let diff = pairwise_differences(x, y);
    let projected = (gamma.unsqueeze_dim::<5>(1) * diff.clone().unsqueeze_dim::<5>(3))
        .sum_dim(4)
        .squeeze::<4>(4);
    let quad = (projected * diff).sum_dim(3).squeeze::<3>(3);
    Ok(quad.mul_scalar(-0.5).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn line(device: &<B as Backend>::Device) -> (Tensor<B, 3>, Tensor<B, 3>) {
        // points spread along x with a tiny y jitter
        let values: Vec<f32> = (0..9)
            .flat_map(|i| [i as f32 * 0.02, if i % 2 == 0 { 0.001 } else { -0.001 }])
            .collect();
        let points = Tensor::from_data(TensorData::new(values, [1, 9, 2]), device);
        let weights = Tensor::ones([1, 9, 1], device).div_scalar(9.0);
        (points, weights)
    }

    #[test]
    fn test_gamma_stretches_along_line() {
        let device = Default::default();
        let (points, weights) = line(&device);
        let config = AnisotropyConfig::new();
        let gamma = estimate_gamma(&config, &points, &weights).unwrap();
        assert_eq!(gamma.dims(), [1, 9, 2, 2]);

        let g = host_values(&gamma).unwrap();
        // middle point: small penalty along x, large along y
        let center = &g[4 * 4..5 * 4];
        assert!(center[0] < center[3]);
    }

    #[test]
    fn test_eigenvalue_floor_bounds_gamma() {
        let device = Default::default();
        let (points, weights) = line(&device);
        let config = AnisotropyConfig::new().with_eigenvalue_min(0.5);
        let gamma = estimate_gamma(&config, &points, &weights).unwrap();
        let g = host_values(&gamma).unwrap();
        let s2 = 0.05f32 * 0.05;
        for chunk in g.chunks(4) {
            assert!(chunk[3] <= 1.0 / (s2 * 0.5) + 1.0);
        }
    }

    #[test]
    fn test_weights_are_one_at_source() {
        let device = Default::default();
        let (points, weights) = line(&device);
        let gamma = estimate_gamma(&AnisotropyConfig::new(), &points, &weights).unwrap();
        let k = anisotropic_matrix(points.clone(), points, gamma).unwrap();
        let k = host_values(&k).unwrap();
        for i in 0..9 {
            assert!((k[i * 9 + i] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rejects_bad_floor() {
        assert!(AnisotropyConfig::new().with_eigenvalue_min(0.0).validate().is_err());
        assert!(AnisotropyConfig::new().with_cov_sigma_scale(-1.0).validate().is_err());
    }
}
