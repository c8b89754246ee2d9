//! Seeded random subsampling.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{CoreError, Result};

/// Draw `num_points` points per batch element without replacement.
///
/// The same index set is used for every batch element. Weights are rescaled
/// so each batch element keeps its total mass. When `num_points` is not
/// smaller than the point count the input is returned unchanged.
pub fn uniform_sample<B: Backend>(
    points: &Tensor<B, 3>,
    weights: &Tensor<B, 3>,
    num_points: usize,
    seed: u64,
) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
    if num_points == 0 {
        return Err(CoreError::invalid_configuration("uniform sampler needs at least one point"));
    }
    let [_, n, _] = points.dims();
    let points = points.clone().detach();
    let weights = weights.clone().detach();
    if num_points >= n {
        return Ok((points, weights));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<i64> = rand::seq::index::sample(&mut rng, n, num_points)
        .into_iter()
        .map(|i| i as i64)
        .collect();
    indices.sort_unstable();

    let device = points.device();
    let index = Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [num_points]), &device);
    let sampled_points = points.select(1, index.clone());
    let sampled_weights = weights.clone().select(1, index);

    let total = weights.sum_dim(1);
    let kept = sampled_weights.clone().sum_dim(1).clamp_min(1e-12);
    let sampled_weights = sampled_weights * (total / kept);
    tracing::debug!("uniform sampler kept {} of {} points (seed {})", num_points, n, seed);
    Ok((sampled_points, sampled_weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::host_values;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_keeps_mass_and_is_seeded() {
        let device = Default::default();
        let points = Tensor::<B, 3>::random([2, 50, 3], burn::tensor::Distribution::Default, &device);
        let weights = Tensor::<B, 3>::ones([2, 50, 1], &device).div_scalar(50.0);

        let (p1, w1) = uniform_sample(&points, &weights, 10, 7).unwrap();
        let (p2, _) = uniform_sample(&points, &weights, 10, 7).unwrap();
        assert_eq!(p1.dims(), [2, 10, 3]);
        assert_eq!(host_values(&p1).unwrap(), host_values(&p2).unwrap());

        let mass = host_values(&w1.sum_dim(1)).unwrap();
        assert!(mass.iter().all(|m| (m - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_oversized_request_returns_input() {
        let device = Default::default();
        let points = Tensor::<B, 3>::zeros([1, 4, 2], &device);
        let weights = Tensor::<B, 3>::ones([1, 4, 1], &device);
        let (p, _) = uniform_sample(&points, &weights, 8, 0).unwrap();
        assert_eq!(p.dims(), [1, 4, 2]);
    }
}
