//! Batched point-set tensor helpers.
//!
//! Point sets are stored as `[Batch, N, D]` tensors. The helpers here are the
//! building blocks shared by kernels, losses and samplers.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

use crate::error::{CoreError, Result};

/// Squared Euclidean distances between every pair of points.
///
/// # Arguments
/// * `x` - Points `[B, M, D]`
/// * `y` - Points `[B, N, D]`
///
/// # Returns
/// Tensor `[B, M, N]` with `|x_i - y_j|^2`
pub fn pairwise_sq_distances<B: Backend>(x: Tensor<B, 3>, y: Tensor<B, 3>) -> Tensor<B, 3> {
    let diff = pairwise_differences(x, y);
    (diff.clone() * diff).sum_dim(3).squeeze::<3>(3)
}

/// Differences `x_i - y_j` for every pair of points, `[B, M, N, D]`.
pub fn pairwise_differences<B: Backend>(x: Tensor<B, 3>, y: Tensor<B, 3>) -> Tensor<B, 4> {
    x.unsqueeze_dim::<4>(2) - y.unsqueeze_dim::<4>(1)
}

/// Check that two point sets share batch size and spatial dimension.
pub fn check_compatible<B: Backend>(
    component: &str,
    x: &Tensor<B, 3>,
    y: &Tensor<B, 3>,
) -> Result<()> {
    let [bx, _, dx] = x.dims();
    let [by, _, dy] = y.dims();
    if bx != by || dx != dy {
        return Err(CoreError::shape_mismatch(component, x.dims(), y.dims()));
    }
    Ok(())
}

/// Read a tensor back to the host as `f32` values in row-major order.
pub fn host_values<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .to_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CoreError::data(format!("cannot read tensor {:?}: {:?}", tensor.dims(), e)))
}

/// Whether every element of the tensor is finite.
///
/// A single NaN or infinity makes the absolute sum non-finite, so one scalar
/// readback is enough.
pub fn all_finite<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> bool {
    let total = tensor.clone().abs().sum().into_scalar().elem::<f64>();
    total.is_finite()
}

/// Largest absolute element-wise difference between two tensors.
pub fn max_abs_diff<B: Backend, const D: usize>(a: &Tensor<B, D>, b: &Tensor<B, D>) -> f64 {
    (a.clone() - b.clone()).abs().max().into_scalar().elem::<f64>()
}
