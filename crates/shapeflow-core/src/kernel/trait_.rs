//! Kernel trait for point-set convolutions.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// A positive kernel between two batched point sets.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Kernel<B: Backend> {
    /// Kernel weights between every query and source point.
    ///
    /// # Arguments
    /// * `x` - Query points `[B, M, D]`
    /// * `y` - Source points `[B, N, D]`
    ///
    /// # Returns
    /// Weight matrix `[B, M, N]`
    fn matrix(&self, x: Tensor<B, 3>, y: Tensor<B, 3>) -> Tensor<B, 3>;

    /// `out[i] = Σ_j k(x_i, y_j) values[j]`, `[B, M, C]`.
    fn convolve(&self, x: Tensor<B, 3>, y: Tensor<B, 3>, values: Tensor<B, 3>) -> Tensor<B, 3> {
        self.matrix(x, y).matmul(values)
    }
}
