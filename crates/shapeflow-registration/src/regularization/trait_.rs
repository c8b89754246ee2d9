//! Regularizer trait definition.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Penalty on the registration parameter.
///
/// # Type Parameters
/// * `B` - The backend type
pub trait Regularizer<B: Backend> {
    /// Scalar penalty `[1]` of a momentum field living on `control_points`.
    fn compute_loss(&self, momentum: Tensor<B, 3>, control_points: Tensor<B, 3>) -> Tensor<B, 1>;

    fn name(&self) -> &'static str;
}
