//! Weighted point-to-point squared distance.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use shapeflow_core::Shape;

use super::trait_::{FeatureAttr, SimilarityLoss};
use crate::error::{RegistrationError, Result};

/// `Σ_i w_i |a_i - b_i|²`, averaged over the batch.
///
/// Assumes point-wise correspondence: both shapes must have the same number
/// of points. The weights are the flowed shape's.
#[derive(Debug, Clone, Default)]
pub struct L2Distance {
    attr: FeatureAttr,
}

impl L2Distance {
    pub fn new(attr: FeatureAttr) -> Self {
        Self { attr }
    }
}

impl<B: Backend> SimilarityLoss<B> for L2Distance {
    fn forward(&self, flowed: &Shape<B>, target: &Shape<B>) -> Result<Tensor<B, 1>> {
        let a = self.attr.select(flowed);
        let b = self.attr.select(target);
        if a.dims() != b.dims() {
            return Err(RegistrationError::shape_mismatch("l2 loss", b.dims(), a.dims()));
        }
        let [batch, _, _] = a.dims();
        let diff = a - b;
        let sq = (diff.clone() * diff).sum_dim(2);
        Ok((sq * flowed.weights().clone()).sum().div_scalar(batch as f64))
    }

    fn name(&self) -> &'static str {
        "L2Distance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{ElementConversion, TensorData};
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_translation_distance() {
        let device = Default::default();
        let points = Tensor::<B, 3>::from_data(TensorData::from([[[0.0, 0.0], [1.0, 0.0]]]), &device);
        let flowed = Shape::new(points.clone()).unwrap();
        let target = Shape::new(points.add_scalar(0.5)).unwrap();
        let loss = L2Distance::default()
            .forward(&flowed, &target)
            .unwrap()
            .into_scalar()
            .elem::<f32>();
        // each point is off by (0.5, 0.5) with weight 1/2
        assert!((loss - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mismatched_counts_fail() {
        let device = Default::default();
        let flowed = Shape::new(Tensor::<B, 3>::zeros([1, 3, 2], &device)).unwrap();
        let target = Shape::new(Tensor::<B, 3>::zeros([1, 4, 2], &device)).unwrap();
        let err = L2Distance::default().forward(&flowed, &target).unwrap_err();
        assert!(matches!(err, RegistrationError::ShapeMismatch { .. }));
    }
}
