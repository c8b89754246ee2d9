//! Kernel mean discrepancy between weighted point sets.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use shapeflow_core::geometry::check_compatible;
use shapeflow_core::{GaussianKernel, Kernel, Shape};

use super::trait_::{FeatureAttr, SimilarityLoss};
use crate::error::Result;

/// `½ αᵀK(a,a)α + ½ βᵀK(b,b)β - αᵀK(a,b)β` with a Gaussian kernel of width `blur`.
///
/// `α` and `β` are the point weights of the two shapes. No correspondence is
/// needed, so the point counts may differ.
#[derive(Debug, Clone)]
pub struct GaussianKernelDistance {
    kernel: GaussianKernel,
    attr: FeatureAttr,
}

impl GaussianKernelDistance {
    pub fn new(blur: f64, attr: FeatureAttr) -> Result<Self> {
        Ok(Self {
            kernel: GaussianKernel::new(blur)?,
            attr,
        })
    }

    pub fn blur(&self) -> f64 {
        self.kernel.sigmas()[0]
    }

    fn energy<B: Backend>(&self, x: Tensor<B, 3>, wx: Tensor<B, 3>, y: Tensor<B, 3>, wy: Tensor<B, 3>) -> Tensor<B, 3> {
        let k = Kernel::<B>::matrix(&self.kernel, x, y);
        wx.transpose().matmul(k.matmul(wy))
    }
}

impl<B: Backend> SimilarityLoss<B> for GaussianKernelDistance {
    fn forward(&self, flowed: &Shape<B>, target: &Shape<B>) -> Result<Tensor<B, 1>> {
        let a = self.attr.select(flowed);
        let b = self.attr.select(target);
        check_compatible("gaussian kernel loss", &a, &b)?;
        let alpha = flowed.weights().clone();
        let beta = target.weights().clone();
        let [batch, _, _] = a.dims();

        let aa = self.energy(a.clone(), alpha.clone(), a.clone(), alpha.clone());
        let bb = self.energy(b.clone(), beta.clone(), b.clone(), beta.clone());
        let ab = self.energy(a, alpha, b, beta);
        let mmd = aa.mul_scalar(0.5) + bb.mul_scalar(0.5) - ab;
        Ok(mmd.sum().div_scalar(batch as f64))
    }

    fn name(&self) -> &'static str {
        "GaussianKernelDistance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{ElementConversion, TensorData};
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn square(device: &<B as Backend>::Device, offset: f64) -> Shape<B> {
        let points = Tensor::<B, 3>::from_data(
            TensorData::from([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]]),
            device,
        );
        Shape::new(points.add_scalar(offset)).unwrap()
    }

    #[test]
    fn test_identical_sets_have_zero_distance() {
        let device = Default::default();
        let loss = GaussianKernelDistance::new(0.5, FeatureAttr::Points).unwrap();
        let value = loss
            .forward(&square(&device, 0.0), &square(&device, 0.0))
            .unwrap()
            .into_scalar()
            .elem::<f32>();
        assert!(value.abs() < 1e-6);
    }

    #[test]
    fn test_distance_grows_with_offset() {
        let device = Default::default();
        let loss = GaussianKernelDistance::new(0.5, FeatureAttr::Points).unwrap();
        let near = loss
            .forward(&square(&device, 0.0), &square(&device, 0.1))
            .unwrap()
            .into_scalar()
            .elem::<f32>();
        let far = loss
            .forward(&square(&device, 0.0), &square(&device, 0.5))
            .unwrap()
            .into_scalar()
            .elem::<f32>();
        assert!(near > 0.0);
        assert!(far > near);
    }
}
