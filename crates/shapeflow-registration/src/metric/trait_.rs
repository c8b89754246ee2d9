//! Similarity interfaces between a flowed shape and its target.
//!
//! Lower values indicate better alignment. Backends are plain trait objects so
//! a third-party loss can be plugged into the solver without touching it.

use std::fmt;
use std::str::FromStr;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use shapeflow_core::Shape;

use crate::error::{RegistrationError, Result};

/// Differentiable dissimilarity between two shapes.
///
/// # Type Parameters
/// * `B` - The tensor backend
pub trait SimilarityLoss<B: Backend> {
    /// Scalar loss `[1]`, averaged over the batch.
    ///
    /// # Arguments
    /// * `flowed` - The deformed source
    /// * `target` - The shape to match
    fn forward(&self, flowed: &Shape<B>, target: &Shape<B>) -> Result<Tensor<B, 1>>;

    /// Get the name of this loss.
    fn name(&self) -> &'static str;
}

/// Per-point attribute a similarity loss compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeatureAttr {
    #[default]
    Points,
    /// The point features, falling back to the points when a shape has none.
    Pointfea,
}

impl FeatureAttr {
    /// Read the attribute from `shape`.
    pub fn select<B: Backend>(&self, shape: &Shape<B>) -> Tensor<B, 3> {
        match self {
            Self::Points => shape.points().clone(),
            Self::Pointfea => shape.pointfea_or_points(),
        }
    }
}

impl FromStr for FeatureAttr {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "points" => Ok(Self::Points),
            "pointfea" => Ok(Self::Pointfea),
            other => Err(RegistrationError::invalid_configuration(format!(
                "unknown feature attribute '{}', expected points or pointfea",
                other
            ))),
        }
    }
}

impl fmt::Display for FeatureAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Points => "points",
            Self::Pointfea => "pointfea",
        })
    }
}

/// Populates `pointfea` on both shapes before the similarity is evaluated.
pub trait PairFeatureExtractor<B: Backend> {
    fn extract(&self, flowed: Shape<B>, target: Shape<B>) -> Result<(Shape<B>, Shape<B>)>;
}

/// Uses the raw coordinates as features.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointFeatureExtractor;

impl<B: Backend> PairFeatureExtractor<B> for PointFeatureExtractor {
    fn extract(&self, mut flowed: Shape<B>, mut target: Shape<B>) -> Result<(Shape<B>, Shape<B>)> {
        let points = flowed.points().clone();
        flowed.set_pointfea(points)?;
        let points = target.points().clone();
        target.set_pointfea(points)?;
        Ok((flowed, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_point_feature_extractor() {
        let device = Default::default();
        let points = Tensor::<B, 3>::ones([1, 3, 2], &device);
        let shape = Shape::new(points).unwrap();
        let (flowed, target) = PointFeatureExtractor.extract(shape.clone(), shape).unwrap();
        assert_eq!(flowed.pointfea().map(|f| f.dims()), Some([1, 3, 2]));
        assert_eq!(target.pointfea().map(|f| f.dims()), Some([1, 3, 2]));
    }

    #[test]
    fn test_feature_attr_from_str() {
        assert_eq!("pointfea".parse::<FeatureAttr>().unwrap(), FeatureAttr::Pointfea);
        assert!("normals".parse::<FeatureAttr>().is_err());
    }
}
