//! Control point samplers.
//!
//! A sampler reduces a shape to a set of control points with masses. The
//! output always lives on the shape's device and carries no gradient.

pub mod grid;
pub mod uniform;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::shape::Shape;

pub use grid::grid_sample;
pub use uniform::uniform_sample;

/// Control point sampling strategy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ShapeSampler {
    /// Every point is a control point.
    #[default]
    Full,
    /// Weighted centroid per voxel cell of the given edge length.
    PointGrid { spacing: f64 },
    /// Seeded random subset of `num_points` points.
    Uniform { num_points: usize, seed: u64 },
}

impl ShapeSampler {
    /// Control points `[B, M, D]` and their masses `[B, M, 1]`.
    pub fn sample<B: Backend>(&self, shape: &Shape<B>) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
        match self {
            Self::Full => Ok((
                shape.points().clone().detach(),
                shape.weights().clone().detach(),
            )),
            Self::PointGrid { spacing } => grid_sample(shape.points(), shape.weights(), *spacing),
            Self::Uniform { num_points, seed } => {
                uniform_sample(shape.points(), shape.weights(), *num_points, *seed)
            }
        }
    }

    /// Whether the sampler keeps every point.
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }
}
