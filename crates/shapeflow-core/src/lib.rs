//! Geometry layer of shapeflow: shapes, shape pairs, kernels and samplers.
//!
//! Every tensor is a batched `burn` tensor. Point sets use the `[B, N, D]`
//! layout with `D` in `{2, 3}`; per-point scalars use `[B, N, 1]`.

pub mod error;
pub mod geometry;
pub mod kernel;
pub mod sampler;
pub mod shape;

pub use error::{CoreError, Result};
pub use kernel::{GaussianKernel, Kernel, KernelInterpolator, KernelInterpolatorConfig};
pub use sampler::ShapeSampler;
pub use shape::{RegParam, Shape, ShapePair, Topology};
