//! Kernels and kernel interpolation.

pub mod anisotropic;
pub mod gaussian;
pub mod interpolator;
pub mod trait_;

pub use anisotropic::{anisotropic_matrix, estimate_gamma, AnisotropyConfig};
pub use gaussian::{GaussianKernel, GaussianKernelConfig};
pub use interpolator::{InterpolatorKernel, KernelInterpolator, KernelInterpolatorConfig};
pub use trait_::Kernel;
