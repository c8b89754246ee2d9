//! LDDMM dynamics: the geodesic equations of a kernel metric on control points.
//!
//! The momentum `p` lives on the control points `x`. The velocity at any
//! point `z` is `v(z) = Σ_j k(z, x_j) p_j`. Two equivalent derivative laws are
//! provided:
//!
//! - [`LddmmKind::Hamiltonian`]: `dp/dt = -∇_x H` with
//!   `H = ½ Σ_ij p_i·p_j k(x_i, x_j)`, written as a matrix factorisation
//!   `x ⊙ rowsum(A) - A x` with `A = (p pᵀ) ⊙ G`.
//! - [`LddmmKind::Variational`]: `dp/dt = -(Dv)ᵀ p`, written as an explicit
//!   contraction over the pairwise differences `x_i - x_j`.
//!
//! Both use the closed-form kernel gradient, so the derivative stays a plain
//! tensor expression and autodiff only has to differentiate it once.

pub mod module;

pub use module::{FlowMode, LddmmKind, LddmmModule, LddmmModuleConfig};
