//! Fixed-step ODE integration over `t ∈ [0, 1]`.

pub mod ode;

pub use ode::{DynamicalSystem, OdeIntegrator, OdeIntegratorConfig, OdeMethod};
