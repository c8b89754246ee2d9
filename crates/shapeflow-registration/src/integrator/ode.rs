//! Explicit fixed-step integrators.
//!
//! The state is a tuple of `[B, N, D]` tensors (momentum, control points and
//! optionally carried points). Every step is a differentiable tensor
//! expression, so gradients flow from the end state back to the initial
//! momentum through the whole trajectory.

use std::fmt;
use std::str::FromStr;

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{RegistrationError, Result};
use crate::validation::ensure_finite;

/// A time-dependent vector field on a tuple of tensors.
pub trait DynamicalSystem<B: Backend> {
    /// Time derivative of every state element, in the same order and shapes.
    fn derivative(&self, t: f64, state: &[Tensor<B, 3>]) -> Result<Vec<Tensor<B, 3>>>;
}

/// Explicit integration scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OdeMethod {
    Euler,
    Midpoint,
    #[default]
    Rk4,
}

impl FromStr for OdeMethod {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "euler" => Ok(Self::Euler),
            "midpoint" | "rk2" => Ok(Self::Midpoint),
            "rk4" => Ok(Self::Rk4),
            other => Err(RegistrationError::invalid_configuration(format!(
                "unknown integration method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for OdeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Euler => "euler",
            Self::Midpoint => "midpoint",
            Self::Rk4 => "rk4",
        })
    }
}

/// Configuration for [`OdeIntegrator`].
#[derive(Config, Debug, PartialEq)]
pub struct OdeIntegratorConfig {
    #[config(default = "OdeMethod::Rk4")]
    pub method: OdeMethod,
    /// Number of steps over `[0, 1]`.
    #[config(default = 10)]
    pub steps: usize,
}

impl OdeIntegratorConfig {
    pub fn init(&self) -> Result<OdeIntegrator> {
        if self.steps == 0 {
            return Err(RegistrationError::invalid_configuration(
                "integrator needs at least one step",
            ));
        }
        Ok(OdeIntegrator {
            method: self.method,
            steps: self.steps,
        })
    }
}

/// Fixed-step explicit integrator over `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdeIntegrator {
    method: OdeMethod,
    steps: usize,
}

impl OdeIntegrator {
    pub fn method(&self) -> OdeMethod {
        self.method
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Integrate from `t = 0` to `t = 1` and return the final state.
    ///
    /// # Errors
    /// `ShapeMismatch` if the system changes the state layout,
    /// `NumericalInstability` if the final state is not finite.
    pub fn solve<B: Backend, S: DynamicalSystem<B> + ?Sized>(
        &self,
        system: &S,
        state: Vec<Tensor<B, 3>>,
    ) -> Result<Vec<Tensor<B, 3>>> {
        let dt = 1.0 / self.steps as f64;
        let mut state = state;
        for step in 0..self.steps {
            state = self.advance(system, step as f64 * dt, dt, state)?;
        }
        for (i, tensor) in state.iter().enumerate() {
            ensure_finite(&format!("integrator state {}", i), tensor)?;
        }
        Ok(state)
    }

    /// Like [`OdeIntegrator::solve`] but keeps every intermediate state,
    /// including the initial one (`steps + 1` entries).
    pub fn solve_trajectory<B: Backend, S: DynamicalSystem<B> + ?Sized>(
        &self,
        system: &S,
        state: Vec<Tensor<B, 3>>,
    ) -> Result<Vec<Vec<Tensor<B, 3>>>> {
        let dt = 1.0 / self.steps as f64;
        let mut trajectory = Vec::with_capacity(self.steps + 1);
        trajectory.push(state.clone());
        let mut state = state;
        for step in 0..self.steps {
            state = self.advance(system, step as f64 * dt, dt, state)?;
            trajectory.push(state.clone());
        }
        for (i, tensor) in state.iter().enumerate() {
            ensure_finite(&format!("integrator state {}", i), tensor)?;
        }
        Ok(trajectory)
    }

    fn advance<B: Backend, S: DynamicalSystem<B> + ?Sized>(
        &self,
        system: &S,
        t: f64,
        dt: f64,
        state: Vec<Tensor<B, 3>>,
    ) -> Result<Vec<Tensor<B, 3>>> {
        let k1 = checked_derivative(system, t, &state)?;
        match self.method {
            OdeMethod::Euler => Ok(axpy(&state, &k1, dt)),
            OdeMethod::Midpoint => {
                let mid = axpy(&state, &k1, 0.5 * dt);
                let k2 = checked_derivative(system, t + 0.5 * dt, &mid)?;
                Ok(axpy(&state, &k2, dt))
            }
            OdeMethod::Rk4 => {
                let k2 = checked_derivative(system, t + 0.5 * dt, &axpy(&state, &k1, 0.5 * dt))?;
                let k3 = checked_derivative(system, t + 0.5 * dt, &axpy(&state, &k2, 0.5 * dt))?;
                let k4 = checked_derivative(system, t + dt, &axpy(&state, &k3, dt))?;
                Ok(state
                    .into_iter()
                    .enumerate()
                    .map(|(i, x)| {
                        let incr = k1[i].clone() + k2[i].clone().mul_scalar(2.0) + k3[i].clone().mul_scalar(2.0) + k4[i].clone();
                        x + incr.mul_scalar(dt / 6.0)
                    })
                    .collect())
            }
        }
    }
}

fn checked_derivative<B: Backend, S: DynamicalSystem<B> + ?Sized>(
    system: &S,
    t: f64,
    state: &[Tensor<B, 3>],
) -> Result<Vec<Tensor<B, 3>>> {
    let derivative = system.derivative(t, state)?;
    if derivative.len() != state.len() {
        return Err(RegistrationError::integrator(format!(
            "system returned {} derivatives for a state of {} tensors",
            derivative.len(),
            state.len()
        )));
    }
    for (x, dx) in state.iter().zip(&derivative) {
        if x.dims() != dx.dims() {
            return Err(RegistrationError::shape_mismatch("integrator", x.dims(), dx.dims()));
        }
    }
    Ok(derivative)
}

/// `x + a * dx` element-wise over the tuple.
fn axpy<B: Backend>(x: &[Tensor<B, 3>], dx: &[Tensor<B, 3>], a: f64) -> Vec<Tensor<B, 3>> {
    x.iter()
        .zip(dx)
        .map(|(x, dx)| x.clone() + dx.clone().mul_scalar(a))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    /// dx/dt = x, solution e^t.
    struct Growth;

    impl DynamicalSystem<B> for Growth {
        fn derivative(&self, _t: f64, state: &[Tensor<B, 3>]) -> Result<Vec<Tensor<B, 3>>> {
            Ok(state.to_vec())
        }
    }

    struct Broken;

    impl DynamicalSystem<B> for Broken {
        fn derivative(&self, _t: f64, state: &[Tensor<B, 3>]) -> Result<Vec<Tensor<B, 3>>> {
            Ok(vec![state[0].clone().div_scalar(0.0)])
        }
    }

    fn solve_growth(method: OdeMethod, steps: usize) -> f64 {
        let device = Default::default();
        let integrator = OdeIntegratorConfig::new()
            .with_method(method)
            .with_steps(steps)
            .init()
            .unwrap();
        let x0 = Tensor::<B, 3>::ones([1, 1, 1], &device);
        let out = integrator.solve(&Growth, vec![x0]).unwrap();
        out[0].clone().into_scalar().elem::<f64>()
    }

    #[test]
    fn test_orders_of_accuracy() {
        let e = std::f64::consts::E;
        let euler = (solve_growth(OdeMethod::Euler, 10) - e).abs();
        let midpoint = (solve_growth(OdeMethod::Midpoint, 10) - e).abs();
        let rk4 = (solve_growth(OdeMethod::Rk4, 10) - e).abs();
        assert!(euler > midpoint);
        assert!(midpoint > rk4);
        assert!(rk4 < 1e-5);
    }

    #[test]
    fn test_trajectory_length() {
        let device = Default::default();
        let integrator = OdeIntegratorConfig::new().with_steps(4).init().unwrap();
        let x0 = Tensor::<B, 3>::ones([1, 2, 2], &device);
        let trajectory = integrator.solve_trajectory(&Growth, vec![x0]).unwrap();
        assert_eq!(trajectory.len(), 5);
    }

    #[test]
    fn test_divergence_is_reported() {
        let device = Default::default();
        let integrator = OdeIntegratorConfig::new().init().unwrap();
        let x0 = Tensor::<B, 3>::ones([1, 2, 2], &device);
        let err = integrator.solve(&Broken, vec![x0]).unwrap_err();
        assert!(err.is_numerical());
    }

    #[test]
    fn test_config_rejects_zero_steps() {
        assert!(OdeIntegratorConfig::new().with_steps(0).init().is_err());
        assert_eq!("RK4".parse::<OdeMethod>().unwrap(), OdeMethod::Rk4);
        assert!("leapfrog".parse::<OdeMethod>().is_err());
    }
}
