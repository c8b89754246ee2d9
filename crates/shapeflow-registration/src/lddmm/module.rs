use std::fmt;
use std::str::FromStr;

use burn::config::Config;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};
use shapeflow_core::geometry::{check_compatible, pairwise_differences};
use shapeflow_core::kernel::GaussianKernelConfig;
use shapeflow_core::{GaussianKernel, Kernel};

use crate::error::{RegistrationError, Result};
use crate::integrator::DynamicalSystem;

/// Momentum is clamped to this range before every velocity evaluation.
pub const MOMENTUM_BOUND: f64 = 1.0;

/// Derivative law of the momentum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LddmmKind {
    #[default]
    Hamiltonian,
    Variational,
}

impl FromStr for LddmmKind {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hamiltonian" => Ok(Self::Hamiltonian),
            "variational" => Ok(Self::Variational),
            other => Err(RegistrationError::invalid_configuration(format!(
                "unknown lddmm module type '{}', expected hamiltonian or variational",
                other
            ))),
        }
    }
}

impl fmt::Display for LddmmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hamiltonian => "hamiltonian",
            Self::Variational => "variational",
        })
    }
}

/// What the integrator state holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowMode {
    /// `(momentum, control_points)`
    #[default]
    Shooting,
    /// `(momentum, control_points, carried_points)`
    Flow,
}

impl FlowMode {
    fn state_len(self) -> usize {
        match self {
            Self::Shooting => 2,
            Self::Flow => 3,
        }
    }
}

/// Configuration for [`LddmmModule`].
#[derive(Config, Debug, PartialEq)]
pub struct LddmmModuleConfig {
    #[config(default = "LddmmKind::Hamiltonian")]
    pub kind: LddmmKind,
    /// Kernel of the deformation metric.
    #[config(default = "GaussianKernelConfig::new()")]
    pub kernel: GaussianKernelConfig,
}

impl LddmmModuleConfig {
    pub fn init(&self) -> Result<LddmmModule> {
        Ok(LddmmModule {
            kind: self.kind,
            kernel: self.kernel.init()?,
            mode: FlowMode::Shooting,
        })
    }
}

/// Dynamical system of the LDDMM geodesic equations.
///
/// The mode is set explicitly before each integrator run; the derivative
/// itself is a pure function of the state.
#[derive(Debug, Clone, PartialEq)]
pub struct LddmmModule {
    kind: LddmmKind,
    kernel: GaussianKernel,
    mode: FlowMode,
}

impl LddmmModule {
    pub fn new(kind: LddmmKind, kernel: GaussianKernel) -> Self {
        Self {
            kind,
            kernel,
            mode: FlowMode::Shooting,
        }
    }

    pub fn set_mode(&mut self, mode: FlowMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> FlowMode {
        self.mode
    }

    pub fn kind(&self) -> LddmmKind {
        self.kind
    }

    pub fn kernel(&self) -> &GaussianKernel {
        &self.kernel
    }

    /// Velocity `K(query, control_points) clamp(momentum)` at `query`.
    pub fn velocity<B: Backend>(
        &self,
        momentum: Tensor<B, 3>,
        control_points: Tensor<B, 3>,
        query: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        Kernel::<B>::convolve(&self.kernel, query, control_points, clamp_momentum(momentum))
    }

    /// Kinetic energy `½ Σ p·K p` of every batch element, `[B]`.
    pub fn hamiltonian<B: Backend>(&self, momentum: Tensor<B, 3>, control_points: Tensor<B, 3>) -> Tensor<B, 1> {
        let p = clamp_momentum(momentum);
        let kp = Kernel::<B>::convolve(&self.kernel, control_points.clone(), control_points, p.clone());
        let [b, _, _] = p.dims();
        (p * kp).sum_dim(2).sum_dim(1).reshape([b]).mul_scalar(0.5)
    }

    /// Time derivative of `(momentum, control_points)`.
    fn geodesic<B: Backend>(&self, momentum: Tensor<B, 3>, control_points: Tensor<B, 3>) -> (Tensor<B, 3>, Tensor<B, 3>) {
        let p = clamp_momentum(momentum);
        let x = control_points;
        let (k, g) = self.kernel.matrix_and_gradient(x.clone(), x.clone());
        let dx = k.matmul(p.clone());
        // A_ij = (p_i · p_j) G_ij
        let a = p.clone().matmul(p.transpose()) * g;
        let dp = match self.kind {
            LddmmKind::Hamiltonian => x.clone() * a.clone().sum_dim(2) - a.matmul(x),
            LddmmKind::Variational => {
                let diff = pairwise_differences(x.clone(), x);
                (diff * a.unsqueeze_dim::<4>(3)).sum_dim(2).squeeze::<3>(2)
            }
        };
        (dp, dx)
    }
}

impl<B: Backend> DynamicalSystem<B> for LddmmModule {
    fn derivative(&self, _t: f64, state: &[Tensor<B, 3>]) -> Result<Vec<Tensor<B, 3>>> {
        let expected = self.mode.state_len();
        if state.len() != expected {
            return Err(RegistrationError::integrator(format!(
                "lddmm {:?} mode expects {} state tensors, got {}",
                self.mode,
                expected,
                state.len()
            )));
        }
        let momentum = state[0].clone();
        let control_points = state[1].clone();
        if momentum.dims() != control_points.dims() {
            return Err(RegistrationError::shape_mismatch(
                "lddmm momentum",
                control_points.dims(),
                momentum.dims(),
            ));
        }
        let (dp, dx) = self.geodesic(momentum.clone(), control_points.clone());
        match self.mode {
            FlowMode::Shooting => Ok(vec![dp, dx]),
            FlowMode::Flow => {
                let carried = state[2].clone();
                check_compatible("lddmm carried points", &control_points, &carried)?;
                let dz = self.velocity(momentum, control_points, carried);
                Ok(vec![dp, dx, dz])
            }
        }
    }
}

/// Clamp the momentum to `[-1, 1]`.
pub fn clamp_momentum<B: Backend>(momentum: Tensor<B, 3>) -> Tensor<B, 3> {
    momentum.clamp(-MOMENTUM_BOUND, MOMENTUM_BOUND)
}
