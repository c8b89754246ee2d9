//! Non-rigid point-set registration with LDDMM.
//!
//! A momentum field on control points is integrated through Hamiltonian or
//! variational geodesic dynamics, the resulting flow moves the source shape,
//! and a similarity plus geodesic regularization objective is minimised by a
//! gradient-based optimizer, optionally coarse to fine.

pub mod error;
pub mod integrator;
pub mod lddmm;
pub mod metric;
pub mod model;
pub mod multiscale;
pub mod optimizer;
pub mod progress;
pub mod registration;
pub mod regularization;
pub mod validation;

pub use error::{RegistrationError, Result};
pub use integrator::{OdeIntegrator, OdeIntegratorConfig, OdeMethod};
pub use lddmm::{LddmmKind, LddmmModule, LddmmModuleConfig};
pub use metric::{SimilarityConfig, SimilarityKind, SimilarityLoss};
pub use model::{LddmmOpt, LddmmOptConfig, ModelKind, RegistrationModel};
pub use multiscale::{MultiScaleConfig, MultiScaleSolver, OptimizerStrategy, RegistrationResult, ScaleChaining};
pub use optimizer::{OptimizerConfig, OptimizerKind};
pub use progress::{ConsoleProgressCallback, HistoryCallback, ProgressCallback, ProgressInfo, ProgressTracker};
pub use registration::{Registration, ScaleBudget, ScaleOutcome};
