//! Multiscale Sphere Registration Example
//!
//! Registers a sampled sphere onto an ellipsoid. The first scale works on a
//! voxel-grid subsample of both shapes, the second on every point, with the
//! momentum transferred between them. The loss is the gaussian kernel
//! discrepancy, so the two point sets need no correspondence.
//!
//! Usage:
//!   cargo run --example sphere_multiscale

use std::sync::Arc;
use std::time::Instant;

use burn::backend::Autodiff;
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use shapeflow_core::kernel::GaussianKernelConfig;
use shapeflow_core::{Shape, ShapeSampler};
use shapeflow_registration::lddmm::{LddmmKind, LddmmModuleConfig};
use shapeflow_registration::metric::{SimilarityConfig, SimilarityKind};
use shapeflow_registration::model::LddmmOptConfig;
use shapeflow_registration::multiscale::{MultiScaleConfig, MultiScaleSolver};
use shapeflow_registration::optimizer::{OptimizerConfig, OptimizerKind};
use shapeflow_registration::progress::ConsoleProgressCallback;

type B = Autodiff<NdArray<f32>>;

/// Fibonacci lattice on an axis-aligned ellipsoid.
fn ellipsoid(n: usize, radii: [f32; 3]) -> Vec<f32> {
    let golden = std::f32::consts::PI * (3.0 - 5f32.sqrt());
    let mut points = Vec::with_capacity(3 * n);
    for i in 0..n {
        let z = 1.0 - 2.0 * (i as f32 + 0.5) / n as f32;
        let r = (1.0 - z * z).sqrt();
        let theta = golden * i as f32;
        points.push(radii[0] * r * theta.cos());
        points.push(radii[1] * r * theta.sin());
        points.push(radii[2] * z);
    }
    points
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let device = Default::default();
    let n_source = 400;
    let n_target = 300;
    let source = Tensor::<B, 3>::from_data(
        TensorData::new(ellipsoid(n_source, [1.0, 1.0, 1.0]), [1, n_source, 3]),
        &device,
    );
    let target = Tensor::<B, 3>::from_data(
        TensorData::new(ellipsoid(n_target, [1.3, 0.9, 0.8]), [1, n_target, 3]),
        &device,
    );
    let source = Shape::new(source)?;
    let target = Shape::new(target)?;

    let mut model = LddmmOptConfig::new()
        .with_module(
            LddmmModuleConfig::new()
                .with_kind(LddmmKind::Hamiltonian)
                .with_kernel(GaussianKernelConfig::new().with_sigmas(vec![0.2, 0.4, 0.8])),
        )
        .with_sim_loss(
            SimilarityConfig::new()
                .with_kind(SimilarityKind::GaussianKernel)
                .with_blur(0.15),
        )
        .with_print_step(20)
        .init::<B>()?;

    let config = MultiScaleConfig::new()
        .with_samplers(vec![ShapeSampler::PointGrid { spacing: 0.3 }, ShapeSampler::Full])
        .with_iter_per_scale(vec![60, 40])
        .with_rel_ftol_per_scale(vec![1e-5, 1e-6])
        .with_init_lr_per_scale(vec![0.5, 0.1])
        .with_optimizer(OptimizerConfig::new().with_kind(OptimizerKind::Lbfgs).with_max_step_norm(0.2));
    let mut solver = MultiScaleSolver::new(config)?.with_callback(Arc::new(ConsoleProgressCallback::new(20)));

    let start = Instant::now();
    let result = solver.solve(&mut model, source, target)?;
    println!("Registration completed in {:.2?}", start.elapsed());

    for outcome in &result.scales {
        println!(
            "scale {}: {} control points, {} iterations, loss {:.6}, converged: {}",
            outcome.scale, outcome.num_control_points, outcome.iterations, outcome.final_loss, outcome.converged
        );
    }
    let export = result.export()?;
    println!(
        "Exported {} momentum values on {:?} control points",
        export.reg_param.as_ref().map_or(0, Vec::len),
        export.control_dims
    );

    Ok(())
}
