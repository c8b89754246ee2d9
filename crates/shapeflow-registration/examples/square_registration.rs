//! Square Registration Example
//!
//! Registers a unit square outline onto a translated and slightly sheared
//! copy with a single-scale LDDMM optimization.
//!
//! Usage:
//!   cargo run --example square_registration

use std::sync::Arc;
use std::time::Instant;

use burn::backend::Autodiff;
use burn::tensor::{Tensor, TensorData};
use burn_ndarray::NdArray;
use shapeflow_core::geometry::host_values;
use shapeflow_core::kernel::GaussianKernelConfig;
use shapeflow_core::Shape;
use shapeflow_registration::lddmm::LddmmModuleConfig;
use shapeflow_registration::model::LddmmOptConfig;
use shapeflow_registration::multiscale::{MultiScaleConfig, MultiScaleSolver};
use shapeflow_registration::progress::ConsoleProgressCallback;

type B = Autodiff<NdArray<f32>>;

fn square_outline(points_per_side: usize) -> Vec<[f32; 2]> {
    let step = 1.0 / points_per_side as f32;
    let mut points = Vec::with_capacity(4 * points_per_side);
    for i in 0..points_per_side {
        let t = i as f32 * step;
        points.push([t, 0.0]);
        points.push([1.0, t]);
        points.push([1.0 - t, 1.0]);
        points.push([0.0, 1.0 - t]);
    }
    points
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let device = Default::default();
    let source_points = square_outline(6);
    let target_points: Vec<[f32; 2]> = source_points
        .iter()
        .map(|[x, y]| [x + 0.1 * y + 0.2, y + 0.1])
        .collect();
    let n = source_points.len();

    let to_tensor = |points: &[[f32; 2]]| {
        let flat: Vec<f32> = points.iter().flatten().copied().collect();
        Tensor::<B, 3>::from_data(TensorData::new(flat, [1, n, 2]), &device)
    };
    let source = Shape::new(to_tensor(&source_points))?;
    let target = Shape::new(to_tensor(&target_points))?;
    println!("Registering {} points", n);

    let mut model = LddmmOptConfig::new()
        .with_module(LddmmModuleConfig::new().with_kernel(GaussianKernelConfig::new().with_sigmas(vec![0.3])))
        .init::<B>()?;
    let config = MultiScaleConfig::new()
        .with_iter_per_scale(vec![200])
        .with_rel_ftol_per_scale(vec![1e-7])
        .with_init_lr_per_scale(vec![0.002]);
    let mut solver = MultiScaleSolver::new(config)?.with_callback(Arc::new(ConsoleProgressCallback::new(20)));

    let start = Instant::now();
    let result = solver.solve(&mut model, source, target.clone())?;
    println!("Registration completed in {:.2?}", start.elapsed());

    let residual = (result.flowed.points().clone() - target.points().clone()).abs();
    let residual = host_values(&residual)?;
    let mean = residual.iter().sum::<f32>() / residual.len() as f32;
    println!("Final loss: {:?}", result.final_loss());
    println!("Mean absolute residual: {:.4}", mean);

    Ok(())
}
