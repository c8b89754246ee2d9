//! Voxel-grid downsampling.

use std::collections::BTreeMap;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};

use crate::error::{CoreError, Result};
use crate::geometry::host_values;

#[derive(Debug, Clone)]
struct Cell {
    weighted_sum: Vec<f64>,
    plain_sum: Vec<f64>,
    mass: f64,
    count: usize,
}

impl Cell {
    fn centroid(&self) -> impl Iterator<Item = f32> + '_ {
        let use_mass = self.mass > 0.0;
        self.weighted_sum
            .iter()
            .zip(&self.plain_sum)
            .map(move |(ws, ps)| {
                if use_mass {
                    (ws / self.mass) as f32
                } else {
                    (ps / self.count as f64) as f32
                }
            })
    }
}

/// Collapse the points of each voxel cell into their weighted centroid.
///
/// The centroid mass is the sum of the masses in the cell; a cell whose
/// points all have zero mass falls back to the plain average. Every batch
/// element must occupy the same number of cells.
///
/// # Arguments
/// * `points` - `[B, N, D]`
/// * `weights` - `[B, N, 1]`
/// * `spacing` - Voxel edge length
pub fn grid_sample<B: Backend>(
    points: &Tensor<B, 3>,
    weights: &Tensor<B, 3>,
    spacing: f64,
) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
    if !(spacing > 0.0 && spacing.is_finite()) {
        return Err(CoreError::invalid_configuration(format!(
            "grid sampler spacing must be positive, got {}",
            spacing
        )));
    }
    let [batch, n, dim] = points.dims();
    let xs = host_values(points)?;
    let ws = host_values(weights)?;

    let mut out_points = Vec::new();
    let mut out_weights = Vec::new();
    let mut cells_per_batch: Option<usize> = None;
    for b in 0..batch {
        let mut cells: BTreeMap<Vec<i64>, Cell> = BTreeMap::new();
        for i in 0..n {
            let p = &xs[(b * n + i) * dim..(b * n + i + 1) * dim];
            let w = ws[b * n + i] as f64;
            let key: Vec<i64> = p.iter().map(|v| (*v as f64 / spacing).floor() as i64).collect();
            let cell = cells.entry(key).or_insert_with(|| Cell {
                weighted_sum: vec![0.0; dim],
                plain_sum: vec![0.0; dim],
                mass: 0.0,
                count: 0,
            });
            for k in 0..dim {
                cell.weighted_sum[k] += w * p[k] as f64;
                cell.plain_sum[k] += p[k] as f64;
            }
            cell.mass += w;
            cell.count += 1;
        }

        match cells_per_batch {
            Some(expected) if expected != cells.len() => {
                return Err(CoreError::shape_mismatch(
                    "grid sampler",
                    [batch, expected, dim],
                    [batch, cells.len(), dim],
                ));
            }
            _ => cells_per_batch = Some(cells.len()),
        }

        for cell in cells.values() {
            out_points.extend(cell.centroid());
            out_weights.push(cell.mass as f32);
        }
    }

    let m = cells_per_batch.unwrap_or(0);
    tracing::debug!("grid sampler reduced {} points to {} cells (spacing {})", n, m, spacing);
    let device = points.device();
    Ok((
        Tensor::from_data(TensorData::new(out_points, [batch, m, dim]), &device),
        Tensor::from_data(TensorData::new(out_weights, [batch, m, 1]), &device),
    ))
}
