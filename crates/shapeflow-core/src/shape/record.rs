//! Host-side records used to build shapes and to hand results to writers.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};

use super::pair::ShapePair;
use super::shape::Shape;
use super::topology::Topology;
use crate::error::{CoreError, Result};
use crate::geometry::host_values;

/// Flat row-major description of one batched shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeRecord {
    /// `[batch, npoints, dim]`
    pub dims: [usize; 3],
    pub points: Vec<f32>,
    #[serde(default)]
    pub weights: Option<Vec<f32>>,
    /// Features with `fea_dim` values per point.
    #[serde(default)]
    pub pointfea: Option<Vec<f32>>,
    #[serde(default)]
    pub fea_dim: usize,
    #[serde(default)]
    pub faces: Option<Vec<[usize; 3]>>,
    #[serde(default)]
    pub edges: Option<Vec<[usize; 2]>>,
    #[serde(default)]
    pub name_list: Vec<String>,
}

impl ShapeRecord {
    /// Point cloud record without weights or features.
    pub fn from_points(dims: [usize; 3], points: Vec<f32>) -> Self {
        Self {
            dims,
            points,
            weights: None,
            pointfea: None,
            fea_dim: 0,
            faces: None,
            edges: None,
            name_list: Vec::new(),
        }
    }

    /// Build a shape on `device`.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` when a buffer length disagrees with `dims`.
    pub fn to_shape<B: Backend>(&self, device: &B::Device) -> Result<Shape<B>> {
        let [b, n, d] = self.dims;
        let points = tensor_from(&self.points, [b, n, d], "record points", device)?;
        let weights = match &self.weights {
            Some(w) => Some(tensor_from(w, [b, n, 1], "record weights", device)?),
            None => None,
        };
        let pointfea = match &self.pointfea {
            Some(f) => Some(tensor_from(f, [b, n, self.fea_dim], "record pointfea", device)?),
            None => None,
        };
        let mut shape = Shape::set_data(points, weights, pointfea)?.with_name_list(self.name_list.clone());
        match (&self.faces, &self.edges) {
            (Some(_), Some(_)) => {
                return Err(CoreError::invalid_shape(
                    "a record cannot carry both faces and edges",
                ))
            }
            (Some(faces), None) => shape = shape.with_topology(Topology::surface_mesh(faces.clone()))?,
            (None, Some(edges)) => shape = shape.with_topology(Topology::poly_line(edges.clone()))?,
            (None, None) => {}
        }
        Ok(shape)
    }

    /// Snapshot a shape back to host memory.
    pub fn from_shape<B: Backend>(shape: &Shape<B>) -> Result<Self> {
        let pointfea = shape.pointfea().map(host_values).transpose()?;
        let fea_dim = shape.pointfea().map(|f| f.dims()[2]).unwrap_or(0);
        let (faces, edges) = match shape.topology() {
            Topology::PointCloud => (None, None),
            Topology::SurfaceMesh { faces } => (Some(faces.as_ref().clone()), None),
            Topology::PolyLine { edges } => (None, Some(edges.as_ref().clone())),
        };
        Ok(Self {
            dims: shape.points().dims(),
            points: host_values(shape.points())?,
            weights: Some(host_values(shape.weights())?),
            pointfea,
            fea_dim,
            faces,
            edges,
            name_list: shape.name_list().to_vec(),
        })
    }
}

fn tensor_from<B: Backend>(
    values: &[f32],
    dims: [usize; 3],
    component: &str,
    device: &B::Device,
) -> Result<Tensor<B, 3>> {
    let expected = dims.iter().product::<usize>();
    if values.len() != expected {
        return Err(CoreError::shape_mismatch(component, [expected], [values.len()]));
    }
    Ok(Tensor::from_data(TensorData::new(values.to_vec(), dims), device))
}

/// Input record for one registration problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    pub source: ShapeRecord,
    pub target: ShapeRecord,
    /// Optional shape advected instead of the source.
    #[serde(default)]
    pub toflow: Option<ShapeRecord>,
}

/// Build the source and target shapes of a record.
pub fn create_source_and_target<B: Backend>(
    record: &PairRecord,
    device: &B::Device,
) -> Result<(Shape<B>, Shape<B>)> {
    let source = record.source.to_shape(device)?;
    let target = record.target.to_shape(device)?;
    Ok((source, target))
}

/// Build a shape pair from a record, including its `toflow` shape.
pub fn create_shape_pair<B: Backend>(record: &PairRecord, device: &B::Device) -> Result<ShapePair<B>> {
    let (source, target) = create_source_and_target(record, device)?;
    let mut pair = ShapePair::new(source, target)?;
    if let Some(toflow) = &record.toflow {
        pair.set_toflow(toflow.to_shape(device)?)?;
    }
    Ok(pair)
}

/// Registration result handed to external writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairExport {
    pub source: ShapeRecord,
    pub target: ShapeRecord,
    pub flowed: Option<ShapeRecord>,
    pub control_points: Vec<f32>,
    pub control_weights: Vec<f32>,
    pub control_dims: [usize; 3],
    pub reg_param: Option<Vec<f32>>,
}

impl PairExport {
    pub fn from_pair<B: Backend>(pair: &ShapePair<B>) -> Result<Self> {
        let control_points = pair.control_points();
        Ok(Self {
            source: ShapeRecord::from_shape(pair.source())?,
            target: ShapeRecord::from_shape(pair.target())?,
            flowed: pair.flowed().map(ShapeRecord::from_shape).transpose()?,
            control_dims: control_points.dims(),
            control_points: host_values(&control_points)?,
            control_weights: host_values(&pair.control_weights())?,
            reg_param: pair
                .reg_param()
                .map(|p| host_values(&p.val()))
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn triangle() -> ShapeRecord {
        ShapeRecord::from_points([1, 3, 2], vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0])
    }

    #[test]
    fn test_record_builds_shape() {
        let device = Default::default();
        let shape: Shape<B> = triangle().to_shape(&device).unwrap();
        assert_eq!(shape.points().dims(), [1, 3, 2]);
        assert_eq!(shape.npoints(), 3);
    }

    #[test]
    fn test_record_rejects_short_buffer() {
        let device = Default::default();
        let mut record = triangle();
        record.points.pop();
        let result: Result<Shape<B>> = record.to_shape(&device);
        assert!(matches!(result, Err(CoreError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_record_keeps_features_and_edges() {
        let device = Default::default();
        let mut record = triangle();
        record.pointfea = Some(vec![1.0; 12]);
        record.fea_dim = 4;
        record.edges = Some(vec![[0, 1], [1, 2]]);
        let shape: Shape<B> = record.to_shape(&device).unwrap();
        let back = ShapeRecord::from_shape(&shape).unwrap();
        assert_eq!(back.fea_dim, 4);
        assert_eq!(back.edges, record.edges);
        assert!(back.weights.is_some());
    }

    #[test]
    fn test_pair_export() {
        let device = Default::default();
        let record = PairRecord {
            source: triangle(),
            target: triangle(),
            toflow: None,
        };
        let pair: ShapePair<B> = create_shape_pair(&record, &device).unwrap();
        let export = PairExport::from_pair(&pair).unwrap();
        assert_eq!(export.control_dims, [1, 3, 2]);
        assert!(export.flowed.is_none());
        assert!(export.reg_param.is_none());
    }
}
