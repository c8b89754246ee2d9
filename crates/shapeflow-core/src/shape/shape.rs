//! Batched geometric shape with optional per-point attributes.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Int, Tensor, TensorData};

use super::topology::Topology;
use crate::error::{CoreError, Result};

/// A batch of point sets sharing the same point count.
///
/// `points` is `[B, N, D]` with `D` in `{2, 3}`. `weights` is `[B, N, 1]`
/// and defaults to a uniform `1/N` per batch element. `pointfea` is an
/// optional `[B, N, F]` feature tensor. Landmarks, labels and segmentation
/// are carried along untouched by deformation.
///
/// A shape is not mutated in place once it is owned by a pair; deformation
/// produces a new shape through [`Shape::with_reference`], which shares every
/// auxiliary attribute of the reference and only replaces the positions.
///
/// # Type Parameters
/// * `B` - The backend for tensor operations
#[derive(Debug, Clone)]
pub struct Shape<B: Backend> {
    points: Tensor<B, 3>,
    weights: Tensor<B, 3>,
    pointfea: Option<Tensor<B, 3>>,
    landmarks: Option<Tensor<B, 3>>,
    label: Option<Tensor<B, 2, Int>>,
    seg: Option<Tensor<B, 2, Int>>,
    topology: Topology,
    name_list: Vec<String>,
}

impl<B: Backend> Shape<B> {
    /// Create a point cloud with uniform weights.
    ///
    /// # Arguments
    /// * `points` - Tensor of shape `[B, N, D]`, `D` in `{2, 3}`
    ///
    /// # Errors
    /// Returns `InvalidShape` for an empty point set or an unsupported dimension.
    pub fn new(points: Tensor<B, 3>) -> Result<Self> {
        let [batch, npoints, dim] = points.dims();
        if batch == 0 || npoints == 0 {
            return Err(CoreError::invalid_shape(format!(
                "a shape needs at least one batch element and one point, got {:?}",
                points.dims()
            )));
        }
        if dim != 2 && dim != 3 {
            return Err(CoreError::invalid_shape(format!(
                "points must be 2D or 3D, got dimension {}",
                dim
            )));
        }
        let device = points.device();
        let weights = Tensor::ones([batch, npoints, 1], &device).div_scalar(npoints as f64);
        Ok(Self {
            points,
            weights,
            pointfea: None,
            landmarks: None,
            label: None,
            seg: None,
            topology: Topology::PointCloud,
            name_list: Vec::new(),
        })
    }

    /// Create a shape from points and optional weights and features.
    pub fn set_data(
        points: Tensor<B, 3>,
        weights: Option<Tensor<B, 3>>,
        pointfea: Option<Tensor<B, 3>>,
    ) -> Result<Self> {
        let mut shape = Self::new(points)?;
        if let Some(weights) = weights {
            shape = shape.with_weights(weights)?;
        }
        if let Some(pointfea) = pointfea {
            shape = shape.with_pointfea(pointfea)?;
        }
        Ok(shape)
    }

    /// Create a shape at new positions that inherits every other attribute
    /// from `reference` (weights, features, landmarks, labels, topology).
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `points` does not have the reference's
    /// `[B, N, D]` layout.
    pub fn with_reference(points: Tensor<B, 3>, reference: &Shape<B>) -> Result<Self> {
        if points.dims() != reference.points.dims() {
            return Err(CoreError::shape_mismatch(
                "shape",
                reference.points.dims(),
                points.dims(),
            ));
        }
        Ok(Self {
            points,
            ..reference.clone()
        })
    }

    /// Replace the point weights (`[B, N, 1]`, non-negative).
    pub fn with_weights(mut self, weights: Tensor<B, 3>) -> Result<Self> {
        let [b, n, _] = self.points.dims();
        let dims = weights.dims();
        if dims != [b, n, 1] {
            return Err(CoreError::shape_mismatch("shape weights", [b, n, 1], dims));
        }
        let min_weight = weights.clone().min().into_scalar().elem::<f64>();
        if min_weight < 0.0 || !min_weight.is_finite() {
            return Err(CoreError::invalid_shape(format!(
                "weights must be finite and non-negative, found minimum {}",
                min_weight
            )));
        }
        self.weights = weights;
        Ok(self)
    }

    /// Attach per-point features (`[B, N, F]`).
    pub fn with_pointfea(mut self, pointfea: Tensor<B, 3>) -> Result<Self> {
        self.check_per_point("shape pointfea", &pointfea)?;
        self.pointfea = Some(pointfea);
        Ok(self)
    }

    /// Attach landmarks (`[B, L, D']`); only the batch size must agree.
    pub fn with_landmarks(mut self, landmarks: Tensor<B, 3>) -> Result<Self> {
        let [b, _, _] = self.points.dims();
        let [lb, _, _] = landmarks.dims();
        if lb != b {
            return Err(CoreError::shape_mismatch("shape landmarks", [b], [lb]));
        }
        self.landmarks = Some(landmarks);
        Ok(self)
    }

    /// Attach a per-shape label (`[B, 1]`).
    pub fn with_label(mut self, label: Tensor<B, 2, Int>) -> Result<Self> {
        let [b, _, _] = self.points.dims();
        let dims = label.dims();
        if dims[0] != b {
            return Err(CoreError::shape_mismatch("shape label", [b, 1], dims));
        }
        self.label = Some(label);
        Ok(self)
    }

    /// Attach a per-point segmentation (`[B, N]`).
    pub fn with_seg(mut self, seg: Tensor<B, 2, Int>) -> Result<Self> {
        let [b, n, _] = self.points.dims();
        let dims = seg.dims();
        if dims != [b, n] {
            return Err(CoreError::shape_mismatch("shape seg", [b, n], dims));
        }
        self.seg = Some(seg);
        Ok(self)
    }

    /// Attach connectivity; indices must stay within the point count.
    pub fn with_topology(mut self, topology: Topology) -> Result<Self> {
        topology.validate(self.npoints())?;
        self.topology = topology;
        Ok(self)
    }

    /// Set the names of the batch elements.
    pub fn with_name_list(mut self, name_list: Vec<String>) -> Self {
        self.name_list = name_list;
        self
    }

    /// Replace the per-point features in place.
    pub fn set_pointfea(&mut self, pointfea: Tensor<B, 3>) -> Result<()> {
        self.check_per_point("shape pointfea", &pointfea)?;
        self.pointfea = Some(pointfea);
        Ok(())
    }

    fn check_per_point(&self, component: &str, tensor: &Tensor<B, 3>) -> Result<()> {
        let [b, n, _] = self.points.dims();
        let [tb, tn, tf] = tensor.dims();
        if tb != b || tn != n {
            return Err(CoreError::shape_mismatch(component, [b, n, tf], [tb, tn, tf]));
        }
        Ok(())
    }

    /// Point positions `[B, N, D]`.
    pub fn points(&self) -> &Tensor<B, 3> {
        &self.points
    }

    /// Point weights `[B, N, 1]`.
    pub fn weights(&self) -> &Tensor<B, 3> {
        &self.weights
    }

    /// Per-point features, if any.
    pub fn pointfea(&self) -> Option<&Tensor<B, 3>> {
        self.pointfea.as_ref()
    }

    /// Per-point features, falling back to the positions when unset.
    pub fn pointfea_or_points(&self) -> Tensor<B, 3> {
        self.pointfea.clone().unwrap_or_else(|| self.points.clone())
    }

    pub fn landmarks(&self) -> Option<&Tensor<B, 3>> {
        self.landmarks.as_ref()
    }

    pub fn label(&self) -> Option<&Tensor<B, 2, Int>> {
        self.label.as_ref()
    }

    pub fn seg(&self) -> Option<&Tensor<B, 2, Int>> {
        self.seg.as_ref()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn name_list(&self) -> &[String] {
        &self.name_list
    }

    /// Batch size.
    pub fn batch(&self) -> usize {
        self.points.dims()[0]
    }

    /// Number of points per batch element.
    pub fn npoints(&self) -> usize {
        self.points.dims()[1]
    }

    /// Spatial dimension.
    pub fn dimension(&self) -> usize {
        self.points.dims()[2]
    }

    /// Device holding the point tensor.
    pub fn device(&self) -> B::Device {
        self.points.device()
    }

    /// Per-dimension `[min, max]` of each batch element, `[B, D, 2]`.
    pub fn bounding_box(&self) -> Tensor<B, 3> {
        let min = self.points.clone().min_dim(1).swap_dims(1, 2);
        let max = self.points.clone().max_dim(1).swap_dims(1, 2);
        Tensor::cat(vec![min, max], 2)
    }

    /// Face centers and area-weighted normals of a surface mesh.
    ///
    /// # Returns
    /// `(centers, normals)`, both `[B, F, 3]`. Degenerate faces get a normal
    /// of `1e-7` in every component instead of zero.
    ///
    /// # Errors
    /// Returns `InvalidShape` when the shape is not a 3D surface mesh.
    pub fn face_centers_and_normals(&self) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
        if !matches!(self.topology, Topology::SurfaceMesh { .. }) || self.dimension() != 3 {
            return Err(CoreError::invalid_shape(format!(
                "face normals need a 3D surface mesh, got a {}D {}",
                self.dimension(),
                self.topology.name()
            )));
        }
        let corners = self.gather_corners();
        let (a, b, c) = (corners[0].clone(), corners[1].clone(), corners[2].clone());
        let centers = (a.clone() + b.clone() + c.clone()).div_scalar(3.0);
        let normals = cross(b - a.clone(), c - a).div_scalar(2.0);

        let norm = (normals.clone() * normals.clone()).sum_dim(2);
        let degenerate = norm.lower_equal_elem(0.0).float();
        let degenerate_count = degenerate.clone().sum().into_scalar().elem::<f64>();
        if degenerate_count > 0.0 {
            tracing::warn!(
                "{} zero normals detected, setting them to 1e-7",
                degenerate_count as usize
            );
        }
        let normals = normals + degenerate.mul_scalar(1e-7);
        Ok((centers, normals))
    }

    /// Edge midpoints and tangents (`end - start`) of a polyline, `[B, E, D]`.
    pub fn edge_centers_and_tangents(&self) -> Result<(Tensor<B, 3>, Tensor<B, 3>)> {
        if !matches!(self.topology, Topology::PolyLine { .. }) {
            return Err(CoreError::invalid_shape(format!(
                "edge tangents need a polyline, got a {}",
                self.topology.name()
            )));
        }
        let corners = self.gather_corners();
        let (start, end) = (corners[0].clone(), corners[1].clone());
        let centers = (start.clone() + end.clone()).div_scalar(2.0);
        Ok((centers, end - start))
    }

    fn gather_corners(&self) -> Vec<Tensor<B, 3>> {
        let device = self.points.device();
        self.topology
            .index_columns()
            .into_iter()
            .map(|column| {
                let len = column.len();
                let index = Tensor::<B, 1, Int>::from_data(TensorData::new(column, [len]), &device);
                self.points.clone().select(1, index)
            })
            .collect()
    }
}

fn cross<B: Backend>(u: Tensor<B, 3>, v: Tensor<B, 3>) -> Tensor<B, 3> {
    let [b, n, _] = u.dims();
    let component = |t: &Tensor<B, 3>, k: usize| t.clone().slice([0..b, 0..n, k..k + 1]);
    let x = component(&u, 1) * component(&v, 2) - component(&u, 2) * component(&v, 1);
    let y = component(&u, 2) * component(&v, 0) - component(&u, 0) * component(&v, 2);
    let z = component(&u, 0) * component(&v, 1) - component(&u, 1) * component(&v, 0);
    Tensor::cat(vec![x, y, z], 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::host_values;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn square(device: &<B as Backend>::Device) -> Tensor<B, 3> {
        Tensor::from_data(
            TensorData::from([[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]]),
            device,
        )
    }

    #[test]
    fn test_default_weights_are_uniform() {
        let device = Default::default();
        let shape = Shape::new(square(&device)).unwrap();
        assert_eq!(shape.weights().dims(), [1, 4, 1]);
        let total = shape.weights().clone().sum().into_scalar();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_4d_points() {
        let device = Default::default();
        let points = Tensor::<B, 3>::zeros([1, 3, 4], &device);
        assert!(matches!(Shape::new(points), Err(CoreError::InvalidShape(_))));
    }

    #[test]
    fn test_rejects_mismatched_pointfea() {
        let device = Default::default();
        let shape = Shape::new(square(&device)).unwrap();
        let fea = Tensor::<B, 3>::zeros([1, 5, 6], &device);
        assert!(matches!(
            shape.with_pointfea(fea),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_negative_weights() {
        let device = Default::default();
        let shape = Shape::new(square(&device)).unwrap();
        let weights = Tensor::<B, 3>::from_data(TensorData::from([[[0.5], [0.5], [0.5], [-0.5]]]), &device);
        assert!(shape.with_weights(weights).is_err());
    }

    #[test]
    fn test_with_reference_keeps_attributes() {
        let device = Default::default();
        let fea = Tensor::<B, 3>::ones([1, 4, 3], &device);
        let shape = Shape::new(square(&device))
            .unwrap()
            .with_pointfea(fea)
            .unwrap()
            .with_name_list(vec!["square".to_string()]);
        let moved = Shape::with_reference(square(&device).add_scalar(1.0), &shape).unwrap();

        assert!(moved.pointfea().is_some());
        assert_eq!(moved.name_list(), &["square".to_string()]);
        let moved_points = host_values(moved.points()).unwrap();
        assert!((moved_points[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_bounding_box() {
        let device = Default::default();
        let shape = Shape::new(square(&device)).unwrap();
        let bbox = host_values(&shape.bounding_box()).unwrap();
        assert_eq!(bbox, vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_face_normal_of_unit_triangle() {
        let device = Default::default();
        let points = Tensor::<B, 3>::from_data(
            TensorData::from([[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]]),
            &device,
        );
        let mesh = Shape::new(points)
            .unwrap()
            .with_topology(Topology::surface_mesh(vec![[0, 1, 2]]))
            .unwrap();
        let (centers, normals) = mesh.face_centers_and_normals().unwrap();
        let centers = host_values(&centers).unwrap();
        let normals = host_values(&normals).unwrap();
        assert!((centers[0] - 1.0 / 3.0).abs() < 1e-6);
        assert!((normals[2] - 0.5).abs() < 1e-6);
        assert!(normals[0].abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_face_gets_floored_normal() {
        let device = Default::default();
        let points = Tensor::<B, 3>::from_data(
            TensorData::from([[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]]),
            &device,
        );
        let mesh = Shape::new(points)
            .unwrap()
            .with_topology(Topology::surface_mesh(vec![[0, 1, 2]]))
            .unwrap();
        let (_, normals) = mesh.face_centers_and_normals().unwrap();
        let normals = host_values(&normals).unwrap();
        assert!(normals.iter().all(|&n| (n - 1e-7).abs() < 1e-9));
    }

    #[test]
    fn test_polyline_tangents() {
        let device = Default::default();
        let line = Shape::new(square(&device))
            .unwrap()
            .with_topology(Topology::poly_line(vec![[0, 1], [1, 2]]))
            .unwrap();
        let (centers, tangents) = line.edge_centers_and_tangents().unwrap();
        assert_eq!(centers.dims(), [1, 2, 2]);
        let tangents = host_values(&tangents).unwrap();
        assert_eq!(tangents, vec![1.0, 0.0, 0.0, 1.0]);
    }
}
