//! Connectivity attached to a shape.
//!
//! Point clouds carry no connectivity. Surface meshes and polylines share one
//! connectivity table across the batch (every batch element has the same
//! number of points and the same faces/edges).

use std::sync::Arc;

use crate::error::{CoreError, Result};

/// Shape variant with its per-variant structure.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Topology {
    /// Unstructured points.
    #[default]
    PointCloud,
    /// Triangular surface mesh, faces index into the point list.
    SurfaceMesh { faces: Arc<Vec<[usize; 3]>> },
    /// Polyline, edges index into the point list.
    PolyLine { edges: Arc<Vec<[usize; 2]>> },
}

impl Topology {
    /// Create a surface mesh topology.
    pub fn surface_mesh(faces: Vec<[usize; 3]>) -> Self {
        Self::SurfaceMesh {
            faces: Arc::new(faces),
        }
    }

    /// Create a polyline topology.
    pub fn poly_line(edges: Vec<[usize; 2]>) -> Self {
        Self::PolyLine {
            edges: Arc::new(edges),
        }
    }

    /// Short type name, as used in logs and records.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PointCloud => "pointcloud",
            Self::SurfaceMesh { .. } => "surfacemesh",
            Self::PolyLine { .. } => "polyline",
        }
    }

    /// Check that every index refers to one of `npoints` points.
    pub fn validate(&self, npoints: usize) -> Result<()> {
        let max_index = match self {
            Self::PointCloud => None,
            Self::SurfaceMesh { faces } => faces.iter().flat_map(|f| f.iter()).max().copied(),
            Self::PolyLine { edges } => edges.iter().flat_map(|e| e.iter()).max().copied(),
        };
        match max_index {
            Some(index) if index >= npoints => Err(CoreError::invalid_shape(format!(
                "{} references point {} but the shape has {} points",
                self.name(),
                index,
                npoints
            ))),
            _ => Ok(()),
        }
    }

    /// Split the connectivity into per-corner index columns.
    pub(crate) fn index_columns(&self) -> Vec<Vec<i64>> {
        match self {
            Self::PointCloud => Vec::new(),
            Self::SurfaceMesh { faces } => (0..3)
                .map(|k| faces.iter().map(|f| f[k] as i64).collect())
                .collect(),
            Self::PolyLine { edges } => (0..2)
                .map(|k| edges.iter().map(|e| e[k] as i64).collect())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_point_cloud() {
        assert_eq!(Topology::default(), Topology::PointCloud);
        assert!(Topology::default().validate(0).is_ok());
    }

    #[test]
    fn test_out_of_range_face() {
        let mesh = Topology::surface_mesh(vec![[0, 1, 3]]);
        assert!(mesh.validate(3).is_err());
        assert!(mesh.validate(4).is_ok());
    }

    #[test]
    fn test_index_columns() {
        let line = Topology::poly_line(vec![[0, 1], [1, 2]]);
        assert_eq!(line.index_columns(), vec![vec![0, 1], vec![1, 2]]);
    }
}
