//! Shapes, shape pairs and their host-side records.

pub mod pair;
pub mod record;
pub mod reg_param;
#[allow(clippy::module_inception)]
pub mod shape;
pub mod topology;

pub use pair::ShapePair;
pub use record::{create_shape_pair, create_source_and_target, PairExport, PairRecord, ShapeRecord};
pub use reg_param::RegParam;
pub use shape::Shape;
pub use topology::Topology;
