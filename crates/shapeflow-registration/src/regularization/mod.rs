//! Regularization of the registration parameter.
//!
//! * **GeodesicDistance**: kinetic energy of the momentum under the kernel metric
//! * **RegFactorScheduleConfig**: sigmoid decay of the regularization weight

pub mod geodesic;
pub mod schedule;
pub mod trait_;

pub use geodesic::GeodesicDistance;
pub use schedule::{sigmoid_decay, RegFactorScheduleConfig};
pub use trait_::Regularizer;
