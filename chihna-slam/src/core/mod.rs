//! Fundamental types: transforms, observations, fiducials, and fusion.

mod fiducial;
pub mod fusion;
mod observation;
mod transform;

pub use fiducial::Fiducial;
pub use fusion::VarianceMode;
pub use observation::Observation;
pub use transform::Transform3D;
