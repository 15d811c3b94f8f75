pub mod geometry;
pub mod handle;

pub use geometry::{JointVector, Matrix2D, Pose, MAX_AXES};
pub use handle::Handle;
