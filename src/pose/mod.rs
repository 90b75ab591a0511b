pub mod frame;
pub mod landmark;
pub mod source;

pub use frame::PoseFrame;
pub use landmark::{Landmark, LandmarkIndex};
pub use source::{Detection, LandmarkSource, ReplaySource};
