pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubEstimator;

#[cfg(feature = "backend-tract")]
pub use tract::TractPoseEstimator;
