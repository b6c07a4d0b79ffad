pub mod aabb;
pub mod candidates;
pub mod false_positive;
pub mod hough;
pub mod overlap;

pub use aabb::AABB;
pub use candidates::{CandidateSet, Circle};
pub use false_positive::is_false_positive;
pub use hough::{CircleDetector, HoughGradient, HoughParams};
pub use overlap::{OverlapResolver, OverlapSettings};
