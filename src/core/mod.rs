pub mod frame;
pub mod tracking_state;

pub use frame::{CombinedGaze, EyeData, Frame, Point2, Side};
pub use tracking_state::TrackingState;
