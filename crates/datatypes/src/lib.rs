pub mod frame;
pub mod position;
pub mod sample;

pub use frame::{Frame, FrameHeader, PixelFormat};
pub use position::{DistanceUnit, Position2D, PositionRecord, REGION_LEN};
pub use sample::Sample;
