use datatypes::{FrameHeader, Position2D};

/// Payload types that may occupy the slot of a shared segment.
///
/// # Safety
/// Implementors must be `#[repr(C)]`, contain no pointers, references or
/// other address-space-local values, and must treat all-zero bytes as a
/// valid default (segments are zero-filled at creation and the slot is
/// never explicitly constructed).
pub unsafe trait SharedSlot: Copy + Send + Sync + 'static {}

unsafe impl SharedSlot for Position2D {}
unsafe impl SharedSlot for FrameHeader {}
