//! Single-producer / multi-consumer lock-step streaming over named
//! shared-memory segments.
//!
//! One `Sink` and any number of `Source`s share a segment identified by a
//! string address. The in-segment `Node` control block mediates every
//! publication: the sink blocks until all attached sources have observed
//! the previous sample, each source blocks until the sink publishes a new
//! one. Payloads are read zero-copy in place; frame payloads keep their
//! pixels in the segment's bulk area.

pub mod errors;
pub mod frame;
pub mod names;
pub mod node;
pub mod segment;
pub mod sink;
pub mod slot;
pub mod source;
mod sync;

pub use errors::LockstepError;
pub use frame::{FrameRef, FrameSink, FrameSource};
pub use node::{MAX_CONSUMERS, NodeState, SinkState};
pub use segment::Segment;
pub use sink::Sink;
pub use slot::SharedSlot;
pub use source::Source;
