//! Consumer façade: attaches to a segment, observes publications in lock
//! step, reads the payload zero-copy.

use crate::errors::LockstepError;
use crate::node::{Node, NodeState, SinkState, WAIT_SLICE};
use crate::segment::{self, Segment};
use crate::slot::SharedSlot;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Source<T: SharedSlot> {
    segment: Segment,
    node: NonNull<Node>,
    slot: NonNull<T>,
    slot_index: usize,
    /// Write number of the last sample this source finished observing;
    /// publications are detected as a difference against it, so stale
    /// barrier tokens only ever cause a spurious wake, never a re-read.
    last_write_number: u64,
    current_write_number: u64,
    interrupt: Arc<AtomicBool>,
    cycle_open: bool,
}

unsafe impl<T: SharedSlot> Send for Source<T> {}

impl<T: SharedSlot> Source<T> {
    /// Attach to the segment at `address`, creating it (control block and
    /// slot only) when the sink has not arrived yet.
    pub fn touch(address: &str) -> Result<Self, LockstepError> {
        let layout = segment::layout::<T>(0);
        let segment = Segment::open_or_create(address, layout.total)?;
        Self::attach(segment)
    }

    /// Attach strictly: fail with `SegmentNotFound` instead of creating.
    pub fn touch_existing(address: &str) -> Result<Self, LockstepError> {
        let layout = segment::layout::<T>(0);
        let segment = Segment::open_existing(address)?;
        if segment.len() < layout.total {
            return Err(LockstepError::SizeMismatch);
        }
        Self::attach(segment)
    }

    fn attach(segment: Segment) -> Result<Self, LockstepError> {
        let base = segment.base();
        let node = unsafe { Node::find_or_construct(base.cast::<Node>()) }?;

        // Slot claim and write-number snapshot must be one atomic step:
        // publications also run under the mutex, so the snapshot is exact
        // for the cycle boundary this source attached at.
        let (slot_index, observed) = {
            let guard = node.lock()?;
            let slot_index = guard.attach()?;
            (slot_index, node.write_number())
        };

        tracing::debug!(address = segment.address(), slot_index, "source attached");

        let layout = segment::layout::<T>(0);
        Ok(Self {
            node: NonNull::from(node),
            slot: unsafe { NonNull::new_unchecked(base.add(layout.slot).cast::<T>()) },
            slot_index,
            last_write_number: observed,
            current_write_number: observed,
            segment,
            interrupt: common::shutdown::quit_flag(),
            cycle_open: false,
        })
    }

    fn node(&self) -> &Node {
        unsafe { self.node.as_ref() }
    }

    /// Synchronize with the stream before the first read.
    ///
    /// If no sink has bound yet, block until one binds and publishes its
    /// first sample (which carries any payload metadata); the sample itself
    /// stays pending for the next `wait()`. With a sink already bound (or
    /// ended) this source is synchronized as of the current cycle boundary
    /// and returns immediately.
    pub fn connect(&mut self) -> Result<(), LockstepError> {
        if self.node().sink_state() != SinkState::Undefined {
            return Ok(());
        }
        loop {
            if self.interrupt.load(Ordering::Relaxed) {
                return Err(LockstepError::Interrupted);
            }
            let node = self.node();
            if node.write_number() != self.last_write_number
                || node.sink_state() == SinkState::End
            {
                return Ok(());
            }
            node.read_barrier(self.slot_index).timed_wait(WAIT_SLICE)?;
        }
    }

    /// Block until a fresh sample is published (`Active`) or the sink
    /// finishes (`End`).
    ///
    /// The publication check precedes the end-of-stream check, so a final
    /// sample published right before the sink left is still delivered.
    pub fn wait(&mut self) -> Result<NodeState, LockstepError> {
        loop {
            if self.interrupt.load(Ordering::Relaxed) {
                return Err(LockstepError::Interrupted);
            }
            let node = self.node();
            let write_number = node.write_number();
            if write_number != self.last_write_number {
                self.current_write_number = write_number;
                self.cycle_open = true;
                return Ok(NodeState::Active);
            }
            if node.sink_state() == SinkState::End {
                return Ok(NodeState::End);
            }
            node.read_barrier(self.slot_index).timed_wait(WAIT_SLICE)?;
        }
    }

    /// Borrow the payload in place. Valid between `wait()` returning
    /// `Active` and the matching `post()`.
    pub fn retrieve(&self) -> Result<&T, LockstepError> {
        if self.node().sink_state() == SinkState::Undefined {
            return Err(LockstepError::ReadWithoutBoundSink);
        }
        Ok(unsafe { self.slot.as_ref() })
    }

    /// Copy the payload out, for consumers that release the cycle quickly
    /// and process offline.
    pub fn clone_payload(&self) -> Result<T, LockstepError> {
        self.retrieve().copied()
    }

    /// Release the current sample: record it as observed and, as the last
    /// reader of the cycle, wake the producer.
    pub fn post(&mut self) -> Result<(), LockstepError> {
        if !self.cycle_open {
            return Err(LockstepError::PostWithoutWait);
        }
        self.cycle_open = false;
        self.last_write_number = self.current_write_number;

        let node = self.node();
        let (read, refs) = {
            let guard = node.lock()?;
            guard.mark_read()
        };
        if read >= refs {
            node.write_barrier().post()?;
        }
        Ok(())
    }

    /// Id of the sample currently or most recently observed; lets a
    /// consumer of several streams check time alignment.
    pub fn write_number(&self) -> u64 {
        self.current_write_number
    }

    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    pub fn address(&self) -> &str {
        self.segment.address()
    }

    /// Replace the process-wide quit flag with a caller-owned one.
    pub fn set_interrupt_flag(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = flag;
    }

    pub(crate) fn segment_len(&self) -> usize {
        self.segment.len()
    }

    /// Borrow `len` bytes of the bulk area starting `offset` bytes from the
    /// segment base.
    pub(crate) fn data_region(&self, offset: usize, len: usize) -> Result<&[u8], LockstepError> {
        if offset.checked_add(len).is_none_or(|end| end > self.segment.len()) {
            return Err(LockstepError::SizeMismatch);
        }
        Ok(unsafe { std::slice::from_raw_parts(self.segment.base().add(offset), len) })
    }

    /// Re-map the segment at its current on-host length. The mapping taken
    /// at attach time predates any growth performed by a later-arriving
    /// sink, so bulk payloads may need the wider view.
    pub(crate) fn remap(&mut self) -> Result<(), LockstepError> {
        let segment = Segment::open_existing(self.segment.address())?;
        let layout = segment::layout::<T>(0);
        let base = segment.base();

        self.node = unsafe { NonNull::new_unchecked(base.cast::<Node>()) };
        self.slot = unsafe { NonNull::new_unchecked(base.add(layout.slot).cast::<T>()) };
        self.segment = segment;
        Ok(())
    }
}

impl<T: SharedSlot> Drop for Source<T> {
    fn drop(&mut self) {
        let node = self.node();

        let (remaining, sink_bound) = match node.lock() {
            Ok(guard) => {
                let remaining = guard.detach(self.slot_index);
                (remaining, node.sink_state() == SinkState::Bound)
            }
            Err(e) => {
                tracing::warn!(address = self.segment.address(), error = %e,
                    "could not detach from node at source teardown");
                return;
            }
        };

        // A producer blocked on the write barrier may have been waiting for
        // precisely this consumer; wake it so it re-checks the counters.
        let _ = node.write_barrier().post();

        if remaining == 0 && !sink_bound {
            match Segment::unlink(self.segment.address()) {
                Ok(()) => tracing::debug!(address = self.segment.address(), "segment unlinked"),
                Err(e) => tracing::warn!(address = self.segment.address(), error = %e,
                    "segment unlink failed at source teardown"),
            }
        }
    }
}
