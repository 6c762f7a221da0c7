//! Producer façade: binds a segment, owns the payload slot, publishes in
//! lock step with the attached consumers.

use crate::errors::LockstepError;
use crate::node::{MAX_CONSUMERS, Node, SinkState, WAIT_SLICE};
use crate::segment::{self, Segment};
use crate::slot::SharedSlot;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Sink<T: SharedSlot> {
    segment: Segment,
    node: NonNull<Node>,
    slot: NonNull<T>,
    data_offset: usize,
    interrupt: Arc<AtomicBool>,
    cycle_open: bool,
}

unsafe impl<T: SharedSlot> Send for Sink<T> {}

impl<T: SharedSlot> Sink<T> {
    /// Open or create the segment at `address` sized for the control block,
    /// one slot of `T` and `payload_bytes` of bulk area, then take producer
    /// ownership of it.
    ///
    /// Exactly one `bind` per address succeeds; a second sink gets
    /// `AlreadyBound`.
    pub fn bind(address: &str, payload_bytes: usize) -> Result<Self, LockstepError> {
        Self::bind_with(address, payload_bytes, None)
    }

    /// `bind` with an initial slot value written before the `Bound` state
    /// becomes visible, so a consumer that observes a bound sink can rely
    /// on the slot's metadata without further synchronization.
    pub(crate) fn bind_with(
        address: &str,
        payload_bytes: usize,
        initial: Option<T>,
    ) -> Result<Self, LockstepError> {
        let layout = segment::layout::<T>(payload_bytes);
        let segment = Segment::open_or_create(address, layout.total)?;

        let base = segment.base();
        let node = unsafe { Node::find_or_construct(base.cast::<Node>()) }?;
        let slot = unsafe { NonNull::new_unchecked(base.add(layout.slot).cast::<T>()) };

        {
            let guard = node.lock()?;
            if node.sink_state() != SinkState::Undefined {
                return Err(LockstepError::AlreadyBound);
            }
            if let Some(value) = initial {
                unsafe { slot.as_ptr().write(value) };
            }
            guard.bind_sink()?;
        }

        tracing::debug!(address, bytes = layout.total, "sink bound");

        Ok(Self {
            node: NonNull::from(node),
            slot,
            data_offset: layout.data,
            segment,
            interrupt: common::shutdown::quit_flag(),
            cycle_open: false,
        })
    }

    fn node(&self) -> &Node {
        unsafe { self.node.as_ref() }
    }

    /// Block until every attached consumer has observed the previous sample
    /// (or no consumer is attached), then take write ownership of the slot.
    ///
    /// The loop re-checks the counters every timed-wait slice, so consumer
    /// departures and shutdown requests are noticed within one slice.
    pub fn wait(&mut self) -> Result<(), LockstepError> {
        loop {
            if self.interrupt.load(Ordering::Relaxed) {
                return Err(LockstepError::Interrupted);
            }
            let node = self.node();
            let refs = node.source_ref_count();
            if refs == 0 || node.write_number() == 0 || node.source_read_count() >= refs {
                break;
            }
            node.write_barrier().timed_wait(WAIT_SLICE)?;
        }
        self.cycle_open = true;
        Ok(())
    }

    /// The slot, for in-place mutation. Only meaningful between `wait()`
    /// and `post()`; outside a cycle consumers may be reading it.
    pub fn payload_mut(&mut self) -> &mut T {
        unsafe { self.slot.as_mut() }
    }

    /// Bulk area following the slot, for payloads that spill past it.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let len = self.segment.len() - self.data_offset;
        unsafe {
            std::slice::from_raw_parts_mut(self.segment.base().add(self.data_offset), len)
        }
    }

    /// Publish the mutated slot: advance the write number and wake every
    /// attached consumer exactly once.
    pub fn post(&mut self) -> Result<(), LockstepError> {
        if !self.cycle_open {
            return Err(LockstepError::PostWithoutWait);
        }
        self.cycle_open = false;

        let node = self.node();
        let mask = node.lock()?.begin_publication();
        for slot in 0..MAX_CONSUMERS {
            if mask & (1 << slot) != 0 {
                node.read_barrier(slot).post()?;
            }
        }
        Ok(())
    }

    /// One full cycle: wait, store `value` in the slot, post.
    pub fn push(&mut self, value: T) -> Result<(), LockstepError> {
        self.wait()?;
        *self.payload_mut() = value;
        self.post()
    }

    pub fn write_number(&self) -> u64 {
        self.node().write_number()
    }

    pub fn source_ref_count(&self) -> u32 {
        self.node().source_ref_count()
    }

    pub fn address(&self) -> &str {
        self.segment.address()
    }

    /// Replace the process-wide quit flag with a caller-owned one.
    pub fn set_interrupt_flag(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = flag;
    }
}

impl<T: SharedSlot> Drop for Sink<T> {
    fn drop(&mut self) {
        let node = self.node();

        // Latch end-of-stream first, then wake every consumer slot once so
        // nobody stays blocked on a barrier that will never be posted again.
        node.latch_end();
        for slot in 0..MAX_CONSUMERS {
            let _ = node.read_barrier(slot).post();
        }

        let remaining = match node.lock() {
            Ok(guard) => {
                let refs = node.source_ref_count();
                drop(guard);
                refs
            }
            Err(e) => {
                tracing::warn!(address = self.segment.address(), error = %e,
                    "could not inspect node at sink teardown");
                return;
            }
        };

        if remaining == 0 {
            match Segment::unlink(self.segment.address()) {
                Ok(()) => tracing::debug!(address = self.segment.address(), "segment unlinked"),
                Err(e) => tracing::warn!(address = self.segment.address(), error = %e,
                    "segment unlink failed at sink teardown"),
            }
        } else {
            tracing::debug!(
                address = self.segment.address(),
                remaining,
                "sink finished with consumers still attached"
            );
        }
    }
}
