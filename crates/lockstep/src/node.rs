//! The Node: per-segment control block shared by one sink and up to
//! `MAX_CONSUMERS` sources.
//!
//! Lives at offset 0 of the mapping. Counter transitions happen under the
//! in-segment mutex; reads use acquire loads so a reader of a counter also
//! observes the writes that preceded its update. The write number is the
//! authoritative publication indicator; the embedded semaphores are
//! wake-up doorbells, so stale tokens are harmless.

use crate::errors::LockstepError;
use crate::sync::SharedSemaphore;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Fixed consumer capacity per segment; keeps the read-barrier array flat
/// and the Node a plain block of known size.
pub const MAX_CONSUMERS: usize = 10;

/// One slice of every blocking loop: long enough to sleep, short enough to
/// notice departures, end-of-stream and shutdown promptly.
pub(crate) const WAIT_SLICE: Duration = Duration::from_millis(10);

const UNINIT: u32 = 0;
const CONSTRUCTING: u32 = 1;
const READY: u32 = 2;

/// Bound on waiting for another process to finish constructing the Node or
/// to release the mutex; a peer that died holding either cannot wedge us.
const NODE_TIMEOUT: Duration = Duration::from_secs(1);

/// Producer lifecycle. `End` is latched: once a sink has finished, the
/// stream never becomes active again.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Undefined = 0,
    Bound = 1,
    End = 2,
}

impl SinkState {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(SinkState::Undefined),
            1 => Some(SinkState::Bound),
            2 => Some(SinkState::End),
            _ => None,
        }
    }
}

/// What a source's `wait` observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// A fresh sample is ready to read.
    Active,
    /// The sink has finished; no further samples will arrive.
    End,
}

#[repr(C, align(64))]
pub struct Node {
    construct_state: AtomicU32,
    sink_state: AtomicU32,
    source_ref_count: AtomicU32,
    source_read_count: AtomicU32,
    slot_mask: AtomicU32,
    write_number: AtomicU64,
    mutex: UnsafeCell<libc::sem_t>,
    write_barrier: UnsafeCell<libc::sem_t>,
    read_barriers: [UnsafeCell<libc::sem_t>; MAX_CONSUMERS],
}

impl Node {
    /// Find-or-construct over a zero-filled or previously initialized cell.
    ///
    /// Exactly one caller wins the construct latch and initializes the
    /// semaphores; racers spin until the latch reads ready. Idempotent per
    /// segment.
    ///
    /// # Safety
    /// `ptr` must point at `size_of::<Node>()` bytes inside a live shared
    /// mapping that outlives the returned reference, zero-filled on first
    /// use.
    pub(crate) unsafe fn find_or_construct<'a>(ptr: *mut Node) -> Result<&'a Node, LockstepError> {
        let node = unsafe { &*ptr };
        match node.construct_state.compare_exchange(
            UNINIT,
            CONSTRUCTING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                unsafe {
                    SharedSemaphore::init(node.mutex.get(), 1)?;
                    SharedSemaphore::init(node.write_barrier.get(), 0)?;
                    for barrier in &node.read_barriers {
                        SharedSemaphore::init(barrier.get(), 0)?;
                    }
                }
                node.construct_state.store(READY, Ordering::Release);
                Ok(node)
            }
            Err(_) => {
                let deadline = Instant::now() + NODE_TIMEOUT;
                while node.construct_state.load(Ordering::Acquire) != READY {
                    if Instant::now() > deadline {
                        return Err(LockstepError::NodeUnresponsive);
                    }
                    std::thread::yield_now();
                }
                Ok(node)
            }
        }
    }

    pub fn sink_state(&self) -> SinkState {
        SinkState::from_u32(self.sink_state.load(Ordering::Acquire)).unwrap_or(SinkState::Undefined)
    }

    /// Latch the sink lifecycle at `End`. Safe to call from teardown paths
    /// without the mutex; the transition is one-way.
    pub(crate) fn latch_end(&self) {
        self.sink_state.store(SinkState::End as u32, Ordering::Release);
    }

    pub fn source_ref_count(&self) -> u32 {
        self.source_ref_count.load(Ordering::Acquire)
    }

    pub fn source_read_count(&self) -> u32 {
        self.source_read_count.load(Ordering::Acquire)
    }

    pub fn write_number(&self) -> u64 {
        self.write_number.load(Ordering::Acquire)
    }

    pub(crate) fn write_barrier(&self) -> SharedSemaphore {
        unsafe { SharedSemaphore::from_cell(self.write_barrier.get()) }
    }

    pub(crate) fn read_barrier(&self, slot: usize) -> SharedSemaphore {
        unsafe { SharedSemaphore::from_cell(self.read_barriers[slot].get()) }
    }

    fn mutex(&self) -> SharedSemaphore {
        unsafe { SharedSemaphore::from_cell(self.mutex.get()) }
    }

    /// Acquire the in-segment mutex, bounded by `NODE_TIMEOUT`.
    pub(crate) fn lock(&self) -> Result<NodeGuard<'_>, LockstepError> {
        let deadline = Instant::now() + NODE_TIMEOUT;
        loop {
            if self.mutex().timed_wait(WAIT_SLICE)? {
                return Ok(NodeGuard { node: self });
            }
            if Instant::now() > deadline {
                return Err(LockstepError::NodeUnresponsive);
            }
        }
    }
}

/// RAII holder of the Node mutex; all counter transitions go through it.
pub(crate) struct NodeGuard<'a> {
    node: &'a Node,
}

impl Drop for NodeGuard<'_> {
    fn drop(&mut self) {
        let _ = self.node.mutex().post();
    }
}

impl NodeGuard<'_> {
    /// Attach a consumer: claim the lowest free slot and bump the ref
    /// count. A consumer arriving while the sink is bound is counted as
    /// having already read the current sample, so the producer's barrier
    /// stays conservative and the joiner first observes the next cycle.
    pub(crate) fn attach(&self) -> Result<usize, LockstepError> {
        let node = self.node;
        let mask = node.slot_mask.load(Ordering::Acquire);
        let Some(slot) = (0..MAX_CONSUMERS).find(|i| mask & (1 << i) == 0) else {
            return Err(LockstepError::TooManyConsumers(MAX_CONSUMERS));
        };
        node.slot_mask.store(mask | (1 << slot), Ordering::Release);
        node.source_ref_count.fetch_add(1, Ordering::AcqRel);
        if node.sink_state() == SinkState::Bound {
            node.source_read_count.fetch_add(1, Ordering::AcqRel);
        }
        Ok(slot)
    }

    /// Detach a consumer; returns the post-decrement ref count.
    pub(crate) fn detach(&self, slot: usize) -> u32 {
        let node = self.node;
        node.slot_mask.fetch_and(!(1 << slot), Ordering::AcqRel);
        node.source_ref_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Record that this consumer finished observing the current sample.
    /// Returns the new read count and the ref count it is measured against.
    pub(crate) fn mark_read(&self) -> (u32, u32) {
        let read = self.node.source_read_count.fetch_add(1, Ordering::AcqRel) + 1;
        (read, self.node.source_ref_count())
    }

    /// Transition the sink from `Undefined` to `Bound`.
    pub(crate) fn bind_sink(&self) -> Result<(), LockstepError> {
        if self.node.sink_state() != SinkState::Undefined {
            return Err(LockstepError::AlreadyBound);
        }
        self.node
            .sink_state
            .store(SinkState::Bound as u32, Ordering::Release);
        Ok(())
    }

    /// Open the next publication cycle: advance the write number, zero the
    /// read count and snapshot the occupancy mask, all in one critical
    /// section so an attach lands wholly before or wholly after it.
    pub(crate) fn begin_publication(&self) -> u32 {
        self.node.write_number.fetch_add(1, Ordering::AcqRel);
        self.node.source_read_count.store(0, Ordering::Release);
        self.node.slot_mask.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::MaybeUninit;

    fn fresh_node() -> (Box<MaybeUninit<Node>>, &'static Node) {
        let mut cell: Box<MaybeUninit<Node>> = Box::new(MaybeUninit::zeroed());
        let node = unsafe { Node::find_or_construct(cell.as_mut_ptr().cast()) }.unwrap();
        (cell, node)
    }

    #[test]
    fn node_is_cache_line_aligned() {
        assert_eq!(std::mem::align_of::<Node>(), 64);
    }

    #[test]
    fn find_or_construct_is_idempotent() {
        let (mut cell, node) = fresh_node();
        assert_eq!(node.write_number(), 0);
        assert_eq!(node.sink_state(), SinkState::Undefined);

        // Second call over the same cell finds, does not re-init.
        let again = unsafe { Node::find_or_construct(cell.as_mut_ptr().cast()) }.unwrap();
        assert_eq!(again.source_ref_count(), 0);
    }

    #[test]
    fn attach_assigns_lowest_free_slot() {
        let (_cell, node) = fresh_node();
        let guard = node.lock().unwrap();

        assert_eq!(guard.attach().unwrap(), 0);
        assert_eq!(guard.attach().unwrap(), 1);
        assert_eq!(guard.attach().unwrap(), 2);
        assert_eq!(node.source_ref_count(), 3);

        // Releasing the middle slot makes it the next assignment.
        assert_eq!(guard.detach(1), 2);
        assert_eq!(guard.attach().unwrap(), 1);
    }

    #[test]
    fn attach_fails_beyond_capacity() {
        let (_cell, node) = fresh_node();
        let guard = node.lock().unwrap();

        for expected in 0..MAX_CONSUMERS {
            assert_eq!(guard.attach().unwrap(), expected);
        }
        assert!(matches!(
            guard.attach(),
            Err(LockstepError::TooManyConsumers(MAX_CONSUMERS))
        ));
    }

    #[test]
    fn attach_while_bound_counts_as_already_read() {
        let (_cell, node) = fresh_node();
        let guard = node.lock().unwrap();
        guard.bind_sink().unwrap();

        guard.attach().unwrap();
        assert_eq!(node.source_read_count(), 1);
        assert_eq!(node.source_ref_count(), 1);
    }

    #[test]
    fn bind_is_exclusive_and_end_is_latched() {
        let (_cell, node) = fresh_node();
        {
            let guard = node.lock().unwrap();
            guard.bind_sink().unwrap();
            assert!(matches!(
                guard.bind_sink(),
                Err(LockstepError::AlreadyBound)
            ));
        }

        node.latch_end();
        assert_eq!(node.sink_state(), SinkState::End);
        let guard = node.lock().unwrap();
        assert!(matches!(
            guard.bind_sink(),
            Err(LockstepError::AlreadyBound)
        ));
    }

    #[test]
    fn begin_publication_resets_reads_and_snapshots_mask() {
        let (_cell, node) = fresh_node();
        let guard = node.lock().unwrap();
        guard.bind_sink().unwrap();
        guard.attach().unwrap();
        guard.attach().unwrap();

        let mask = guard.begin_publication();
        assert_eq!(mask, 0b11);
        assert_eq!(node.write_number(), 1);
        assert_eq!(node.source_read_count(), 0);

        let (read, refs) = guard.mark_read();
        assert_eq!((read, refs), (1, 2));
    }
}
