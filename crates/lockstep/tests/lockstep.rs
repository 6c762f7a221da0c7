//! End-to-end protocol tests: sinks and sources on separate threads sharing
//! uniquely named segments, exercising delivery, ordering, late join,
//! fan-out, teardown and the frame fast path.

use datatypes::{PixelFormat, Position2D};
use lockstep::{FrameSink, FrameSource, LockstepError, NodeState, Segment, Sink, Source};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn test_address(tag: &str) -> String {
    format!("lockstep-it-{}-{}", tag, std::process::id())
}

fn position(x: f64, y: f64) -> Position2D {
    let mut p = Position2D::default();
    p.position_valid = true;
    p.position = [x, y];
    p
}

fn segment_absent(address: &str) -> bool {
    matches!(
        Segment::open_existing(address),
        Err(LockstepError::SegmentNotFound(_))
    )
}

/// Scenario: single consumer echo. Two pushed samples arrive in order with
/// consecutive write numbers, then end-of-stream, then the segment is gone.
#[test]
fn single_consumer_echo() {
    let address = test_address("echo");
    let _ = Segment::unlink(&address);

    let mut source = Source::<Position2D>::touch(&address).unwrap();

    let producer = {
        let address = address.clone();
        thread::spawn(move || {
            let mut sink = Sink::<Position2D>::bind(&address, 0).unwrap();
            sink.push(position(1.0, 2.0)).unwrap();
            sink.push(position(3.0, 4.0)).unwrap();
        })
    };

    source.connect().unwrap();

    assert_eq!(source.wait().unwrap(), NodeState::Active);
    let first = *source.retrieve().unwrap();
    assert_eq!(first.position, [1.0, 2.0]);
    assert!(first.position_valid);
    assert_eq!(source.write_number(), 1);
    source.post().unwrap();

    assert_eq!(source.wait().unwrap(), NodeState::Active);
    assert_eq!(source.retrieve().unwrap().position, [3.0, 4.0]);
    assert_eq!(source.write_number(), 2);
    source.post().unwrap();

    assert_eq!(source.wait().unwrap(), NodeState::End);
    producer.join().unwrap();

    drop(source);
    assert!(segment_absent(&address));
}

/// Scenario: late join. A consumer attaching after sample 1 observes sample
/// 2 and never the stale sample 1.
#[test]
fn late_joiner_never_sees_a_stale_sample() {
    let address = test_address("latejoin");
    let _ = Segment::unlink(&address);

    let mut sink = Sink::<Position2D>::bind(&address, 0).unwrap();
    sink.push(position(1.0, 1.0)).unwrap();

    let mut source = Source::<Position2D>::touch(&address).unwrap();
    source.connect().unwrap();

    sink.push(position(2.0, 2.0)).unwrap();

    assert_eq!(source.wait().unwrap(), NodeState::Active);
    assert_eq!(source.write_number(), 2);
    assert_eq!(source.retrieve().unwrap().position, [2.0, 2.0]);
    source.post().unwrap();

    drop(sink);
    assert_eq!(source.wait().unwrap(), NodeState::End);
    drop(source);
    assert!(segment_absent(&address));
}

/// Scenario: fan-out of two. Both consumers observe the same samples in the
/// same order, exactly once each.
#[test]
fn two_consumers_observe_every_sample_in_order() {
    let address = test_address("fanout");
    let _ = Segment::unlink(&address);

    let values: Vec<f64> = (1..=25).map(|v| v as f64 * 10.0).collect();

    let sources: Vec<Source<Position2D>> = (0..2)
        .map(|_| Source::<Position2D>::touch(&address).unwrap())
        .collect();

    let consumers: Vec<_> = sources
        .into_iter()
        .map(|mut source| {
            thread::spawn(move || {
                source.connect().unwrap();
                let mut seen = Vec::new();
                let mut write_numbers = Vec::new();
                loop {
                    match source.wait().unwrap() {
                        NodeState::Active => {
                            seen.push(source.retrieve().unwrap().position[0]);
                            write_numbers.push(source.write_number());
                            source.post().unwrap();
                        }
                        NodeState::End => break,
                    }
                }
                (seen, write_numbers)
            })
        })
        .collect();

    let mut sink = Sink::<Position2D>::bind(&address, 0).unwrap();
    for &v in &values {
        sink.push(position(v, 0.0)).unwrap();
    }
    drop(sink);

    for consumer in consumers {
        let (seen, write_numbers) = consumer.join().unwrap();
        assert_eq!(seen, values);
        let expected: Vec<u64> = (1..=values.len() as u64).collect();
        assert_eq!(write_numbers, expected);
    }

    assert!(segment_absent(&address));
}

/// Scenario: the sink disappearing wakes every blocked consumer within a
/// few wait slices, and the last one out removes the segment.
#[test]
fn sink_teardown_wakes_blocked_consumers() {
    let address = test_address("teardown");
    let _ = Segment::unlink(&address);

    let sink = Sink::<Position2D>::bind(&address, 0).unwrap();

    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let mut source = Source::<Position2D>::touch(&address).unwrap();
            thread::spawn(move || {
                source.connect().unwrap();
                let started = Instant::now();
                assert_eq!(source.wait().unwrap(), NodeState::End);
                started.elapsed()
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    drop(sink);

    for consumer in consumers {
        let blocked_for = consumer.join().unwrap();
        assert!(
            blocked_for < Duration::from_secs(2),
            "consumer stayed blocked for {blocked_for:?}"
        );
    }

    assert!(segment_absent(&address));
}

/// A raised interrupt flag unblocks any wait within a few slices.
#[test]
fn interrupt_flag_unblocks_waits() {
    let address = test_address("interrupt");
    let _ = Segment::unlink(&address);

    let quit = Arc::new(AtomicBool::new(false));

    let _sink = Sink::<Position2D>::bind(&address, 0).unwrap();
    let mut source = Source::<Position2D>::touch(&address).unwrap();
    source.set_interrupt_flag(Arc::clone(&quit));
    source.connect().unwrap();

    let consumer = thread::spawn(move || {
        let started = Instant::now();
        let result = source.wait();
        (result, started.elapsed())
    });

    thread::sleep(Duration::from_millis(30));
    quit.store(true, Ordering::Relaxed);

    let (result, blocked_for) = consumer.join().unwrap();
    assert!(matches!(result, Err(LockstepError::Interrupted)));
    assert!(blocked_for < Duration::from_secs(2));
}

/// A producer blocked on unread consumers is released when the interrupt
/// flag rises.
#[test]
fn interrupt_flag_unblocks_a_waiting_producer() {
    let address = test_address("producer-interrupt");
    let _ = Segment::unlink(&address);

    let quit = Arc::new(AtomicBool::new(false));

    let source = Source::<Position2D>::touch(&address).unwrap();
    let mut sink = Sink::<Position2D>::bind(&address, 0).unwrap();
    sink.set_interrupt_flag(Arc::clone(&quit));
    sink.push(position(1.0, 1.0)).unwrap();

    // The consumer never reads, so the next wait cannot be satisfied.
    let producer = thread::spawn(move || {
        let result = sink.wait();
        drop(sink);
        result
    });

    thread::sleep(Duration::from_millis(30));
    quit.store(true, Ordering::Relaxed);

    assert!(matches!(
        producer.join().unwrap(),
        Err(LockstepError::Interrupted)
    ));
    drop(source);
    assert!(segment_absent(&address));
}

/// A consumer detaching mid-wait is noticed by the producer's timed
/// re-check even though nobody posts the write barrier for it.
#[test]
fn producer_notices_departing_consumer() {
    let address = test_address("departure");
    let _ = Segment::unlink(&address);

    let mut sink = Sink::<Position2D>::bind(&address, 0).unwrap();
    let source = Source::<Position2D>::touch(&address).unwrap();

    sink.push(position(1.0, 1.0)).unwrap();

    let producer = thread::spawn(move || {
        // Blocks until the only attached consumer reads or leaves.
        sink.push(position(2.0, 2.0)).unwrap();
        sink.write_number()
    });

    thread::sleep(Duration::from_millis(30));
    drop(source);

    assert_eq!(producer.join().unwrap(), 2);
}

/// Scenario: frame zero-copy. The view aliases segment memory across
/// cycles; clones are detached deep copies.
#[test]
fn frame_views_are_zero_copy_and_clones_are_deep() {
    let address = test_address("frames");
    let _ = Segment::unlink(&address);

    // Source first: its attach-time mapping predates the sink's growth of
    // the segment, forcing the re-map path in connect().
    let mut source = FrameSource::touch(&address).unwrap();
    let mut sink = FrameSink::bind(&address, 4, 6, PixelFormat::Gray8).unwrap();

    let first: Vec<u8> = (0u8..24).collect();
    sink.wait().unwrap();
    sink.data_mut().copy_from_slice(&first);
    sink.post().unwrap();

    source.connect().unwrap();
    assert_eq!(source.wait().unwrap(), NodeState::Active);

    let view = source.frame().unwrap();
    assert_eq!((view.rows, view.cols), (4, 6));
    assert_eq!(view.pixel_format, PixelFormat::Gray8);
    assert_eq!(view.data, &first[..]);
    let view_ptr = view.data.as_ptr() as usize;

    let clone = source.clone_frame().unwrap();
    assert_ne!(clone.data.as_ptr() as usize, view_ptr);
    source.post().unwrap();

    let second: Vec<u8> = (0u8..24).map(|v| v.wrapping_add(100)).collect();
    sink.push_frame(&second).unwrap();

    assert_eq!(source.wait().unwrap(), NodeState::Active);
    let view = source.frame().unwrap();
    // Same backing memory as the first cycle: nothing was copied.
    assert_eq!(view.data.as_ptr() as usize, view_ptr);
    assert_eq!(view.data, &second[..]);
    source.post().unwrap();

    // The earlier deep copy is unaffected by later publications.
    assert_eq!(clone.data, first);

    drop(sink);
    drop(source);
    assert!(segment_absent(&address));
}

/// Rejecting a mis-sized pixel buffer keeps the cycle unopened.
#[test]
fn push_frame_rejects_mismatched_sizes() {
    let address = test_address("badframe");
    let _ = Segment::unlink(&address);

    let mut sink = FrameSink::bind(&address, 2, 2, PixelFormat::Bgr8).unwrap();
    assert!(matches!(
        sink.push_frame(&[0u8; 5]),
        Err(LockstepError::SizeMismatch)
    ));
    sink.push_frame(&[0u8; 12]).unwrap();
}

/// Attaching more than the slot capacity fails cleanly.
#[test]
fn attach_beyond_capacity_fails() {
    let address = test_address("capacity");
    let _ = Segment::unlink(&address);

    let sink = Sink::<Position2D>::bind(&address, 0).unwrap();

    let mut sources = Vec::new();
    for _ in 0..lockstep::MAX_CONSUMERS {
        sources.push(Source::<Position2D>::touch(&address).unwrap());
    }
    assert!(matches!(
        Source::<Position2D>::touch(&address),
        Err(LockstepError::TooManyConsumers(_))
    ));

    drop(sources);
    drop(sink);
    assert!(segment_absent(&address));
}

/// Lifecycle check: a sink alone leaves nothing behind, and a full
/// sink/source pair tears down regardless of drop order.
#[test]
fn last_participant_unlinks_the_segment() {
    let address = test_address("lifecycle");
    let _ = Segment::unlink(&address);

    // Sink alone.
    let sink = Sink::<Position2D>::bind(&address, 0).unwrap();
    drop(sink);
    assert!(segment_absent(&address));

    // Source outliving the sink.
    let mut sink = Sink::<Position2D>::bind(&address, 0).unwrap();
    let source = Source::<Position2D>::touch(&address).unwrap();
    sink.push(position(5.0, 5.0)).unwrap();
    drop(sink);
    assert!(!segment_absent(&address));
    drop(source);
    assert!(segment_absent(&address));
}
