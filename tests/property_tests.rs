//! Invariant checks over the public `Queue` API (`spec.md` §8).

use proptest::prelude::*;
use ringshm_rs::codecs::BytesCodec;
use ringshm_rs::{Queue, QueueConfig, QueueError};

fn byte_queue(capacity_bytes: usize) -> Queue<Vec<u8>, BytesCodec> {
    Queue::new(QueueConfig::with_capacity(capacity_bytes), BytesCodec).unwrap()
}

fn small_records() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

proptest! {
    #[test]
    fn single_producer_order_is_preserved(records in prop::collection::vec(small_records(), 1..200)) {
        let q = byte_queue(1 << 20);
        for r in &records {
            q.put_nowait(r).unwrap();
        }
        for expected in &records {
            let got = q.get_nowait().unwrap();
            prop_assert_eq!(&got, expected);
        }
        prop_assert!(q.empty().unwrap());
    }

    #[test]
    fn count_tracks_puts_minus_gets(records in prop::collection::vec(small_records(), 0..200)) {
        let q = byte_queue(1 << 20);
        for (i, r) in records.iter().enumerate() {
            q.put_nowait(r).unwrap();
            prop_assert_eq!(q.size().unwrap(), i + 1);
        }
        for i in (0..records.len()).rev() {
            q.get_nowait().unwrap();
            prop_assert_eq!(q.size().unwrap(), i);
        }
    }

    #[test]
    fn round_trip_preserves_exact_bytes(record in small_records()) {
        let q = byte_queue(4096);
        q.put_nowait(&record).unwrap();
        let got = q.get_nowait().unwrap();
        prop_assert_eq!(got, record);
    }

    #[test]
    fn put_many_then_get_many_yields_the_same_sequence(
        records in prop::collection::vec(small_records(), 1..50)
    ) {
        let q = byte_queue(1 << 20);
        q.put_many(&records, false, None).unwrap();
        let got = q.get_many(records.len(), false, None, None).unwrap();
        prop_assert_eq!(got, records);
    }

    #[test]
    fn wrap_around_preserves_order_in_a_tiny_ring(
        records in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..4), 1..500)
    ) {
        // Ring barely bigger than one max-sized framed record, forcing
        // constant wrap-around under interleaved put/get.
        let q = byte_queue(32);
        for r in &records {
            loop {
                match q.put_nowait(r) {
                    Ok(()) => break,
                    Err(QueueError::Full) => {
                        q.get_nowait().unwrap();
                    }
                    Err(e) => panic!("unexpected put error: {e:?}"),
                }
            }
        }
        let mut drained = Vec::new();
        while !q.empty().unwrap() {
            drained.push(q.get_nowait().unwrap());
        }
        prop_assert_eq!(drained.len(), records.len());
    }

    #[test]
    fn batch_exceeding_capacity_is_rejected_without_mutating_state(
        records in prop::collection::vec(prop::collection::vec(any::<u8>(), 100..200), 5..20)
    ) {
        let q = byte_queue(64);
        let before = q.size().unwrap();
        let err = q.put_many(&records, false, None).unwrap_err();
        prop_assert!(matches!(err, QueueError::TooLarge { .. }));
        prop_assert_eq!(q.size().unwrap(), before);
        prop_assert!(q.empty().unwrap());
    }
}

#[test]
fn timeout_never_waits_meaningfully_longer_than_requested() {
    use std::time::{Duration, Instant};
    let q = byte_queue(1024);
    let budget = Duration::from_millis(150);
    let started = Instant::now();
    assert!(matches!(q.get(true, Some(budget)), Err(QueueError::Empty)));
    let elapsed = started.elapsed();
    assert!(elapsed >= budget);
    assert!(elapsed < budget * 5, "waited {elapsed:?} for a {budget:?} budget");
}

#[test]
fn close_is_idempotent_and_unblocks_future_waiters_immediately() {
    use std::time::Duration;
    let q = byte_queue(1024);
    q.close().unwrap();
    q.close().unwrap();
    let started = std::time::Instant::now();
    assert!(matches!(
        q.get(true, Some(Duration::from_secs(5))),
        Err(QueueError::Closed)
    ));
    assert!(started.elapsed() < Duration::from_millis(500));
}
