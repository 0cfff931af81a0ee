use ringshm_rs::codecs::BytesCodec;
use ringshm_rs::{Queue, QueueConfig, QueueError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn byte_queue(capacity_bytes: usize) -> Queue<Vec<u8>, BytesCodec> {
    Queue::new(QueueConfig::with_capacity(capacity_bytes), BytesCodec).unwrap()
}

/// Initializes a `tracing` subscriber once per test binary, gated by
/// `RUST_LOG`, so the crate's `debug!`/`warn!`/`trace!` lines (segment
/// create/close, robust-mutex recovery, scratch growth) are visible when
/// diagnosing a failure in the blocking/multi-threaded tests below. Mirrors
/// `examples/bearcove-dodeca`'s `integration-tests` binary setup.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[test]
fn fifo_ordering_single_producer() {
    let q = byte_queue(1 << 16);
    const N: u64 = 10_000;

    for i in 0..N {
        q.put_nowait(&i.to_le_bytes().to_vec()).unwrap();
    }

    for expected in 0..N {
        let bytes = q.get_nowait().unwrap();
        assert_eq!(u64::from_le_bytes(bytes.try_into().unwrap()), expected);
    }
    assert!(q.empty().unwrap());
}

#[test]
fn fifo_ordering_multi_producer_per_producer_order_preserved() {
    init_tracing();
    const N_PRODUCERS: usize = 20;
    const ITEMS_PER_PRODUCER: u64 = 50_000;

    let producer = byte_queue(4 * 1024 * 1024);
    let mut handles = vec![];

    for producer_id in 0..N_PRODUCERS {
        let q = producer.clone();
        handles.push(thread::spawn(move || {
            for i in 0..ITEMS_PER_PRODUCER {
                let mut record = Vec::with_capacity(16);
                record.extend_from_slice(&(producer_id as u64).to_le_bytes());
                record.extend_from_slice(&i.to_le_bytes());
                q.put(&record, true, Some(Duration::from_secs(5))).unwrap();
            }
        }));
    }

    // Three consumers pulling bulk batches, tracking per-producer sequence.
    const N_CONSUMERS: usize = 3;
    let last_seen: Arc<Vec<std::sync::Mutex<u64>>> = Arc::new(
        (0..N_PRODUCERS)
            .map(|_| std::sync::Mutex::new(0))
            .collect(),
    );
    let total_consumed = Arc::new(AtomicUsize::new(0));
    let target = N_PRODUCERS * ITEMS_PER_PRODUCER as usize;

    let mut consumer_handles = vec![];
    for _ in 0..N_CONSUMERS {
        let q = producer.clone();
        let last_seen = Arc::clone(&last_seen);
        let total_consumed = Arc::clone(&total_consumed);
        consumer_handles.push(thread::spawn(move || {
            while total_consumed.load(Ordering::Relaxed) < target {
                match q.get_many(1000, true, Some(Duration::from_millis(200)), None) {
                    Ok(batch) => {
                        let n = batch.len();
                        for record in batch {
                            let producer_id =
                                u64::from_le_bytes(record[0..8].try_into().unwrap()) as usize;
                            let seq = u64::from_le_bytes(record[8..16].try_into().unwrap());
                            let mut expected = last_seen[producer_id].lock().unwrap();
                            assert_eq!(seq, *expected, "out-of-order delivery for producer {producer_id}");
                            *expected += 1;
                        }
                        total_consumed.fetch_add(n, Ordering::Relaxed);
                    }
                    Err(QueueError::Empty) => continue,
                    Err(e) => panic!("unexpected get error: {e:?}"),
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
    for h in consumer_handles {
        h.join().unwrap();
    }

    assert_eq!(total_consumed.load(Ordering::Relaxed), target);
    for seq in last_seen.iter() {
        assert_eq!(*seq.lock().unwrap(), ITEMS_PER_PRODUCER);
    }
}

#[test]
fn get_blocks_then_wakes_on_put() {
    init_tracing();
    let q = byte_queue(1024);
    let q2 = q.clone();

    let handle = thread::spawn(move || q2.get(true, Some(Duration::from_secs(5))).unwrap());

    thread::sleep(Duration::from_millis(50));
    q.put_nowait(&vec![1, 2, 3]).unwrap();

    assert_eq!(handle.join().unwrap(), vec![1, 2, 3]);
}

#[test]
fn get_times_out_when_queue_stays_empty() {
    let q = byte_queue(1024);
    let started = std::time::Instant::now();
    let err = q
        .get(true, Some(Duration::from_millis(100)))
        .unwrap_err();
    assert!(matches!(err, QueueError::Empty));
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[test]
fn put_blocks_until_consumer_drains_then_wakes() {
    init_tracing();
    let q = byte_queue(32); // room for exactly one small record
    q.put_nowait(&vec![1, 2]).unwrap();
    assert!(q.full().unwrap());

    let producer = q.clone();
    let handle = thread::spawn(move || {
        producer
            .put(&vec![9, 9], true, Some(Duration::from_secs(5)))
            .unwrap();
    });

    thread::sleep(Duration::from_millis(50));
    assert_eq!(q.get_nowait().unwrap(), vec![1, 2]);
    handle.join().unwrap();
    assert_eq!(q.get_nowait().unwrap(), vec![9, 9]);
}

#[test]
fn close_wakes_blocked_waiters_with_closed_error() {
    init_tracing();
    let q = byte_queue(1024);
    let waiter = q.clone();
    let handle = thread::spawn(move || waiter.get(true, None));

    thread::sleep(Duration::from_millis(50));
    q.close().unwrap();

    assert!(matches!(handle.join().unwrap(), Err(QueueError::Closed)));
}

#[test]
fn close_lets_pending_records_drain_before_reporting_closed() {
    let q = byte_queue(1024);
    q.put_nowait(&vec![1]).unwrap();
    q.put_nowait(&vec![2]).unwrap();
    q.close().unwrap();

    assert_eq!(q.get_nowait().unwrap(), vec![1]);
    assert_eq!(q.get_nowait().unwrap(), vec![2]);
    assert!(matches!(q.get_nowait(), Err(QueueError::Closed)));
    assert!(matches!(q.put_nowait(&vec![3]), Err(QueueError::Closed)));
}

#[test]
fn wrap_around_under_interleaved_traffic() {
    let q = byte_queue(256); // small ring to force wrapping
    const N: usize = 10_000;

    for i in 0..N {
        let record = vec![(i % 251) as u8; 3];
        loop {
            match q.put_nowait(&record) {
                Ok(()) => break,
                Err(QueueError::Full) => {
                    q.get_nowait().unwrap();
                }
                Err(e) => panic!("unexpected put error: {e:?}"),
            }
        }
    }

    let mut drained = 0;
    while !q.empty().unwrap() {
        q.get_nowait().unwrap();
        drained += 1;
    }
    assert!(drained > 0);
}

#[test]
fn handle_reattaches_across_cloned_queue_values() {
    let q1 = byte_queue(1024);
    let handle = q1.handle();

    let q2 = Queue::<Vec<u8>, BytesCodec>::open(&handle, BytesCodec).unwrap();
    q1.put_nowait(&vec![1, 2, 3]).unwrap();
    assert_eq!(q2.get_nowait().unwrap(), vec![1, 2, 3]);

    q2.put_nowait(&vec![4, 5]).unwrap();
    assert_eq!(q1.get_nowait().unwrap(), vec![4, 5]);
}

#[test]
fn get_many_caps_rather_than_guarantees_the_requested_count() {
    let q = byte_queue(4096);
    for i in 0..5u8 {
        q.put_nowait(&vec![i]).unwrap();
    }
    let batch = q.get_many(100, false, None, None).unwrap();
    assert_eq!(batch.len(), 5);
    assert!(matches!(q.get_many(1, false, None, None), Err(QueueError::Empty)));
}
