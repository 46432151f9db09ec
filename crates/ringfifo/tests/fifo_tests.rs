//! End-to-end queue scenarios: one producer thread, one consumer thread,
//! exact delivery under contention, back-pressure, and in-place draining.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ringfifo::{HeapFifo, Signal};

#[test]
fn serial_echo() {
    // Capacity 100, stream 1..=100 with EOF on the last element.
    let queue = Arc::new(HeapFifo::<i64>::new(100).unwrap());

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for n in 1..=100 {
                let signal = if n == 100 { Signal::Eof } else { Signal::None };
                queue.push(n, signal);
            }
        })
    };

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut received = Vec::new();
            loop {
                let (value, signal) = queue.pop_signaled();
                received.push(value);
                if signal == Signal::Eof {
                    break;
                }
            }
            received
        })
    };

    producer.join().unwrap();
    let received = consumer.join().unwrap();
    assert_eq!(received, (1..=100).collect::<Vec<_>>());
    assert!(queue.write_finished());
}

#[test]
fn back_pressure_blocks_the_producer_without_losing_elements() {
    // Small ring, unthrottled producer, slow consumer: the writer must hit
    // the full state, raise its blocked flag, and still deliver the exact
    // sequence.
    const COUNT: i64 = 10_000;
    let queue = Arc::new(HeapFifo::<i64>::new(64).unwrap());

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for n in 1..=COUNT {
                let signal = if n == COUNT { Signal::Eof } else { Signal::None };
                queue.push(n, signal);
            }
        })
    };

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut expected = 0i64;
            loop {
                let (value, signal) = queue.pop_signaled();
                expected += 1;
                assert_eq!(value, expected);
                if expected % 256 == 0 {
                    thread::sleep(Duration::from_micros(5));
                }
                if signal == Signal::Eof {
                    break;
                }
            }
            expected
        })
    };

    // Play the sampler's part: periodically read-and-zero the writer
    // counters and remember whether a blocked frame was ever observed.
    let mut saw_blocked = false;
    while !queue.write_finished() {
        saw_blocked |= queue.take_write_stats().blocked;
        thread::sleep(Duration::from_millis(1));
    }
    saw_blocked |= queue.take_write_stats().blocked;

    producer.join().unwrap();
    let received = consumer.join().unwrap();
    assert_eq!(received, COUNT);
    assert!(saw_blocked, "a 64-slot ring fed 10k items must block the writer");
}

#[test]
fn bijective_delivery_under_contention() {
    const COUNT: u64 = 200_000;
    let queue = Arc::new(HeapFifo::<u64>::new(128).unwrap());

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for n in 0..COUNT {
                let signal = if n + 1 == COUNT { Signal::Eof } else { Signal::None };
                queue.push(n, signal);
            }
        })
    };

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut next = 0u64;
            loop {
                let (value, signal) = queue.pop_signaled();
                assert_eq!(value, next, "loss, duplication, or reorder");
                next += 1;
                if signal == Signal::Eof {
                    break;
                }
            }
            next
        })
    };

    producer.join().unwrap();
    assert_eq!(consumer.join().unwrap(), COUNT);
}

#[test]
fn insert_longer_than_capacity_relies_on_the_draining_peer() {
    let queue = Arc::new(HeapFifo::<u32>::new(16).unwrap());
    let items: Vec<u32> = (0..200).collect();

    let producer = {
        let queue = Arc::clone(&queue);
        let items = items.clone();
        thread::spawn(move || {
            queue.insert(&items, Signal::Eof);
        })
    };

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut received = Vec::new();
            loop {
                let (value, signal) = queue.pop_signaled();
                received.push(value);
                if signal == Signal::Eof {
                    break;
                }
            }
            received
        })
    };

    producer.join().unwrap();
    assert_eq!(consumer.join().unwrap(), items);
}

#[test]
fn pop_range_collects_across_the_wrap_boundary() {
    let queue = HeapFifo::<u32>::new(8).unwrap();

    // Walk the read position to the middle of the ring first.
    queue.insert(&[0, 1, 2, 3, 4], Signal::None);
    let mut head = [0u32; 5];
    queue.pop_range(&mut head, None);
    assert_eq!(head, [0, 1, 2, 3, 4]);

    // This range now spans the end of the backing array.
    queue.insert(&[10, 11, 12, 13, 14, 15], Signal::Quit);
    let mut out = [0u32; 6];
    let mut sigs = [Signal::None; 6];
    queue.pop_range(&mut out, Some(&mut sigs));
    assert_eq!(out, [10, 11, 12, 13, 14, 15]);
    assert_eq!(sigs[5], Signal::Quit);
    assert_eq!(queue.size(), 0);
}

#[test]
fn recycle_after_peek_scenario() {
    let queue = HeapFifo::<u32>::new(16).unwrap();
    queue.insert(&(1..=10).collect::<Vec<_>>(), Signal::None);

    for expected in 1..=10 {
        assert_eq!(*queue.peek(), expected);
        queue.recycle(1).unwrap();
    }
    assert_eq!(queue.size(), 0);
    assert_eq!(queue.space_avail(), queue.capacity());
}

#[test]
fn async_quit_reaches_the_peer_out_of_band() {
    let queue = Arc::new(HeapFifo::<u64>::new(8).unwrap());

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            while queue.get_signal() != Signal::Quit {
                thread::yield_now();
            }
        })
    };

    thread::sleep(Duration::from_millis(1));
    assert!(queue.send_signal(Signal::Quit));
    consumer.join().unwrap();
}

#[test]
fn capacity_bound_holds_at_every_observation() {
    let queue = Arc::new(HeapFifo::<u64>::new(32).unwrap());
    let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for n in 0..50_000u64 {
                queue.push(n, Signal::None);
            }
        })
    };
    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for _ in 0..50_000u64 {
                queue.pop();
            }
        })
    };

    // A third observer hammers the non-failing observers mid-flight.
    let observer = {
        let queue = Arc::clone(&queue);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(std::sync::atomic::Ordering::Acquire) {
                let size = queue.size();
                assert!(size <= queue.capacity());
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();
    done.store(true, std::sync::atomic::Ordering::Release);
    observer.join().unwrap();
}
