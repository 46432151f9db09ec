//! Threaded producer/consumer run with the sampler attached.
//!
//! A producer pushes a counter stream terminated by EOF while a paced
//! consumer drains it; the sampler estimates rates alongside and the final
//! report is printed on exit.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ringfifo::{HeapFifo, Signal};
use ringfifo_monitor::{Monitor, SystemClock, Units};

const CAPACITY: usize = 10_000;
const SEND_COUNT: i64 = 1_000_000;

fn main() {
    env_logger::init();

    let queue = Arc::new(HeapFifo::<i64>::new(CAPACITY).expect("queue construction"));
    let monitor = Monitor::new(Arc::clone(&queue), Arc::new(SystemClock::new()));

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for n in 1..=SEND_COUNT {
                let signal = if n == SEND_COUNT { Signal::Eof } else { Signal::None };
                queue.push(n, signal);
            }
        })
    };

    let consumer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut received = 0i64;
            loop {
                let (value, signal) = queue.pop_signaled();
                received += 1;
                assert_eq!(value, received, "stream order broke");
                if signal == Signal::Eof {
                    break;
                }
                // A touch of service time keeps the queue visibly occupied.
                if received % 1024 == 0 {
                    thread::sleep(Duration::from_micros(50));
                }
            }
            received
        })
    };

    producer.join().expect("producer panicked");
    let received = consumer.join().expect("consumer panicked");
    println!("received {received} items");

    let stats = monitor.finish();
    println!("{}", stats.report(Units::MB));
}
