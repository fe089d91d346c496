use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use num_format::{Locale, ToFormattedString};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;

const SLIDING_WINDOW_SIZE: u64 = 2; // In seconds

static STOP: AtomicBool = AtomicBool::new(false);

#[repr(C)]
#[derive(Default)]
struct WorkerStats {
    count: AtomicU64,
    /// Padding to avoid false sharing
    _padding: [u64; 15],
}

/// Makes the aggregator's internal logs visible, the overflow warning in
/// particular.
pub fn init_internal_logs() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(LevelFilter::DEBUG))
        .init();
}

pub fn test_throughput<F>(func: F)
where
    F: Fn() + Sync + Send + 'static,
{
    test_throughput_with_background(func, || thread::sleep(Duration::from_millis(100)));
}

/// Runs `func` on every physical core but one and `background` in a loop
/// next to them, printing the throughput of `func` until Ctrl-C.
pub fn test_throughput_with_background<F, B>(func: F, background: B)
where
    F: Fn() + Sync + Send + 'static,
    B: Fn() + Send + 'static,
{
    ctrlc::set_handler(move || {
        STOP.store(true, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    let num_threads = num_cpus::get_physical().max(2);
    println!("Number of threads: {}\n", num_threads);
    let func_arc = Arc::new(func);
    let worker_stats_shared: Arc<Vec<WorkerStats>> =
        Arc::new((0..num_threads).map(|_| WorkerStats::default()).collect());
    let worker_stats_shared_monitor = Arc::clone(&worker_stats_shared);

    let mut handles = Vec::with_capacity(num_threads + 1);
    handles.push(thread::spawn(move || {
        let mut last_collect_time = Instant::now();
        let mut total_count_old: u64 = 0;
        loop {
            let elapsed = last_collect_time.elapsed().as_secs();
            if elapsed >= SLIDING_WINDOW_SIZE {
                let total_count_u64: u64 = worker_stats_shared_monitor
                    .iter()
                    .map(|worker_stat| worker_stat.count.load(Ordering::Relaxed))
                    .sum();
                last_collect_time = Instant::now();
                let current_count = total_count_u64 - total_count_old;
                total_count_old = total_count_u64;
                let throughput = current_count / elapsed;
                println!(
                    "Throughput: {} iterations/sec",
                    throughput.to_formatted_string(&Locale::en)
                );
            }

            if STOP.load(Ordering::SeqCst) {
                break;
            }

            thread::sleep(Duration::from_millis(5000));
        }
    }));

    handles.push(thread::spawn(move || {
        while !STOP.load(Ordering::SeqCst) {
            background();
        }
    }));

    for thread_index in 0..num_threads - 1 {
        let worker_stats_shared = Arc::clone(&worker_stats_shared);
        let func_arc_clone = Arc::clone(&func_arc);
        handles.push(thread::spawn(move || loop {
            for _ in 0..1000 {
                func_arc_clone();
            }
            worker_stats_shared[thread_index]
                .count
                .fetch_add(1000, Ordering::Relaxed);
            if STOP.load(Ordering::SeqCst) {
                break;
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}
