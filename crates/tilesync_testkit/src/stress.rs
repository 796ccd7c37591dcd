//! Concurrency helpers.
//!
//! Runs closures on several threads released at the same instant, so races
//! on the write path actually overlap.

use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult<R> {
    /// Per-thread results, in thread order.
    pub results: Vec<R>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl<R> StressTestResult<R> {
    /// Counts results matching `pred`.
    pub fn count(&self, pred: impl Fn(&R) -> bool) -> usize {
        self.results.iter().filter(|r| pred(r)).count()
    }
}

/// Runs `f(thread_index)` on `threads` threads, started together.
pub fn run_concurrently<F, R>(threads: usize, f: F) -> StressTestResult<R>
where
    F: Fn(usize) -> R + Sync,
    R: Send,
{
    let barrier = Barrier::new(threads);
    let start = Instant::now();
    let results = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let barrier = &barrier;
                let f = &f;
                scope.spawn(move || {
                    barrier.wait();
                    f(i)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("stress thread panicked"))
            .collect()
    });
    StressTestResult {
        results,
        duration: start.elapsed(),
    }
}
