//! Reusable counting barrier with a completion closure.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

/// Barrier for a fixed number of threads.
///
/// The last thread to arrive runs the closure passed to [`Barrier::wait`]
/// before anyone is released, so the closure never overlaps with the work
/// that follows the barrier on other threads. The barrier resets itself and
/// can be reused for the next round immediately.
#[derive(Debug)]
pub struct Barrier {
    threads: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl Barrier {
    /// A barrier for `threads` participants. Zero is treated as one.
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        }
    }

    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Block until every participant has arrived.
    ///
    /// Only the closure of the last arriving thread is run; the others are
    /// dropped unused.
    pub fn wait<F: FnOnce()>(&self, on_complete: F) {
        let mut state = self.state.lock();
        state.arrived += 1;

        if state.arrived == self.threads {
            on_complete();
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.released.notify_all();
            return;
        }

        let generation = state.generation;
        while state.generation == generation {
            self.released.wait(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_single_thread_runs_closure() {
        let barrier = Barrier::new(0);
        let mut ran = 0;
        barrier.wait(|| ran += 1);
        barrier.wait(|| ran += 1);
        assert_eq!(ran, 2);
        assert_eq!(barrier.threads(), 1);
    }

    #[test]
    fn test_closure_runs_once_per_round() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 50;
        let barrier = Arc::new(Barrier::new(THREADS));
        let completions = Arc::new(AtomicUsize::new(0));
        let work = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let barrier = barrier.clone();
                let completions = completions.clone();
                let work = work.clone();
                std::thread::spawn(move || {
                    for round in 0..ROUNDS {
                        work.fetch_add(1, Ordering::SeqCst);
                        barrier.wait(|| {
                            // Everyone has finished this round's work
                            assert_eq!(work.load(Ordering::SeqCst), (round + 1) * THREADS);
                            completions.fetch_add(1, Ordering::SeqCst);
                        });
                        // And the closure is done before anyone moves on
                        assert!(completions.load(Ordering::SeqCst) > round);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(completions.load(Ordering::SeqCst), ROUNDS);
    }
}
