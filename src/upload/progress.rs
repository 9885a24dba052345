//! Upload progress tracking
//!
//! Part uploads finish on arbitrary workers, so progress is owned by a single
//! tracker. Updates and callback calls happen under one lock: callbacks never
//! run concurrently and the cumulative values they see never decrease.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Progress callback: `(bytes_so_far, total_bytes, done)`
///
/// Uploads call it at least once per completed part; calls are serialized.
/// Once an upload has returned, the callback is not called again, even by
/// parts that were still in flight when it failed.
pub type ProgressFn = Arc<dyn Fn(u64, u64, bool) + Send + Sync>;

#[derive(Default)]
struct State {
    uploaded: u64,
    closed: bool,
}

/// Shared cumulative byte counter with an optional callback
pub struct ProgressTracker {
    total: u64,
    state: Mutex<State>,
    callback: Option<ProgressFn>,
}

impl ProgressTracker {
    pub fn new(total: u64, callback: Option<ProgressFn>) -> Self {
        Self {
            total,
            state: Mutex::new(State::default()),
            callback,
        }
    }

    /// Add `bytes` and notify the callback; returns the new cumulative count
    ///
    /// After [`close`](Self::close) the count still moves but the callback
    /// stays silent.
    pub fn advance(&self, bytes: u64) -> u64 {
        let mut state = self.state.lock();
        state.uploaded += bytes;
        let current = state.uploaded;
        if !state.closed {
            if let Some(callback) = &self.callback {
                callback(current, self.total, current == self.total);
            }
        }
        current
    }

    /// Stop notifying the callback
    ///
    /// Takes the same lock as [`advance`](Self::advance), so no call is
    /// running once this returns.
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Bytes recorded so far
    pub fn uploaded(&self) -> u64 {
        self.state.lock().uploaded
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("total", &self.total)
            .field("uploaded", &self.uploaded())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_reports_done_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let tracker = ProgressTracker::new(
            10,
            Some(Arc::new(move |done, total, finished| {
                sink.lock().push((done, total, finished));
            })),
        );

        tracker.advance(4);
        tracker.advance(4);
        tracker.advance(2);

        assert_eq!(
            *calls.lock(),
            vec![(4, 10, false), (8, 10, false), (10, 10, true)]
        );
        assert_eq!(tracker.uploaded(), 10);
    }

    #[test]
    fn test_closed_tracker_stops_calling_back() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let tracker = ProgressTracker::new(
            9,
            Some(Arc::new(move |done, total, finished| {
                sink.lock().push((done, total, finished));
            })),
        );

        tracker.advance(3);
        tracker.close();
        tracker.advance(3);
        tracker.advance(3);

        assert_eq!(*calls.lock(), vec![(3, 9, false)]);
        assert_eq!(tracker.uploaded(), 9);
    }

    #[test]
    fn test_concurrent_advances_are_not_lost() {
        let tracker = Arc::new(ProgressTracker::new(8 * 1000, None));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        tracker.advance(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.uploaded(), tracker.total());
    }
}
