//! Round-trip latency tracking and stall detection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::cancel::StopToken;

/// Measures how long the outstanding request has been waiting for its response.
///
/// Between transactions the stopwatch is idle and reports zero.
#[derive(Clone, Debug, Default)]
pub struct LatencyStopwatch {
    started: Arc<Mutex<Option<Instant>>>,
}

impl LatencyStopwatch {
    /// Creates an idle stopwatch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts timing a transaction. The returned guard stops the stopwatch
    /// when dropped, including when the transaction is abandoned.
    pub fn start(&self) -> LatencyGuard<'_> {
        *self.started.lock() = Some(Instant::now());
        LatencyGuard { stopwatch: self }
    }

    /// Time spent waiting so far, zero when idle.
    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    /// Time spent waiting as of `now`.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        let started = *self.started.lock();
        started
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default()
    }

    /// Returns true while a transaction is being timed.
    pub fn is_running(&self) -> bool {
        self.started.lock().is_some()
    }

    fn reset(&self) {
        *self.started.lock() = None;
    }

    #[cfg(test)]
    pub(crate) fn start_at(&self, started: Instant) {
        *self.started.lock() = Some(started);
    }
}

/// Stops a [`LatencyStopwatch`] when dropped.
#[must_use = "the stopwatch stops as soon as the guard is dropped"]
#[derive(Debug)]
pub struct LatencyGuard<'a> {
    stopwatch: &'a LatencyStopwatch,
}

impl Drop for LatencyGuard<'_> {
    fn drop(&mut self) {
        self.stopwatch.reset();
    }
}

/// Periodically checks the stopwatch and reports requests that have been
/// pending longer than a threshold.
///
/// The monitor only observes. It never touches the connection and cannot
/// cancel the stalled request.
#[derive(Clone, Debug)]
pub struct StallMonitor {
    stopwatch: LatencyStopwatch,
    period: Duration,
    threshold: Duration,
}

impl StallMonitor {
    /// Creates a monitor checking `stopwatch` every `period`.
    pub fn new(stopwatch: LatencyStopwatch, period: Duration, threshold: Duration) -> Self {
        Self {
            stopwatch,
            period,
            threshold,
        }
    }

    /// Returns the pending time if it exceeds the threshold.
    pub fn check(&self) -> Option<Duration> {
        self.check_at(Instant::now())
    }

    /// Same as [`StallMonitor::check`] with an explicit clock reading.
    pub fn check_at(&self, now: Instant) -> Option<Duration> {
        let elapsed = self.stopwatch.elapsed_at(now);
        (elapsed > self.threshold).then_some(elapsed)
    }

    /// Ticks every period until `stop` is cancelled, calling `on_stall` once
    /// per tick that finds a stalled request.
    pub async fn run(self, stop: StopToken, on_stall: impl Fn(Duration) + Send) {
        trace!(
            "Stall monitor armed (period {:?}, threshold {:?})",
            self.period, self.threshold
        );
        while stop.sleep(self.period).await {
            if let Some(elapsed) = self.check() {
                warn!("No response for {:?}, server is busy", elapsed);
                on_stall(elapsed);
            }
        }
        trace!("Stall monitor stopped");
    }
}
