//! Periodic loop discipline shared by every worker.
//!
//! ```text
//!  ┌────────── loop ──────────────────────────────────────────┐
//!  │ stop requested? ──yes──► exit                            │
//!  │ cycle()              (one bounded unit of work)          │
//!  │ record timing        (late = elapsed > period)           │
//!  │ idle(period - elapsed), checking stop every IDLE_TICK_MS │
//!  └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Stop latency is therefore bounded by the longest single cycle plus one
//! idle tick. A cycle that overruns its period is followed immediately by the
//! next one; the sleep is clamped at zero, never negative.

use crane_common::consts::IDLE_TICK_MS;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Shared stop request for one worker.
///
/// Cloning shares the flag. Set by the supervisor (or the signal handler),
/// polled by the worker loop.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    /// Create a cleared signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to exit at its next check.
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True once a stop has been requested.
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Re-arm before a restart.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Outcome of one cycle body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Unit of work completed.
    Done,
    /// Unit of work failed; the loop carries on next period.
    Failed,
    /// Unrecoverable; leave the loop.
    Exit,
}

/// Timing statistics for periodic loop monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingStats {
    /// Number of cycles executed
    pub cycle_count: u64,
    /// Cycles whose body reported a failure
    pub failed_cycles: u64,
    /// Cycles that took longer than the period
    pub late_cycles: u64,
    /// Maximum observed cycle time
    pub max_cycle_time_us: u64,
    /// Sum of cycle times for average calculation
    pub total_cycle_time_us: u64,
}

impl TimingStats {
    /// Account for one finished cycle.
    pub fn record(&mut self, elapsed: Duration, period: Duration, outcome: CycleOutcome) {
        let cycle_time_us = elapsed.as_micros() as u64;
        self.cycle_count += 1;
        self.total_cycle_time_us += cycle_time_us;
        self.max_cycle_time_us = self.max_cycle_time_us.max(cycle_time_us);
        if outcome == CycleOutcome::Failed {
            self.failed_cycles += 1;
        }
        if elapsed > period {
            self.late_cycles += 1;
        }
    }

    /// Average cycle time in microseconds.
    pub fn avg_cycle_time_us(&self) -> u64 {
        self.total_cycle_time_us
            .checked_div(self.cycle_count)
            .unwrap_or(0)
    }
}

/// First 10 occurrences, then every 1000th.
pub fn should_log(count: u64) -> bool {
    count <= 10 || count % 1000 == 0
}

/// Sleep up to `duration`, waking every idle tick to check `stop`.
///
/// Returns `false` if the wait was cut short by a stop request.
pub fn idle(duration: Duration, stop: &StopSignal) -> bool {
    let deadline = Instant::now() + duration;
    let tick = Duration::from_millis(IDLE_TICK_MS);
    loop {
        if stop.is_requested() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(tick));
    }
}

/// Run `cycle` every `period` until `stop` is requested or it returns
/// [`CycleOutcome::Exit`].
pub fn run_periodic<F>(name: &str, period: Duration, stop: &StopSignal, mut cycle: F) -> TimingStats
where
    F: FnMut() -> CycleOutcome,
{
    let mut stats = TimingStats::default();

    while !stop.is_requested() {
        let cycle_start = Instant::now();
        let outcome = cycle();
        let elapsed = cycle_start.elapsed();
        stats.record(elapsed, period, outcome);

        if elapsed > period && should_log(stats.late_cycles) {
            warn!(
                "{}: late cycle #{}: took {}ms (period {}ms)",
                name,
                stats.late_cycles,
                elapsed.as_millis(),
                period.as_millis()
            );
        }

        if stats.cycle_count % 1000 == 0 {
            debug!(
                "{}: {} cycles, avg={}us, max={}us, failed={}, late={}",
                name,
                stats.cycle_count,
                stats.avg_cycle_time_us(),
                stats.max_cycle_time_us,
                stats.failed_cycles,
                stats.late_cycles
            );
        }

        if outcome == CycleOutcome::Exit {
            break;
        }

        idle(period.saturating_sub(elapsed), stop);
    }

    debug!(
        "{}: loop stopped after {} cycles (failed: {}, late: {}, max={}us)",
        name, stats.cycle_count, stats.failed_cycles, stats.late_cycles, stats.max_cycle_time_us
    );
    stats
}

/// A named worker thread that can be joined with a bound.
///
/// The thread holds the sending half of a channel for its whole lifetime;
/// the channel disconnecting is how `join` learns it has finished.
#[derive(Debug)]
pub struct WorkerThread {
    name: String,
    handle: Option<JoinHandle<()>>,
    done: Receiver<()>,
}

impl WorkerThread {
    /// Spawn `body` on a thread called `name`.
    pub fn spawn<F>(name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (done_tx, done) = mpsc::channel::<()>();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            let _done = done_tx;
            body();
        })?;
        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
            done,
        })
    }

    /// True once the thread body has returned (or was never started).
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Wait up to `timeout` for the thread to finish.
    ///
    /// Returns `true` if it finished (and was reaped), `false` if it is still
    /// running. May be called again after a `false`.
    pub fn join(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("{}: worker thread panicked", self.name);
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                self.handle = Some(handle);
                false
            }
        }
    }
}
