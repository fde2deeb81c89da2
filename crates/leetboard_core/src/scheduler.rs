use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::fetch::StatsSource;
use crate::pipeline::{CyclePlan, CycleReport, run_cycle_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleRun {
    Completed(CycleReport),
    /// The cycle ran and failed; the previous snapshot stays in place.
    Failed,
    /// Another cycle was still in flight.
    Skipped,
    /// A stop arrived mid-cycle; the previous snapshot stays in place.
    Cancelled,
}

/// Runs refresh cycles immediately and then once per interval, never two at a time.
pub struct Scheduler<S> {
    plan: CyclePlan,
    source: S,
    interval: Duration,
    running: AtomicBool,
}

impl<S: StatsSource> Scheduler<S> {
    pub fn new(plan: CyclePlan, source: S, interval: Duration) -> Self {
        Self {
            plan,
            source,
            interval,
            running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one cycle unless another is in flight. Failures are logged, not returned.
    pub fn run_once(&self) -> CycleRun {
        self.run_guarded(&|| false)
    }

    fn run_guarded(&self, cancelled: &dyn Fn() -> bool) -> CycleRun {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("refresh cycle already in flight, skipping");
            return CycleRun::Skipped;
        }
        let _idle_on_exit = IdleOnDrop(&self.running);

        match run_cycle_until(&self.plan, &self.source, cancelled) {
            Ok(report) => CycleRun::Completed(report),
            Err(error) if cancelled() => {
                warn!(error = %format!("{error:#}"), "refresh cycle cancelled");
                CycleRun::Cancelled
            }
            Err(error) => {
                error!(error = %format!("{error:#}"), "refresh cycle failed");
                CycleRun::Failed
            }
        }
    }

    /// Run a cycle now, then one per interval until `stop` fires or hangs up.
    /// A stop that arrives mid-cycle cancels it before the next fetch.
    pub fn run(&self, stop: Receiver<()>) -> usize {
        let stopped = Cell::new(false);
        let cancelled = || {
            if !stopped.get() {
                match stop.try_recv() {
                    Ok(()) | Err(TryRecvError::Disconnected) => stopped.set(true),
                    Err(TryRecvError::Empty) => {}
                }
            }
            stopped.get()
        };

        let mut cycles = 0;
        loop {
            if self.run_guarded(&cancelled) != CycleRun::Skipped {
                cycles += 1;
            }
            if stopped.get() {
                info!(cycles, "scheduler stopped mid-cycle");
                return cycles;
            }
            match stop.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!(cycles, "scheduler stopped");
                    return cycles;
                }
            }
        }
    }
}

struct IdleOnDrop<'a>(&'a AtomicBool);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
