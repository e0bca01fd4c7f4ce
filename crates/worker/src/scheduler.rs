//! Claim cycle scheduler.
//!
//! A fixed-interval timer drives batch cycles. The scheduler is either idle or
//! running one cycle; a tick that arrives while a cycle is still running is
//! skipped, so cycles never overlap within a process. `stop()` prevents new
//! cycles and waits for the in-flight one to finish on its own.
//!
//! A throttled cycle pauses the timer for the channel's `retry_after`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use dicebot_notifier::NotificationChannel;

use crate::cycle::{BatchCycle, CycleOutcome};
use crate::store::{RequestStore, StoreError};

/// Result of a single timer tick.
#[derive(Debug)]
pub enum TickOutcome {
    Ran(CycleOutcome),
    /// The cycle hit a transient store error; the next tick retries.
    Failed(StoreError),
    /// A cycle was already running.
    Skipped,
}

enum TaskState {
    Idle,
    Started(JoinHandle<()>),
    Stopped,
}

/// Marks the scheduler as running for as long as it is held.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Scheduler<S, C: ?Sized> {
    cycle: Arc<BatchCycle<S, C>>,
    interval: Duration,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    task: Mutex<TaskState>,
}

impl<S, C> Scheduler<S, C>
where
    S: RequestStore,
    C: NotificationChannel + ?Sized + 'static,
{
    pub fn new(cycle: BatchCycle<S, C>, interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            cycle: Arc::new(cycle),
            interval,
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
            task: Mutex::new(TaskState::Idle),
        }
    }

    /// Whether a cycle is in progress right now.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one cycle now unless one is already running.
    pub async fn tick(&self) -> TickOutcome {
        run_tick(&self.cycle, &self.running).await
    }

    /// Start the timer. Calling it again, or after `stop()`, does nothing.
    pub async fn start(&self) {
        let mut state = self.task.lock().await;
        if !matches!(*state, TaskState::Idle) {
            return;
        }

        let cycle = Arc::clone(&self.cycle);
        let running = Arc::clone(&self.running);
        let mut shutdown = self.shutdown.subscribe();
        let period = self.interval;

        tracing::info!(
            poll_interval_ms = period.as_millis() as u64,
            "Claim scheduler started"
        );

        *state = TaskState::Started(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }
                // Not raced against shutdown: an in-flight cycle always finishes.
                let outcome = run_tick(&cycle, &running).await;

                if let TickOutcome::Ran(CycleOutcome::Throttled {
                    retry_after: Some(pause),
                    ..
                }) = outcome
                {
                    tracing::info!(
                        pause_ms = pause.as_millis() as u64,
                        "Pausing claim cycles for rate limit"
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
            }

            tracing::info!("Claim scheduler stopped");
        }));
    }

    /// Stop the timer and wait for any in-flight cycle. Idempotent.
    pub async fn stop(&self) {
        let mut state = self.task.lock().await;
        match std::mem::replace(&mut *state, TaskState::Stopped) {
            TaskState::Started(handle) => {
                let _ = self.shutdown.send(true);
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Scheduler task failed");
                }
            }
            TaskState::Idle | TaskState::Stopped => {}
        }
    }
}

async fn run_tick<S, C>(cycle: &BatchCycle<S, C>, running: &AtomicBool) -> TickOutcome
where
    S: RequestStore,
    C: NotificationChannel + ?Sized,
{
    let Some(_guard) = RunningGuard::acquire(running) else {
        tracing::debug!("Previous cycle still running, skipping tick");
        return TickOutcome::Skipped;
    };

    match cycle.run().await {
        Ok(outcome) => TickOutcome::Ran(outcome),
        Err(e) => {
            tracing::error!(error = %e, "Claim cycle failed, will retry next tick");
            TickOutcome::Failed(e)
        }
    }
}
