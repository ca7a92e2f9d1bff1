//! Worker scheduler - the poll loop around the ingest service
//!
//! States: Idle -> Running -> {Sleeping <-> Running} -> Stopped.
//!
//! A cycle that processed at least one message is followed immediately by
//! another one. An empty (or entirely failed) cycle sleeps for the idle
//! interval; a cycle error or panic sleeps for the longer backoff. Sleeping is a
//! select over the timer, the wake signal and the stop channel. Stop is
//! only observed between cycles, so an in-flight message always completes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::domain::result::Result;
use crate::ports::MailboxGateway;
use crate::services::ingest::{CycleReport, IngestService};

pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(30);

/// One poll-and-drain cycle
#[async_trait]
pub trait PollCycle: Send + Sync {
    async fn poll(&self) -> Result<CycleReport>;
}

/// The production cycle: drain a mailbox through the ingest service
pub struct MailboxCycle {
    service: Arc<IngestService>,
    mailbox: Arc<dyn MailboxGateway>,
}

impl MailboxCycle {
    pub fn new(service: Arc<IngestService>, mailbox: Arc<dyn MailboxGateway>) -> Self {
        Self { service, mailbox }
    }
}

#[async_trait]
impl PollCycle for MailboxCycle {
    async fn poll(&self) -> Result<CycleReport> {
        self.service.run_cycle(self.mailbox.as_ref()).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerState {
    Idle,
    Running,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub idle_interval: Duration,
    pub error_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_interval: DEFAULT_IDLE_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }
}

struct Shared {
    cycle: Arc<dyn PollCycle>,
    config: SchedulerConfig,
    state: watch::Sender<SchedulerState>,
    stop: watch::Sender<bool>,
    wake: Notify,
}

impl Shared {
    fn set_state(&self, state: SchedulerState) {
        self.state.send_replace(state);
    }
}

/// Handle to the scheduler loop
pub struct Scheduler {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(cycle: Arc<dyn PollCycle>, config: SchedulerConfig) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        let (stop, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                cycle,
                config,
                state,
                stop,
                wake: Notify::new(),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every state transition
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.shared.state.subscribe()
    }

    /// Spawn the loop on the current tokio runtime.
    ///
    /// Returns false (and does nothing) if the loop is already active.
    pub fn start(&self) -> bool {
        let Ok(mut task) = self.task.lock() else {
            return false;
        };
        if matches!(self.state(), SchedulerState::Running | SchedulerState::Sleeping) {
            return false;
        }

        self.shared.stop.send_replace(false);
        self.shared.set_state(SchedulerState::Running);
        info!(
            idle_secs = self.shared.config.idle_interval.as_secs(),
            backoff_secs = self.shared.config.error_backoff.as_secs(),
            "Scheduler started"
        );
        *task = Some(tokio::spawn(run_loop(Arc::clone(&self.shared))));
        true
    }

    /// Request a stop and wait for the loop to finish its current cycle
    pub async fn stop(&self) {
        self.shared.stop.send_replace(true);
        let handle = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler task ended abnormally");
                self.shared.set_state(SchedulerState::Stopped);
            }
        }
    }

    /// Cut the current idle wait short. No-op unless sleeping.
    pub fn wake(&self) -> bool {
        if self.state() == SchedulerState::Sleeping {
            self.shared.wake.notify_one();
            return true;
        }
        false
    }
}

async fn run_loop(shared: Arc<Shared>) {
    let mut stop_rx = shared.stop.subscribe();

    loop {
        if *stop_rx.borrow() {
            break;
        }
        shared.set_state(SchedulerState::Running);

        // own task so a panicking cycle is contained like a failed one
        let cycle = Arc::clone(&shared.cycle);
        let outcome = tokio::spawn(async move { cycle.poll().await }).await;

        let delay = match outcome {
            Ok(Ok(report)) if report.processed > 0 => {
                debug!(processed = report.processed, failed = report.failed, "Cycle drained messages, polling again");
                continue;
            }
            Ok(Ok(report)) => {
                debug!(fetched = report.fetched, failed = report.failed, "Nothing processed, sleeping");
                shared.config.idle_interval
            }
            Ok(Err(e)) => {
                error!(error = %e, backoff_secs = shared.config.error_backoff.as_secs(), "Poll cycle failed, backing off");
                shared.config.error_backoff
            }
            Err(e) => {
                error!(error = %e, backoff_secs = shared.config.error_backoff.as_secs(), "Poll cycle aborted, backing off");
                shared.config.error_backoff
            }
        };

        shared.set_state(SchedulerState::Sleeping);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shared.wake.notified() => debug!("Scheduler woken early"),
            _ = stop_rx.changed() => {}
        }
    }

    shared.set_state(SchedulerState::Stopped);
    info!("Scheduler stopped");
}
