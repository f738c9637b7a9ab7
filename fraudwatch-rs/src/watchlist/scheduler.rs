//! Periodically refreshes the watchlist.
//!
//! The scheduler is a simple state machine which cycles through
//! **Idle -> Fetching -> Publishing -> Idle**. Each cycle fetches the raw rows from the
//! [DataSource], builds a new [Snapshot] from them and publishes it into the [SnapshotStore].
//! If fetching or building fails, the cycle ends right away (**Fetching -> Idle**) and the store
//! isn't touched at all, so that the previous snapshot remains active. There is no retry logic
//! besides the fixed period: the next tick is the retry.
//!
//! The periodic task is started via [RefreshScheduler::start] and stopped either via
//! [RefreshScheduler::stop] or once the platform shuts down. Out of band refreshes can be
//! requested via [RefreshScheduler::trigger].
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::fmt::format_duration;
use crate::watchlist::error::RefreshError;
use crate::watchlist::snapshot::{Snapshot, SnapshotBuilder};
use crate::watchlist::source::DataSource;
use crate::watchlist::store::SnapshotStore;

/// Enumerates the states of a refresh cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    /// No refresh is in progress.
    Idle,
    /// The data is being fetched from the source and turned into a snapshot.
    Fetching,
    /// A freshly built snapshot is being published.
    Publishing,
}

impl RefreshState {
    fn from_u8(value: u8) -> RefreshState {
        match value {
            1 => RefreshState::Fetching,
            2 => RefreshState::Publishing,
            _ => RefreshState::Idle,
        }
    }
}

/// Summarizes the past refresh cycles.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RefreshStatus {
    /// The number of cycles which published a snapshot.
    pub successful_cycles: u64,
    /// The number of cycles which failed.
    pub failed_cycles: u64,
    /// The point in time of the last successful cycle.
    pub last_success: Option<DateTime<Local>>,
    /// The point in time of the last failed cycle.
    pub last_failure: Option<DateTime<Local>>,
    /// The message of the last failure (even if subsequent cycles succeeded).
    pub last_error: Option<String>,
}

/// Resets the state to **Idle** once a cycle ends - even if it is aborted half way.
struct StateGuard<'a> {
    state: &'a AtomicU8,
}

impl<'a> StateGuard<'a> {
    fn enter(state: &'a AtomicU8, initial: RefreshState) -> Self {
        state.store(initial as u8, Ordering::Release);
        StateGuard { state }
    }

    fn transition(&self, next: RefreshState) {
        self.state.store(next as u8, Ordering::Release);
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.state.store(RefreshState::Idle as u8, Ordering::Release);
    }
}

/// Drives the fetch / build / publish cycles of the watchlist.
pub struct RefreshScheduler {
    store: Arc<SnapshotStore>,
    source: Arc<dyn DataSource>,
    builder: SnapshotBuilder,
    state: AtomicU8,
    cycle_lock: tokio::sync::Mutex<()>,
    interval: Mutex<Duration>,
    status: Mutex<RefreshStatus>,
    started: AtomicBool,
    trigger: Notify,
    reschedule: Notify,
    shutdown: CancellationToken,
}

impl RefreshScheduler {
    /// Creates a new scheduler which refreshes the given store from the given source.
    ///
    /// The scheduler stops once either the given token is cancelled or [stop](RefreshScheduler::stop)
    /// is invoked. Note that nothing happens until [start](RefreshScheduler::start) is called.
    pub fn new(
        store: Arc<SnapshotStore>,
        source: Arc<dyn DataSource>,
        builder: SnapshotBuilder,
        interval: Duration,
        shutdown: &CancellationToken,
    ) -> Arc<Self> {
        Arc::new(RefreshScheduler {
            store,
            source,
            builder,
            state: AtomicU8::new(RefreshState::Idle as u8),
            cycle_lock: tokio::sync::Mutex::new(()),
            interval: Mutex::new(interval),
            status: Mutex::new(RefreshStatus::default()),
            started: AtomicBool::new(false),
            trigger: Notify::new(),
            reschedule: Notify::new(),
            shutdown: shutdown.child_token(),
        })
    }

    /// Returns the state of the current cycle.
    pub fn state(&self) -> RefreshState {
        RefreshState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns the period between two cycles.
    pub fn interval(&self) -> Duration {
        *self.interval.lock().unwrap()
    }

    /// Changes the period between two cycles.
    ///
    /// A running scheduler restarts its timer using the new period.
    pub fn set_interval(&self, interval: Duration) {
        let previous = std::mem::replace(&mut *self.interval.lock().unwrap(), interval);
        if previous != interval {
            log::info!(
                "The watchlist will now be refreshed every {}.",
                format_duration(interval)
            );
            self.reschedule.notify_one();
        }
    }

    /// Returns a summary of the past cycles.
    pub fn status(&self) -> RefreshStatus {
        self.status.lock().unwrap().clone()
    }

    /// Executes a single fetch / build / publish cycle.
    ///
    /// Cycles never overlap: if one is already running, this waits for it to complete first.
    /// On error, the store remains untouched and the error is returned to the caller. Use
    /// [refresh](RefreshScheduler::refresh) to have errors logged and suppressed.
    pub async fn run_cycle(&self) -> Result<Arc<Snapshot>, RefreshError> {
        let _cycle = self.cycle_lock.lock().await;
        let result = self.fetch_build_and_publish().await;

        let mut status = self.status.lock().unwrap();
        match &result {
            Ok(_) => {
                status.successful_cycles += 1;
                status.last_success = Some(Local::now());
            }
            Err(error) => {
                status.failed_cycles += 1;
                status.last_failure = Some(Local::now());
                status.last_error = Some(error.to_string());
            }
        }

        result
    }

    async fn fetch_build_and_publish(&self) -> Result<Arc<Snapshot>, RefreshError> {
        let state = StateGuard::enter(&self.state, RefreshState::Fetching);
        let rows = self.source.fetch_rows().await?;
        let snapshot = self.builder.build(&rows)?;

        state.transition(RefreshState::Publishing);
        Ok(self.store.publish(snapshot))
    }

    /// Executes a single cycle and logs its outcome.
    ///
    /// Returns **true** if a new snapshot has been published, **false** if the cycle failed and
    /// the previous snapshot remains active.
    pub async fn refresh(&self) -> bool {
        let watch = Instant::now();
        match self.run_cycle().await {
            Ok(snapshot) => {
                let stats = snapshot.stats();
                log::info!(
                    "Watchlist refreshed: {} entries for {} phones and {} customer ids - Duration: {} ms",
                    stats.total_entries,
                    stats.unique_phones,
                    stats.customer_ids,
                    watch.elapsed().as_millis()
                );
                true
            }
            Err(error) => {
                log::error!(
                    "Failed to refresh the watchlist, keeping the previous one: {}",
                    error
                );
                false
            }
        }
    }

    /// Requests an immediate refresh from the periodic task.
    ///
    /// The regular schedule continues afterwards. Multiple requests made while a cycle is
    /// running are coalesced into a single subsequent cycle.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stops the periodic task.
    ///
    /// A cycle which is currently running is aborted and leaves the store untouched.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Determines if the periodic task has been stopped (or the platform has shut down).
    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Starts the periodic task.
    ///
    /// The first cycle runs after one full interval, as the initial load is expected to be
    /// performed synchronously during startup (see [install](crate::watchlist::install)).
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::AcqRel) {
            log::warn!("The refresh scheduler has already been started.");
            return;
        }

        let scheduler = self.clone();
        crate::spawn!(async move {
            log::info!(
                "Refreshing the watchlist every {}...",
                format_duration(scheduler.interval())
            );

            loop {
                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    _ = scheduler.reschedule.notified() => continue,
                    _ = scheduler.trigger.notified() => log::info!("Refreshing the watchlist on request..."),
                    _ = tokio::time::sleep(scheduler.interval()) => (),
                }

                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    _ = scheduler.refresh() => (),
                }
            }

            log::info!("The refresh scheduler has been stopped.");
        });
    }
}
