//! Keeps the fraud watchlist in memory and answers lookups against it.
//!
//! The watchlist is assembled from a couple of small parts:
//! * a [DataSource](source::DataSource) delivers the raw rows (most commonly an
//!   [HttpCsvSource](source::HttpCsvSource) which downloads a CSV document),
//! * the [SnapshotBuilder](snapshot::SnapshotBuilder) turns these rows into an immutable
//!   [Snapshot](snapshot::Snapshot), using a [PhoneFormat](normalize::PhoneFormat) to compute the
//!   canonical phones,
//! * the [SnapshotStore](store::SnapshotStore) holds the active snapshot and swaps in new ones
//!   atomically,
//! * the [RefreshScheduler](scheduler::RefreshScheduler) runs the fetch / build / publish cycle
//!   periodically,
//! * the [QueryEngine](query::QueryEngine) answers phone and customer id lookups.
//!
//! Calling [install] wires all of these together and registers the store, the query engine and
//! the scheduler in the [Platform].
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast::error::RecvError;

use crate::config::Config;
use crate::fmt::format_duration;
use crate::platform::Platform;
use crate::watchlist::normalize::{PhoneFormat, TrunkPrefixFormat};
use crate::watchlist::query::QueryEngine;
use crate::watchlist::scheduler::RefreshScheduler;
use crate::watchlist::snapshot::SnapshotBuilder;
use crate::watchlist::source::{DataSource, HttpCsvSource};
use crate::watchlist::store::SnapshotStore;

pub mod error;
pub mod normalize;
pub mod query;
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod store;

/// Installs the watchlist which is fetched from the URL configured in **config/settings.yml**.
///
/// See [install_with_source] for details.
pub async fn install(platform: &Arc<Platform>) -> anyhow::Result<()> {
    let config = obtain_config(platform);
    let source = Arc::new(HttpCsvSource::new(config));

    install_with_source(platform, source).await
}

/// Installs a watchlist which is fetched from the given source.
///
/// This performs the initial load right away. If it fails and **watchlist.require_initial_load**
/// is set, an error is returned and nothing is started. Otherwise the error is logged and the
/// service starts with an empty watchlist (so that every lookup yields **notfraud**) until a
/// later refresh succeeds.
///
/// Afterwards the periodic refresh is started. It stops once the platform terminates. Changes of
/// **watchlist.interval** in the config are picked up without a restart.
pub async fn install_with_source(
    platform: &Arc<Platform>,
    source: Arc<dyn DataSource>,
) -> anyhow::Result<()> {
    let config = obtain_config(platform);
    let settings = config.current().settings().clone();

    let format: Arc<dyn PhoneFormat> = Arc::new(TrunkPrefixFormat);
    let store = Arc::new(SnapshotStore::new());
    let scheduler = RefreshScheduler::new(
        store.clone(),
        source,
        SnapshotBuilder::new(format.clone()),
        settings.interval,
        &platform.shutdown_token(),
    );

    let watch = Instant::now();
    match scheduler.run_cycle().await {
        Ok(snapshot) => log::info!(
            "Initial watchlist loaded: {} entries for {} phones - Duration: {} ms",
            snapshot.stats().total_entries,
            snapshot.stats().unique_phones,
            watch.elapsed().as_millis()
        ),
        Err(error) if settings.require_initial_load => {
            return Err(anyhow::anyhow!(
                "Failed to load the initial watchlist: {}",
                error
            ));
        }
        Err(error) => log::error!(
            "Failed to load the initial watchlist. Starting with an empty one: {}",
            error
        ),
    }

    platform.register::<SnapshotStore>(store.clone());
    platform.register::<QueryEngine>(Arc::new(QueryEngine::new(store, format)));
    platform.register::<RefreshScheduler>(scheduler.clone());

    scheduler.start();
    follow_config_changes(platform, config, scheduler);

    Ok(())
}

fn obtain_config(platform: &Arc<Platform>) -> Arc<Config> {
    platform.find::<Config>().unwrap_or_else(|| {
        log::warn!("No config has been installed. Using the default settings for the watchlist.");
        let config = Arc::new(Config::new("config/settings.yml"));
        platform.register::<Config>(config.clone());

        config
    })
}

fn follow_config_changes(
    platform: &Arc<Platform>,
    config: Arc<Config>,
    scheduler: Arc<RefreshScheduler>,
) {
    let shutdown = platform.shutdown_token();
    let mut change_notifier = config.notifier();
    crate::spawn!(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                change = change_notifier.recv() => match change {
                    Ok(()) | Err(RecvError::Lagged(_)) => {
                        let interval = config.current().settings().interval;
                        if interval != scheduler.interval() {
                            log::info!("Config changed. Refresh interval is now {}.", format_duration(interval));
                            scheduler.set_interval(interval);
                        }
                    }
                    Err(RecvError::Closed) => return,
                },
            }
        }
    });
}
