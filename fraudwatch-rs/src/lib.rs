//! FraudWatch keeps a fraud watchlist in memory and answers lookups against it.
//!
//! # Introduction
//! **FraudWatch** checks whether a phone number or a customer id shows up on a watchlist of
//! fraud-associated customers. The watchlist itself is maintained elsewhere (most commonly as a
//! published spreadsheet) and is pulled in as **CSV** on a fixed interval. Each row names a phone
//! number, the location (state, city, zone) it was seen in, the number of distinct customers
//! involved and the list of affected customer ids.
//!
//! Lookups have to be fast and must never wait for a refresh. Therefore each download is turned
//! into an immutable [Snapshot](watchlist::snapshot::Snapshot) which is built completely off to
//! the side and then swapped in atomically. Readers always see either the previous or the new
//! snapshot, never something in between, and a failed download simply leaves the previous
//! snapshot in place.
//!
//! # Features
//! * **Lock-free reads**: the active snapshot is kept in an
//!   [ArcSwap](https://docs.rs/arc-swap), so any number of concurrent queries run without
//!   contending with the refresh task.
//! * **Resilient refresh**: network, decoding or format errors are logged and suppressed. The
//!   next tick of the [RefreshScheduler](watchlist::scheduler::RefreshScheduler) is the retry.
//! * **Reload-aware config facility** which permits to change the source URL, the refresh interval
//!   or the fetch timeout during operation (see [config]).
//! * **Dual-path lookups**: a query is first treated as a phone number (normalized to its
//!   canonical form) and then as an exact customer id.
//!
//! # Modules
//! * **Watchlist**: the normalizer, snapshot builder, snapshot store, refresh scheduler and
//!   query engine. See [watchlist].
//! * **Platform / Builder**: a tiny registry of central components and a builder to set them up
//!   (see [platform] and [builder]).
//! * **API**: a minimal JSON API on top of the query engine (see [api]).
//!
//! # Using FraudWatch
//! A complete service which exposes the query engine via the [api] can be found in
//! the **fraudwatch-io** crate. A short example on how to initialize the library can be found
//! here: [Builder](builder::Builder).
#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod api;
pub mod builder;
pub mod config;
pub mod fmt;
pub mod platform;
pub mod signals;
pub mod watchlist;

/// Contains the version of the FraudWatch library.
pub const FRAUDWATCH_VERSION: &str = "DEVELOPMENT-SNAPSHOT";

/// Contains the git commit hash of the FraudWatch build being used.
pub const FRAUDWATCH_REVISION: &str = "NO-REVISION";

/// Initializes the logging system.
///
/// Note that most probably the simplest way is to use a [Builder](builder::Builder) to set up the
/// framework, which will also set up logging if enabled.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    // Tests build several platforms within one process, so this must only ever run once...
    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .set_location_level(LevelFilter::Trace)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

/// Provides a simple macro to execute an async lambda within `tokio::spawn`.
///
/// Note that this also applies std::mem::drop on the returned closure to make
/// clippy happy.
///
/// # Example
/// ```rust
/// # #[macro_use] extern crate fraudwatch;
/// # #[tokio::main]
/// # async fn main() {
/// spawn!(async move {
///     // perform some async stuff here...
/// });
/// # }
#[macro_export]
macro_rules! spawn {
    ($e:expr) => {{
        std::mem::drop(tokio::spawn($e));
    }};
}
