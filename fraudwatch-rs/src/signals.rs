//! Installs a signal handler which terminates the platform on CTRL+C, SIGHUP or SIGTERM.
//!
//! Forks an async task which waits for one of these signals and then invokes
//! [Platform::terminate](crate::platform::Platform::terminate) on the given platform. As we
//! are most probably running in a container, SIGTERM is what a `docker stop` delivers.
use std::sync::Arc;

use tokio::signal::unix::SignalKind;

use crate::platform::Platform;

/// Installs a signal handler for the given platform.
///
/// Note that this is automatically called by the [Builder](crate::builder::Builder) unless it is
/// disabled.
pub fn install(platform: Arc<Platform>) {
    crate::spawn!(async move {
        let shutdown = platform.shutdown_token();
        let mut sig_hup = match tokio::signal::unix::signal(SignalKind::hangup()) {
            Ok(signal) => signal,
            Err(error) => {
                log::error!("Failed to install SIGHUP handler: {}", error);
                return;
            }
        };
        let mut sig_term = match tokio::signal::unix::signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(error) => {
                log::error!("Failed to install SIGTERM handler: {}", error);
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => log::info!("Received CTRL-C. Shutting down..."),
            _ = sig_hup.recv() => log::info!("Received SIGHUP. Shutting down..."),
            _ = sig_term.recv() => log::info!("Received SIGTERM. Shutting down..."),
            _ = shutdown.cancelled() => return,
        }

        platform.terminate();
    });
}
