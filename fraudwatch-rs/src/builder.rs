//! Provides a builder which can be used to setup and initialize the framework.
//!
//! This creates and sets up the central parts of the service. As some of them are optional
//! (tests most probably don't want to install signal handlers), a builder permits to selectively
//! enable or disable them.
//!
//! # Example
//! Setting up the framework with all features enabled:
//! ```no_run
//! # use fraudwatch::builder::Builder;
//! # use fraudwatch::watchlist::query::QueryEngine;
//! #[tokio::main]
//! async fn main() {
//!     // Enable all features and build the platform...
//!     let platform = Builder::new().enable_all().build().await;
//!
//!     // Perform the initial load and start refreshing the watchlist...
//!     fraudwatch::watchlist::install(&platform).await.unwrap();
//!
//!     let result = platform.require::<QueryEngine>().query("01112223334");
//!     println!("{:?}", result.status);
//! }
//! ```
use std::sync::Arc;

use crate::platform::Platform;
use crate::{init_logging, FRAUDWATCH_REVISION, FRAUDWATCH_VERSION};

/// Initializes the framework by creating and initializing all core components.
///
/// Note that the watchlist itself isn't installed here, as its initial load might fail
/// and the caller has to decide how to handle that. See
/// [watchlist::install](crate::watchlist::install).
#[derive(Default)]
pub struct Builder {
    setup_logging: bool,
    enable_signals: bool,
    setup_config: bool,
}

impl Builder {
    /// Creates a new builder with all features disabled.
    pub fn new() -> Self {
        Builder::default()
    }

    /// Enables all features.
    ///
    /// Note that using this method (and then maybe disabling selected components) is quite
    /// convenient, but be aware that new components which might be added in a library update
    /// will then also be enabled by default.
    pub fn enable_all(mut self) -> Self {
        self.setup_logging = true;
        self.enable_signals = true;
        self.setup_config = true;

        self
    }

    /// Enables the automatic setup of the logging system.
    ///
    /// Using this, we properly initialize **simplelog** to log to stdout. As the service is
    /// intended to be run in a container, this is all that is needed.
    pub fn enable_logging(mut self) -> Self {
        self.setup_logging = true;
        self
    }

    /// Disables the automatic setup of the logging system after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_logging(mut self) -> Self {
        self.setup_logging = false;
        self
    }

    /// Installs a signal listener which terminates the framework once **CTRL-C**, **SIGHUP** or
    /// **SIGTERM** is received.
    ///
    /// For more details see: [signals](crate::signals)
    pub fn enable_signals(mut self) -> Self {
        self.enable_signals = true;
        self
    }

    /// Disables installing the signal listener after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_signals(mut self) -> Self {
        self.enable_signals = false;
        self
    }

    /// Installs [config::Config](crate::config::Config) and loads the **settings.yml**.
    ///
    /// For more details see: [config](crate::config)
    pub fn enable_config(mut self) -> Self {
        self.setup_config = true;
        self
    }

    /// Disables setting up a **Config** instance after [enable_all()](Builder::enable_all)
    /// has been used.
    pub fn disable_config(mut self) -> Self {
        self.setup_config = false;
        self
    }

    /// Builds the [Platform](crate::platform::Platform) registry with all the enabled components
    /// being registered.
    pub async fn build(self) -> Arc<Platform> {
        let platform = Platform::new();

        if self.setup_logging {
            init_logging();
        }

        log::info!(
            "||. FRAUDWATCH (v {} - rev {}) running on {} core(s) in {} CPU(s)",
            FRAUDWATCH_VERSION,
            FRAUDWATCH_REVISION,
            num_cpus::get(),
            num_cpus::get_physical()
        );

        if self.enable_signals {
            crate::signals::install(platform.clone());
        }

        if self.setup_config {
            crate::config::install(platform.clone()).await;
        }

        platform
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::config::Config;

    #[test]
    fn only_enabled_components_are_installed() {
        crate::testing::test_async(async {
            let platform = Builder::new().build().await;
            assert_eq!(platform.find::<Config>().is_none(), true);

            let platform = Builder::new().enable_all().disable_signals().build().await;
            assert_eq!(platform.find::<Config>().is_some(), true);

            platform.terminate();
            assert_eq!(platform.is_running(), false);
        });
    }
}
