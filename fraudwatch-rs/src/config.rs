//! Contains the system configuration.
//!
//! Provides access to the system configuration which is loaded from the **config/settings.yml**
//! file. Note that we observe this file for changes and reload it once a change is detected.
//! Therefore each user of the config should attach itself to the [Config::notifier](Config::notifier)
//! and re-process the config once a change message is received.
//!
//! A complete config file looks like this (every key is optional):
//! ```yaml
//! watchlist:
//!     # The CSV document to fetch the watchlist from.
//!     url: "https://docs.example.com/watchlist.csv"
//!     # The period between two refreshes. Plain numbers are treated as seconds.
//!     interval: "10m"
//!     # The maximal duration of a single download.
//!     timeout: "30s"
//!     # Abort the startup if the very first refresh fails instead of serving an empty list.
//!     require_initial_load: false
//! server:
//!     address: "0.0.0.0:8080"
//! ```
//!
//! Note that the **Config** struct is kind of constant and can be obtained from the **Platform**
//! once and then kept around. However, the [Handle] returned by **Config::current()** should not
//! be stored, as it will not be updated once a new config has been loaded.
//!
//! # Examples
//!
//! ```
//! # use fraudwatch::config::Config;
//! # use std::time::Duration;
//! let config = Config::new("somefile.yml");
//! config.load_from_string("
//! watchlist:
//!     interval: 5m
//! ", None).unwrap();
//!
//! assert_eq!(config.current().settings().interval, Duration::from_secs(300));
//! ```
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use arc_swap::ArcSwap;
use yaml_rust::{Yaml, YamlLoader};

use crate::fmt::parse_duration;
use crate::platform::Platform;

/// Contains the refresh period used if none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);

/// Contains the fetch timeout used if none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Contains the address the HTTP API binds to if none is configured.
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:8080";

/// Represents the parsed and validated contents of the config file.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// The URL of the CSV document containing the watchlist.
    pub source_url: Option<String>,
    /// The period between two refresh cycles.
    pub interval: Duration,
    /// The maximal duration of a single fetch.
    pub timeout: Duration,
    /// Determines if a failing initial refresh aborts the startup.
    pub require_initial_load: bool,
    /// The socket address of the HTTP API.
    pub server_address: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            source_url: None,
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            require_initial_load: false,
            server_address: DEFAULT_SERVER_ADDRESS.to_owned(),
        }
    }
}

impl Settings {
    /// Reads the settings from the given YAML document.
    ///
    /// Missing keys fall back to their defaults, values of the wrong type or unparseable
    /// durations are reported as error.
    pub fn from_yaml(doc: &Yaml) -> anyhow::Result<Settings> {
        let mut settings = Settings::default();
        let watchlist = &doc["watchlist"];

        match &watchlist["url"] {
            Yaml::BadValue | Yaml::Null => (),
            Yaml::String(url) if url.trim().is_empty() => (),
            Yaml::String(url) => settings.source_url = Some(url.trim().to_owned()),
            other => return Err(anyhow::anyhow!("watchlist.url: Expected a string but got {:?}", other)),
        }

        if let Some(interval) = read_duration(&watchlist["interval"], "watchlist.interval")? {
            if interval.is_zero() {
                return Err(anyhow::anyhow!("watchlist.interval must not be zero."));
            }
            settings.interval = interval;
        }
        if let Some(timeout) = read_duration(&watchlist["timeout"], "watchlist.timeout")? {
            if timeout.is_zero() {
                return Err(anyhow::anyhow!("watchlist.timeout must not be zero."));
            }
            settings.timeout = timeout;
        }

        match &watchlist["require_initial_load"] {
            Yaml::BadValue | Yaml::Null => (),
            Yaml::Boolean(flag) => settings.require_initial_load = *flag,
            other => {
                return Err(anyhow::anyhow!(
                    "watchlist.require_initial_load: Expected a boolean but got {:?}",
                    other
                ))
            }
        }

        match &doc["server"]["address"] {
            Yaml::BadValue | Yaml::Null => (),
            Yaml::String(address) => settings.server_address = address.clone(),
            other => {
                return Err(anyhow::anyhow!(
                    "server.address: Expected a string but got {:?}",
                    other
                ))
            }
        }

        Ok(settings)
    }
}

fn read_duration(value: &Yaml, key: &str) -> anyhow::Result<Option<Duration>> {
    match value {
        Yaml::BadValue | Yaml::Null => Ok(None),
        Yaml::Integer(seconds) if *seconds >= 0 => Ok(Some(Duration::from_secs(*seconds as u64))),
        Yaml::String(expression) => parse_duration(expression)
            .map(Some)
            .with_context(|| format!("Invalid value for {}", key)),
        other => Err(anyhow::anyhow!(
            "{}: Expected a duration like '10m' but got {:?}",
            key,
            other
        )),
    }
}

/// Provides access to the system configuration.
///
/// Most probably a config instance is installed by the [Builder](crate::builder::Builder) and
/// can be obtained via `platform.require::<Config>()`.
pub struct Config {
    filename: String,
    tx: tokio::sync::broadcast::Sender<()>,
    config: ArcSwap<(Settings, Option<SystemTime>)>,
}

/// Represents the change listener.
///
/// Internally this is simply the receiver of a broadcast. The actual message being broadcast
/// can and should be ignored. All that matters is, once a message has been received, the config
/// was changed and needs to be re-processed.
pub type ChangeNotifier = tokio::sync::broadcast::Receiver<()>;

/// Represents a handle to the currently loaded configuration.
///
/// Note that this handle should not be stored or kept around for long, as it will not be updated
/// if the underlying config changed.
pub struct Handle {
    config: Arc<(Settings, Option<SystemTime>)>,
}

impl Config {
    /// Creates a new config reading the given file.
    ///
    /// Note that this will not install a change listener. This is only done by the
    /// [install](install) function. Until something is loaded, the default settings apply.
    pub fn new(file: &str) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(1);
        Config {
            filename: file.to_owned(),
            config: ArcSwap::new(Arc::new((Settings::default(), None))),
            tx,
        }
    }

    /// Obtains a change notifier which receives a message once the config changed.
    pub fn notifier(&self) -> ChangeNotifier {
        self.tx.subscribe()
    }

    /// Obtains a handle to the currently loaded configuration.
    pub fn current(&self) -> Handle {
        Handle {
            config: self.config.load_full(),
        }
    }

    /// Determines the last modified date of the config file on disk.
    ///
    /// As within docker, the file is presented as volume, we check that it is a file, as an
    /// unmounted docker volume is always presented as directory.
    async fn last_modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.filename)
            .await
            .ok()
            .filter(|meta| meta.is_file())
            .and_then(|meta| meta.modified().ok())
    }

    /// Forces the config to read the underlying file.
    ///
    /// Note that this is normally called by the framework and should not be invoked manually.
    pub async fn load(&self) -> anyhow::Result<()> {
        log::info!("Loading config file {}...", &self.filename);

        if let Ok(metadata) = tokio::fs::metadata(&self.filename).await {
            if !metadata.is_file() {
                log::info!("Config file doesn't exist or is an unmounted docker volume - skipping config load.");
                return Ok(());
            }
        }

        let config_data = tokio::fs::read_to_string(&self.filename)
            .await
            .with_context(|| format!("Cannot load config file {}", &self.filename))?;

        let last_modified = self.last_modified().await;

        self.load_from_string(config_data.as_str(), last_modified)
    }

    /// Loads a configuration from the given string instead of a file.
    ///
    /// This is intended to be used in test environments where we cannot / do not want to load
    /// a config file from disk. A config which cannot be parsed is rejected and the previous
    /// settings remain active.
    pub fn load_from_string(
        &self,
        data: &str,
        last_modified: Option<SystemTime>,
    ) -> anyhow::Result<()> {
        let docs = YamlLoader::load_from_str(data).map_err(|error| {
            anyhow::anyhow!("Cannot parse config file {}: {}", &self.filename, error)
        })?;

        let settings = match docs.first() {
            Some(doc) => Settings::from_yaml(doc)
                .with_context(|| format!("Invalid config file {}", &self.filename))?,
            None => Settings::default(),
        };

        self.config.store(Arc::new((settings, last_modified)));

        // Notify all listeners - we ignore if there are none...
        let _ = self.tx.send(());

        Ok(())
    }
}

impl Handle {
    /// Provides access to the currently loaded settings.
    pub fn settings(&self) -> &Settings {
        &self.config.0
    }
}

/// Creates and installs a **Config** for the given platform.
///
/// This will read its contents from **config/settings.yml** and also install a change listener
/// for this file. Note that this listener will only watch the "last modified" date of the file
/// and will not perform a structural comparison.
///
/// Note that this method is also called by the [Builder](crate::builder::Builder) unless the
/// **Config** part is disabled.
pub async fn install(platform: Arc<Platform>) {
    let path = Path::new("config").to_path_buf();
    if let Err(error) = tokio::fs::create_dir_all(path.clone()).await {
        log::warn!(
            "Failed to create config base directory {}: {}",
            path.to_string_lossy(),
            error
        )
    }

    let config = Arc::new(Config::new("config/settings.yml"));
    platform.register::<Config>(config.clone());

    if let Err(error) = config.load().await {
        log::error!("{:#}", error);
    }

    run_config_change_monitor(platform, config);
}

#[cfg(test)]
fn run_config_change_monitor(_platform: Arc<Platform>, _config: Arc<Config>) {
    // No automatic updates during testing...
}

#[cfg(not(test))]
fn run_config_change_monitor(platform: Arc<Platform>, config: Arc<Config>) {
    crate::spawn!(async move {
        let shutdown = platform.shutdown_token();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_secs(2)) => (),
            }

            let last_modified = config.last_modified().await;
            let last_loaded = config.config.load().1;

            // Only reload if a file is present and newer than the one previously loaded...
            if last_modified.is_some() && (last_loaded.is_none() || last_modified > last_loaded) {
                match config.load().await {
                    Ok(_) => log::info!("System configuration was re-loaded."),
                    Err(error) => log::error!("Failed to re-load system config: {:#}", error),
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use crate::builder::Builder;
    use crate::config::{Config, Settings, DEFAULT_TIMEOUT};
    use std::time::{Duration, SystemTime};

    #[test]
    fn ensure_config_update_works() {
        crate::testing::test_async(async {
            let platform = Builder::new().enable_config().build().await;
            let config = platform.require::<Config>();

            // Load an initial config...
            config
                .load_from_string("watchlist:\n  interval: 42s", Some(SystemTime::now()))
                .unwrap();

            // Setup a task which notifies our oneshot channel once the config changes...
            let mut change_notifier = config.notifier();
            let (tx, rx) = tokio::sync::oneshot::channel();
            crate::spawn!(async move {
                if change_notifier.recv().await.is_ok() {
                    tx.send(()).unwrap();
                }
            });

            assert_eq!(
                config.current().settings().interval,
                Duration::from_secs(42)
            );

            // Ensure that a malformed config is simply ignored...
            assert_eq!(
                config
                    .load_from_string("watchlist: 'invalid", Some(SystemTime::now()))
                    .is_err(),
                true
            );
            assert_eq!(
                config
                    .load_from_string("watchlist:\n  interval: soon", Some(SystemTime::now()))
                    .is_err(),
                true
            );
            assert_eq!(
                config.current().settings().interval,
                Duration::from_secs(42)
            );

            // Change the config...
            config
                .load_from_string("watchlist:\n  interval: 1h", Some(SystemTime::now()))
                .unwrap();

            match rx.await {
                Ok(()) => (),
                _ => panic!("Received invalid value..."),
            };

            assert_eq!(
                config.current().settings().interval,
                Duration::from_secs(3600)
            );

            platform.terminate();
        });
    }

    #[test]
    fn settings_are_read_from_yaml() {
        let config = Config::new("test.yml");
        config
            .load_from_string(
                r#"
                watchlist:
                    url: " http://localhost:7981/watchlist.csv "
                    interval: 120
                    timeout: "5s"
                    require_initial_load: true
                server:
                    address: "127.0.0.1:9000"
                "#,
                None,
            )
            .unwrap();

        let handle = config.current();
        let settings = handle.settings();
        assert_eq!(
            settings.source_url.as_deref(),
            Some("http://localhost:7981/watchlist.csv")
        );
        assert_eq!(settings.interval, Duration::from_secs(120));
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.require_initial_load, true);
        assert_eq!(settings.server_address, "127.0.0.1:9000");
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = Config::new("test.yml");
        config.load_from_string("other: 1", None).unwrap();
        assert_eq!(config.current().settings(), &Settings::default());
        assert_eq!(config.current().settings().timeout, DEFAULT_TIMEOUT);

        assert_eq!(
            config
                .load_from_string("watchlist:\n  interval: 0s", None)
                .is_err(),
            true
        );
        assert_eq!(
            config
                .load_from_string("watchlist:\n  require_initial_load: 'yes'", None)
                .is_err(),
            true
        );
        assert_eq!(
            config
                .load_from_string("watchlist:\n  timeout: 0s", None)
                .is_err(),
            true
        );
        assert_eq!(config.current().settings().timeout, DEFAULT_TIMEOUT);
    }
}
