//! Provides a tiny DI like container to expose all components of the system.
//!
//! The platform is more or less a simple map which keeps all central components (the
//! [Config](crate::config::Config), the [SnapshotStore](crate::watchlist::store::SnapshotStore),
//! the [QueryEngine](crate::watchlist::query::QueryEngine) and so on) as **Arc<T>** around.
//! Also this keeps the central **is_running** flag which is toggled to *false* once
//! [Platform::terminate](Platform::terminate) is invoked.
//!
//! Background tasks like the refresh scheduler don't poll the flag but await the
//! [shutdown token](Platform::shutdown_token) which is cancelled by
//! [Platform::terminate](Platform::terminate). This way a sleeping task wakes up immediately
//! once the system shuts down.
//!
//! # Examples
//!
//! ```
//! # use std::sync::Arc;
//! # use fraudwatch::platform::Platform;
//! struct Service {
//!     value : i32
//! }
//!
//! struct UnknownService;
//!
//! let platform = Platform::new();
//!
//! // Registers a new service...
//! platform.register::<Service>(Arc::new(Service { value: 42 }));
//!
//! // Obtains a reference to a previously registered service...
//! let service = platform.require::<Service>();
//! assert_eq!(service.value, 42);
//!
//! // Trying to obtain a service which hasn't been registered yet, returns an empty
//! // optional...
//! assert_eq!(platform.find::<UnknownService>().is_none(), true);
//!
//! // Once terminated...
//! let token = platform.shutdown_token();
//! platform.terminate();
//!
//! // All services are released, the platform is halted and all tasks are told to stop...
//! assert_eq!(platform.find::<Service>().is_none(), true);
//! assert_eq!(platform.is_running(), false);
//! assert_eq!(token.is_cancelled(), true);
//! ```
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// Provides a container to keep all central services in a single place.
pub struct Platform {
    services: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    is_running: AtomicBool,
    shutdown: CancellationToken,
}

impl Platform {
    /// Creates a new platform instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Platform {
            services: Mutex::new(HashMap::new()),
            is_running: AtomicBool::new(true),
            shutdown: CancellationToken::new(),
        })
    }

    /// Registers a new component.
    ///
    /// Registering a component of the same type twice replaces the previous one.
    pub fn register<T>(&self, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        let _ = self
            .services
            .lock()
            .unwrap()
            .insert(TypeId::of::<T>(), service);
    }

    /// Tries to resolve a previously registered service.
    ///
    /// Note, if one knows for certain, that a service will be present,
    /// [Platform::require](Platform::require) can be used.
    pub fn find<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let services = self.services.lock().unwrap();
        services
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.clone().downcast::<T>().ok())
    }

    /// Resolve a previously registered service.
    ///
    /// # Panics
    /// Panics if the requested service isn't available or if the platform is already
    /// shutting down (as all services are evicted then).
    ///
    /// ```should_panic
    /// # use fraudwatch::platform::Platform;
    /// struct UnknownService;
    ///
    /// let platform = Platform::new();
    ///
    /// // This will panic...
    /// platform.require::<UnknownService>();
    /// ```
    pub fn require<T>(&self) -> Arc<T>
    where
        T: Any + Send + Sync,
    {
        if !self.is_running() {
            panic!(
                "A required component ({}) has been requested but the system is already shutting down!",
                std::any::type_name::<T>()
            )
        }

        match self.find::<T>() {
            Some(service) => service,
            None => panic!(
                "A required component ({}) was not available in the platform registry!",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Determines if the platform is still running or if [Platform::terminate](Platform::terminate)
    /// has already been called.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Returns a token which is cancelled once the platform terminates.
    ///
    /// Long running tasks should `select!` on `token.cancelled()` so that they stop promptly.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Terminates the platform.
    ///
    /// This will immediately release all services (so that the Dropped handlers run eventually),
    /// cancel the [shutdown token](Platform::shutdown_token) and toggle the
    /// [is_running()](Platform::is_running) flag to **false**.
    pub fn terminate(&self) {
        self.services.lock().unwrap().clear();
        self.is_running.store(false, Ordering::Release);
        self.shutdown.cancel();
    }
}
