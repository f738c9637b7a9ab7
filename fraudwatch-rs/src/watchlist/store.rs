//! Keeps the currently active snapshot.
//!
//! The store is the only shared mutable state of the watchlist. It holds an
//! [ArcSwap](arc_swap::ArcSwap) which points to an immutable [Snapshot]. Readers obtain an
//! **Arc** of the snapshot which remains valid (and unchanged) for as long as they hold it, even
//! if a new snapshot is published in the meantime. Publishing is a single atomic pointer swap,
//! therefore neither readers nor the writer ever wait for each other.
//!
//! # Example
//!
//! ```
//! # use fraudwatch::watchlist::snapshot::{RawRow, SnapshotBuilder};
//! # use fraudwatch::watchlist::store::SnapshotStore;
//! let store = SnapshotStore::new();
//! assert_eq!(store.get_active().is_empty(), true);
//!
//! let row: RawRow = [("Phone", "01112223334"), ("State", "Lagos"), ("City", "Ikeja"), ("Zone", "A"),
//!            ("distinct_customers", "3"), ("customer_ids", "[C100 C101]")]
//!     .iter()
//!     .map(|(column, value)| (column.to_string(), value.to_string()))
//!     .collect();
//! let snapshot = SnapshotBuilder::default().build(&[row]).unwrap();
//!
//! // A reader which obtained the snapshot before the publish keeps its view...
//! let before = store.get_active();
//! store.publish(snapshot);
//! assert_eq!(before.is_empty(), true);
//!
//! // ...while everyone else sees the new one.
//! assert_eq!(store.get_active().stats().total_entries, 1);
//! ```
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::watchlist::snapshot::Snapshot;

/// Holds the active [Snapshot] behind an atomic swap point.
pub struct SnapshotStore {
    active: ArcSwap<Snapshot>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        SnapshotStore::new()
    }
}

impl SnapshotStore {
    /// Creates a new store which serves an empty snapshot until something is published.
    pub fn new() -> Self {
        SnapshotStore {
            active: ArcSwap::from_pointee(Snapshot::empty()),
        }
    }

    /// Returns the currently active snapshot.
    ///
    /// The returned snapshot is always complete and never changes. Callers which perform
    /// several lookups should obtain it once and use it for all of them.
    pub fn get_active(&self) -> Arc<Snapshot> {
        self.active.load_full()
    }

    /// Atomically replaces the active snapshot.
    ///
    /// The previous snapshot is dropped once the last reader releases it.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.active.store(snapshot.clone());

        snapshot
    }
}
