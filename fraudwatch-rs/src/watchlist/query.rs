//! Answers lookups against the active snapshot.
//!
//! A query string is interpreted in two ways, in this order:
//! 1. as a phone number: it is normalized to its canonical form and looked up in the phone index,
//! 2. as a customer id: it is matched **exactly** (after trimming) against the customer id index
//!    and resolved to the phone it is listed under.
//!
//! The first path which yields a match wins. If neither does, the result is
//! [NotFraud](Status::NotFraud) without any locations.
//!
//! # Example
//!
//! ```
//! # use std::sync::Arc;
//! # use fraudwatch::watchlist::query::{QueryEngine, Status};
//! # use fraudwatch::watchlist::snapshot::{RawRow, SnapshotBuilder};
//! # use fraudwatch::watchlist::store::SnapshotStore;
//! let store = Arc::new(SnapshotStore::new());
//! let row: RawRow = [("Phone", "01112223334"), ("State", "Lagos"), ("City", "Ikeja"), ("Zone", "A"),
//!            ("distinct_customers", "3"), ("customer_ids", "[C100 C101]")]
//!     .iter()
//!     .map(|(column, value)| (column.to_string(), value.to_string()))
//!     .collect();
//! store.publish(SnapshotBuilder::default().build(&[row]).unwrap());
//!
//! let engine = QueryEngine::with_default_format(store);
//! let result = engine.query("C101");
//! assert_eq!(result.status, Status::Fraud);
//! assert_eq!(result.phone, "01112223334");
//! assert_eq!(result.locations[0].city, "Ikeja");
//! ```
use std::sync::Arc;

use serde::Serialize;

use crate::watchlist::normalize::{PhoneFormat, TrunkPrefixFormat};
use crate::watchlist::snapshot::{Snapshot, WatchlistEntry};
use crate::watchlist::store::SnapshotStore;

/// Tells whether a query matched the watchlist.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The phone or customer id is listed.
    Fraud,
    /// Nothing matched.
    NotFraud,
}

/// Describes one location a matched phone is listed for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Location {
    /// The state of the location.
    pub state: String,
    /// The city of the location.
    pub city: String,
    /// The zone of the location.
    pub zone: String,
    /// The number of distinct customers (as given in the source).
    pub distinct_customers: String,
    /// The customer ids seen at this location.
    pub customer_ids: Vec<String>,
}

impl From<&WatchlistEntry> for Location {
    fn from(entry: &WatchlistEntry) -> Self {
        Location {
            state: entry.state.clone(),
            city: entry.city.clone(),
            zone: entry.zone.clone(),
            distinct_customers: entry.distinct_customers.clone(),
            customer_ids: entry.customer_ids.clone(),
        }
    }
}

/// Represents the outcome of a lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    /// Either **fraud** or **notfraud**.
    pub status: Status,
    /// The matched phone in its display form. For a miss, this is the display form of the
    /// trimmed query.
    pub phone: String,
    /// All locations of the matched phone in source order. Empty for a miss.
    pub locations: Vec<Location>,
}

impl QueryResult {
    /// Determines if the query matched the watchlist.
    pub fn is_fraud(&self) -> bool {
        self.status == Status::Fraud
    }
}

/// Performs lookups against the active snapshot of a [SnapshotStore].
pub struct QueryEngine {
    store: Arc<SnapshotStore>,
    format: Arc<dyn PhoneFormat>,
}

impl QueryEngine {
    /// Creates a new engine which uses the given format to normalize and present phones.
    ///
    /// This has to be the same format which is used by the
    /// [SnapshotBuilder](crate::watchlist::snapshot::SnapshotBuilder) feeding the store.
    pub fn new(store: Arc<SnapshotStore>, format: Arc<dyn PhoneFormat>) -> Self {
        QueryEngine { store, format }
    }

    /// Creates a new engine using the [TrunkPrefixFormat].
    pub fn with_default_format(store: Arc<SnapshotStore>) -> Self {
        QueryEngine::new(store, Arc::new(TrunkPrefixFormat))
    }

    /// Looks up the given phone or customer id.
    ///
    /// The active snapshot is obtained exactly once, so that a concurrent refresh can never
    /// mix the phone path and the customer id path across two snapshots.
    pub fn query(&self, query: &str) -> QueryResult {
        let snapshot = self.store.get_active();
        self.query_snapshot(&snapshot, query)
    }

    /// Looks up the given phone or customer id in the given snapshot.
    pub fn query_snapshot(&self, snapshot: &Snapshot, query: &str) -> QueryResult {
        let query = query.trim();
        let canonical_phone = self.format.normalize(query);
        if snapshot.contains_phone(&canonical_phone) {
            return self.fraud(snapshot, &canonical_phone);
        }

        match snapshot.phone_for_customer_id(query) {
            Some(phone) => self.fraud(snapshot, phone),
            None => self.not_fraud(query),
        }
    }

    fn not_fraud(&self, query: &str) -> QueryResult {
        QueryResult {
            status: Status::NotFraud,
            phone: self.format.display(query),
            locations: Vec::new(),
        }
    }

    fn fraud(&self, snapshot: &Snapshot, canonical_phone: &str) -> QueryResult {
        QueryResult {
            status: Status::Fraud,
            phone: self.format.display(canonical_phone),
            locations: snapshot
                .entries_for_phone(canonical_phone)
                .map(Location::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::watchlist::normalize::PhoneFormat;
    use crate::watchlist::query::{QueryEngine, Status};
    use crate::watchlist::snapshot::tests::row;
    use crate::watchlist::snapshot::SnapshotBuilder;
    use crate::watchlist::store::SnapshotStore;

    fn engine() -> QueryEngine {
        let store = Arc::new(SnapshotStore::new());
        let _ = store.publish(
            SnapshotBuilder::default()
                .build(&[
                    row("01112223334", "Lagos", "Ikeja", "A", "3", "[C100 C101]"),
                    row("01112223334", "Lagos", "Lekki", "C", "2", "[C102]"),
                    row("2223334445", "Oyo", "Ibadan", "B", "1", "C200, C201"),
                ])
                .unwrap(),
        );

        QueryEngine::with_default_format(store)
    }

    #[test]
    fn phones_are_found_in_both_forms() {
        let engine = engine();

        for query in ["1112223334", "01112223334", "  01112223334\n"] {
            let result = engine.query(query);
            assert_eq!(result.status, Status::Fraud);
            assert_eq!(result.phone, "01112223334");
            assert_eq!(result.locations.len(), 2);
            assert_eq!(result.locations[0].city, "Ikeja");
            assert_eq!(result.locations[0].customer_ids, vec!["C100", "C101"]);
            assert_eq!(result.locations[1].city, "Lekki");
        }
    }

    #[test]
    fn customer_ids_resolve_to_their_phone() {
        let engine = engine();

        let result = engine.query("C100");
        assert_eq!(result.status, Status::Fraud);
        assert_eq!(result.phone, "01112223334");
        assert_eq!(result.locations.len(), 2);

        let result = engine.query(" C201 ");
        assert_eq!(result.phone, "02223334445");
        assert_eq!(result.locations[0].state, "Oyo");
        assert_eq!(result.locations[0].distinct_customers, "1");
    }

    #[test]
    fn customer_ids_are_matched_exactly() {
        let engine = engine();
        assert_eq!(engine.query("c100").status, Status::NotFraud);
        assert_eq!(engine.query("C10").status, Status::NotFraud);
    }

    #[test]
    fn misses_present_the_trimmed_query() {
        let engine = engine();

        let result = engine.query(" 9999999999 ");
        assert_eq!(result.status, Status::NotFraud);
        assert_eq!(result.phone, "09999999999");
        assert_eq!(result.locations.is_empty(), true);
        assert_eq!(result.is_fraud(), false);

        assert_eq!(engine.query("C999").phone, "C999");
        assert_eq!(engine.query("   ").status, Status::NotFraud);
        assert_eq!(engine.query("").phone, "");
    }

    #[test]
    fn an_empty_store_knows_nothing() {
        let engine = QueryEngine::with_default_format(Arc::new(SnapshotStore::new()));
        assert_eq!(engine.query("01112223334").status, Status::NotFraud);
        assert_eq!(engine.query("C100").status, Status::NotFraud);
    }

    #[test]
    fn the_phone_path_takes_precedence() {
        // A customer id which happens to look like a listed phone...
        let store = Arc::new(SnapshotStore::new());
        let _ = store.publish(
            SnapshotBuilder::default()
                .build(&[
                    row("1112223334", "Lagos", "Ikeja", "A", "1", "C100"),
                    row("2223334445", "Oyo", "Ibadan", "B", "1", "1112223334"),
                ])
                .unwrap(),
        );
        let engine = QueryEngine::with_default_format(store);

        let result = engine.query("1112223334");
        assert_eq!(result.phone, "01112223334");
        assert_eq!(result.locations[0].city, "Ikeja");
    }

    #[test]
    fn results_are_serialized_as_expected() {
        let engine = engine();

        let json = serde_json::to_value(engine.query("C200")).unwrap();
        assert_eq!(json["status"], "fraud");
        assert_eq!(json["phone"], "02223334445");
        assert_eq!(json["locations"][0]["zone"], "B");
        assert_eq!(json["locations"][0]["customer_ids"][1], "C201");

        let json = serde_json::to_value(engine.query("nope")).unwrap();
        assert_eq!(json["status"], "notfraud");
        assert_eq!(json["locations"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn a_single_row_watchlist_answers_all_lookups() {
        let store = Arc::new(SnapshotStore::new());
        let _ = store.publish(
            SnapshotBuilder::default()
                .build(&[row("01112223334", "Lagos", "Ikeja", "A", "3", "[C100 C101]")])
                .unwrap(),
        );
        let engine = QueryEngine::with_default_format(store);

        let expected = serde_json::json!({
            "status": "fraud",
            "phone": "01112223334",
            "locations": [{
                "state": "Lagos",
                "city": "Ikeja",
                "zone": "A",
                "distinct_customers": "3",
                "customer_ids": ["C100", "C101"]
            }]
        });
        assert_eq!(serde_json::to_value(engine.query("1112223334")).unwrap(), expected);
        assert_eq!(serde_json::to_value(engine.query("C100")).unwrap(), expected);
        assert_eq!(
            serde_json::to_value(engine.query("9999999999")).unwrap(),
            serde_json::json!({"status": "notfraud", "phone": "09999999999", "locations": []})
        );
    }

    #[test]
    fn blank_phones_are_listed_like_any_other() {
        let store = Arc::new(SnapshotStore::new());
        let _ = store.publish(
            SnapshotBuilder::default()
                .build(&[
                    row("01112223334", "Lagos", "Ikeja", "A", "3", "C100"),
                    row("", "", "", "", "", ""),
                ])
                .unwrap(),
        );
        let engine = QueryEngine::with_default_format(store);

        let result = engine.query("  ");
        assert_eq!(result.status, Status::Fraud);
        assert_eq!(result.phone, "");
        assert_eq!(result.locations.len(), 1);
    }

    struct Verbatim;

    impl PhoneFormat for Verbatim {
        fn normalize(&self, raw: &str) -> String {
            raw.trim().to_owned()
        }

        fn display(&self, phone: &str) -> String {
            phone.to_owned()
        }
    }

    #[test]
    fn other_phone_formats_can_be_plugged_in() {
        let format: Arc<dyn PhoneFormat> = Arc::new(Verbatim);
        let store = Arc::new(SnapshotStore::new());
        let _ = store.publish(
            SnapshotBuilder::new(format.clone())
                .build(&[row("+2341112223334", "Lagos", "Ikeja", "A", "1", "C100")])
                .unwrap(),
        );
        let engine = QueryEngine::new(store, format);

        assert_eq!(engine.query("+2341112223334").phone, "+2341112223334");
        assert_eq!(engine.query("C100").phone, "+2341112223334");
        assert_eq!(engine.query("1112223334").status, Status::NotFraud);
    }
}
