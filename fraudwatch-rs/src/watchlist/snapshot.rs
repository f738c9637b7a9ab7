//! Provides the immutable lookup structures built from one download of the watchlist.
//!
//! A [Snapshot] consists of three cross-referenced structures:
//! * all entries in the order of the source rows,
//! * an index from the canonical phone to all entries of this phone (a phone can be listed
//!   for several locations),
//! * an index from each customer id to the canonical phone it was listed under.
//!
//! Snapshots are created by the [SnapshotBuilder] from a list of [RawRow]s. The builder works
//! on fresh, local maps only and hands out the snapshot once it is complete. After that nothing
//! ever modifies it - a refresh creates a new one which is then swapped in by the
//! [SnapshotStore](crate::watchlist::store::SnapshotStore).
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use fnv::FnvHashMap;
use serde::Serialize;

use crate::watchlist::error::RefreshError;
use crate::watchlist::normalize::{parse_customer_id_cell, PhoneFormat, TrunkPrefixFormat};

/// Represents a single row as delivered by a [DataSource](crate::watchlist::source::DataSource).
///
/// This maps column names to the raw cell contents.
pub type RawRow = HashMap<String, String>;

/// Contains the name of the column holding the phone number.
pub const COLUMN_PHONE: &str = "Phone";
/// Contains the name of the column holding the state.
pub const COLUMN_STATE: &str = "State";
/// Contains the name of the column holding the city.
pub const COLUMN_CITY: &str = "City";
/// Contains the name of the column holding the zone.
pub const COLUMN_ZONE: &str = "Zone";
/// Contains the name of the column holding the number of distinct customers.
pub const COLUMN_DISTINCT_CUSTOMERS: &str = "distinct_customers";
/// Contains the name of the column holding the list of customer ids.
pub const COLUMN_CUSTOMER_IDS: &str = "customer_ids";

/// Lists all columns which have to be present in each row.
pub const REQUIRED_COLUMNS: [&str; 6] = [
    COLUMN_PHONE,
    COLUMN_STATE,
    COLUMN_CITY,
    COLUMN_ZONE,
    COLUMN_DISTINCT_CUSTOMERS,
    COLUMN_CUSTOMER_IDS,
];

/// Represents one row of the watchlist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchlistEntry {
    /// The phone number as given in the source (trimmed but not normalized).
    pub phone: String,
    /// The state of the location.
    pub state: String,
    /// The city of the location.
    pub city: String,
    /// The zone of the location.
    pub zone: String,
    /// The number of distinct customers. This is passed through as is and never parsed.
    pub distinct_customers: String,
    /// The customer ids seen at this location in the order given in the source.
    pub customer_ids: Vec<String>,
}

/// Summarizes the contents of a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    /// The number of rows / entries.
    pub total_entries: usize,
    /// The number of distinct canonical phones.
    pub unique_phones: usize,
    /// The number of distinct customer ids.
    pub customer_ids: usize,
    /// The point in time when the snapshot was built or **None** for the initial, empty one.
    pub loaded_at: Option<DateTime<Local>>,
}

/// Represents a complete and immutable build of the watchlist.
#[derive(Debug, Default)]
pub struct Snapshot {
    entries: Vec<WatchlistEntry>,
    entries_by_phone: FnvHashMap<String, Vec<usize>>,
    phone_by_customer_id: FnvHashMap<String, String>,
    loaded_at: Option<DateTime<Local>>,
}

impl Snapshot {
    /// Creates an empty snapshot which doesn't know any phone or customer id.
    ///
    /// This is what the store serves before the first refresh succeeded.
    pub fn empty() -> Self {
        Snapshot::default()
    }

    /// Returns all entries in the order of the source rows.
    pub fn entries(&self) -> &[WatchlistEntry] {
        &self.entries
    }

    /// Determines if the given canonical phone is listed.
    pub fn contains_phone(&self, canonical_phone: &str) -> bool {
        self.entries_by_phone.contains_key(canonical_phone)
    }

    /// Returns all entries listed for the given canonical phone in source order.
    ///
    /// Yields an empty iterator if the phone isn't listed.
    pub fn entries_for_phone<'a>(
        &'a self,
        canonical_phone: &str,
    ) -> impl Iterator<Item = &'a WatchlistEntry> + 'a {
        let indices = self
            .entries_by_phone
            .get(canonical_phone)
            .map(|indices| indices.as_slice())
            .unwrap_or(&[]);

        indices.iter().map(move |index| &self.entries[*index])
    }

    /// Resolves the canonical phone under which the given customer id is listed.
    ///
    /// Customer ids are matched exactly, no normalization whatsoever is applied.
    pub fn phone_for_customer_id(&self, customer_id: &str) -> Option<&str> {
        self.phone_by_customer_id
            .get(customer_id)
            .map(|phone| phone.as_str())
    }

    /// Returns all canonical phones known to this snapshot (in no particular order).
    pub fn phones(&self) -> impl Iterator<Item = &str> {
        self.entries_by_phone.keys().map(|phone| phone.as_str())
    }

    /// Returns the point in time when the snapshot was built.
    pub fn loaded_at(&self) -> Option<DateTime<Local>> {
        self.loaded_at
    }

    /// Determines if the snapshot doesn't contain any entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summarizes the contents of this snapshot.
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            total_entries: self.entries.len(),
            unique_phones: self.entries_by_phone.len(),
            customer_ids: self.phone_by_customer_id.len(),
            loaded_at: self.loaded_at,
        }
    }
}

/// Transforms raw rows into a [Snapshot].
///
/// The builder itself is stateless apart from the [PhoneFormat] used to compute the lookup keys
/// and can therefore be shared freely.
pub struct SnapshotBuilder {
    format: Arc<dyn PhoneFormat>,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        SnapshotBuilder::new(Arc::new(TrunkPrefixFormat))
    }
}

impl SnapshotBuilder {
    /// Creates a new builder which uses the given format to compute canonical phones.
    pub fn new(format: Arc<dyn PhoneFormat>) -> Self {
        SnapshotBuilder { format }
    }

    /// Builds a snapshot from the given rows.
    ///
    /// A single row which lacks one of the [REQUIRED_COLUMNS] aborts the whole build with a
    /// [RefreshError::DataFormat]. We rather keep serving a stale watchlist than an incomplete
    /// one.
    ///
    /// If the same customer id shows up under several phones, the last row wins. This is
    /// reported as warning but not treated as an error.
    pub fn build(&self, rows: &[RawRow]) -> Result<Snapshot, RefreshError> {
        let watch = Instant::now();
        let mut entries = Vec::with_capacity(rows.len());
        let mut entries_by_phone: FnvHashMap<String, Vec<usize>> = FnvHashMap::default();
        let mut phone_by_customer_id: FnvHashMap<String, String> = FnvHashMap::default();
        let mut reassigned_ids = 0;

        for (index, row) in rows.iter().enumerate() {
            let entry = self.parse_row(index + 1, row)?;
            let canonical_phone = self.format.normalize(&entry.phone);

            for customer_id in &entry.customer_ids {
                if let Some(previous) =
                    phone_by_customer_id.insert(customer_id.clone(), canonical_phone.clone())
                {
                    if previous != canonical_phone {
                        log::debug!(
                            "Customer id {} is listed under {} and {} - keeping {}.",
                            customer_id,
                            previous,
                            canonical_phone,
                            canonical_phone
                        );
                        reassigned_ids += 1;
                    }
                }
            }

            entries_by_phone
                .entry(canonical_phone)
                .or_default()
                .push(entries.len());
            entries.push(entry);
        }

        if reassigned_ids > 0 {
            log::warn!(
                "{} customer id(s) are listed under more than one phone. The last listing wins.",
                reassigned_ids
            );
        }

        log::debug!(
            "Built a snapshot of {} entries for {} phones in {} ms.",
            entries.len(),
            entries_by_phone.len(),
            watch.elapsed().as_millis()
        );

        Ok(Snapshot {
            entries,
            entries_by_phone,
            phone_by_customer_id,
            loaded_at: Some(Local::now()),
        })
    }

    fn parse_row(&self, row_number: usize, row: &RawRow) -> Result<WatchlistEntry, RefreshError> {
        Ok(WatchlistEntry {
            phone: cell(row, row_number, COLUMN_PHONE)?.to_owned(),
            state: cell(row, row_number, COLUMN_STATE)?.to_owned(),
            city: cell(row, row_number, COLUMN_CITY)?.to_owned(),
            zone: cell(row, row_number, COLUMN_ZONE)?.to_owned(),
            distinct_customers: cell(row, row_number, COLUMN_DISTINCT_CUSTOMERS)?.to_owned(),
            customer_ids: parse_customer_id_cell(cell(row, row_number, COLUMN_CUSTOMER_IDS)?),
        })
    }
}

fn cell<'a>(row: &'a RawRow, row_number: usize, column: &'static str) -> Result<&'a str, RefreshError> {
    row.get(column)
        .map(|value| value.trim())
        .ok_or(RefreshError::DataFormat {
            row: row_number,
            column,
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::watchlist::error::RefreshError;
    use crate::watchlist::snapshot::{RawRow, Snapshot, SnapshotBuilder, REQUIRED_COLUMNS};

    /// Creates a row with all required columns.
    pub fn row(
        phone: &str,
        state: &str,
        city: &str,
        zone: &str,
        distinct_customers: &str,
        customer_ids: &str,
    ) -> RawRow {
        REQUIRED_COLUMNS
            .iter()
            .zip([phone, state, city, zone, distinct_customers, customer_ids])
            .map(|(column, value)| (column.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn entries_keep_source_order_and_raw_phone() {
        let snapshot = SnapshotBuilder::default()
            .build(&[
                row(" 01112223334 ", "Lagos", "Ikeja", "A", "3", "[C100 C101]"),
                row("2223334445", " Oyo ", "Ibadan", "B", " 1 ", ""),
                row("01112223334", "Lagos", "Lekki", "C", "2", "C102"),
            ])
            .unwrap();

        let entries = snapshot.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].phone, "01112223334");
        assert_eq!(entries[0].customer_ids, vec!["C100", "C101"]);
        assert_eq!(entries[1].state, "Oyo");
        assert_eq!(entries[1].distinct_customers, "1");
        assert_eq!(entries[1].customer_ids.is_empty(), true);
        assert_eq!(entries[2].city, "Lekki");
    }

    #[test]
    fn entries_are_grouped_by_canonical_phone() {
        let snapshot = SnapshotBuilder::default()
            .build(&[
                row("01112223334", "Lagos", "Ikeja", "A", "3", "C100"),
                row("2223334445", "Oyo", "Ibadan", "B", "1", "C200"),
                row("1112223334", "Lagos", "Lekki", "C", "2", "C102"),
            ])
            .unwrap();

        let cities = snapshot
            .entries_for_phone("1112223334")
            .map(|entry| entry.city.as_str())
            .collect::<Vec<_>>();
        assert_eq!(cities, vec!["Ikeja", "Lekki"]);
        assert_eq!(snapshot.contains_phone("01112223334"), false);
        assert_eq!(snapshot.entries_for_phone("01112223334").count(), 0);

        let stats = snapshot.stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.unique_phones, 2);
        assert_eq!(stats.customer_ids, 3);
        assert_eq!(stats.loaded_at.is_some(), true);
    }

    #[test]
    fn indexed_entries_are_part_of_the_ordered_entries() {
        let snapshot = SnapshotBuilder::default()
            .build(&[
                row("01112223334", "Lagos", "Ikeja", "A", "3", "C100"),
                row("2223334445", "Oyo", "Ibadan", "B", "1", "C200"),
                row("01112223334", "Lagos", "Lekki", "C", "2", "C102"),
                row("3334445556", "Kano", "Kano", "D", "7", "C300 C301"),
            ])
            .unwrap();

        for phone in snapshot.phones() {
            // Every indexed entry must appear in the ordered entries and in the same order...
            let mut position = 0;
            for entry in snapshot.entries_for_phone(phone) {
                let found = snapshot.entries()[position..]
                    .iter()
                    .position(|candidate| candidate == entry)
                    .expect("indexed entry missing from ordered entries");
                position += found + 1;
            }
        }
    }

    #[test]
    fn customer_ids_point_to_listed_phones() {
        let snapshot = SnapshotBuilder::default()
            .build(&[
                row("01112223334", "Lagos", "Ikeja", "A", "3", "[C100, C101]"),
                row("2223334445", "Oyo", "Ibadan", "B", "1", "C200\nC201"),
            ])
            .unwrap();

        assert_eq!(snapshot.phone_for_customer_id("C100"), Some("1112223334"));
        assert_eq!(snapshot.phone_for_customer_id("C201"), Some("2223334445"));
        assert_eq!(snapshot.phone_for_customer_id("c100"), None);

        for id in ["C100", "C101", "C200", "C201"] {
            let phone = snapshot.phone_for_customer_id(id).unwrap();
            assert_eq!(snapshot.contains_phone(phone), true);
        }
    }

    #[test]
    fn duplicate_customer_ids_keep_the_last_phone() {
        let snapshot = SnapshotBuilder::default()
            .build(&[
                row("01112223334", "Lagos", "Ikeja", "A", "3", "C100 C101"),
                row("2223334445", "Oyo", "Ibadan", "B", "1", "C100"),
            ])
            .unwrap();

        assert_eq!(snapshot.phone_for_customer_id("C100"), Some("2223334445"));
        assert_eq!(snapshot.phone_for_customer_id("C101"), Some("1112223334"));
    }

    #[test]
    fn a_missing_column_aborts_the_build() {
        let mut broken = row("2223334445", "Oyo", "Ibadan", "B", "1", "C200");
        let _ = broken.remove("Zone");

        let result = SnapshotBuilder::default().build(&[
            row("01112223334", "Lagos", "Ikeja", "A", "3", "C100"),
            broken,
        ]);

        match result {
            Err(RefreshError::DataFormat { row, column }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "Zone");
            }
            other => panic!("Expected a data format error but got {:?}", other),
        }
    }

    #[test]
    fn empty_input_yields_an_empty_snapshot() {
        let snapshot = SnapshotBuilder::default().build(&[]).unwrap();
        assert_eq!(snapshot.is_empty(), true);
        assert_eq!(snapshot.stats().unique_phones, 0);
        assert_eq!(Snapshot::empty().loaded_at().is_none(), true);
    }
}
