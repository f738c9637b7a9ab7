//! Converts raw phone numbers and customer id cells into their canonical forms.
//!
//! Phone numbers arrive in two shapes: with the national trunk prefix ("01112223334") or
//! without it ("1112223334"). Internally all lookups use the 10 digit form (the **canonical
//! phone**) and only the presentation re-adds the leading zero. This is a lossy heuristic
//! for one country's dialing convention and not a full E.164 parser. Therefore it is only
//! accessed via the [PhoneFormat] trait, so that another convention can be plugged into the
//! [SnapshotBuilder](crate::watchlist::snapshot::SnapshotBuilder) and the
//! [QueryEngine](crate::watchlist::query::QueryEngine) without touching either.
//!
//! # Examples
//!
//! ```
//! # use fraudwatch::watchlist::normalize::{display_phone, normalize_phone, parse_customer_id_cell};
//! assert_eq!(normalize_phone(" 01234567890 "), "1234567890");
//! assert_eq!(display_phone("1234567890"), "01234567890");
//! assert_eq!(parse_customer_id_cell("[C1, C2,C3]"), vec!["C1", "C2", "C3"]);
//! ```

/// Determines how phone numbers are canonicalized and presented.
pub trait PhoneFormat: Send + Sync {
    /// Transforms a raw phone number into the key used for lookups.
    fn normalize(&self, raw: &str) -> String;

    /// Transforms a canonical (or raw) phone number into its presentation form.
    fn display(&self, phone: &str) -> String;
}

/// Implements the national dialing convention: 11 digits with a leading trunk prefix "0" or
/// 10 digits without.
#[derive(Default, Debug, Clone, Copy)]
pub struct TrunkPrefixFormat;

impl PhoneFormat for TrunkPrefixFormat {
    fn normalize(&self, raw: &str) -> String {
        normalize_phone(raw)
    }

    fn display(&self, phone: &str) -> String {
        display_phone(phone)
    }
}

/// Trims the given phone number and strips the trunk prefix of an 11 character number.
///
/// Everything else (including non-numeric input) is returned trimmed but otherwise unchanged.
pub fn normalize_phone(raw: &str) -> String {
    let phone = raw.trim();
    if phone.starts_with('0') && phone.chars().count() == 11 {
        phone[1..].to_owned()
    } else {
        phone.to_owned()
    }
}

/// Prefixes a 10 character phone number with "0" and leaves everything else untouched.
pub fn display_phone(phone: &str) -> String {
    if phone.chars().count() == 10 {
        format!("0{}", phone)
    } else {
        phone.to_owned()
    }
}

/// Splits a cell like "[C1, C2\nC3]" into its customer ids.
///
/// One enclosing pair of brackets is removed (each side independently), commas and line breaks
/// act as separators just like any other whitespace. Empty tokens are dropped, duplicates and
/// the original order are kept.
pub fn parse_customer_id_cell(raw: &str) -> Vec<String> {
    let cell = raw.trim();
    let cell = cell.strip_prefix('[').unwrap_or(cell);
    let cell = cell.strip_suffix(']').unwrap_or(cell);

    cell.split(|ch: char| ch == ',' || ch.is_whitespace())
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::watchlist::normalize::{
        display_phone, normalize_phone, parse_customer_id_cell, PhoneFormat, TrunkPrefixFormat,
    };

    #[test]
    fn phones_with_trunk_prefix_are_shortened() {
        assert_eq!(normalize_phone("01234567890"), "1234567890");
        assert_eq!(normalize_phone("  01234567890\n"), "1234567890");
    }

    #[test]
    fn other_phones_are_only_trimmed() {
        assert_eq!(normalize_phone("1234567890"), "1234567890");
        assert_eq!(normalize_phone(" 012345678 "), "012345678");
        assert_eq!(normalize_phone("11234567890"), "11234567890");
        assert_eq!(normalize_phone("012345678901"), "012345678901");
        assert_eq!(normalize_phone("0abcdefghij"), "abcdefghij");
        assert_eq!(normalize_phone("C100"), "C100");
        assert_eq!(normalize_phone(""), "");
    }

    #[test]
    fn display_re_adds_the_trunk_prefix() {
        assert_eq!(display_phone("1234567890"), "01234567890");
        assert_eq!(display_phone("01234567890"), "01234567890");
        assert_eq!(display_phone("C100"), "C100");
        assert_eq!(display_phone(""), "");
    }

    #[test]
    fn customer_id_cells_are_split() {
        assert_eq!(parse_customer_id_cell("[C1, C2,C3]"), vec!["C1", "C2", "C3"]);
        assert_eq!(parse_customer_id_cell("[C100 C101]"), vec!["C100", "C101"]);
        assert_eq!(
            parse_customer_id_cell(" C1\nC2 ,, C1 "),
            vec!["C1", "C2", "C1"]
        );
        assert_eq!(parse_customer_id_cell("[C1"), vec!["C1"]);
        assert_eq!(parse_customer_id_cell("C1]"), vec!["C1"]);
    }

    #[test]
    fn empty_customer_id_cells_yield_nothing() {
        assert_eq!(parse_customer_id_cell("").is_empty(), true);
        assert_eq!(parse_customer_id_cell("[]").is_empty(), true);
        assert_eq!(parse_customer_id_cell(" [ , ] ").is_empty(), true);
    }

    #[test]
    fn trunk_prefix_format_delegates() {
        let format = TrunkPrefixFormat;
        assert_eq!(format.normalize("01112223334"), "1112223334");
        assert_eq!(format.display("1112223334"), "01112223334");
    }
}
