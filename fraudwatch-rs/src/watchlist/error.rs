//! Describes what can go wrong while refreshing the watchlist.
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Enumerates the failures of a refresh cycle.
///
/// None of these ever reach a query. They are caught by the
/// [RefreshScheduler](crate::watchlist::scheduler::RefreshScheduler), logged and the previously
/// published snapshot remains active.
#[derive(Debug)]
pub enum RefreshError {
    /// The data source was unreachable, responded with a non-success status or timed out.
    Network(anyhow::Error),

    /// The response couldn't be decoded into tabular rows (invalid UTF-8, broken CSV...).
    Decode(anyhow::Error),

    /// A row lacks a required column.
    DataFormat {
        /// The one-based number of the data row (not counting the header).
        row: usize,
        /// The name of the missing column.
        column: &'static str,
    },
}

impl RefreshError {
    /// Returns a short name of the error kind, e.g. to be reported in a status overview.
    pub fn kind(&self) -> &'static str {
        match self {
            RefreshError::Network(_) => "network",
            RefreshError::Decode(_) => "decode",
            RefreshError::DataFormat { .. } => "data-format",
        }
    }
}

impl Display for RefreshError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            RefreshError::Network(e) => write!(f, "Network error: {:#}", e),
            RefreshError::Decode(e) => write!(f, "Decode error: {:#}", e),
            RefreshError::DataFormat { row, column } => write!(
                f,
                "Data format error: row {} lacks the required column '{}'",
                row, column
            ),
        }
    }
}

impl Error for RefreshError {}
