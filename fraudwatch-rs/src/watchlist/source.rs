//! Provides the data sources which deliver the raw rows of the watchlist.
//!
//! The refresh machinery only needs "fetch raw tabular rows from somewhere" which is expressed
//! by the [DataSource] trait. The default implementation, [HttpCsvSource], downloads a CSV
//! document via HTTP(S) - most commonly a spreadsheet which has been "published to the web".
//!
//! The CSV is expected to be UTF-8 encoded (a BOM is accepted), to use "," as separator and to
//! carry the column names in its first line:
//! ```csv
//! Phone,State,City,Zone,distinct_customers,customer_ids
//! 01112223334,Lagos,Ikeja,A,3,"[C100, C101]"
//! ```
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use csv::{ReaderBuilder, Trim};
use futures::TryStreamExt;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Uri};
use hyper_tls::HttpsConnector;
use itertools::Itertools;

use crate::config::Config;
use crate::fmt::format_size;
use crate::watchlist::error::RefreshError;
use crate::watchlist::snapshot::{RawRow, REQUIRED_COLUMNS};

/// Determines how many redirects are followed before giving up.
///
/// Published spreadsheets commonly answer with a redirect to the actual content server.
const MAX_REDIRECTS: usize = 5;

/// Limits the size of a downloaded document (64 MiB).
const MAX_DOCUMENT_SIZE: usize = 64 * 1024 * 1024;

/// Delivers the raw rows of the watchlist.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync {
    /// Fetches all rows of the watchlist.
    ///
    /// Fails with [RefreshError::Network] if the source cannot be reached (or responds with an
    /// error) and with [RefreshError::Decode] if the response isn't valid tabular data.
    async fn fetch_rows(&self) -> Result<Vec<RawRow>, RefreshError>;
}

/// Downloads the watchlist as CSV from the URL configured as `watchlist.url`.
///
/// The URL and the timeout (`watchlist.timeout`) are read for each fetch, so that config
/// changes are picked up by the next refresh.
pub struct HttpCsvSource {
    config: Arc<Config>,
    client: Client<HttpsConnector<HttpConnector>>,
}

impl HttpCsvSource {
    /// Creates a new source which is controlled by the given config.
    pub fn new(config: Arc<Config>) -> Self {
        HttpCsvSource {
            config,
            client: Client::builder().build::<_, Body>(HttpsConnector::new()),
        }
    }

    async fn download(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let mut uri = Uri::from_str(url).context("Invalid source URL")?;

        for _ in 0..=MAX_REDIRECTS {
            let response = self
                .client
                .get(uri.clone())
                .await
                .with_context(|| format!("Failed to connect to {}", uri))?;

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(hyper::header::LOCATION)
                    .and_then(|location| location.to_str().ok())
                    .with_context(|| format!("Received {} without a location from {}", status, uri))?;
                log::debug!("Following redirect from {} to {}...", uri, location);
                uri = resolve_location(&uri, location)?;
                continue;
            }

            if !status.is_success() {
                return Err(anyhow::anyhow!("{} responded with {}", uri, status));
            }

            let mut body = response.into_body();
            let mut data = Vec::new();
            while let Some(chunk) = body
                .try_next()
                .await
                .context("Failed to read the response body")?
            {
                if data.len() + chunk.len() > MAX_DOCUMENT_SIZE {
                    return Err(anyhow::anyhow!(
                        "{} delivered more than {}",
                        uri,
                        format_size(MAX_DOCUMENT_SIZE)
                    ));
                }
                data.extend_from_slice(&chunk);
            }

            return Ok(data);
        }

        Err(anyhow::anyhow!(
            "Gave up after following {} redirects for {}",
            MAX_REDIRECTS,
            url
        ))
    }
}

/// Resolves the value of a **Location** header which might be relative to the given uri.
fn resolve_location(base: &Uri, location: &str) -> anyhow::Result<Uri> {
    let target = Uri::from_str(location).context("Invalid redirect location")?;
    if target.scheme().is_some() {
        return Ok(target);
    }

    let mut parts = base.clone().into_parts();
    parts.path_and_query = target.path_and_query().cloned();
    Uri::from_parts(parts).context("Invalid redirect location")
}

#[async_trait::async_trait]
impl DataSource for HttpCsvSource {
    async fn fetch_rows(&self) -> Result<Vec<RawRow>, RefreshError> {
        let settings = self.config.current().settings().clone();
        let url = settings.source_url.ok_or_else(|| {
            RefreshError::Network(anyhow::anyhow!(
                "No source is configured. Please specify watchlist.url"
            ))
        })?;

        let watch = Instant::now();
        let data = match tokio::time::timeout(settings.timeout, self.download(&url)).await {
            Ok(Ok(data)) => data,
            Ok(Err(error)) => return Err(RefreshError::Network(error)),
            Err(_) => {
                return Err(RefreshError::Network(anyhow::anyhow!(
                    "Fetching {} timed out after {}",
                    url,
                    crate::fmt::format_duration(settings.timeout)
                )))
            }
        };

        log::debug!(
            "Downloaded {} from {} in {} ms.",
            format_size(data.len()),
            url,
            watch.elapsed().as_millis()
        );

        parse_csv(&data)
    }
}

/// Parses the given CSV data into rows.
///
/// The first line is expected to contain the column names (surrounding whitespace is ignored).
/// Rows with fewer cells than headers are accepted, the missing columns are simply absent from
/// the row, which is then rejected by the [SnapshotBuilder](crate::watchlist::snapshot::SnapshotBuilder).
///
/// # Example
/// ```
/// # use fraudwatch::watchlist::source::parse_csv;
/// let rows = parse_csv(b"Phone , State\n0111,\"Lagos, Ikeja\"\n0222,Oyo").unwrap();
/// assert_eq!(rows.len(), 2);
/// assert_eq!(rows[0]["Phone"], "0111");
/// assert_eq!(rows[0]["State"], "Lagos, Ikeja");
/// assert_eq!(rows[1]["State"], "Oyo");
/// ```
pub fn parse_csv(data: &[u8]) -> Result<Vec<RawRow>, RefreshError> {
    let (text, malformed) = encoding_rs::UTF_8.decode_with_bom_removal(data);
    if malformed {
        return Err(RefreshError::Decode(anyhow::anyhow!(
            "The data isn't valid UTF-8"
        )));
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|error| {
            RefreshError::Decode(anyhow::anyhow!("Failed to read headers from CSV: {}", error))
        })?
        .clone();
    if headers.iter().all(|header| header.is_empty()) {
        return Err(RefreshError::Decode(anyhow::anyhow!(
            "The CSV data doesn't contain a header line"
        )));
    }

    let missing_columns = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|header| header == **column))
        .join(", ");
    if !missing_columns.is_empty() {
        log::warn!("The CSV header lacks the column(s): {}", missing_columns);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|error| {
            let line = error
                .position()
                .map(|position| position.line().to_string())
                .unwrap_or_else(|| "?".to_owned());
            RefreshError::Decode(anyhow::anyhow!(
                "Failed to parse CSV in line {}: {}",
                line,
                error
            ))
        })?;

        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(header, value)| (header.to_owned(), value.to_owned()))
                .collect(),
        );
    }

    Ok(rows)
}
