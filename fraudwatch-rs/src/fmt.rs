//! Provides formatting and parsing helpers for durations and byte sizes.
//!
//! Durations are used throughout the config (e.g. `watchlist.interval: 10m`) and sizes show up
//! when logging how much data a refresh downloaded.
use std::fmt::Write;
use std::time::Duration;

/// Formats a given size in bytes.
///
/// This function determines the ideal unit (ranging from bytes to gigabytes) to provide
/// a concise representation. Watchlists are expected to fit in memory, so anything beyond
/// is simply reported in GiB.
///
/// # Examples
///
/// ```
/// assert_eq!(fraudwatch::fmt::format_size(0), "0 bytes");
/// assert_eq!(fraudwatch::fmt::format_size(1), "1 byte");
/// assert_eq!(fraudwatch::fmt::format_size(100), "100 bytes");
/// assert_eq!(fraudwatch::fmt::format_size(8_734), "8.53 KiB");
/// assert_eq!(fraudwatch::fmt::format_size(87_340), "85.3 KiB");
/// assert_eq!(fraudwatch::fmt::format_size(873_400), "853 KiB");
/// assert_eq!(fraudwatch::fmt::format_size(8_734_000), "8.33 MiB");
/// assert_eq!(fraudwatch::fmt::format_size(8_734_000_000), "8.13 GiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    if size_in_bytes == 1 {
        return "1 byte".to_owned();
    } else if size_in_bytes < 1024 {
        return format!("{} bytes", size_in_bytes);
    }

    let units = ["KiB", "MiB", "GiB"];
    let mut size = size_in_bytes as f64 / 1024.;
    let mut unit = 0;
    while size > 1024. && unit < units.len() - 1 {
        size /= 1024.;
        unit += 1;
    }

    if size <= 10. {
        format!("{:.2} {}", size, units[unit])
    } else if size <= 100. {
        format!("{:.1} {}", size, units[unit])
    } else {
        format!("{:.0} {}", size, units[unit])
    }
}

/// Parses a duration from a given string.
///
/// This string can have the following suffixes:
/// * **ms** or **MS**: treats the value as milliseconds
/// * **s** or **S**: treats the value as seconds
/// * **m** or **M**: treats the value as minutes
/// * **h** or **H**: treats the value as hours
/// * **d** or **D**: treats the value as days
///
/// A value without suffix is treated as milliseconds. Returns an **Err** if either a
/// non-integer value is given or if an unknown suffix was provided.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(fraudwatch::fmt::parse_duration("100 ms").unwrap(), Duration::from_millis(100));
/// assert_eq!(fraudwatch::fmt::parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(fraudwatch::fmt::parse_duration("10 m").unwrap(), Duration::from_secs(600));
/// assert_eq!(fraudwatch::fmt::parse_duration("2 H").unwrap(), Duration::from_secs(2 * 60 * 60));
/// assert_eq!(fraudwatch::fmt::parse_duration("1d").unwrap(), Duration::from_secs(24 * 60 * 60));
///
/// // An invalid suffix results in an error...
/// assert_eq!(fraudwatch::fmt::parse_duration("3 Y").is_err(), true);
///
/// // Decimal numbers result in an error...
/// assert_eq!(fraudwatch::fmt::parse_duration("1.5m").is_err(), true);
///
/// // Negative numbers result in an error...
/// assert_eq!(fraudwatch::fmt::parse_duration("-1m").is_err(), true);
/// ```
pub fn parse_duration(str: impl AsRef<str>) -> anyhow::Result<Duration> {
    lazy_static::lazy_static! {
        static ref NUMBER_AND_SUFFIX: regex::Regex =
            regex::Regex::new(r"^ *(\d+) *((ms|s|m|h|d|MS|S|M|H|D)?) *$").unwrap();
    }

    let captures = NUMBER_AND_SUFFIX.captures(str.as_ref()).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' into a duration expression. \
             Expected a positive number and optionally 'ms', 's', 'm', 'h' or 'd' as suffix.",
            str.as_ref()
        )
    })?;

    let number = captures[1]
        .parse::<u64>()
        .map_err(|error| anyhow::anyhow!("Invalid duration '{}': {}", str.as_ref(), error))?;

    match &captures[2] {
        "s" | "S" => Ok(Duration::from_secs(number)),
        "m" | "M" => Ok(Duration::from_secs(number * 60)),
        "h" | "H" => Ok(Duration::from_secs(number * 60 * 60)),
        "d" | "D" => Ok(Duration::from_secs(number * 60 * 60 * 24)),
        _ => Ok(Duration::from_millis(number)),
    }
}

/// Formats a duration into a string like "1h 10m 2s 12ms".
///
/// Components which are zero are skipped. A zero duration is reported as "0ms".
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(fraudwatch::fmt::format_duration(Duration::from_millis(13)), "13ms");
/// assert_eq!(fraudwatch::fmt::format_duration(Duration::from_millis(1013)), "1s 13ms");
/// assert_eq!(fraudwatch::fmt::format_duration(Duration::from_secs(600)), "10m");
/// assert_eq!(fraudwatch::fmt::format_duration(Duration::from_secs(60 * 61)), "1h 1m");
/// assert_eq!(fraudwatch::fmt::format_duration(Duration::from_secs(24 * 60 * 60 + 59)), "1d 59s");
/// assert_eq!(fraudwatch::fmt::format_duration(Duration::ZERO), "0ms");
/// ```
pub fn format_duration(duration: Duration) -> String {
    const UNITS: [(u128, &str); 5] = [
        (1000 * 60 * 60 * 24, "d"),
        (1000 * 60 * 60, "h"),
        (1000 * 60, "m"),
        (1000, "s"),
        (1, "ms"),
    ];

    let mut result = String::new();
    let mut value = duration.as_millis();
    for (millis, suffix) in UNITS {
        let amount = value / millis;
        if amount > 0 {
            if !result.is_empty() {
                result.push(' ');
            }
            let _ = write!(result, "{}{}", amount, suffix);
            value %= millis;
        }
    }

    if result.is_empty() {
        result.push_str("0ms");
    }

    result
}
