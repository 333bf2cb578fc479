//! Human-readable duration parsing for configuration values.
//!
//! Accepts `"100ms"`, `"30s"`, `"10m"`, `"1h"`, or a bare number of seconds.
//! Fractional values are allowed (`"1.5h"`).

use std::time::Duration;

use crate::error::Error;

/// Parse a duration string like `"5m"`, `"30s"`, `"1h"`, `"100ms"`.
///
/// A value without a unit suffix is interpreted as seconds.
pub fn parse(value: &str) -> Result<Duration, Error> {
    let value = value.trim();

    // Unit casing is uniform: "100MS" parses like "100ms". Both suffix
    // bytes are checked as ASCII, so the slice below stays on a char
    // boundary.
    let bytes = value.as_bytes();
    let has_ms_suffix = bytes.len() >= 2
        && bytes[bytes.len() - 2].eq_ignore_ascii_case(&b'm')
        && bytes[bytes.len() - 1].eq_ignore_ascii_case(&b's');

    let (numeric, unit_seconds) = if has_ms_suffix {
        (&value[..value.len() - 2], 0.001)
    } else if let Some(rest) = value.strip_suffix(['s', 'S']) {
        (rest, 1.0)
    } else if let Some(rest) = value.strip_suffix(['m', 'M']) {
        (rest, 60.0)
    } else if let Some(rest) = value.strip_suffix(['h', 'H']) {
        (rest, 3600.0)
    } else {
        (value, 1.0)
    };

    let number: f64 = numeric
        .trim()
        .parse()
        .map_err(|_| invalid_duration(value))?;
    if !number.is_finite() || number < 0.0 {
        return Err(invalid_duration(value));
    }

    Ok(Duration::from_secs_f64(number * unit_seconds))
}

fn invalid_duration(value: &str) -> Error {
    Error::Configuration(format!("invalid duration \"{value}\""))
}
