use std::time::Duration;

/// Splits a list-valued setting on `,` or `;`, dropping blank items.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

/// Parse a boolean value from a raw string, accepting common env-style forms.
///
/// Accepted truthy values (case-insensitive): `"1"`, `"true"`, `"yes"`, `"on"`.
/// Accepted falsy values: `"0"`, `"false"`, `"no"`, `"off"`.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses a humantime duration such as `30s`, `2h` or `1h 30m`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    humantime::parse_duration(raw.trim()).ok()
}

/// Parses a fractional number of hours (`CACHE_TTL_HOURS=1.5`).
pub fn parse_hours(raw: &str) -> Option<Duration> {
    parse_scaled(raw, 60.0 * 60.0)
}

/// Parses a fractional number of minutes.
pub fn parse_minutes(raw: &str) -> Option<Duration> {
    parse_scaled(raw, 60.0)
}

fn parse_scaled(raw: &str, seconds_per_unit: f64) -> Option<Duration> {
    let value: f64 = raw.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(value * seconds_per_unit).ok()
}
