//! Serde helper for duration strings like "30s", "5m", "1h" or "1m30s".

use serde::{self, Deserialize, Deserializer};
use std::time::Duration;

/// Deserializes an optional duration string; absent or null yields zero.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) => parse_duration(&s).map_err(serde::de::Error::custom),
        None => Ok(Duration::ZERO),
    }
}

pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
    let mut rest = s.trim();
    if rest.is_empty() {
        return Ok(Duration::ZERO);
    }

    let mut total = 0.0;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (num_str, tail) = rest.split_at(num_end);
        let num: f64 = num_str
            .parse()
            .map_err(|_| format!("invalid duration number: {}", num_str))?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let multiplier = match unit.trim() {
            "ms" => 1e-3,
            "s" | "" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(format!("unknown duration unit: {}", unit)),
        };

        total += num * multiplier;
        rest = tail;
    }

    Duration::try_from_secs_f64(total).map_err(|e| format!("duration out of range: {}: {}", s, e))
}
