use anyhow::{anyhow, bail, Result};
use indexmap::IndexMap;
use std::time::Duration;

/// Parses `-e KEY=VALUE` pairs. Later pairs override earlier ones.
pub fn parse_env_pairs(pairs: &[String]) -> Result<IndexMap<String, String>> {
    let mut parsed = IndexMap::new();

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid env pair (expected KEY=VALUE): {}", pair))?;

        let key = key.trim();
        if key.is_empty() {
            bail!("Invalid env pair (empty key): {}", pair);
        }
        parsed.insert(key.to_string(), value.to_string());
    }

    Ok(parsed)
}

/// Parses durations such as `500ms`, `10s`, `2m`, `1h`, `1m30s`.
/// A bare number is read as seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        bail!("Empty duration");
    }

    if let Ok(seconds) = input.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    humantime::parse_duration(input).map_err(|e| anyhow!("Invalid duration '{}': {}", input, e))
}

/// Formats a duration at millisecond precision, e.g. `1m 30s`, `500ms`.
pub fn format_duration(duration: Duration) -> String {
    let whole_ms = Duration::from_millis(duration.as_millis().min(u64::MAX as u128) as u64);
    humantime::format_duration(whole_ms).to_string()
}

/// Truncates a response body for log lines.
pub fn excerpt(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(max_chars).collect();
    cut.push('…');
    cut
}
