//! # Duration Validation
//!
//! Handles parsing Kubernetes/Go duration strings such as `refreshInterval`.

use anyhow::Result;
use regex::Regex;
use std::time::Duration;

/// Parse Kubernetes duration string into std::time::Duration
/// Accepts Go duration syntax plus days: "100ns", "250us", "500ms", "30s",
/// "1.5h", "1h30m", "1d"
/// Returns Duration or error if format is invalid or the duration is zero
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    // Whole-string check first so trailing garbage is not silently ignored
    let format_regex = Regex::new(r"^(?:(?:\d+(?:\.\d*)?|\.\d+)(?:ns|us|µs|μs|ms|s|m|h|d))+$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;
    let component_regex = Regex::new(
        r"(?P<whole>\d*)(?:\.(?P<fraction>\d*))?(?P<unit>ns|us|µs|μs|ms|s|m|h|d)",
    )
    .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    let interval_lower = duration_trimmed.to_lowercase();

    if !format_regex.is_match(&interval_lower) {
        return Err(anyhow::anyhow!(
            "Invalid duration format '{}'. Expected format: <number><unit>[<number><unit>...] (e.g., '30s', '1.5h', '1h30m')",
            duration_trimmed
        ));
    }

    let mut total_nanos: u128 = 0;
    for captures in component_regex.captures_iter(&interval_lower) {
        let unit_nanos: u128 = match &captures["unit"] {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "d" => 86_400 * 1_000_000_000,
            unit => {
                return Err(anyhow::anyhow!(
                    "Invalid unit '{}' in duration '{}'. Expected: ns, us, ms, s, m, h, or d",
                    unit,
                    duration_trimmed
                ));
            }
        };

        let whole = parse_digits(&captures["whole"], duration_trimmed)?;
        let mut component = whole.saturating_mul(unit_nanos);

        if let Some(fraction) = captures.name("fraction") {
            // Digits past nanosecond precision of a day cannot change the result
            let digits = &fraction.as_str()[..fraction.as_str().len().min(18)];
            if !digits.is_empty() {
                let scale = 10u128.pow(u32::try_from(digits.len()).unwrap_or(18));
                let numerator = parse_digits(digits, duration_trimmed)?;
                component = component.saturating_add(numerator.saturating_mul(unit_nanos) / scale);
            }
        }

        total_nanos = total_nanos.saturating_add(component);
    }

    if total_nanos == 0 {
        return Err(anyhow::anyhow!(
            "Duration must be greater than 0, got '{}'",
            duration_trimmed
        ));
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000).unwrap_or(u64::MAX);
    let nanos = u32::try_from(total_nanos % 1_000_000_000).unwrap_or(0);
    Ok(Duration::new(secs, nanos))
}

fn parse_digits(digits: &str, duration: &str) -> Result<u128> {
    if digits.is_empty() {
        return Ok(0);
    }
    digits.parse().map_err(|e| {
        anyhow::anyhow!(
            "Invalid duration number '{}' in '{}': {}",
            digits,
            duration,
            e
        )
    })
}
