//! Field value transforms.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static ISO_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:\.\d+)?S)?)?$")
        .expect("hardcoded regex pattern is valid")
});

static CLOCK_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}(?::[0-5]\d){1,2}$").expect("hardcoded regex pattern is valid")
});

static MAGNITUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d[\d,]*(?:\.\d+)?[KMB]?)\b").expect("hardcoded regex pattern is valid")
});

/// Normalization applied to a resolved raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// ISO-8601 or clock time to `H:MM:SS` / `M:SS`; anything else is rejected.
    Duration,
    /// Leading count token (`1.2K`, `12,345`); raw text passes through when
    /// no token is found.
    Magnitude,
    /// Like `Magnitude`, but text without a count token is rejected.
    StrictMagnitude,
}

impl Transform {
    pub fn apply(&self, raw: &str) -> Option<String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match self {
            Transform::Duration => normalize_duration(raw),
            Transform::Magnitude => {
                Some(extract_magnitude(raw).unwrap_or_else(|| raw.to_string()))
            }
            Transform::StrictMagnitude => extract_magnitude(raw),
        }
    }
}

/// Converts `PT1H2M3S` to `1:02:03` and `PT2M5S` to `2:05`. Clock-style
/// values (`4:13`, `1:02:03`) pass through unchanged.
pub fn normalize_duration(raw: &str) -> Option<String> {
    let raw = raw.trim();

    if let Some(caps) = ISO_DURATION.captures(raw) {
        if caps.iter().skip(1).all(|c| c.is_none()) {
            return None;
        }
        let mut total: u64 = 0;
        for (i, unit) in [(1, 86_400u64), (2, 3_600), (3, 60), (4, 1)] {
            let Some(m) = caps.get(i) else {
                continue;
            };
            let secs = m
                .as_str()
                .parse::<u64>()
                .ok()
                .and_then(|n| n.checked_mul(unit))?;
            total = total.checked_add(secs)?;
        }
        return Some(format_clock(total));
    }

    if CLOCK_DURATION.is_match(raw) {
        return Some(raw.to_string());
    }

    None
}

fn format_clock(total_secs: u64) -> String {
    let hours = total_secs / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Extracts the first count token, keeping separators and the K/M/B suffix
/// as written: `"1.2K likes"` gives `"1.2K"`.
pub fn extract_magnitude(raw: &str) -> Option<String> {
    MAGNITUDE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
