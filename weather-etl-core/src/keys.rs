//! Blob key naming.
//!
//! Keys look like `raw/weather_raw_20250301_070509_123_1a2b3c4d.json`: the
//! purpose prefix, a stem, the UTC second, the millisecond and a random
//! suffix so that two runs never land on the same key.

use chrono::{DateTime, Utc};

pub const RAW_STEM: &str = "weather_raw";
pub const TRANSFORMED_STEM: &str = "weather_transformed";

/// Build a run-unique key under `prefix`.
pub fn timestamped_key(prefix: &str, stem: &str, ext: &str, at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let prefix = prefix.trim_matches('/');
    let name = format!(
        "{stem}_{}_{}_{}.{ext}",
        at.format("%Y%m%d_%H%M%S"),
        at.format("%3f"),
        &suffix[..8],
    );

    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

pub fn raw_key(prefix: &str, at: DateTime<Utc>) -> String {
    timestamped_key(prefix, RAW_STEM, "json", at)
}

pub fn transformed_key(prefix: &str, at: DateTime<Utc>) -> String {
    timestamped_key(prefix, TRANSFORMED_STEM, "csv", at)
}
