// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Human-readable durations (`5m`, `12h`, `30days`) for spec fields.
//!
//! Use with `#[serde(with = "crate::duration")]`.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{de, Deserialize, Deserializer, Serializer};

pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;
	parse(&raw).map_err(|e| de::Error::custom(format!("invalid duration '{raw}': {e}")))
}

/// Parse a human-readable duration string.
pub fn parse(raw: &str) -> Result<Duration, humantime::DurationError> {
	humantime::parse_duration(raw.trim())
}

/// Add a std duration to a timestamp, saturating at the maximum representable time.
pub fn add(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
	TimeDelta::from_std(duration)
		.ok()
		.and_then(|delta| at.checked_add_signed(delta))
		.unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Time elapsed from `earlier` to `later`, zero if `later` is not after `earlier`.
pub fn elapsed(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
	(later - earlier).to_std().unwrap_or(Duration::ZERO)
}
