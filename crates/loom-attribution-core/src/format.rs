// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire formatting for dates and durations.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

/// Date layout used in package parameters and server timestamps.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ%z";

/// Formats a timestamp, e.g. `2025-03-01T12:00:00.000Z+0000`.
pub fn format_date(value: DateTime<Utc>) -> String {
	value.format(DATE_FORMAT).to_string()
}

/// Formats seconds since the unix epoch with [`format_date`].
pub fn format_seconds_1970(value: f64) -> Option<String> {
	if !value.is_finite() {
		return None;
	}
	let secs = value.floor();
	let nanos = ((value - secs) * 1_000_000_000.0).round().min(999_999_999.0) as u32;
	Utc.timestamp_opt(secs as i64, nanos)
		.single()
		.map(format_date)
}

/// Parses a server timestamp in [`DATE_FORMAT`], falling back to RFC 3339.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
	DateTime::parse_from_str(value, DATE_FORMAT)
		.or_else(|_| DateTime::parse_from_rfc3339(value))
		.ok()
		.map(|dt| dt.with_timezone(&Utc))
}

/// Durations go over the wire as whole, rounded seconds.
pub fn format_duration(value: Duration) -> String {
	value.as_secs_f64().round().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn noon() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
	}

	#[test]
	fn format_date_uses_wire_layout() {
		assert_eq!(format_date(noon()), "2025-03-01T12:00:00.000Z+0000");
	}

	#[test]
	fn parse_date_reads_wire_layout() {
		assert_eq!(parse_date("2025-03-01T12:00:00.000Z+0000"), Some(noon()));
	}

	#[test]
	fn parse_date_accepts_rfc3339() {
		assert_eq!(parse_date("2025-03-01T13:00:00+01:00"), Some(noon()));
	}

	#[test]
	fn parse_date_rejects_garbage() {
		assert_eq!(parse_date("yesterday"), None);
	}

	#[test]
	fn seconds_1970_formats_epoch_offsets() {
		let secs = noon().timestamp() as f64 + 0.25;
		assert_eq!(
			format_seconds_1970(secs).as_deref(),
			Some("2025-03-01T12:00:00.250Z+0000")
		);
		assert_eq!(format_seconds_1970(f64::NAN), None);
	}

	#[test]
	fn durations_round_to_seconds() {
		assert_eq!(format_duration(Duration::from_millis(2_100_400)), "2100");
		assert_eq!(format_duration(Duration::from_millis(1_600)), "2");
		assert_eq!(format_duration(Duration::ZERO), "0");
	}
}
