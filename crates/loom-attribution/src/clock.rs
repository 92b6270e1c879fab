// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The single source of "now" for session decisions.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Wall clock used for every session boundary decision.
pub trait Clock: Send + Sync + 'static {
	fn now(&self) -> DateTime<Utc>;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			now: Mutex::new(start),
		}
	}

	pub fn advance(&self, by: Duration) {
		let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
		let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
		*now = now.checked_add_signed(by).unwrap_or(*now);
	}

	pub fn set(&self, value: DateTime<Utc>) {
		*self.now.lock().unwrap_or_else(PoisonError::into_inner) = value;
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn manual_clock_advances() {
		let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
		let clock = ManualClock::new(start);
		clock.advance(Duration::from_secs(90));
		assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
	}

	#[test]
	fn manual_clock_can_move_backwards() {
		let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
		let clock = ManualClock::new(start);
		clock.set(start - chrono::Duration::hours(1));
		assert!(clock.now() < start);
	}
}
