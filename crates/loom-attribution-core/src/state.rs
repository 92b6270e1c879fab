// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable per-install activity counters.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable scalar record, one per install.
///
/// `session_count` is zero until the first session starts. From then on
/// `subsession_count` is at least one and resets to one on every new session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityState {
	/// Random install identifier, attached to every package.
	pub uuid: Uuid,
	pub enabled: bool,
	/// An attribution check is outstanding.
	#[serde(default)]
	pub asking_attribution: bool,
	#[serde(default)]
	pub device_token: Option<Vec<u8>>,
	#[serde(default)]
	pub event_count: u64,
	#[serde(default)]
	pub session_count: u64,
	#[serde(default)]
	pub subsession_count: u64,
	/// Foreground plus short background time in the current session.
	#[serde(default)]
	pub session_length: Duration,
	/// Foreground time in the current session.
	#[serde(default)]
	pub time_spent: Duration,
	pub created_at: DateTime<Utc>,
	#[serde(default)]
	pub last_activity: Option<DateTime<Utc>>,
	/// Gap before the most recent session or subsession start.
	#[serde(default)]
	pub last_interval: Option<Duration>,
	pub updated_at: DateTime<Utc>,
	/// The one-shot iAd click has been enqueued.
	#[serde(default)]
	pub iad_sent: bool,
}

impl ActivityState {
	/// Creates the state for a fresh install.
	pub fn new(now: DateTime<Utc>) -> Self {
		Self {
			uuid: Uuid::new_v4(),
			enabled: true,
			asking_attribution: false,
			device_token: None,
			event_count: 0,
			session_count: 0,
			subsession_count: 0,
			session_length: Duration::ZERO,
			time_spent: Duration::ZERO,
			created_at: now,
			last_activity: None,
			last_interval: None,
			updated_at: now,
			iad_sent: false,
		}
	}

	/// Whether any session has started on this install.
	pub fn has_session(&self) -> bool {
		self.session_count > 0
	}

	/// Resets the per-session aggregates once a session package is built.
	pub fn reset_session_attributes(&mut self, now: DateTime<Utc>) {
		self.subsession_count = 1;
		self.session_length = Duration::ZERO;
		self.time_spent = Duration::ZERO;
		self.last_activity = Some(now);
		self.updated_at = now;
	}

	/// Time since the last recorded activity. Negative when the clock moved backwards.
	pub fn elapsed_since_activity(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
		self.last_activity.map(|last| now.signed_duration_since(last))
	}
}
