// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session and subsession boundary detection.
//!
//! Gaps are measured between `last_activity` and the injected "now":
//!
//! | gap                                   | transition     |
//! |---------------------------------------|----------------|
//! | no session yet                        | first session  |
//! | `gap >= session_interval`             | new session    |
//! | `gap >= subsession_interval`          | subsession     |
//! | shorter                               | continued      |
//! | negative (clock moved backwards)      | time travel    |

use std::time::Duration;

use chrono::{DateTime, Utc};
use loom_attribution_core::ActivityState;
use tracing::{debug, error, info};

use crate::config::SessionPolicy;

/// Where the app is in its lifecycle, as far as the handler knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
	Uninitialized,
	Foreground,
	Background,
}

/// What a `track_subsession_start` amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsessionTransition {
	FirstSession,
	/// `gap` is `None` when a session exists but no activity was ever recorded.
	NewSession { gap: Option<Duration> },
	Subsession { gap: Duration },
	Continued,
	TimeTravel,
}

impl SubsessionTransition {
	/// Whether a session package has to be sent.
	pub fn starts_session(&self) -> bool {
		matches!(
			self,
			SubsessionTransition::FirstSession | SubsessionTransition::NewSession { .. }
		)
	}
}

/// Applies lifecycle signals to [`ActivityState`] counters.
#[derive(Debug)]
pub struct SessionStateMachine {
	policy: SessionPolicy,
	phase: LifecyclePhase,
}

impl SessionStateMachine {
	pub fn new(policy: SessionPolicy) -> Self {
		Self {
			policy,
			phase: LifecyclePhase::Uninitialized,
		}
	}

	pub fn phase(&self) -> LifecyclePhase {
		self.phase
	}

	pub fn is_foreground(&self) -> bool {
		self.phase == LifecyclePhase::Foreground
	}

	/// Records a foreground signal without touching any counters.
	pub fn mark_foreground(&mut self) {
		self.phase = LifecyclePhase::Foreground;
	}

	/// Decides what a subsession start at `now` would be, without mutating anything.
	pub fn classify(&self, state: &ActivityState, now: DateTime<Utc>) -> SubsessionTransition {
		if !state.has_session() {
			return SubsessionTransition::FirstSession;
		}
		let Some(elapsed) = state.elapsed_since_activity(now) else {
			return SubsessionTransition::NewSession { gap: None };
		};
		let Ok(gap) = elapsed.to_std() else {
			return SubsessionTransition::TimeTravel;
		};

		if gap >= self.policy.session_interval {
			SubsessionTransition::NewSession { gap: Some(gap) }
		} else if gap >= self.policy.subsession_interval {
			SubsessionTransition::Subsession { gap }
		} else {
			SubsessionTransition::Continued
		}
	}

	/// The app came to the foreground.
	///
	/// For session starts, `build_session` sees the state after the session
	/// counter moved but before the previous session's aggregates are reset,
	/// so the package can report them.
	pub fn start_subsession<T>(
		&mut self,
		state: &mut ActivityState,
		now: DateTime<Utc>,
		build_session: impl FnOnce(&ActivityState) -> T,
	) -> (SubsessionTransition, Option<T>) {
		self.phase = LifecyclePhase::Foreground;
		let transition = self.classify(state, now);
		let mut package = None;

		match transition {
			SubsessionTransition::FirstSession => {
				state.session_count = 1;
				state.subsession_count = 1;
				state.last_interval = None;
				package = Some(build_session(state));
				state.reset_session_attributes(now);
				info!(installation_id = %state.uuid, "first session started");
			}
			SubsessionTransition::NewSession { gap } => {
				state.session_count = state.session_count.saturating_add(1);
				state.last_interval = gap;
				package = Some(build_session(state));
				state.reset_session_attributes(now);
				info!(
					session_count = state.session_count,
					last_interval_secs = gap.map(|g| g.as_secs()),
					"new session started"
				);
			}
			SubsessionTransition::Subsession { gap } => {
				state.subsession_count = state.subsession_count.saturating_add(1);
				state.session_length += gap;
				state.last_interval = Some(gap);
				state.last_activity = Some(now);
				info!(
					session_count = state.session_count,
					subsession_count = state.subsession_count,
					"subsession started"
				);
			}
			SubsessionTransition::Continued => {
				self.accrue(state, now, false);
				debug!(
					subsession_count = state.subsession_count,
					"time since last activity too short for a new subsession"
				);
			}
			SubsessionTransition::TimeTravel => {
				error!(
					last_activity = ?state.last_activity,
					now = %now,
					"clock moved backwards, resetting last activity"
				);
				state.last_activity = Some(now);
			}
		}

		state.updated_at = now;
		(transition, package)
	}

	/// The app went to the background.
	pub fn end_subsession(&mut self, state: &mut ActivityState, now: DateTime<Utc>) {
		let was_foreground = self.is_foreground();
		self.phase = LifecyclePhase::Background;
		if state.has_session() {
			self.accrue(state, now, was_foreground);
		} else {
			state.last_activity = Some(now);
		}
		state.updated_at = now;
	}

	/// Periodic foreground heartbeat. Returns whether the state changed.
	pub fn tick(&mut self, state: &mut ActivityState, now: DateTime<Utc>) -> bool {
		if !self.is_foreground() || !state.has_session() {
			return false;
		}
		self.accrue(state, now, true);
		state.updated_at = now;
		true
	}

	/// Adds the time since `last_activity` to the current session.
	fn accrue(&self, state: &mut ActivityState, now: DateTime<Utc>, foreground: bool) {
		let gap = state.elapsed_since_activity(now).map(|elapsed| elapsed.to_std());

		match gap {
			Some(Ok(gap)) if gap < self.policy.session_interval => {
				state.session_length += gap;
				if foreground {
					state.time_spent += gap;
				}
			}
			Some(Err(_)) => {
				error!(now = %now, "clock moved backwards, resetting last activity");
			}
			_ => {}
		}
		state.last_activity = Some(now);
	}
}
