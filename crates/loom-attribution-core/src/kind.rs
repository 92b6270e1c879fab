// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Activity kinds and the endpoint each one is delivered to.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The closed set of activity package kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
	/// Start of a new session.
	Session,
	/// Custom event tracked by the host app.
	Event,
	/// Deep link open or other click-like attribution source.
	Click,
	/// Attribution check request.
	Attribution,
	/// Push token registration.
	PushToken,
	/// Ad revenue report.
	AdRevenue,
}

impl ActivityKind {
	/// Endpoint path, relative to the base URL.
	pub fn path(&self) -> &'static str {
		match self {
			ActivityKind::Session => "/session",
			ActivityKind::Event => "/event",
			ActivityKind::Click => "/sdk_click",
			ActivityKind::Attribution => "/attribution",
			ActivityKind::PushToken => "/sdk_info",
			ActivityKind::AdRevenue => "/ad_revenue",
		}
	}

	/// Attribution checks are read-only and go out as GET requests.
	pub fn is_query(&self) -> bool {
		matches!(self, ActivityKind::Attribution)
	}
}

impl std::fmt::Display for ActivityKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ActivityKind::Session => write!(f, "session"),
			ActivityKind::Event => write!(f, "event"),
			ActivityKind::Click => write!(f, "click"),
			ActivityKind::Attribution => write!(f, "attribution"),
			ActivityKind::PushToken => write!(f, "push_token"),
			ActivityKind::AdRevenue => write!(f, "ad_revenue"),
		}
	}
}

impl std::str::FromStr for ActivityKind {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"session" => Ok(ActivityKind::Session),
			"event" => Ok(ActivityKind::Event),
			"click" => Ok(ActivityKind::Click),
			"attribution" => Ok(ActivityKind::Attribution),
			"push_token" => Ok(ActivityKind::PushToken),
			"ad_revenue" => Ok(ActivityKind::AdRevenue),
			_ => Err(CoreError::InvalidKind(s.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn any_kind() -> impl Strategy<Value = ActivityKind> {
		prop_oneof![
			Just(ActivityKind::Session),
			Just(ActivityKind::Event),
			Just(ActivityKind::Click),
			Just(ActivityKind::Attribution),
			Just(ActivityKind::PushToken),
			Just(ActivityKind::AdRevenue),
		]
	}

	proptest! {
		#[test]
		fn kind_display_parses_back(kind in any_kind()) {
			let parsed: ActivityKind = kind.to_string().parse().unwrap();
			prop_assert_eq!(kind, parsed);
		}

		#[test]
		fn every_path_is_absolute(kind in any_kind()) {
			prop_assert!(kind.path().starts_with('/'));
		}
	}

	#[test]
	fn only_attribution_is_a_query() {
		assert!(ActivityKind::Attribution.is_query());
		assert!(!ActivityKind::Session.is_query());
		assert!(!ActivityKind::Click.is_query());
	}

	#[test]
	fn unknown_kind_is_rejected() {
		assert_eq!(
			"revenue".parse::<ActivityKind>(),
			Err(CoreError::InvalidKind("revenue".to_string()))
		);
	}

	#[test]
	fn serde_uses_snake_case() {
		let json = serde_json::to_string(&ActivityKind::PushToken).unwrap();
		assert_eq!(json, "\"push_token\"");
	}
}
