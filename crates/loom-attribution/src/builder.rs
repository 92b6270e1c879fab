// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turns handler state and host input into activity packages.
//!
//! Every function here is pure: it reads the state it is given and returns a
//! new [`ActivityPackage`]. Counters are moved by the session state machine
//! before a package is built, never by the builder.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use loom_attribution_core::{
	format_date, format_duration, ActivityKind, ActivityPackage, ActivityState, Attribution, Event,
	Parameters,
};

use crate::config::{AttributionConfig, Environment};

/// SDK identifier sent with every package.
pub fn client_sdk() -> String {
	format!("loom-attribution-rust/{}", env!("CARGO_PKG_VERSION"))
}

/// Where a click package originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickSource {
	/// The app was opened through a URL with attribution parameters.
	Deeplink,
	/// iAd impression and purchase dates.
	Iad,
	/// A deep link that arrived together with a changed attribution.
	AttributionDeeplink,
}

impl ClickSource {
	pub fn as_str(&self) -> &'static str {
		match self {
			ClickSource::Deeplink => "deeplink",
			ClickSource::Iad => "iad",
			ClickSource::AttributionDeeplink => "attribution_deeplink",
		}
	}
}

/// Everything a click package carries besides the common parameters.
#[derive(Debug, Clone)]
pub struct ClickDetails {
	pub source: ClickSource,
	pub click_time: Option<DateTime<Utc>>,
	pub purchase_time: Option<DateTime<Utc>>,
	pub hints: Attribution,
	pub params: BTreeMap<String, String>,
	pub deeplink: Option<String>,
}

impl ClickDetails {
	pub fn new(source: ClickSource) -> Self {
		Self {
			source,
			click_time: None,
			purchase_time: None,
			hints: Attribution::default(),
			params: BTreeMap::new(),
			deeplink: None,
		}
	}
}

/// Static per-install metadata plus one builder function per package kind.
#[derive(Debug, Clone)]
pub struct PackageBuilder {
	app_token: String,
	environment: Environment,
	client_sdk: String,
	default_tracker: Option<String>,
	device_info: Parameters,
}

impl PackageBuilder {
	pub fn from_config(config: &AttributionConfig) -> Self {
		Self {
			app_token: config.app_token.clone(),
			environment: config.environment,
			client_sdk: client_sdk(),
			default_tracker: config.default_tracker.clone(),
			device_info: config.device_info.clone(),
		}
	}

	pub fn session(&self, state: &ActivityState, now: DateTime<Utc>) -> ActivityPackage {
		let mut params = self.base(state, now);
		params.insert("session_count", state.session_count);

		// The first session has no finished predecessor to report on.
		if state.session_count > 1 {
			params.insert("subsession_count", state.subsession_count);
			params.insert("session_length", format_duration(state.session_length));
			params.insert("time_spent", format_duration(state.time_spent));
		}
		params.insert_opt("last_interval", state.last_interval.map(format_duration));
		params.insert_opt("default_tracker", self.default_tracker.as_deref());
		params.insert_opt("push_token", state.device_token.as_ref().map(hex::encode));

		self.package(ActivityKind::Session, params, "")
	}

	pub fn event(&self, state: &ActivityState, event: &Event, now: DateTime<Utc>) -> ActivityPackage {
		let mut params = self.base(state, now);
		params.insert("event_count", state.event_count);
		params.insert("event_token", event.token());
		if let (Some(amount), Some(currency)) = (event.revenue(), event.currency()) {
			params.insert("revenue", format!("{amount:.5}"));
			params.insert("currency", currency);
		}
		params.insert_opt("callback_params", json_map(event.callback_parameters()));
		params.insert_opt("partner_params", json_map(event.partner_parameters()));
		session_counters(&mut params, state);

		self.package(ActivityKind::Event, params, event.suffix())
	}

	pub fn click(&self, state: &ActivityState, details: &ClickDetails, now: DateTime<Utc>) -> ActivityPackage {
		let mut params = self.base(state, now);
		params.insert("source", details.source.as_str());
		params.insert_opt("click_time", details.click_time.map(format_date));
		params.insert_opt("purchase_time", details.purchase_time.map(format_date));
		params.insert_opt("tracker", details.hints.tracker_name.as_deref());
		params.insert_opt("campaign", details.hints.campaign.as_deref());
		params.insert_opt("adgroup", details.hints.adgroup.as_deref());
		params.insert_opt("creative", details.hints.creative.as_deref());
		params.insert_opt("params", json_map(&details.params));
		params.insert_opt("deeplink", details.deeplink.as_deref());
		session_counters(&mut params, state);

		let suffix = format!(" '{}'", details.source.as_str());
		self.package(ActivityKind::Click, params, suffix)
	}

	/// An attribution check carries only the common parameters.
	pub fn attribution(&self, state: &ActivityState, now: DateTime<Utc>) -> ActivityPackage {
		let params = self.base(state, now);
		self.package(ActivityKind::Attribution, params, "")
	}

	pub fn push_token(&self, state: &ActivityState, token: &[u8], now: DateTime<Utc>) -> ActivityPackage {
		let mut params = self.base(state, now);
		params.insert("source", "push");
		params.insert("push_token", hex::encode(token));

		self.package(ActivityKind::PushToken, params, "")
	}

	pub fn ad_revenue(
		&self,
		state: &ActivityState,
		source: &str,
		payload: &serde_json::Value,
		now: DateTime<Utc>,
	) -> ActivityPackage {
		let mut params = self.base(state, now);
		params.insert("source", source);
		params.insert("payload", payload.to_string());
		params.insert("session_count", state.session_count);

		self.package(ActivityKind::AdRevenue, params, format!(" '{source}'"))
	}

	fn base(&self, state: &ActivityState, now: DateTime<Utc>) -> Parameters {
		let mut params = Parameters::new();
		params.insert("app_token", &self.app_token);
		params.insert("environment", self.environment);
		params.insert("installation_id", state.uuid);
		params.insert("created_at", format_date(now));
		params.extend(&self.device_info);
		params
	}

	fn package(&self, kind: ActivityKind, params: Parameters, suffix: impl Into<String>) -> ActivityPackage {
		ActivityPackage::new(kind, self.client_sdk.clone(), params, suffix)
	}
}

fn session_counters(params: &mut Parameters, state: &ActivityState) {
	params.insert("session_count", state.session_count);
	params.insert("subsession_count", state.subsession_count);
	params.insert("session_length", format_duration(state.session_length));
	params.insert("time_spent", format_duration(state.time_spent));
}

fn json_map(map: &BTreeMap<String, String>) -> Option<String> {
	if map.is_empty() {
		return None;
	}
	serde_json::to_string(map).ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;
	use std::time::Duration;

	fn now() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
	}

	fn builder() -> PackageBuilder {
		let mut config = AttributionConfig::new("abcdefabcdef", Environment::Sandbox);
		config.default_tracker = Some("dflt01".to_string());
		config.device_info.insert("os_name", "linux");
		PackageBuilder::from_config(&config)
	}

	fn started_state() -> ActivityState {
		let mut state = ActivityState::new(now());
		state.session_count = 1;
		state.subsession_count = 1;
		state.last_activity = Some(now());
		state
	}

	#[test]
	fn base_parameters_come_first() {
		let state = started_state();
		let package = builder().session(&state, now());
		let keys: Vec<&str> = package.parameters().iter().map(|(k, _)| k).take(5).collect();
		assert_eq!(
			keys,
			["app_token", "environment", "installation_id", "created_at", "os_name"]
		);
		assert_eq!(package.parameters().get("environment"), Some("sandbox"));
		assert_eq!(
			package.parameters().get("installation_id"),
			Some(state.uuid.to_string().as_str())
		);
		assert_eq!(package.client_sdk(), client_sdk());
	}

	#[test]
	fn first_session_omits_aggregates() {
		let package = builder().session(&started_state(), now());
		let params = package.parameters();
		assert_eq!(package.kind(), ActivityKind::Session);
		assert_eq!(params.get("session_count"), Some("1"));
		assert!(!params.contains_key("subsession_count"));
		assert!(!params.contains_key("session_length"));
		assert!(!params.contains_key("last_interval"));
		assert_eq!(params.get("default_tracker"), Some("dflt01"));
	}

	#[test]
	fn later_session_reports_previous_aggregates() {
		let mut state = started_state();
		state.session_count = 2;
		state.subsession_count = 4;
		state.session_length = Duration::from_secs(600);
		state.time_spent = Duration::from_millis(299_600);
		state.last_interval = Some(Duration::from_secs(35 * 60));
		state.device_token = Some(vec![0xde, 0xad]);

		let package = builder().session(&state, now());
		let params = package.parameters();
		assert_eq!(params.get("subsession_count"), Some("4"));
		assert_eq!(params.get("session_length"), Some("600"));
		assert_eq!(params.get("time_spent"), Some("300"));
		assert_eq!(params.get("last_interval"), Some("2100"));
		assert_eq!(params.get("push_token"), Some("dead"));
	}

	#[test]
	fn event_carries_revenue_and_parameters() {
		let mut state = started_state();
		state.event_count = 3;
		let event = Event::new("abc123")
			.with_revenue(0.99, "EUR")
			.with_callback_parameter("key", "value")
			.with_partner_parameter("foo", "bar");

		let package = builder().event(&state, &event, now());
		let params = package.parameters();
		assert_eq!(package.kind(), ActivityKind::Event);
		assert_eq!(params.get("event_count"), Some("3"));
		assert_eq!(params.get("event_token"), Some("abc123"));
		assert_eq!(params.get("revenue"), Some("0.99000"));
		assert_eq!(params.get("currency"), Some("EUR"));
		assert_eq!(params.get("callback_params"), Some(r#"{"key":"value"}"#));
		assert_eq!(params.get("partner_params"), Some(r#"{"foo":"bar"}"#));
		assert_eq!(params.get("subsession_count"), Some("1"));
		assert_eq!(package.suffix(), " (0.99000 EUR, 'abc123')");
	}

	#[test]
	fn event_without_extras_omits_them() {
		let package = builder().event(&started_state(), &Event::new("abc123"), now());
		let params = package.parameters();
		assert!(!params.contains_key("revenue"));
		assert!(!params.contains_key("callback_params"));
		assert_eq!(package.suffix(), " 'abc123'");
	}

	#[test]
	fn deeplink_click_carries_hints_and_params() {
		let mut details = ClickDetails::new(ClickSource::Deeplink);
		details.click_time = Some(now());
		details.hints.tracker_name = Some("abc".to_string());
		details.hints.campaign = Some("spring".to_string());
		details.params.insert("foo".to_string(), "bar".to_string());

		let package = builder().click(&started_state(), &details, now());
		let params = package.parameters();
		assert_eq!(package.kind(), ActivityKind::Click);
		assert_eq!(package.path(), "/sdk_click");
		assert_eq!(params.get("source"), Some("deeplink"));
		assert_eq!(params.get("click_time"), Some("2025-03-01T12:00:00.000Z+0000"));
		assert_eq!(params.get("tracker"), Some("abc"));
		assert_eq!(params.get("campaign"), Some("spring"));
		assert_eq!(params.get("params"), Some(r#"{"foo":"bar"}"#));
		assert!(!params.contains_key("purchase_time"));
	}

	#[test]
	fn push_token_is_hex_encoded() {
		let package = builder().push_token(&started_state(), &[0x01, 0xab, 0xff], now());
		assert_eq!(package.kind(), ActivityKind::PushToken);
		assert_eq!(package.parameters().get("source"), Some("push"));
		assert_eq!(package.parameters().get("push_token"), Some("01abff"));
	}

	#[test]
	fn attribution_check_has_only_base_parameters() {
		let package = builder().attribution(&started_state(), now());
		assert_eq!(package.kind(), ActivityKind::Attribution);
		assert_eq!(package.parameters().len(), 5);
	}

	#[test]
	fn ad_revenue_embeds_payload() {
		let payload = serde_json::json!({"network": "admob", "amount": 0.01});
		let package = builder().ad_revenue(&started_state(), "admob_sdk", &payload, now());
		assert_eq!(package.kind(), ActivityKind::AdRevenue);
		assert_eq!(package.parameters().get("source"), Some("admob_sdk"));
		let decoded: serde_json::Value =
			serde_json::from_str(package.parameters().get("payload").unwrap()).unwrap();
		assert_eq!(decoded, payload);
	}
}
