// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Handler configuration and policy knobs.

use std::time::Duration;

use loom_attribution_core::Parameters;
use serde::{Deserialize, Serialize};

use crate::error::{AttributionError, Result};

/// Default backend for package delivery.
pub const DEFAULT_BASE_URL: &str = "https://app.loom-attribution.dev";

/// Length of an app token issued by the dashboard.
pub const APP_TOKEN_LENGTH: usize = 12;

/// Backend environment the app reports to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
	Sandbox,
	Production,
}

impl std::fmt::Display for Environment {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Environment::Sandbox => write!(f, "sandbox"),
			Environment::Production => write!(f, "production"),
		}
	}
}

impl std::str::FromStr for Environment {
	type Err = AttributionError;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"sandbox" => Ok(Environment::Sandbox),
			"production" => Ok(Environment::Production),
			_ => Err(AttributionError::InvalidEnvironment(s.to_string())),
		}
	}
}

/// Durations in policy structs are (de)serialized as whole seconds.
mod duration_secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(value.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_secs)
	}
}

/// Inactivity thresholds that split usage into sessions and subsessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPolicy {
	/// A gap at least this long starts a new session.
	#[serde(with = "duration_secs")]
	pub session_interval: Duration,
	/// A shorter gap at least this long counts as a subsession.
	#[serde(with = "duration_secs")]
	pub subsession_interval: Duration,
}

impl Default for SessionPolicy {
	fn default() -> Self {
		Self {
			session_interval: Duration::from_secs(30 * 60),
			subsession_interval: Duration::from_secs(60),
		}
	}
}

/// Bounded exponential backoff for retriable delivery failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// A package is dropped once it has failed this many times.
	pub max_retries: u32,
	#[serde(with = "duration_secs")]
	pub base_delay: Duration,
	#[serde(with = "duration_secs")]
	pub max_delay: Duration,
	/// Spread delays by up to 20% in either direction.
	pub jitter: bool,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_delay: Duration::from_secs(2),
			max_delay: Duration::from_secs(60),
			jitter: true,
		}
	}
}

impl RetryPolicy {
	/// Delay before the next attempt after `retries` failures.
	pub fn delay_for(&self, retries: u32) -> Duration {
		let exponent = retries.saturating_sub(1).min(16);
		let factor = 2u32.saturating_pow(exponent);
		let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);

		if self.jitter {
			let spread = 0.8 + fastrand::f64() * 0.4;
			delay.mul_f64(spread).min(self.max_delay)
		} else {
			delay
		}
	}

	/// Whether a package that has failed `retries` times must be dropped.
	pub fn is_exhausted(&self, retries: u32) -> bool {
		retries >= self.max_retries
	}
}

/// Everything the handler needs to know about the host app.
#[derive(Debug, Clone)]
pub struct AttributionConfig {
	pub app_token: String,
	pub environment: Environment,
	pub base_url: String,
	pub default_tracker: Option<String>,
	pub session_policy: SessionPolicy,
	pub retry_policy: RetryPolicy,
	pub request_timeout: Duration,
	/// Interval of the foreground tick that accrues time spent and re-triggers delivery.
	pub foreground_tick: Duration,
	/// Dispatch deep links that arrive with a changed attribution.
	pub launch_deferred_deeplink: bool,
	/// Opaque host-provided values appended to every package.
	pub device_info: Parameters,
}

impl AttributionConfig {
	pub fn new(app_token: impl Into<String>, environment: Environment) -> Self {
		Self {
			app_token: app_token.into(),
			environment,
			base_url: DEFAULT_BASE_URL.to_string(),
			default_tracker: None,
			session_policy: SessionPolicy::default(),
			retry_policy: RetryPolicy::default(),
			request_timeout: Duration::from_secs(60),
			foreground_tick: Duration::from_secs(60),
			launch_deferred_deeplink: true,
			device_info: Parameters::new(),
		}
	}

	/// Checks the configuration and normalizes the base URL.
	pub fn validate(&mut self) -> Result<()> {
		if self.app_token.len() != APP_TOKEN_LENGTH
			|| !self.app_token.chars().all(|c| c.is_ascii_alphanumeric())
		{
			return Err(AttributionError::InvalidAppToken(self.app_token.clone()));
		}

		let trimmed = self.base_url.trim_end_matches('/').to_string();
		url::Url::parse(&trimmed).map_err(|e| AttributionError::InvalidBaseUrl(format!("{trimmed}: {e}")))?;
		self.base_url = trimmed;

		let policy = &self.session_policy;
		if policy.subsession_interval > policy.session_interval {
			return Err(AttributionError::invalid_config(
				"session_policy.subsession_interval",
				"must not exceed session_interval",
			));
		}
		if self.retry_policy.max_retries == 0 {
			return Err(AttributionError::invalid_config(
				"retry_policy.max_retries",
				"must be at least 1",
			));
		}
		if self.foreground_tick.is_zero() {
			return Err(AttributionError::invalid_config(
				"foreground_tick",
				"must be greater than zero",
			));
		}

		Ok(())
	}
}
