// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Parsed backend responses.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attribution::Attribution;
use crate::error::{CoreError, Result};
use crate::format::parse_date;
use crate::kind::ActivityKind;

/// The interpreted result of delivering one package.
///
/// Produced for every terminal outcome, including packages that were dropped
/// without ever getting a response (`status` is `None` then).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
	/// Kind of the package this response belongs to.
	pub kind: ActivityKind,
	pub success: bool,
	/// HTTP status, if a response was received.
	pub status: Option<u16>,
	pub message: Option<String>,
	pub error: Option<String>,
	/// Server time, used to detect clock skew.
	pub timestamp: Option<DateTime<Utc>>,
	pub adid: Option<String>,
	pub attribution: Option<Attribution>,
	/// Server asks the client to re-check attribution after this delay.
	pub ask_in: Option<Duration>,
	pub deeplink: Option<String>,
	/// The raw body, kept for observers.
	#[serde(default)]
	pub json: serde_json::Value,
}

impl ResponseData {
	/// Interprets a parsed JSON body.
	pub fn from_json(kind: ActivityKind, status: Option<u16>, json: serde_json::Value) -> Self {
		let string = |name: &str| {
			json
				.get(name)
				.and_then(|v| v.as_str())
				.filter(|s| !s.is_empty())
				.map(str::to_string)
		};

		let error = string("error");
		let adid = string("adid");
		let status_ok = status.map_or(true, |s| (200..300).contains(&s));

		let attribution_json = json.get("attribution");
		let mut attribution = attribution_json.and_then(Attribution::from_json);
		if let Some(attr) = attribution.as_mut() {
			if attr.adid.is_none() {
				attr.adid = adid.clone();
			}
		}

		let deeplink = attribution_json
			.and_then(|a| a.get("deeplink"))
			.and_then(|v| v.as_str())
			.map(str::to_string)
			.or_else(|| string("deeplink"));

		let ask_in = json
			.get("ask_in")
			.and_then(|v| v.as_u64())
			.map(Duration::from_millis);

		Self {
			kind,
			success: status_ok && error.is_none(),
			status,
			message: string("message"),
			error,
			timestamp: string("timestamp").as_deref().and_then(parse_date),
			adid,
			attribution,
			ask_in,
			deeplink,
			json,
		}
	}

	/// Parses a response body. Anything but a JSON object is malformed.
	pub fn parse(kind: ActivityKind, status: Option<u16>, body: &str) -> Result<Self> {
		let json: serde_json::Value =
			serde_json::from_str(body).map_err(|e| CoreError::MalformedResponse(e.to_string()))?;
		if !json.is_object() {
			return Err(CoreError::MalformedResponse(format!(
				"expected a JSON object, got: {json}"
			)));
		}
		Ok(Self::from_json(kind, status, json))
	}

	/// Builds the record for a package that never got a usable response.
	pub fn failure(kind: ActivityKind, status: Option<u16>, message: impl Into<String>) -> Self {
		Self {
			kind,
			success: false,
			status,
			message: None,
			error: Some(message.into()),
			timestamp: None,
			adid: None,
			attribution: None,
			ask_in: None,
			deeplink: None,
			json: serde_json::Value::Null,
		}
	}

	/// Server time minus local time, when the server sent a timestamp.
	pub fn clock_skew(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
		self.timestamp.map(|ts| ts.signed_duration_since(now))
	}
}
