// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the attribution SDK.

use loom_attribution_core::CoreError;
use thiserror::Error;

use crate::storage::StorageError;

/// Result type alias for attribution SDK operations.
pub type Result<T> = std::result::Result<T, AttributionError>;

/// Errors surfaced to the host app.
///
/// Delivery failures never show up here: they are retried or dropped inside
/// the handler and reported through observers.
#[derive(Debug, Error)]
pub enum AttributionError {
	/// App token is missing or malformed.
	#[error("invalid app token: {0}")]
	InvalidAppToken(String),

	/// Environment was not set.
	#[error("environment is required (sandbox or production)")]
	MissingEnvironment,

	/// Environment string is not recognised.
	#[error("invalid environment: {0}")]
	InvalidEnvironment(String),

	/// Base URL could not be parsed.
	#[error("invalid base URL: {0}")]
	InvalidBaseUrl(String),

	/// A policy value is out of range.
	#[error("invalid configuration for {field}: {message}")]
	InvalidConfig { field: String, message: String },

	/// Event failed validation and was not tracked.
	#[error("invalid event: {0}")]
	InvalidEvent(#[source] CoreError),

	/// Deep link URL could not be parsed.
	#[error("invalid URL: {0}")]
	InvalidUrl(#[source] CoreError),

	/// The handler has been shut down.
	#[error("activity handler has been shut down")]
	HandlerShutdown,

	/// Persistent storage could not be prepared.
	#[error("storage error: {0}")]
	Storage(#[from] StorageError),

	/// HTTP client could not be built.
	#[error("HTTP client error: {0}")]
	HttpClient(#[from] reqwest::Error),
}

impl AttributionError {
	pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
		Self::InvalidConfig {
			field: field.into(),
			message: message.into(),
		}
	}
}

/// Errors that may succeed when the same request is tried again later.
pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn invalid_event_keeps_source() {
		let err = AttributionError::InvalidEvent(CoreError::InvalidEventToken("x".into()));
		assert!(err.to_string().starts_with("invalid event:"));
		assert!(std::error::Error::source(&err).is_some());
	}

	#[test]
	fn invalid_config_formats_field() {
		let err = AttributionError::invalid_config("retry_policy.max_retries", "must be at least 1");
		assert_eq!(
			err.to_string(),
			"invalid configuration for retry_policy.max_retries: must be at least 1"
		);
	}
}
