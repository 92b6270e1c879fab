// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the attribution core types.

use thiserror::Error;

/// Result type alias for core attribution operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while validating or parsing attribution types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
	/// Unknown activity kind string.
	#[error("invalid activity kind: {0}")]
	InvalidKind(String),

	/// Event token does not have the expected shape.
	#[error("invalid event token '{0}': expected {len} alphanumeric characters", len = crate::event::EVENT_TOKEN_LENGTH)]
	InvalidEventToken(String),

	/// Revenue was negative or not a finite number.
	#[error("invalid revenue amount: {0}")]
	InvalidRevenue(f64),

	/// Currency code is not a three letter code.
	#[error("invalid currency code: {0}")]
	InvalidCurrency(String),

	/// Response body could not be interpreted.
	#[error("malformed response: {0}")]
	MalformedResponse(String),

	/// URL could not be parsed.
	#[error("invalid URL: {0}")]
	InvalidUrl(String),
}
