// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Custom events tracked by the host app.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Length of an event token issued by the dashboard.
pub const EVENT_TOKEN_LENGTH: usize = 6;

/// A custom event, optionally carrying revenue.
///
/// # Example
///
/// ```
/// use loom_attribution_core::Event;
///
/// let event = Event::new("abc123")
///     .with_revenue(0.99, "EUR")
///     .with_callback_parameter("order_id", "o-1")
///     .with_partner_parameter("sku", "gold");
/// assert!(event.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	token: String,
	#[serde(default)]
	revenue: Option<f64>,
	#[serde(default)]
	currency: Option<String>,
	#[serde(default)]
	callback_parameters: BTreeMap<String, String>,
	#[serde(default)]
	partner_parameters: BTreeMap<String, String>,
}

impl Event {
	pub fn new(token: impl Into<String>) -> Self {
		Self {
			token: token.into(),
			revenue: None,
			currency: None,
			callback_parameters: BTreeMap::new(),
			partner_parameters: BTreeMap::new(),
		}
	}

	/// Attaches a revenue amount in the given ISO 4217 currency.
	pub fn with_revenue(mut self, amount: f64, currency: impl Into<String>) -> Self {
		self.revenue = Some(amount);
		self.currency = Some(currency.into());
		self
	}

	/// Adds a parameter forwarded to the app's own callback URL.
	pub fn with_callback_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.callback_parameters.insert(key.into(), value.into());
		self
	}

	/// Adds a parameter forwarded to ad network partners.
	pub fn with_partner_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.partner_parameters.insert(key.into(), value.into());
		self
	}

	pub fn token(&self) -> &str {
		&self.token
	}

	pub fn revenue(&self) -> Option<f64> {
		self.revenue
	}

	pub fn currency(&self) -> Option<&str> {
		self.currency.as_deref()
	}

	pub fn callback_parameters(&self) -> &BTreeMap<String, String> {
		&self.callback_parameters
	}

	pub fn partner_parameters(&self) -> &BTreeMap<String, String> {
		&self.partner_parameters
	}

	/// Checks the token and revenue before the event is handed to the handler.
	pub fn validate(&self) -> Result<()> {
		if self.token.len() != EVENT_TOKEN_LENGTH
			|| !self.token.chars().all(|c| c.is_ascii_alphanumeric())
		{
			return Err(CoreError::InvalidEventToken(self.token.clone()));
		}

		if let Some(amount) = self.revenue {
			if !amount.is_finite() || amount < 0.0 {
				return Err(CoreError::InvalidRevenue(amount));
			}
			let currency = self.currency.as_deref().unwrap_or_default();
			if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
				return Err(CoreError::InvalidCurrency(currency.to_string()));
			}
		}

		Ok(())
	}

	/// Log label, e.g. ` (0.99000 EUR, 'abc123')` or ` 'abc123'`.
	pub fn suffix(&self) -> String {
		match (self.revenue, self.currency.as_deref()) {
			(Some(amount), Some(currency)) => {
				format!(" ({amount:.5} {currency}, '{}')", self.token)
			}
			_ => format!(" '{}'", self.token),
		}
	}
}
