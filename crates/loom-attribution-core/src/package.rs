// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Activity packages: the durable unit of delivery.

use serde::{Deserialize, Serialize};

use crate::kind::ActivityKind;

/// An insertion-ordered string map used as a package payload.
///
/// Order matters: the payload is logged and encoded exactly in the order the
/// builder inserted keys, so the same package always produces the same body.
///
/// # Example
///
/// ```
/// use loom_attribution_core::Parameters;
///
/// let mut params = Parameters::new();
/// params.insert("app_token", "abc123abc123");
/// params.insert("session_count", 1);
/// assert_eq!(params.to_query_string(), "app_token=abc123abc123&session_count=1");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
	entries: Vec<(String, String)>,
}

impl Parameters {
	/// Creates an empty parameter list.
	pub fn new() -> Self {
		Self {
			entries: Vec::new(),
		}
	}

	/// Inserts a value. An existing key keeps its position and gets the new value.
	pub fn insert<K, V>(&mut self, key: K, value: V)
	where
		K: Into<String>,
		V: ToString,
	{
		let key = key.into();
		let value = value.to_string();
		match self.entries.iter_mut().find(|(k, _)| *k == key) {
			Some(entry) => entry.1 = value,
			None => self.entries.push((key, value)),
		}
	}

	/// Inserts the value only when present.
	pub fn insert_opt<K, V>(&mut self, key: K, value: Option<V>)
	where
		K: Into<String>,
		V: ToString,
	{
		if let Some(value) = value {
			self.insert(key, value);
		}
	}

	/// Appends every entry of `other`, overriding keys already present.
	pub fn extend(&mut self, other: &Parameters) {
		for (k, v) in other.iter() {
			self.insert(k, v);
		}
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self
			.entries
			.iter()
			.find(|(k, _)| k == key)
			.map(|(_, v)| v.as_str())
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.get(key).is_some()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Iterates entries in insertion order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// Form-urlencodes the entries in insertion order.
	pub fn to_query_string(&self) -> String {
		url::form_urlencoded::Serializer::new(String::new())
			.extend_pairs(self.iter())
			.finish()
	}
}

impl<K, V> FromIterator<(K, V)> for Parameters
where
	K: Into<String>,
	V: ToString,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut params = Parameters::new();
		for (k, v) in iter {
			params.insert(k, v);
		}
		params
	}
}

/// One unit of data destined for the backend.
///
/// Everything except the retry counter is fixed at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityPackage {
	kind: ActivityKind,
	path: String,
	client_sdk: String,
	parameters: Parameters,
	suffix: String,
	#[serde(default)]
	retries: u32,
}

impl ActivityPackage {
	/// Creates a package for `kind`, delivered to the kind's endpoint.
	pub fn new(
		kind: ActivityKind,
		client_sdk: impl Into<String>,
		parameters: Parameters,
		suffix: impl Into<String>,
	) -> Self {
		Self {
			kind,
			path: kind.path().to_string(),
			client_sdk: client_sdk.into(),
			parameters,
			suffix: suffix.into(),
			retries: 0,
		}
	}

	pub fn kind(&self) -> ActivityKind {
		self.kind
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn client_sdk(&self) -> &str {
		&self.client_sdk
	}

	pub fn parameters(&self) -> &Parameters {
		&self.parameters
	}

	/// Human readable label appended to log lines, e.g. ` 'abc123'`.
	pub fn suffix(&self) -> &str {
		&self.suffix
	}

	/// Number of failed delivery attempts so far.
	pub fn retries(&self) -> u32 {
		self.retries
	}

	/// Records a failed attempt and returns the new retry count.
	pub fn increment_retries(&mut self) -> u32 {
		self.retries = self.retries.saturating_add(1);
		self.retries
	}

	/// Short description used in log lines.
	pub fn describe(&self) -> String {
		format!("{}{}", self.kind, self.suffix)
	}
}
