// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Marketing attribution for an install.

use serde::{Deserialize, Serialize};

/// The marketing source fields associated with an install.
///
/// Equality is field-by-field; the handler only reports a change when at least
/// one field differs from the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Attribution {
	pub tracker_token: Option<String>,
	pub tracker_name: Option<String>,
	pub network: Option<String>,
	pub campaign: Option<String>,
	pub adgroup: Option<String>,
	pub creative: Option<String>,
	pub click_label: Option<String>,
	pub adid: Option<String>,
}

impl Attribution {
	/// Reads an attribution block from a response object.
	///
	/// Returns `None` when the value is not a JSON object. Fields that are not
	/// strings are ignored rather than failing the whole block.
	pub fn from_json(value: &serde_json::Value) -> Option<Self> {
		let object = value.as_object()?;
		let field = |name: &str| {
			object
				.get(name)
				.and_then(|v| v.as_str())
				.filter(|s| !s.is_empty())
				.map(str::to_string)
		};

		Some(Self {
			tracker_token: field("tracker_token"),
			tracker_name: field("tracker_name"),
			network: field("network"),
			campaign: field("campaign"),
			adgroup: field("adgroup"),
			creative: field("creative"),
			click_label: field("click_label"),
			adid: field("adid"),
		})
	}

	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}
}

impl std::fmt::Display for Attribution {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
		write!(
			f,
			"tracker={} network={} campaign={} adgroup={} creative={}",
			show(&self.tracker_name),
			show(&self.network),
			show(&self.campaign),
			show(&self.adgroup),
			show(&self.creative),
		)
	}
}
