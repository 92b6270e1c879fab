// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Attribution hints carried in deep link query strings.

use std::collections::BTreeMap;

use url::Url;

use crate::attribution::Attribution;
use crate::error::{CoreError, Result};

/// Query parameters with this prefix are reserved for attribution.
pub const DEEPLINK_PARAM_PREFIX: &str = "loom_";

/// A deep link open that should be reported as a click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeeplinkClick {
	/// The URL as opened by the app.
	pub url: String,
	/// `tracker`, `campaign`, `adgroup` and `creative` hints.
	pub hints: Attribution,
	/// Every other prefixed parameter, with the prefix stripped.
	pub params: BTreeMap<String, String>,
}

impl DeeplinkClick {
	/// Extracts the prefixed parameters from `url`.
	///
	/// Returns `None` when the URL carries no prefixed parameter, in which case
	/// there is nothing to attribute.
	pub fn from_url(url: &Url) -> Option<Self> {
		let mut hints = Attribution::default();
		let mut params = BTreeMap::new();
		let mut found = false;

		for (key, value) in url.query_pairs() {
			let Some(name) = key.strip_prefix(DEEPLINK_PARAM_PREFIX) else {
				continue;
			};
			if name.is_empty() || value.is_empty() {
				continue;
			}
			found = true;

			let value = value.into_owned();
			match name {
				"tracker" => hints.tracker_name = Some(value),
				"campaign" => hints.campaign = Some(value),
				"adgroup" => hints.adgroup = Some(value),
				"creative" => hints.creative = Some(value),
				_ => {
					params.insert(name.to_string(), value);
				}
			}
		}

		found.then(|| Self {
			url: url.to_string(),
			hints,
			params,
		})
	}

	/// Parses `url` and extracts the prefixed parameters.
	pub fn parse(url: &str) -> Result<Option<Self>> {
		let parsed = Url::parse(url).map_err(|e| CoreError::InvalidUrl(format!("{url}: {e}")))?;
		Ok(Self::from_url(&parsed))
	}
}
