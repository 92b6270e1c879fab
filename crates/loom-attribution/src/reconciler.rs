// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Holds the install's attribution and detects genuine changes.

use std::sync::Arc;

use loom_attribution_core::Attribution;
use tracing::{debug, info};

use crate::storage::{read_record, write_record, Storage, StorageKey};

pub struct AttributionReconciler {
	current: Option<Attribution>,
	storage: Arc<dyn Storage>,
}

impl AttributionReconciler {
	pub async fn load(storage: Arc<dyn Storage>) -> Self {
		// A cleared attribution is stored as `null`.
		let current = read_record::<Option<Attribution>>(storage.as_ref(), StorageKey::Attribution)
			.await
			.flatten();
		Self { current, storage }
	}

	pub fn current(&self) -> Option<&Attribution> {
		self.current.as_ref()
	}

	/// Stores `candidate` if it differs field by field from the current value.
	///
	/// Returns `true` on a genuine change. An equal candidate causes no write.
	pub async fn update(&mut self, candidate: Attribution) -> bool {
		if self.current.as_ref() == Some(&candidate) {
			debug!("attribution unchanged");
			return false;
		}

		info!(attribution = %candidate, "attribution changed");
		self.current = Some(candidate);
		self.persist().await;
		true
	}

	/// Replaces the stored value without change detection.
	pub async fn replace(&mut self, attribution: Option<Attribution>) {
		self.current = attribution;
		self.persist().await;
	}

	async fn persist(&self) {
		write_record(self.storage.as_ref(), StorageKey::Attribution, &self.current).await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::storage::MemoryStorage;

	fn attribution(network: &str) -> Attribution {
		Attribution {
			tracker_token: Some("tok123".to_string()),
			network: Some(network.to_string()),
			..Default::default()
		}
	}

	#[tokio::test]
	async fn identical_update_is_a_noop() {
		let storage = Arc::new(MemoryStorage::new());
		let mut reconciler = AttributionReconciler::load(storage.clone()).await;

		assert!(reconciler.update(attribution("fb")).await);
		assert!(!reconciler.update(attribution("fb")).await);

		assert_eq!(storage.write_count(StorageKey::Attribution).await, 1);
	}

	#[tokio::test]
	async fn any_field_difference_is_a_change() {
		let storage = Arc::new(MemoryStorage::new());
		let mut reconciler = AttributionReconciler::load(storage.clone()).await;
		reconciler.update(attribution("fb")).await;

		let mut changed = attribution("fb");
		changed.click_label = Some("summer".to_string());
		assert!(reconciler.update(changed.clone()).await);
		assert_eq!(reconciler.current(), Some(&changed));
	}

	#[tokio::test]
	async fn survives_reload() {
		let storage = Arc::new(MemoryStorage::new());
		let mut reconciler = AttributionReconciler::load(storage.clone()).await;
		reconciler.update(attribution("google")).await;

		let mut reloaded = AttributionReconciler::load(storage.clone()).await;
		assert_eq!(reloaded.current(), Some(&attribution("google")));
		assert!(!reloaded.update(attribution("google")).await);
	}

	#[tokio::test]
	async fn replace_clears_value() {
		let storage = Arc::new(MemoryStorage::new());
		let mut reconciler = AttributionReconciler::load(storage.clone()).await;
		reconciler.update(attribution("fb")).await;
		reconciler.replace(None).await;

		assert!(reconciler.current().is_none());
		assert!(AttributionReconciler::load(storage.clone()).await.current().is_none());
	}

	#[tokio::test]
	async fn cleared_record_decodes_cleanly() {
		let storage = Arc::new(MemoryStorage::new());
		let mut reconciler = AttributionReconciler::load(storage.clone()).await;
		reconciler.replace(None).await;

		let stored = read_record::<Option<Attribution>>(storage.as_ref(), StorageKey::Attribution).await;
		assert_eq!(stored, Some(None));

		let mut reloaded = AttributionReconciler::load(storage).await;
		assert!(reloaded.current().is_none());
		assert!(reloaded.update(attribution("fb")).await);
	}

	#[tokio::test]
	async fn empty_attribution_is_still_a_first_change() {
		let storage = Arc::new(MemoryStorage::new());
		let mut reconciler = AttributionReconciler::load(storage).await;
		assert!(reconciler.update(Attribution::default()).await);
		assert!(!reconciler.update(Attribution::default()).await);
	}
}
