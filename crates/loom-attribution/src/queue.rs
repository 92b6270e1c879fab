// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable FIFO of packages awaiting delivery.

use std::collections::VecDeque;
use std::sync::Arc;

use loom_attribution_core::{ActivityKind, ActivityPackage};
use tracing::{debug, info};

use crate::storage::{read_record, write_record, Storage, StorageKey};

/// Ordered packages, persisted as a whole after every change.
///
/// Only the delivery worker removes entries, and only from the front.
pub struct PackageQueue {
	packages: VecDeque<ActivityPackage>,
	storage: Arc<dyn Storage>,
}

impl PackageQueue {
	/// Loads the persisted queue. An unreadable queue starts empty.
	pub async fn load(storage: Arc<dyn Storage>) -> Self {
		let packages: VecDeque<ActivityPackage> =
			read_record(storage.as_ref(), StorageKey::PackageQueue)
				.await
				.unwrap_or_default();

		if !packages.is_empty() {
			info!(count = packages.len(), "restored package queue");
		}

		Self { packages, storage }
	}

	pub async fn enqueue(&mut self, package: ActivityPackage) {
		debug!(kind = %package.kind(), suffix = package.suffix(), "added package {}", self.packages.len() + 1);
		self.packages.push_back(package);
		self.persist().await;
	}

	pub fn peek_front(&self) -> Option<&ActivityPackage> {
		self.packages.front()
	}

	pub async fn remove_front(&mut self) -> Option<ActivityPackage> {
		let removed = self.packages.pop_front();
		if removed.is_some() {
			self.persist().await;
		}
		removed
	}

	/// Counts a failed attempt against the head package and returns its new retry count.
	pub async fn record_failure(&mut self) -> Option<u32> {
		let retries = self.packages.front_mut()?.increment_retries();
		self.persist().await;
		Some(retries)
	}

	pub fn len(&self) -> usize {
		self.packages.len()
	}

	pub fn is_empty(&self) -> bool {
		self.packages.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &ActivityPackage> {
		self.packages.iter()
	}

	pub fn contains_kind(&self, kind: ActivityKind) -> bool {
		self.packages.iter().any(|p| p.kind() == kind)
	}

	async fn persist(&self) {
		write_record(self.storage.as_ref(), StorageKey::PackageQueue, &self.packages).await;
	}
}
