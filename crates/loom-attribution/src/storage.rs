// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable blob storage for handler records.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Logical record names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	ActivityState,
	PackageQueue,
	Attribution,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::ActivityState => "activity_state",
			StorageKey::PackageQueue => "package_queue",
			StorageKey::Attribution => "attribution",
		}
	}
}

impl std::fmt::Display for StorageKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("storage unavailable: {0}")]
	Unavailable(String),
}

/// Reads and writes opaque blobs under a [`StorageKey`].
///
/// A `save` must replace the previous blob atomically: a reader sees either
/// the old bytes or the new bytes, never a truncated mix.
#[async_trait]
pub trait Storage: Send + Sync {
	async fn load(&self, key: StorageKey) -> Result<Option<Vec<u8>>, StorageError>;
	async fn save(&self, key: StorageKey, bytes: &[u8]) -> Result<(), StorageError>;
}

/// Stores each record as a JSON file in one directory.
pub struct FileStorage {
	dir: PathBuf,
}

impl FileStorage {
	pub fn new(dir: PathBuf) -> Self {
		Self { dir }
	}

	/// Uses `$XDG_DATA_HOME/loom/attribution` (or the platform equivalent).
	pub fn from_xdg() -> Result<Self, StorageError> {
		let data_dir = dirs::data_dir().ok_or_else(|| {
			StorageError::Unavailable("could not determine XDG data directory".to_string())
		})?;

		let dir = data_dir.join("loom").join("attribution");
		std::fs::create_dir_all(&dir)?;

		info!(dir = %dir.display(), "initialized attribution storage");

		Ok(Self::new(dir))
	}

	fn record_path(&self, key: StorageKey) -> PathBuf {
		self.dir.join(format!("{key}.json"))
	}
}

#[async_trait]
impl Storage for FileStorage {
	async fn load(&self, key: StorageKey) -> Result<Option<Vec<u8>>, StorageError> {
		let path = self.record_path(key);

		match tokio::fs::read(&path).await {
			Ok(bytes) => {
				debug!(key = %key, bytes = bytes.len(), "loaded record from disk");
				Ok(Some(bytes))
			}
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!(key = %key, path = %path.display(), "record file not found");
				Ok(None)
			}
			Err(e) => Err(e.into()),
		}
	}

	async fn save(&self, key: StorageKey, bytes: &[u8]) -> Result<(), StorageError> {
		tokio::fs::create_dir_all(&self.dir).await?;

		let path = self.record_path(key);
		let tmp_path = self.dir.join(format!("{key}.json.tmp"));

		tokio::fs::write(&tmp_path, bytes).await?;
		tokio::fs::rename(&tmp_path, &path).await?;

		debug!(key = %key, bytes = bytes.len(), path = %path.display(), "saved record to disk");

		Ok(())
	}
}

/// In-memory storage for hosts without a filesystem and for tests.
#[derive(Default)]
pub struct MemoryStorage {
	records: Mutex<HashMap<StorageKey, Vec<u8>>>,
	writes: Mutex<HashMap<StorageKey, usize>>,
	fail_saves: AtomicBool,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every subsequent `save` fail, simulating a full or read-only disk.
	pub fn set_fail_saves(&self, fail: bool) {
		self.fail_saves.store(fail, Ordering::SeqCst);
	}

	/// Number of successful writes of `key`.
	pub async fn write_count(&self, key: StorageKey) -> usize {
		self.writes.lock().await.get(&key).copied().unwrap_or(0)
	}

	/// Places raw bytes under `key`, bypassing write accounting.
	pub async fn put_raw(&self, key: StorageKey, bytes: Vec<u8>) {
		self.records.lock().await.insert(key, bytes);
	}

	pub async fn get_raw(&self, key: StorageKey) -> Option<Vec<u8>> {
		self.records.lock().await.get(&key).cloned()
	}
}

#[async_trait]
impl Storage for MemoryStorage {
	async fn load(&self, key: StorageKey) -> Result<Option<Vec<u8>>, StorageError> {
		Ok(self.records.lock().await.get(&key).cloned())
	}

	async fn save(&self, key: StorageKey, bytes: &[u8]) -> Result<(), StorageError> {
		if self.fail_saves.load(Ordering::SeqCst) {
			return Err(StorageError::Unavailable(format!("save of {key} rejected")));
		}
		self.records.lock().await.insert(key, bytes.to_vec());
		*self.writes.lock().await.entry(key).or_insert(0) += 1;
		Ok(())
	}
}

/// Loads and decodes a record. Missing, unreadable or corrupt records yield `None`.
pub(crate) async fn read_record<T: DeserializeOwned>(storage: &dyn Storage, key: StorageKey) -> Option<T> {
	let bytes = match storage.load(key).await {
		Ok(Some(bytes)) => bytes,
		Ok(None) => return None,
		Err(e) => {
			warn!(key = %key, error = %e, "failed to read record, starting from defaults");
			return None;
		}
	};

	match serde_json::from_slice(&bytes) {
		Ok(value) => Some(value),
		Err(e) => {
			warn!(key = %key, error = %e, "discarding corrupt record");
			None
		}
	}
}

/// Encodes and saves a record. Failures are logged; the caller keeps its in-memory copy.
pub(crate) async fn write_record<T: Serialize>(storage: &dyn Storage, key: StorageKey, value: &T) -> bool {
	let bytes = match serde_json::to_vec(value) {
		Ok(bytes) => bytes,
		Err(e) => {
			error!(key = %key, error = %e, "failed to encode record");
			return false;
		}
	};

	match storage.save(key, &bytes).await {
		Ok(()) => true,
		Err(e) => {
			error!(key = %key, error = %e, "failed to persist record");
			false
		}
	}
}
