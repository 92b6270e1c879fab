// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use loom_attribution::{
	ActivityHandler, ActivityKind, ActivityObserver, ActivityPackage, Attribution, DeeplinkOrigin,
	Environment, HandlerSnapshot, ManualClock, MemoryStorage, ResponseData, RetryPolicy, Transport,
	TransportError,
};
use serde_json::json;

pub const APP_TOKEN: &str = "abcdefabcdef";

pub fn t0() -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// One scripted transport outcome.
pub enum Reply {
	Success(serde_json::Value),
	Connectivity,
	Status(u16, serde_json::Value),
}

/// Answers sends from a script, falling back to `{}` with status 200.
pub struct ScriptedTransport {
	script: Mutex<VecDeque<Reply>>,
	sent: Mutex<Vec<ActivityPackage>>,
	latency: Duration,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			script: Mutex::new(VecDeque::new()),
			sent: Mutex::new(Vec::new()),
			latency: Duration::from_millis(50),
			in_flight: AtomicUsize::new(0),
			max_in_flight: AtomicUsize::new(0),
		})
	}

	pub fn push(&self, reply: Reply) {
		self.script.lock().unwrap().push_back(reply);
	}

	pub fn sent(&self) -> Vec<ActivityPackage> {
		self.sent.lock().unwrap().clone()
	}

	pub fn sent_kinds(&self) -> Vec<ActivityKind> {
		self.sent().iter().map(|p| p.kind()).collect()
	}

	pub fn max_in_flight(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Transport for ScriptedTransport {
	async fn send(&self, package: &ActivityPackage) -> Result<ResponseData, TransportError> {
		let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

		tokio::time::sleep(self.latency).await;

		self.sent.lock().unwrap().push(package.clone());
		let reply = self.script.lock().unwrap().pop_front();
		self.in_flight.fetch_sub(1, Ordering::SeqCst);

		match reply.unwrap_or(Reply::Success(json!({}))) {
			Reply::Success(body) => Ok(ResponseData::from_json(package.kind(), Some(200), body)),
			Reply::Connectivity => Err(TransportError::Connectivity("network unreachable".into())),
			Reply::Status(status, body) => Err(TransportError::Status {
				status,
				response: Some(Box::new(ResponseData::from_json(
					package.kind(),
					Some(status),
					body,
				))),
			}),
		}
	}
}

/// Records every observer notification.
#[derive(Default)]
pub struct RecordingObserver {
	pub finished: Mutex<Vec<ResponseData>>,
	pub attributions: Mutex<Vec<Attribution>>,
	pub deeplinks: Mutex<Vec<(String, DeeplinkOrigin)>>,
}

impl RecordingObserver {
	pub fn finished_kinds(&self) -> Vec<(ActivityKind, bool)> {
		self
			.finished
			.lock()
			.unwrap()
			.iter()
			.map(|r| (r.kind, r.success))
			.collect()
	}

	pub fn attributions(&self) -> Vec<Attribution> {
		self.attributions.lock().unwrap().clone()
	}

	pub fn deeplinks(&self) -> Vec<(String, DeeplinkOrigin)> {
		self.deeplinks.lock().unwrap().clone()
	}
}

#[async_trait]
impl ActivityObserver for RecordingObserver {
	async fn on_finished_tracking(&self, response: &ResponseData) {
		self.finished.lock().unwrap().push(response.clone());
	}

	async fn on_attribution_changed(&self, attribution: &Attribution) {
		self.attributions.lock().unwrap().push(attribution.clone());
	}

	async fn on_deeplink(&self, url: &str, origin: DeeplinkOrigin) {
		self.deeplinks.lock().unwrap().push((url.to_string(), origin));
	}
}

/// A handler wired to in-memory collaborators.
pub struct Harness {
	pub handler: ActivityHandler,
	pub transport: Arc<ScriptedTransport>,
	pub storage: Arc<MemoryStorage>,
	pub clock: Arc<ManualClock>,
	pub observer: Arc<RecordingObserver>,
}

impl Harness {
	pub async fn new() -> Self {
		Self::with_storage(Arc::new(MemoryStorage::new())).await
	}

	pub async fn with_storage(storage: Arc<MemoryStorage>) -> Self {
		let transport = ScriptedTransport::new();
		let clock = Arc::new(ManualClock::new(t0()));
		let observer = Arc::new(RecordingObserver::default());

		let handler = ActivityHandler::builder()
			.app_token(APP_TOKEN)
			.environment(Environment::Sandbox)
			.retry_policy(RetryPolicy {
				max_retries: 3,
				base_delay: Duration::from_secs(2),
				max_delay: Duration::from_secs(60),
				jitter: false,
			})
			.storage(storage.clone())
			.transport(transport.clone())
			.clock(clock.clone())
			.observer(observer.clone())
			.build()
			.await
			.unwrap();

		Self {
			handler,
			transport,
			storage,
			clock,
			observer,
		}
	}

	pub fn advance(&self, by: Duration) {
		self.clock.advance(by);
	}

	pub async fn snapshot(&self) -> HandlerSnapshot {
		self.handler.snapshot().await.unwrap()
	}

	/// Waits until the queue is empty and nothing is in flight.
	pub async fn settle(&self) -> HandlerSnapshot {
		for _ in 0..1_000 {
			let snapshot = self.snapshot().await;
			if snapshot.queue_len == 0 && !snapshot.in_flight {
				return snapshot;
			}
			tokio::time::sleep(Duration::from_millis(100)).await;
		}
		panic!("handler did not drain its queue");
	}

	/// Lets timers and sends run for `by` of paused time.
	pub async fn idle(&self, by: Duration) {
		tokio::time::sleep(by).await;
	}
}
