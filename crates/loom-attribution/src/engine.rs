// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The serialized command loop behind [`ActivityHandler`](crate::ActivityHandler).
//!
//! Every mutation of the activity state, the package queue and the stored
//! attribution happens inside [`Engine::handle`], one command at a time.
//! Network sends and timers run as detached tasks that report back by posting
//! a command, so the loop itself never waits on the network.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use loom_attribution_core::{
	ActivityKind, ActivityPackage, ActivityState, Attribution, DeeplinkClick, Event, ResponseData,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::builder::{ClickDetails, ClickSource, PackageBuilder};
use crate::clock::Clock;
use crate::config::AttributionConfig;
use crate::delivery::{DeliveryReport, DeliveryWorker};
use crate::observer::{DeeplinkOrigin, SharedObserver};
use crate::queue::PackageQueue;
use crate::reconciler::AttributionReconciler;
use crate::session::{LifecyclePhase, SessionStateMachine};
use crate::storage::{read_record, write_record, Storage, StorageKey};
use crate::transport::{Transport, TransportError};

/// Point-in-time view of the handler, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct HandlerSnapshot {
	pub state: ActivityState,
	pub queue_len: usize,
	pub queued_kinds: Vec<ActivityKind>,
	pub in_flight: bool,
	pub retry_scheduled: bool,
	pub offline: bool,
	pub phase: LifecyclePhase,
	pub attribution: Option<Attribution>,
}

pub(crate) enum Command {
	SubsessionStart,
	SubsessionEnd,
	TrackEvent(Event),
	TrackAdRevenue {
		source: String,
		payload: serde_json::Value,
	},
	SetEnabled(bool),
	SetOfflineMode(bool),
	SetDeviceToken(Vec<u8>),
	OpenUrl(DeeplinkClick),
	SetIadDate {
		impression: DateTime<Utc>,
		purchase: Option<DateTime<Utc>>,
	},
	SetAttribution(Option<Attribution>),
	SetAskingAttribution(bool),
	UpdateAttribution {
		attribution: Attribution,
		deeplink: Option<String>,
		launch_deeplink: bool,
	},
	FinishedTracking(ResponseData),
	LaunchDeeplink(String),
	LaunchSessionDeeplink(String),
	RegisterObserver(SharedObserver),
	SendFinished(Result<ResponseData, TransportError>),
	RetryDue,
	AttributionCheckDue,
	ForegroundTick,
	Snapshot(oneshot::Sender<HandlerSnapshot>),
	IsEnabled(oneshot::Sender<bool>),
	GetAttribution(oneshot::Sender<Option<Attribution>>),
	Shutdown(oneshot::Sender<()>),
}

/// Collaborators handed to the engine at start-up.
pub(crate) struct EngineParts {
	pub config: AttributionConfig,
	pub storage: Arc<dyn Storage>,
	pub transport: Arc<dyn Transport>,
	pub clock: Arc<dyn Clock>,
	pub observers: Vec<SharedObserver>,
}

pub(crate) struct Engine {
	config: AttributionConfig,
	clock: Arc<dyn Clock>,
	storage: Arc<dyn Storage>,
	builder: PackageBuilder,
	state: ActivityState,
	queue: PackageQueue,
	worker: DeliveryWorker,
	sessions: SessionStateMachine,
	reconciler: AttributionReconciler,
	observers: Vec<SharedObserver>,
	pending_session_deeplink: Option<String>,
	tx: mpsc::WeakUnboundedSender<Command>,
	tick_task: Option<JoinHandle<()>>,
	retry_task: Option<JoinHandle<()>>,
	attribution_task: Option<JoinHandle<()>>,
	shutdown_ack: Option<oneshot::Sender<()>>,
	stopped: bool,
}

impl Engine {
	/// Loads persisted records and spawns the command loop.
	pub(crate) async fn start(parts: EngineParts) -> (mpsc::UnboundedSender<Command>, JoinHandle<()>) {
		let EngineParts {
			config,
			storage,
			transport,
			clock,
			observers,
		} = parts;

		let now = clock.now();
		let restored: Option<ActivityState> = read_record(storage.as_ref(), StorageKey::ActivityState).await;
		let fresh = restored.is_none();
		let state = restored.unwrap_or_else(|| ActivityState::new(now));

		let queue = PackageQueue::load(Arc::clone(&storage)).await;
		let reconciler = AttributionReconciler::load(Arc::clone(&storage)).await;
		let worker = DeliveryWorker::new(transport, config.retry_policy, state.enabled);

		let (tx, rx) = mpsc::unbounded_channel();

		let mut engine = Engine {
			builder: PackageBuilder::from_config(&config),
			sessions: SessionStateMachine::new(config.session_policy),
			config,
			clock,
			storage,
			state,
			queue,
			worker,
			reconciler,
			observers,
			pending_session_deeplink: None,
			tx: tx.downgrade(),
			tick_task: None,
			retry_task: None,
			attribution_task: None,
			shutdown_ack: None,
			stopped: false,
		};

		if fresh {
			info!(installation_id = %engine.state.uuid, "first launch, created activity state");
			engine.persist_state().await;
		} else {
			info!(
				installation_id = %engine.state.uuid,
				session_count = engine.state.session_count,
				queued = engine.queue.len(),
				"restored activity state"
			);
		}

		let task = tokio::spawn(engine.run(rx));
		(tx, task)
	}

	async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
		if self.state.asking_attribution {
			self.schedule_attribution_check(Duration::ZERO);
		}
		self.drain();

		while let Some(command) = rx.recv().await {
			self.handle(command).await;
			if self.stopped {
				break;
			}
		}

		self.stop_timers();
		info!("activity handler stopped");
	}

	async fn handle(&mut self, command: Command) {
		match command {
			Command::SubsessionStart => self.subsession_start().await,
			Command::SubsessionEnd => self.subsession_end().await,
			Command::TrackEvent(event) => self.track_event(event).await,
			Command::TrackAdRevenue { source, payload } => self.track_ad_revenue(source, payload).await,
			Command::SetEnabled(enabled) => self.set_enabled(enabled).await,
			Command::SetOfflineMode(offline) => self.set_offline_mode(offline),
			Command::SetDeviceToken(token) => self.set_device_token(token).await,
			Command::OpenUrl(click) => self.open_url(click).await,
			Command::SetIadDate { impression, purchase } => self.set_iad_date(impression, purchase).await,
			Command::SetAttribution(attribution) => self.reconciler.replace(attribution).await,
			Command::SetAskingAttribution(asking) => self.set_asking_attribution(asking).await,
			Command::UpdateAttribution {
				attribution,
				deeplink,
				launch_deeplink,
			} => {
				self.update_attribution(attribution, deeplink, launch_deeplink).await;
			}
			Command::FinishedTracking(response) => self.finished_tracking(response).await,
			Command::LaunchDeeplink(url) => self.notify_deeplink(&url, DeeplinkOrigin::Direct).await,
			Command::LaunchSessionDeeplink(url) => self.launch_session_deeplink(url).await,
			Command::RegisterObserver(observer) => self.observers.push(observer),
			Command::SendFinished(result) => self.send_finished(result).await,
			Command::RetryDue => {
				self.retry_task = None;
				self.worker.retry_due();
				self.drain();
			}
			Command::AttributionCheckDue => self.attribution_check_due().await,
			Command::ForegroundTick => self.foreground_tick().await,
			Command::Snapshot(reply) => {
				let _ = reply.send(self.snapshot());
			}
			Command::IsEnabled(reply) => {
				let _ = reply.send(self.state.enabled);
			}
			Command::GetAttribution(reply) => {
				let _ = reply.send(self.reconciler.current().cloned());
			}
			Command::Shutdown(ack) => self.begin_shutdown(ack).await,
		}
	}

	async fn subsession_start(&mut self) {
		if !self.state.enabled {
			debug!("handler disabled, ignoring subsession start");
			self.sessions.mark_foreground();
			return;
		}
		self.open_subsession().await;
		self.drain();
	}

	async fn open_subsession(&mut self) {
		let now = self.clock.now();
		let builder = &self.builder;
		let (transition, package) = self
			.sessions
			.start_subsession(&mut self.state, now, |state| builder.session(state, now));

		debug!(?transition, "subsession start");
		self.persist_state().await;
		if let Some(package) = package {
			self.queue.enqueue(package).await;
		}
		self.start_tick();
	}

	async fn subsession_end(&mut self) {
		let now = self.clock.now();
		self.sessions.end_subsession(&mut self.state, now);
		self.stop_tick();
		self.persist_state().await;
		debug!(session_count = self.state.session_count, "subsession end");
	}

	async fn track_event(&mut self, event: Event) {
		if !self.state.enabled {
			debug!(token = event.token(), "handler disabled, dropping event");
			return;
		}
		if !self.state.has_session() {
			self.open_subsession().await;
		}

		let now = self.clock.now();
		self.sessions.tick(&mut self.state, now);
		self.state.event_count = self.state.event_count.saturating_add(1);
		self.state.updated_at = now;

		let package = self.builder.event(&self.state, &event, now);
		self.persist_state().await;
		self.enqueue(package).await;
	}

	async fn track_ad_revenue(&mut self, source: String, payload: serde_json::Value) {
		if !self.state.enabled {
			debug!(source = %source, "handler disabled, dropping ad revenue");
			return;
		}
		let now = self.clock.now();
		let package = self.builder.ad_revenue(&self.state, &source, &payload, now);
		self.enqueue(package).await;
	}

	async fn set_enabled(&mut self, enabled: bool) {
		if self.state.enabled == enabled {
			debug!(enabled, "enabled state unchanged");
			return;
		}

		self.state.enabled = enabled;
		self.state.updated_at = self.clock.now();
		self.worker.set_enabled(enabled);
		self.persist_state().await;
		info!(enabled, "handler {}", if enabled { "enabled" } else { "disabled" });

		if !enabled {
			self.stop_tick();
			return;
		}
		if self.sessions.is_foreground() {
			self.open_subsession().await;
		}
		self.drain();
	}

	fn set_offline_mode(&mut self, offline: bool) {
		if self.worker.is_offline() == offline {
			return;
		}
		self.worker.set_offline(offline);
		info!(offline, "offline mode {}", if offline { "enabled" } else { "disabled" });
		if !offline {
			self.drain();
		}
	}

	async fn set_device_token(&mut self, token: Vec<u8>) {
		if self.state.device_token.as_deref() == Some(token.as_slice()) {
			debug!("push token unchanged");
			return;
		}

		let now = self.clock.now();
		self.state.device_token = Some(token.clone());
		self.state.updated_at = now;
		self.persist_state().await;

		if !self.state.enabled {
			debug!("handler disabled, push token stored without sending");
			return;
		}
		let package = self.builder.push_token(&self.state, &token, now);
		self.enqueue(package).await;
	}

	async fn open_url(&mut self, click: DeeplinkClick) {
		if !self.state.enabled {
			debug!(url = %click.url, "handler disabled, ignoring deep link");
			return;
		}

		let now = self.clock.now();
		let details = ClickDetails {
			click_time: Some(now),
			hints: click.hints,
			params: click.params,
			deeplink: Some(click.url),
			..ClickDetails::new(ClickSource::Deeplink)
		};
		let package = self.builder.click(&self.state, &details, now);
		self.enqueue(package).await;
	}

	async fn set_iad_date(&mut self, impression: DateTime<Utc>, purchase: Option<DateTime<Utc>>) {
		if !self.state.enabled {
			debug!("handler disabled, ignoring iAd dates");
			return;
		}
		if self.state.iad_sent {
			debug!("iAd click already sent");
			return;
		}

		let now = self.clock.now();
		let details = ClickDetails {
			click_time: Some(impression),
			purchase_time: purchase,
			..ClickDetails::new(ClickSource::Iad)
		};
		let package = self.builder.click(&self.state, &details, now);

		self.state.iad_sent = true;
		self.state.updated_at = now;
		self.persist_state().await;
		self.enqueue(package).await;
	}

	async fn set_asking_attribution(&mut self, asking: bool) {
		if self.state.asking_attribution == asking {
			return;
		}
		self.state.asking_attribution = asking;
		self.persist_state().await;
	}

	/// Stores a candidate attribution and reacts to a genuine change.
	///
	/// With `launch_deeplink` set, an accompanying deep link is tracked as a
	/// click and handed to the observers.
	async fn update_attribution(
		&mut self,
		candidate: Attribution,
		deeplink: Option<String>,
		launch_deeplink: bool,
	) -> bool {
		if !self.reconciler.update(candidate.clone()).await {
			return false;
		}

		for observer in &self.observers {
			observer.on_attribution_changed(&candidate).await;
		}

		if let Some(url) = deeplink {
			if launch_deeplink && self.state.enabled {
				let now = self.clock.now();
				let details = ClickDetails {
					click_time: Some(now),
					hints: candidate,
					deeplink: Some(url.clone()),
					..ClickDetails::new(ClickSource::AttributionDeeplink)
				};
				let package = self.builder.click(&self.state, &details, now);
				self.enqueue(package).await;
				self.notify_deeplink(&url, DeeplinkOrigin::Attribution).await;
			}
		}
		true
	}

	/// Routes a terminal delivery outcome to observers and the reconciler.
	async fn finished_tracking(&mut self, response: ResponseData) {
		debug!(kind = %response.kind, success = response.success, "finished tracking");

		for observer in &self.observers {
			observer.on_finished_tracking(&response).await;
		}

		if let Some(skew) = response.clock_skew(self.clock.now()) {
			if skew.num_seconds().abs() > 60 {
				warn!(skew_secs = skew.num_seconds(), "device clock differs from server time");
			}
		}

		if let Some(attribution) = response.attribution.clone() {
			let launch = self.config.launch_deferred_deeplink;
			self.update_attribution(attribution, response.deeplink.clone(), launch).await;
			self.set_asking_attribution(false).await;
			if let Some(url) = self.pending_session_deeplink.take() {
				self.notify_deeplink(&url, DeeplinkOrigin::Session).await;
			}
		}

		if let Some(ask_in) = response.ask_in {
			info!(ask_in_ms = ask_in.as_millis() as u64, "server asked for an attribution check");
			self.set_asking_attribution(true).await;
			self.schedule_attribution_check(ask_in);
			return;
		}

		if !response.success || response.attribution.is_some() {
			return;
		}
		match response.kind {
			ActivityKind::Attribution => self.set_asking_attribution(false).await,
			ActivityKind::Session if self.state.asking_attribution => self.enqueue_attribution_check().await,
			_ => {}
		}
	}

	async fn launch_session_deeplink(&mut self, url: String) {
		if self.reconciler.current().is_some() && !self.state.asking_attribution {
			self.notify_deeplink(&url, DeeplinkOrigin::Session).await;
		} else {
			debug!(url = %url, "holding session deep link until attribution resolves");
			self.pending_session_deeplink = Some(url);
		}
	}

	async fn notify_deeplink(&self, url: &str, origin: DeeplinkOrigin) {
		info!(url, ?origin, "launching deep link");
		for observer in &self.observers {
			observer.on_deeplink(url, origin).await;
		}
	}

	async fn send_finished(&mut self, result: Result<ResponseData, TransportError>) {
		if let Some(report) = self.worker.complete(&mut self.queue, result).await {
			if let DeliveryReport::Retrying { delay, .. } = &report {
				self.schedule_retry(*delay);
			}
			if let Some(response) = report.terminal_response() {
				self.finished_tracking(response.clone()).await;
			}
		}

		if let Some(ack) = self.shutdown_ack.take() {
			self.finish_shutdown(ack).await;
			return;
		}
		self.drain();
	}

	async fn attribution_check_due(&mut self) {
		self.attribution_task = None;
		if !self.state.enabled {
			debug!("handler disabled, skipping attribution check");
			return;
		}
		self.enqueue_attribution_check().await;
	}

	async fn enqueue_attribution_check(&mut self) {
		if self.queue.contains_kind(ActivityKind::Attribution) {
			debug!("attribution check already queued");
			return;
		}
		let package = self.builder.attribution(&self.state, self.clock.now());
		self.enqueue(package).await;
	}

	async fn foreground_tick(&mut self) {
		if !self.state.enabled {
			return;
		}
		let now = self.clock.now();
		if self.sessions.tick(&mut self.state, now) {
			self.persist_state().await;
		}
		self.drain();
	}

	async fn begin_shutdown(&mut self, ack: oneshot::Sender<()>) {
		info!(queued = self.queue.len(), "shutting down activity handler");
		self.stop_timers();
		if self.worker.is_in_flight() {
			self.shutdown_ack = Some(ack);
			return;
		}
		self.finish_shutdown(ack).await;
	}

	async fn finish_shutdown(&mut self, ack: oneshot::Sender<()>) {
		self.persist_state().await;
		let _ = ack.send(());
		self.stopped = true;
	}

	fn snapshot(&self) -> HandlerSnapshot {
		HandlerSnapshot {
			state: self.state.clone(),
			queue_len: self.queue.len(),
			queued_kinds: self.queue.iter().map(ActivityPackage::kind).collect(),
			in_flight: self.worker.is_in_flight(),
			retry_scheduled: self.worker.is_retry_scheduled(),
			offline: self.worker.is_offline(),
			phase: self.sessions.phase(),
			attribution: self.reconciler.current().cloned(),
		}
	}

	async fn enqueue(&mut self, package: ActivityPackage) {
		self.queue.enqueue(package).await;
		self.drain();
	}

	/// Starts the next send if the worker allows it.
	fn drain(&mut self) {
		if self.shutdown_ack.is_some() || self.stopped {
			return;
		}
		let Some(task) = self.worker.begin(&self.queue) else {
			return;
		};

		let tx = self.tx.clone();
		tokio::spawn(async move {
			let result = task.run().await;
			if let Some(tx) = tx.upgrade() {
				let _ = tx.send(Command::SendFinished(result));
			}
		});
	}

	async fn persist_state(&self) {
		write_record(self.storage.as_ref(), StorageKey::ActivityState, &self.state).await;
	}

	fn schedule_retry(&mut self, delay: Duration) {
		if let Some(task) = self.retry_task.take() {
			task.abort();
		}
		self.retry_task = Some(self.send_later(delay, || Command::RetryDue));
	}

	fn schedule_attribution_check(&mut self, delay: Duration) {
		if let Some(task) = self.attribution_task.take() {
			task.abort();
		}
		self.attribution_task = Some(self.send_later(delay, || Command::AttributionCheckDue));
	}

	fn send_later(&self, delay: Duration, command: fn() -> Command) -> JoinHandle<()> {
		let tx = self.tx.clone();
		tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			if let Some(tx) = tx.upgrade() {
				let _ = tx.send(command());
			}
		})
	}

	fn start_tick(&mut self) {
		if self.tick_task.as_ref().is_some_and(|task| !task.is_finished()) {
			return;
		}
		let period = self.config.foreground_tick;
		let tx = self.tx.clone();
		self.tick_task = Some(tokio::spawn(async move {
			let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
			loop {
				interval.tick().await;
				let Some(tx) = tx.upgrade() else {
					break;
				};
				if tx.send(Command::ForegroundTick).is_err() {
					break;
				}
			}
		}));
	}

	fn stop_tick(&mut self) {
		if let Some(task) = self.tick_task.take() {
			task.abort();
		}
	}

	fn stop_timers(&mut self) {
		self.stop_tick();
		for task in [self.retry_task.take(), self.attribution_task.take()].into_iter().flatten() {
			task.abort();
		}
	}
}
