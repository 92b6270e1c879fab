// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host-facing handle and its builder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use loom_attribution_core::{Attribution, DeeplinkClick, Event, Parameters, ResponseData};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{AttributionConfig, Environment, RetryPolicy, SessionPolicy, DEFAULT_BASE_URL};
use crate::engine::{Command, Engine, EngineParts, HandlerSnapshot};
use crate::error::{AttributionError, Result};
use crate::observer::SharedObserver;
use crate::storage::{FileStorage, Storage};
use crate::transport::{HttpTransport, Transport};

/// Builder for constructing an [`ActivityHandler`].
pub struct ActivityHandlerBuilder {
	app_token: Option<String>,
	environment: Option<Environment>,
	base_url: Option<String>,
	default_tracker: Option<String>,
	session_policy: SessionPolicy,
	retry_policy: RetryPolicy,
	request_timeout: Option<Duration>,
	foreground_tick: Option<Duration>,
	launch_deferred_deeplink: bool,
	device_info: Parameters,
	storage: Option<Arc<dyn Storage>>,
	transport: Option<Arc<dyn Transport>>,
	clock: Option<Arc<dyn Clock>>,
	observers: Vec<SharedObserver>,
}

impl ActivityHandlerBuilder {
	pub fn new() -> Self {
		Self {
			app_token: None,
			environment: None,
			base_url: None,
			default_tracker: None,
			session_policy: SessionPolicy::default(),
			retry_policy: RetryPolicy::default(),
			request_timeout: None,
			foreground_tick: None,
			launch_deferred_deeplink: true,
			device_info: Parameters::new(),
			storage: None,
			transport: None,
			clock: None,
			observers: Vec::new(),
		}
	}

	/// Sets the app token from the dashboard (required).
	pub fn app_token(mut self, token: impl Into<String>) -> Self {
		self.app_token = Some(token.into());
		self
	}

	/// Sets the backend environment (required).
	pub fn environment(mut self, environment: Environment) -> Self {
		self.environment = Some(environment);
		self
	}

	pub fn base_url(mut self, url: impl Into<String>) -> Self {
		self.base_url = Some(url.into());
		self
	}

	pub fn default_tracker(mut self, tracker: impl Into<String>) -> Self {
		self.default_tracker = Some(tracker.into());
		self
	}

	pub fn session_policy(mut self, policy: SessionPolicy) -> Self {
		self.session_policy = policy;
		self
	}

	pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
		self.retry_policy = policy;
		self
	}

	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = Some(timeout);
		self
	}

	pub fn foreground_tick(mut self, interval: Duration) -> Self {
		self.foreground_tick = Some(interval);
		self
	}

	/// Whether deep links that arrive with a changed attribution are dispatched.
	pub fn launch_deferred_deeplink(mut self, launch: bool) -> Self {
		self.launch_deferred_deeplink = launch;
		self
	}

	/// Adds a host-provided value sent with every package.
	pub fn device_info(mut self, key: impl Into<String>, value: impl ToString) -> Self {
		self.device_info.insert(key, value);
		self
	}

	/// Overrides where records are persisted. Defaults to [`FileStorage::from_xdg`].
	pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
		self.storage = Some(storage);
		self
	}

	/// Overrides how packages are sent. Defaults to [`HttpTransport`].
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);
		self
	}

	pub fn observer(mut self, observer: SharedObserver) -> Self {
		self.observers.push(observer);
		self
	}

	/// Validates the configuration and assembles it without starting anything.
	pub fn config(&self) -> Result<AttributionConfig> {
		let app_token = self
			.app_token
			.clone()
			.ok_or_else(|| AttributionError::InvalidAppToken(String::new()))?;
		let environment = self.environment.ok_or(AttributionError::MissingEnvironment)?;

		let mut config = AttributionConfig::new(app_token, environment);
		config.base_url = self.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
		config.default_tracker = self.default_tracker.clone();
		config.session_policy = self.session_policy;
		config.retry_policy = self.retry_policy;
		if let Some(timeout) = self.request_timeout {
			config.request_timeout = timeout;
		}
		if let Some(tick) = self.foreground_tick {
			config.foreground_tick = tick;
		}
		config.launch_deferred_deeplink = self.launch_deferred_deeplink;
		config.device_info = self.device_info.clone();

		config.validate()?;
		Ok(config)
	}

	/// Loads persisted state and starts the handler loop.
	///
	/// Must be called from within a tokio runtime.
	pub async fn build(self) -> Result<ActivityHandler> {
		let config = self.config()?;

		let storage: Arc<dyn Storage> = match self.storage {
			Some(storage) => storage,
			None => Arc::new(FileStorage::from_xdg()?),
		};
		let transport: Arc<dyn Transport> = match self.transport {
			Some(transport) => transport,
			None => Arc::new(HttpTransport::new(&config.base_url, config.request_timeout)?),
		};
		let clock = self
			.clock
			.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);

		info!(
			environment = %config.environment,
			base_url = %config.base_url,
			"attribution handler initialized"
		);

		let (tx, task) = Engine::start(EngineParts {
			config,
			storage,
			transport,
			clock,
			observers: self.observers,
		})
		.await;

		Ok(ActivityHandler {
			inner: Arc::new(HandlerInner {
				tx,
				closed: AtomicBool::new(false),
				task: Mutex::new(Some(task)),
			}),
		})
	}
}

impl Default for ActivityHandlerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct HandlerInner {
	tx: mpsc::UnboundedSender<Command>,
	closed: AtomicBool,
	task: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap, cloneable handle to the activity handler.
///
/// Lifecycle and tracking calls return immediately: they are queued onto the
/// handler's command sequence and applied in call order. Only queries wait for
/// a reply.
#[derive(Clone)]
pub struct ActivityHandler {
	inner: Arc<HandlerInner>,
}

impl ActivityHandler {
	pub fn builder() -> ActivityHandlerBuilder {
		ActivityHandlerBuilder::new()
	}

	/// The app became active.
	pub fn track_subsession_start(&self) -> Result<()> {
		self.send(Command::SubsessionStart)
	}

	/// The app moved to the background.
	pub fn track_subsession_end(&self) -> Result<()> {
		self.send(Command::SubsessionEnd)
	}

	/// Validates and tracks a custom event.
	pub fn track_event(&self, event: Event) -> Result<()> {
		event.validate().map_err(AttributionError::InvalidEvent)?;
		self.send(Command::TrackEvent(event))
	}

	pub fn track_ad_revenue(&self, source: impl Into<String>, payload: serde_json::Value) -> Result<()> {
		self.send(Command::TrackAdRevenue {
			source: source.into(),
			payload,
		})
	}

	/// Reports a backend response as if a package had just finished.
	pub fn finished_tracking(&self, response: ResponseData) -> Result<()> {
		self.send(Command::FinishedTracking(response))
	}

	/// Disabling pauses delivery and stops new packages; queued packages are kept.
	pub fn set_enabled(&self, enabled: bool) -> Result<()> {
		self.send(Command::SetEnabled(enabled))
	}

	pub async fn is_enabled(&self) -> Result<bool> {
		self.query(Command::IsEnabled).await
	}

	/// Offline mode keeps building packages but holds them until switched off.
	pub fn set_offline_mode(&self, offline: bool) -> Result<()> {
		self.send(Command::SetOfflineMode(offline))
	}

	pub fn set_device_token(&self, token: impl Into<Vec<u8>>) -> Result<()> {
		self.send(Command::SetDeviceToken(token.into()))
	}

	/// Reports a deep link open.
	///
	/// Returns `false` when the URL carries no attribution parameters and was ignored.
	pub fn app_will_open_url(&self, url: &str) -> Result<bool> {
		let Some(click) = DeeplinkClick::parse(url).map_err(AttributionError::InvalidUrl)? else {
			debug!(url, "deep link has no attribution parameters");
			return Ok(false);
		};
		self.send(Command::OpenUrl(click))?;
		Ok(true)
	}

	/// Records iAd impression and purchase dates. Only the first call per install is sent.
	pub fn set_iad_date(&self, impression: DateTime<Utc>, purchase: Option<DateTime<Utc>>) -> Result<()> {
		self.send(Command::SetIadDate { impression, purchase })
	}

	pub async fn attribution(&self) -> Result<Option<Attribution>> {
		self.query(Command::GetAttribution).await
	}

	/// Replaces the stored attribution without notifying observers.
	pub fn set_attribution(&self, attribution: Option<Attribution>) -> Result<()> {
		self.send(Command::SetAttribution(attribution))
	}

	pub fn set_asking_attribution(&self, asking: bool) -> Result<()> {
		self.send(Command::SetAskingAttribution(asking))
	}

	/// Offers a candidate attribution, e.g. from a response delivered out of band.
	///
	/// When the attribution changed and `launch_deeplink` is set, `deeplink`
	/// is tracked as a click and handed to the observers.
	pub fn update_attribution(
		&self,
		attribution: Attribution,
		deeplink: Option<String>,
		launch_deeplink: bool,
	) -> Result<()> {
		self.send(Command::UpdateAttribution {
			attribution,
			deeplink,
			launch_deeplink,
		})
	}

	pub fn register_observer(&self, observer: SharedObserver) -> Result<()> {
		self.send(Command::RegisterObserver(observer))
	}

	/// Hands `url` to the observers right away.
	pub fn launch_deeplink(&self, url: impl Into<String>) -> Result<()> {
		self.send(Command::LaunchDeeplink(url.into()))
	}

	/// Hands `url` to the observers once attribution is known.
	pub fn launch_session_deeplink(&self, url: impl Into<String>) -> Result<()> {
		self.send(Command::LaunchSessionDeeplink(url.into()))
	}

	pub async fn snapshot(&self) -> Result<HandlerSnapshot> {
		self.query(Command::Snapshot).await
	}

	/// Stops the handler after any in-flight request resolves.
	///
	/// Queued packages stay persisted and are sent by the next handler.
	pub async fn shutdown(&self) -> Result<()> {
		if self.inner.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		let (ack, done) = oneshot::channel();
		if self.inner.tx.send(Command::Shutdown(ack)).is_ok() {
			let _ = done.await;
		}

		if let Some(task) = self.inner.task.lock().await.take() {
			if let Err(e) = task.await {
				warn!(error = %e, "activity handler task ended abnormally");
			}
		}

		info!("activity handler shut down");
		Ok(())
	}

	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::SeqCst)
	}

	fn send(&self, command: Command) -> Result<()> {
		if self.is_closed() {
			return Err(AttributionError::HandlerShutdown);
		}
		self
			.inner
			.tx
			.send(command)
			.map_err(|_| AttributionError::HandlerShutdown)
	}

	async fn query<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
		let (reply, response) = oneshot::channel();
		self.send(command(reply))?;
		response.await.map_err(|_| AttributionError::HandlerShutdown)
	}
}
