// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Example: Track a session and an event with the loom-attribution SDK.
//!
//! Run with:
//!   LOOM_APP_TOKEN=abcdefabcdef cargo run --example track -p loom-attribution

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use loom_attribution::{
	ActivityHandler, ActivityObserver, Attribution, DeeplinkOrigin, Environment, Event, FileStorage,
	ResponseData,
};
use tracing_subscriber::EnvFilter;

struct PrintObserver;

#[async_trait]
impl ActivityObserver for PrintObserver {
	async fn on_finished_tracking(&self, response: &ResponseData) {
		println!(
			"finished {}: success={} message={:?}",
			response.kind, response.success, response.message
		);
	}

	async fn on_attribution_changed(&self, attribution: &Attribution) {
		println!("attribution changed: {attribution}");
	}

	async fn on_deeplink(&self, url: &str, origin: DeeplinkOrigin) {
		println!("deep link {url} ({origin:?})");
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let app_token = std::env::var("LOOM_APP_TOKEN").expect("LOOM_APP_TOKEN environment variable required");
	let base_url = std::env::var("LOOM_ATTRIBUTION_URL")
		.unwrap_or_else(|_| loom_attribution::DEFAULT_BASE_URL.to_string());
	let data_dir = std::env::temp_dir().join("loom-attribution-example");

	println!("Initializing attribution handler...");
	println!("  Base URL: {}", base_url);
	println!("  Data dir: {}", data_dir.display());

	let handler = ActivityHandler::builder()
		.app_token(app_token)
		.environment(Environment::Sandbox)
		.base_url(base_url)
		.device_info("os_name", std::env::consts::OS)
		.storage(Arc::new(FileStorage::new(data_dir)))
		.observer(Arc::new(PrintObserver))
		.build()
		.await?;

	// App comes to the foreground
	handler.track_subsession_start()?;

	handler.track_event(
		Event::new("abc123")
			.with_revenue(0.99, "EUR")
			.with_callback_parameter("order_id", "42"),
	)?;

	handler.app_will_open_url("myapp://promo?loom_campaign=spring&loom_foo=bar")?;

	tokio::time::sleep(Duration::from_secs(2)).await;

	// App goes to the background
	handler.track_subsession_end()?;

	let snapshot = handler.snapshot().await?;
	println!(
		"session_count={} subsession_count={} queued={}",
		snapshot.state.session_count, snapshot.state.subsession_count, snapshot.queue_len
	);

	handler.shutdown().await?;
	println!("Done!");

	Ok(())
}
