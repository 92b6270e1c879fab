// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Host callbacks for delivery outcomes, attribution and deep links.

use std::sync::Arc;

use async_trait::async_trait;
use loom_attribution_core::{Attribution, ResponseData};

/// Why a deep link is being handed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeeplinkOrigin {
	/// `launch_deeplink` was called.
	Direct,
	/// A deep link stored by `launch_session_deeplink` after attribution resolved.
	Session,
	/// The backend returned a deep link together with a changed attribution.
	Attribution,
}

/// Receives notifications from the handler loop.
///
/// Hooks are awaited in order on the handler's command sequence, so a slow
/// observer delays later commands. Spawn a task for long-running work.
#[async_trait]
pub trait ActivityObserver: Send + Sync {
	/// A package reached a terminal outcome: delivered or dropped.
	async fn on_finished_tracking(&self, _response: &ResponseData) {}

	async fn on_attribution_changed(&self, _attribution: &Attribution) {}

	async fn on_deeplink(&self, _url: &str, _origin: DeeplinkOrigin) {}
}

pub type SharedObserver = Arc<dyn ActivityObserver>;

/// Ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl ActivityObserver for NoOpObserver {}
