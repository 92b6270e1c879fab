// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Single-flight delivery of the package queue.
//!
//! The worker never awaits the network itself. [`DeliveryWorker::begin`]
//! hands out a [`SendTask`] for the head of the queue; the handler spawns it
//! and feeds the result back through [`DeliveryWorker::complete`] on the same
//! command sequence that owns the queue. Until then no other package may be
//! started, so the backend sees packages in the order they were built.

use std::sync::Arc;
use std::time::Duration;

use loom_attribution_core::{ActivityKind, ActivityPackage, ResponseData};
use tracing::{debug, error, info, warn};

use crate::config::RetryPolicy;
use crate::error::RetryableError;
use crate::queue::PackageQueue;
use crate::transport::{Transport, TransportError};

/// Why a package left the queue without being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
	/// The backend rejected the package; sending it again would not help.
	Rejected,
	/// The package failed as often as the retry policy allows.
	RetriesExhausted,
}

/// Outcome of one completed send.
#[derive(Debug)]
pub enum DeliveryReport {
	Delivered {
		package: ActivityPackage,
		response: ResponseData,
	},
	/// The head package stays queued and is attempted again after `delay`.
	Retrying {
		kind: ActivityKind,
		retries: u32,
		delay: Duration,
	},
	Dropped {
		package: ActivityPackage,
		reason: DropReason,
		response: ResponseData,
	},
}

impl DeliveryReport {
	/// Response for a terminal outcome, to be routed to `finished_tracking`.
	pub fn terminal_response(&self) -> Option<&ResponseData> {
		match self {
			DeliveryReport::Delivered { response, .. } | DeliveryReport::Dropped { response, .. } => {
				Some(response)
			}
			DeliveryReport::Retrying { .. } => None,
		}
	}
}

/// One request for the head package, detached from the worker.
pub struct SendTask {
	transport: Arc<dyn Transport>,
	package: ActivityPackage,
}

impl SendTask {
	pub fn package(&self) -> &ActivityPackage {
		&self.package
	}

	pub async fn run(self) -> Result<ResponseData, TransportError> {
		self.transport.send(&self.package).await
	}
}

/// Gatekeeper for the one request allowed in flight.
pub struct DeliveryWorker {
	transport: Arc<dyn Transport>,
	retry_policy: RetryPolicy,
	enabled: bool,
	offline: bool,
	in_flight: bool,
	retry_scheduled: bool,
}

impl DeliveryWorker {
	pub fn new(transport: Arc<dyn Transport>, retry_policy: RetryPolicy, enabled: bool) -> Self {
		Self {
			transport,
			retry_policy,
			enabled,
			offline: false,
			in_flight: false,
			retry_scheduled: false,
		}
	}

	pub fn set_enabled(&mut self, enabled: bool) {
		self.enabled = enabled;
	}

	/// Pauses or resumes sending without touching the queue.
	pub fn set_offline(&mut self, offline: bool) {
		self.offline = offline;
	}

	pub fn is_offline(&self) -> bool {
		self.offline
	}

	pub fn is_in_flight(&self) -> bool {
		self.in_flight
	}

	pub fn is_retry_scheduled(&self) -> bool {
		self.retry_scheduled
	}

	pub fn can_send(&self) -> bool {
		self.enabled && !self.offline && !self.in_flight && !self.retry_scheduled
	}

	/// Starts sending the head package, if sending is allowed right now.
	pub fn begin(&mut self, queue: &PackageQueue) -> Option<SendTask> {
		if !self.can_send() {
			return None;
		}
		let package = queue.peek_front()?.clone();

		debug!(
			kind = %package.kind(),
			suffix = package.suffix(),
			retries = package.retries(),
			queued = queue.len(),
			"sending package"
		);

		self.in_flight = true;
		Some(SendTask {
			transport: Arc::clone(&self.transport),
			package,
		})
	}

	/// The backoff delay for the head package has elapsed.
	pub fn retry_due(&mut self) {
		self.retry_scheduled = false;
	}

	/// Applies the result of the in-flight send to the queue.
	///
	/// Returns `None` when there was nothing in flight or the queue was emptied underneath.
	pub async fn complete(
		&mut self,
		queue: &mut PackageQueue,
		result: Result<ResponseData, TransportError>,
	) -> Option<DeliveryReport> {
		if !self.in_flight {
			warn!("send completion received with no request in flight");
			return None;
		}
		self.in_flight = false;

		match result {
			Ok(response) => {
				let package = queue.remove_front().await?;
				info!(
					kind = %package.kind(),
					suffix = package.suffix(),
					message = response.message.as_deref().unwrap_or_default(),
					"package delivered"
				);
				Some(DeliveryReport::Delivered { package, response })
			}
			Err(err) if err.is_retryable() => {
				let retries = queue.record_failure().await?;

				if self.retry_policy.is_exhausted(retries) {
					let package = queue.remove_front().await?;
					error!(
						kind = %package.kind(),
						suffix = package.suffix(),
						retries,
						error = %err,
						"dropping package after exhausting retries"
					);
					let response = failure_response(&package, &err);
					return Some(DeliveryReport::Dropped {
						package,
						reason: DropReason::RetriesExhausted,
						response,
					});
				}

				let delay = self.retry_policy.delay_for(retries);
				let kind = queue.peek_front()?.kind();
				warn!(
					kind = %kind,
					retries,
					delay_ms = delay.as_millis() as u64,
					error = %err,
					"package send failed, will retry"
				);
				self.retry_scheduled = true;
				Some(DeliveryReport::Retrying { kind, retries, delay })
			}
			Err(err) => {
				let package = queue.remove_front().await?;
				error!(
					kind = %package.kind(),
					suffix = package.suffix(),
					error = %err,
					"package rejected by server, dropping"
				);
				let response = match err {
					TransportError::Status {
						response: Some(response),
						..
					} => *response,
					other => failure_response(&package, &other),
				};
				Some(DeliveryReport::Dropped {
					package,
					reason: DropReason::Rejected,
					response,
				})
			}
		}
	}
}

fn failure_response(package: &ActivityPackage, err: &TransportError) -> ResponseData {
	ResponseData::failure(package.kind(), err.status(), err.to_string())
}
