// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rust SDK for Loom install attribution.
//!
//! The [`ActivityHandler`] records app lifecycle signals (foreground,
//! background, custom events, deep link opens, push tokens) as durable
//! activity packages and delivers them to the attribution backend one at a
//! time, in the order they were built. Attribution returned by the backend is
//! stored and reported to registered observers only when it actually changes.
//!
//! # Overview
//!
//! - Sessions are split by inactivity gaps (30 minutes by default); shorter
//!   resumes count as subsessions.
//! - Packages survive restarts: the queue, counters and attribution are
//!   persisted after every change.
//! - Transient delivery failures are retried with capped exponential backoff;
//!   rejected packages are dropped so they never block the queue.
//!
//! # Example
//!
//! ```ignore
//! use loom_attribution::{ActivityHandler, Environment, Event};
//!
//! let handler = ActivityHandler::builder()
//!     .app_token("abcdefabcdef")
//!     .environment(Environment::Sandbox)
//!     .build()
//!     .await?;
//!
//! handler.track_subsession_start()?;
//! handler.track_event(Event::new("abc123").with_revenue(0.99, "EUR"))?;
//! handler.track_subsession_end()?;
//!
//! handler.shutdown().await?;
//! ```

pub mod builder;
pub mod clock;
pub mod config;
pub mod delivery;
mod engine;
pub mod error;
pub mod handler;
pub mod observer;
pub mod queue;
pub mod reconciler;
pub mod session;
pub mod storage;
pub mod transport;

pub use builder::{ClickDetails, ClickSource, PackageBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AttributionConfig, Environment, RetryPolicy, SessionPolicy, DEFAULT_BASE_URL};
pub use delivery::{DeliveryReport, DeliveryWorker, DropReason};
pub use engine::HandlerSnapshot;
pub use error::{AttributionError, Result, RetryableError};
pub use handler::{ActivityHandler, ActivityHandlerBuilder};
pub use observer::{ActivityObserver, DeeplinkOrigin, NoOpObserver, SharedObserver};
pub use session::{LifecyclePhase, SessionStateMachine, SubsessionTransition};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError, StorageKey};
pub use transport::{HttpTransport, Transport, TransportError};

pub use loom_attribution_core::{
	ActivityKind, ActivityPackage, ActivityState, Attribution, Event, Parameters, ResponseData,
};
