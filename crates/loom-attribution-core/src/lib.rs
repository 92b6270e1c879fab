// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for Loom install attribution.
//!
//! This crate holds the runtime-free data model shared by the on-device SDK
//! (`loom-attribution`) and anything that needs to read its persisted records:
//! activity packages and their ordered parameters, the durable activity state,
//! attribution values, custom events and parsed backend responses.
//!
//! # Example
//!
//! ```
//! use loom_attribution_core::{ActivityKind, ActivityPackage, Parameters};
//!
//! let mut params = Parameters::new();
//! params.insert("session_count", 1);
//!
//! let package = ActivityPackage::new(ActivityKind::Session, "sdk/1.0", params, "");
//! assert_eq!(package.path(), "/session");
//! ```

pub mod attribution;
pub mod deeplink;
pub mod error;
pub mod event;
pub mod format;
pub mod kind;
pub mod package;
pub mod response;
pub mod state;

pub use attribution::Attribution;
pub use deeplink::{DeeplinkClick, DEEPLINK_PARAM_PREFIX};
pub use error::{CoreError, Result};
pub use event::{Event, EVENT_TOKEN_LENGTH};
pub use format::{format_date, format_duration, format_seconds_1970, parse_date};
pub use kind::ActivityKind;
pub use package::{ActivityPackage, Parameters};
pub use response::ResponseData;
pub use state::ActivityState;
