// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sending a single package to the backend.

use std::time::Duration;

use async_trait::async_trait;
use loom_attribution_core::{ActivityPackage, ResponseData};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::error::{AttributionError, RetryableError};

/// Why a package could not be delivered.
#[derive(Debug, Error)]
pub enum TransportError {
	/// No connectivity, DNS failure, connection reset.
	#[error("connection failed: {0}")]
	Connectivity(String),

	#[error("request timed out")]
	Timeout,

	/// The server answered with a non-success status.
	#[error("server returned status {status}")]
	Status {
		status: u16,
		/// Parsed body, when the server sent one.
		response: Option<Box<ResponseData>>,
	},

	/// A success status with a body that is not a JSON object.
	#[error("malformed response: {0}")]
	MalformedResponse(String),
}

impl TransportError {
	pub fn status(&self) -> Option<u16> {
		match self {
			TransportError::Status { status, .. } => Some(*status),
			_ => None,
		}
	}
}

impl RetryableError for TransportError {
	fn is_retryable(&self) -> bool {
		match self {
			TransportError::Connectivity(_) | TransportError::Timeout => true,
			TransportError::MalformedResponse(_) => true,
			TransportError::Status { status, .. } => {
				matches!(*status, 408 | 429) || (500..600).contains(status)
			}
		}
	}
}

/// Issues one request for one package.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn send(&self, package: &ActivityPackage) -> Result<ResponseData, TransportError>;
}

/// Delivers packages over HTTPS with `reqwest`.
///
/// Attribution checks are sent as GET with the parameters in the query
/// string; everything else is a form-encoded POST.
pub struct HttpTransport {
	base_url: String,
	http: Client,
}

impl HttpTransport {
	pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AttributionError> {
		let base_url = base_url.into().trim_end_matches('/').to_string();
		url::Url::parse(&base_url).map_err(|e| AttributionError::InvalidBaseUrl(format!("{base_url}: {e}")))?;

		let http = Client::builder()
			.user_agent(format!("loom-attribution/{}", env!("CARGO_PKG_VERSION")))
			.timeout(timeout)
			.build()?;

		Ok(Self { base_url, http })
	}

	/// Uses an existing client, e.g. one shared with the rest of the app.
	pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
		Self {
			base_url: base_url.into().trim_end_matches('/').to_string(),
			http,
		}
	}

	fn url_for(&self, package: &ActivityPackage) -> String {
		format!("{}{}", self.base_url, package.path())
	}
}

#[async_trait]
impl Transport for HttpTransport {
	async fn send(&self, package: &ActivityPackage) -> Result<ResponseData, TransportError> {
		let url = self.url_for(package);
		let query = package.parameters().to_query_string();

		debug!(url = %url, kind = %package.kind(), retries = package.retries(), "sending package");

		let request = if package.kind().is_query() {
			self.http.get(format!("{url}?{query}"))
		} else {
			self
				.http
				.post(&url)
				.header(
					CONTENT_TYPE,
					HeaderValue::from_static("application/x-www-form-urlencoded"),
				)
				.body(query)
		};

		let response = request
			.header("Client-SDK", package.client_sdk())
			.send()
			.await
			.map_err(|e| {
				if e.is_timeout() {
					TransportError::Timeout
				} else {
					TransportError::Connectivity(e.to_string())
				}
			})?;

		let status = response.status();
		let body = response.text().await.map_err(|e| {
			if e.is_timeout() {
				TransportError::Timeout
			} else {
				TransportError::Connectivity(e.to_string())
			}
		})?;

		interpret(package, status, &body)
	}
}

fn interpret(
	package: &ActivityPackage,
	status: StatusCode,
	body: &str,
) -> Result<ResponseData, TransportError> {
	let parsed = ResponseData::parse(package.kind(), Some(status.as_u16()), body);

	if status.is_success() {
		return parsed.map_err(|e| TransportError::MalformedResponse(e.to_string()));
	}

	Err(TransportError::Status {
		status: status.as_u16(),
		response: parsed.ok().map(Box::new),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_attribution_core::{ActivityKind, Parameters};
	use wiremock::matchers::{body_string, header, method, path, query_param};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn package(kind: ActivityKind) -> ActivityPackage {
		let params: Parameters = [("app_token", "abcdefabcdef"), ("session_count", "1")]
			.into_iter()
			.collect();
		ActivityPackage::new(kind, "loom-attribution-rust/0.1.0", params, "")
	}

	fn transport(server: &MockServer) -> HttpTransport {
		HttpTransport::new(server.uri(), Duration::from_secs(5)).unwrap()
	}

	#[test]
	fn retryable_classification() {
		assert!(TransportError::Timeout.is_retryable());
		assert!(TransportError::Connectivity("reset".into()).is_retryable());
		assert!(TransportError::MalformedResponse("html".into()).is_retryable());
		for status in [408, 429, 500, 502, 503, 504] {
			let err = TransportError::Status { status, response: None };
			assert!(err.is_retryable(), "status {status} should be retryable");
		}
		for status in [400, 401, 403, 404, 422] {
			let err = TransportError::Status { status, response: None };
			assert!(!err.is_retryable(), "status {status} should not be retryable");
		}
	}

	#[tokio::test]
	async fn posts_form_body_in_parameter_order() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/session"))
			.and(header("Client-SDK", "loom-attribution-rust/0.1.0"))
			.and(body_string("app_token=abcdefabcdef&session_count=1"))
			.respond_with(
				ResponseTemplate::new(200).set_body_string(r#"{"message":"Session tracked"}"#),
			)
			.expect(1)
			.mount(&server)
			.await;

		let response = transport(&server)
			.send(&package(ActivityKind::Session))
			.await
			.unwrap();

		assert!(response.success);
		assert_eq!(response.kind, ActivityKind::Session);
		assert_eq!(response.message.as_deref(), Some("Session tracked"));
	}

	#[tokio::test]
	async fn shared_client_keeps_its_own_headers() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/event"))
			.and(header("User-Agent", "host-app/2.0"))
			.and(header("Client-SDK", "loom-attribution-rust/0.1.0"))
			.respond_with(ResponseTemplate::new(200).set_body_string("{}"))
			.expect(1)
			.mount(&server)
			.await;

		let http = Client::builder().user_agent("host-app/2.0").build().unwrap();
		let transport = HttpTransport::with_client(format!("{}/", server.uri()), http);

		let response = transport.send(&package(ActivityKind::Event)).await.unwrap();
		assert!(response.success);
		assert_eq!(response.kind, ActivityKind::Event);
	}

	#[tokio::test]
	async fn attribution_check_is_a_get_with_query() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/attribution"))
			.and(query_param("app_token", "abcdefabcdef"))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_string(r#"{"attribution":{"network":"fb"}}"#),
			)
			.expect(1)
			.mount(&server)
			.await;

		let response = transport(&server)
			.send(&package(ActivityKind::Attribution))
			.await
			.unwrap();

		assert_eq!(
			response.attribution.and_then(|a| a.network).as_deref(),
			Some("fb")
		);
	}

	#[tokio::test]
	async fn client_error_keeps_status_and_body() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/event"))
			.respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"bad token"}"#))
			.mount(&server)
			.await;

		let err = transport(&server)
			.send(&package(ActivityKind::Event))
			.await
			.unwrap_err();

		assert_eq!(err.status(), Some(400));
		assert!(!err.is_retryable());
		match err {
			TransportError::Status { response, .. } => {
				assert_eq!(response.unwrap().error.as_deref(), Some("bad token"));
			}
			other => panic!("unexpected error: {other:?}"),
		}
	}

	#[tokio::test]
	async fn server_error_is_retryable() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
			.mount(&server)
			.await;

		let err = transport(&server)
			.send(&package(ActivityKind::Session))
			.await
			.unwrap_err();

		assert_eq!(err.status(), Some(503));
		assert!(err.is_retryable());
	}

	#[tokio::test]
	async fn success_with_html_body_is_malformed() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
			.mount(&server)
			.await;

		let err = transport(&server)
			.send(&package(ActivityKind::Session))
			.await
			.unwrap_err();

		assert!(matches!(err, TransportError::MalformedResponse(_)));
		assert!(err.is_retryable());
	}

	#[tokio::test]
	async fn unreachable_host_is_connectivity_failure() {
		let transport =
			HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();

		let err = transport
			.send(&package(ActivityKind::Session))
			.await
			.unwrap_err();

		assert!(matches!(
			err,
			TransportError::Connectivity(_) | TransportError::Timeout
		));
	}

	#[test]
	fn rejects_invalid_base_url() {
		assert!(matches!(
			HttpTransport::new("not a url", Duration::from_secs(1)),
			Err(AttributionError::InvalidBaseUrl(_))
		));
	}
}
