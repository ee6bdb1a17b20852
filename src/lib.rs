//! Xbox Live authentication core: single-flight refresh of the Microsoft account and Xbox Live
//! token chain, proof-of-possession request signing, and burst/sustain rate limiting.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod error;
pub mod http;
pub mod manager;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod ratelimit;
pub mod session;
pub mod signing;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Fixtures shared by unit tests; enabled via `cfg(test)` or the `test` crate feature.
	//!
	//! [`FakeTransport`] answers by URI path from a route table, records every request, and
	//! yields once per call so concurrent callers interleave on any executor.

	pub use crate::_prelude::*;

	// std
	use std::task::{Context, Poll};
	// crates.io
	use oauth2::{
		AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
		http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
	};
	use time::format_description::well_known::Rfc3339;
	// self
	use crate::{
		auth::{OAuth2Token, ScopeSet, TokenKind},
		http::{HttpTransport, ResponseMetadata, ResponseMetadataSlot},
		manager::AuthenticationManager,
		provider::ProviderDescriptor,
	};

	/// Base URL every fixture endpoint is rebased onto.
	pub const FIXTURE_BASE_URL: &str = "https://xbl.test/";
	/// Path of the OAuth2 token endpoint under [`FIXTURE_BASE_URL`].
	pub const TOKEN_PATH: &str = "/oauth20_token.srf";
	/// Path of the device endpoint.
	pub const DEVICE_PATH: &str = "/device/authenticate";
	/// Path of the title endpoint.
	pub const TITLE_PATH: &str = "/title/authenticate";
	/// Path of the user endpoint.
	pub const USER_PATH: &str = "/user/authenticate";
	/// Path of the XSTS endpoint.
	pub const XSTS_PATH: &str = "/xsts/authorize";
	/// User hash carried by the user and XSTS fixtures.
	pub const FIXTURE_USERHASH: &str = "2535405290";
	/// Xbox user id carried by the XSTS fixture.
	pub const FIXTURE_XUID: &str = "2535405291234567";

	/// Request captured by [`FakeTransport`].
	#[derive(Clone, Debug)]
	pub struct RecordedRequest {
		/// HTTP method.
		pub method: String,
		/// Full request URI.
		pub uri: String,
		/// URI path without the query.
		pub path: String,
		/// Header name/value pairs in send order.
		pub headers: Vec<(String, String)>,
		/// Body decoded as UTF-8 (lossy).
		pub body: String,
	}
	impl RecordedRequest {
		/// First value of `name`, compared case-insensitively.
		pub fn header(&self, name: &str) -> Option<&str> {
			self.headers
				.iter()
				.find(|(key, _)| key.eq_ignore_ascii_case(name))
				.map(|(_, value)| value.as_str())
		}
	}

	/// Error returned for paths configured with [`FakeTransport::fail`].
	#[derive(Debug, ThisError)]
	#[error("Fake transport refused the request to {path}.")]
	pub struct FakeTransportError {
		/// Path of the refused request.
		pub path: String,
	}

	#[derive(Clone, Debug)]
	struct Route {
		status: u16,
		body: String,
	}

	#[derive(Debug, Default)]
	struct FakeState {
		routes: HashMap<String, Route>,
		failing: Vec<String>,
		requests: Vec<RecordedRequest>,
	}

	/// In-process [`HttpTransport`] with a path-keyed route table.
	#[derive(Clone, Debug, Default)]
	pub struct FakeTransport(Arc<Mutex<FakeState>>);
	impl FakeTransport {
		/// Transport answering the OAuth2 token endpoint and all four identity endpoints with
		/// valid fixtures.
		pub fn xbox_live() -> Self {
			let transport = Self::default();

			transport.respond(TOKEN_PATH, 200, oauth_token_body());

			for (path, kind) in [
				(DEVICE_PATH, TokenKind::Device),
				(TITLE_PATH, TokenKind::Title),
				(USER_PATH, TokenKind::User),
				(XSTS_PATH, TokenKind::Xsts),
			] {
				transport.respond(path, 200, fresh_identity_body(kind));
			}

			transport
		}

		/// Answers `path` with `status` and a JSON `body`, replacing any earlier route.
		pub fn respond(&self, path: &str, status: u16, body: impl Into<String>) {
			let mut state = self.0.lock();

			state.failing.retain(|failing| failing != path);
			state.routes.insert(path.to_owned(), Route { status, body: body.into() });
		}

		/// Makes every request to `path` fail at the transport level.
		pub fn fail(&self, path: &str) {
			self.0.lock().failing.push(path.to_owned());
		}

		/// Number of requests sent to `path`.
		pub fn calls(&self, path: &str) -> usize {
			self.0.lock().requests.iter().filter(|request| request.path == path).count()
		}

		/// Number of requests sent anywhere.
		pub fn total_calls(&self) -> usize {
			self.0.lock().requests.len()
		}

		/// Requests sent to `path`, oldest first.
		pub fn requests(&self, path: &str) -> Vec<RecordedRequest> {
			self.0
				.lock()
				.requests
				.iter()
				.filter(|request| request.path == path)
				.cloned()
				.collect()
		}

		/// Body of the most recent request sent to `path`.
		pub fn last_body(&self, path: &str) -> Option<String> {
			self.requests(path).pop().map(|request| request.body)
		}

		fn route(&self, request: RecordedRequest) -> Option<Route> {
			let mut state = self.0.lock();
			let path = request.path.clone();

			state.requests.push(request);

			if state.failing.contains(&path) {
				return None;
			}

			Some(
				state
					.routes
					.get(&path)
					.cloned()
					.unwrap_or(Route { status: 404, body: String::new() }),
			)
		}
	}
	impl HttpTransport for FakeTransport {
		type Handle = FakeHandle;
		type TransportError = FakeTransportError;

		fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
			FakeHandle { transport: self.clone(), slot }
		}
	}

	/// Handle returned by [`FakeTransport`].
	#[derive(Clone, Debug)]
	pub struct FakeHandle {
		transport: FakeTransport,
		slot: ResponseMetadataSlot,
	}
	impl<'c> AsyncHttpClient<'c> for FakeHandle {
		type Error = HttpClientError<FakeTransportError>;
		type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

		fn call(&'c self, request: HttpRequest) -> Self::Future {
			Box::pin(async move {
				self.slot.take();

				YieldOnce::default().await;

				let recorded = RecordedRequest {
					method: request.method().to_string(),
					uri: request.uri().to_string(),
					path: request.uri().path().to_owned(),
					headers: request
						.headers()
						.iter()
						.map(|(name, value)| {
							(name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
						})
						.collect(),
					body: String::from_utf8_lossy(request.body()).into_owned(),
				};
				let path = recorded.path.clone();
				let Some(route) = self.transport.route(recorded) else {
					return Err(HttpClientError::Reqwest(Box::new(FakeTransportError { path })));
				};
				let status = StatusCode::from_u16(route.status)
					.map_err(|e| HttpClientError::Other(e.to_string()))?;
				let mut response = HttpResponse::new(route.body.into_bytes());

				*response.status_mut() = status;
				response
					.headers_mut()
					.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

				self.slot.store(ResponseMetadata {
					status: Some(route.status),
					retry_after: None,
					error_body: (!status.is_success()).then(|| response.body().clone()),
				});

				Ok(response)
			})
		}
	}

	#[derive(Default)]
	struct YieldOnce(bool);
	impl Future for YieldOnce {
		type Output = ();

		fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
			if self.0 {
				return Poll::Ready(());
			}

			self.0 = true;
			cx.waker().wake_by_ref();

			Poll::Pending
		}
	}

	/// Descriptor with every endpoint rebased onto [`FIXTURE_BASE_URL`].
	pub fn fixture_descriptor() -> ProviderDescriptor {
		ProviderDescriptor::builder()
			.base_url(Url::parse(FIXTURE_BASE_URL).expect("Fixture base URL should parse."))
			.build()
			.expect("Fixture descriptor should validate.")
	}

	/// Manager wired to a fresh [`FakeTransport::xbox_live`] transport.
	pub fn fake_manager() -> (AuthenticationManager<FakeTransport>, FakeTransport) {
		let transport = FakeTransport::xbox_live();
		let manager = AuthenticationManager::with_http_client(
			fixture_descriptor(),
			"0000000048183522",
			transport.clone(),
		);

		(manager, transport)
	}

	/// OAuth2 token valid for an hour, with a refresh token.
	pub fn fresh_oauth() -> OAuth2Token {
		OAuth2Token::bearer("access", Duration::hours(1), ScopeSet::xbox_live())
			.with_refresh_token("refresh-1")
	}

	/// Token endpoint response issuing `fresh-access` / `refresh-2`.
	pub fn oauth_token_body() -> String {
		serde_json::json!({
			"token_type": "bearer",
			"expires_in": 3600,
			"access_token": "fresh-access",
			"refresh_token": "refresh-2",
			"user_id": "msa-user",
		})
		.to_string()
	}

	/// Identity envelope for `kind` valid for sixteen hours from now.
	pub fn fresh_identity_body(kind: TokenKind) -> String {
		let token = match kind {
			TokenKind::OAuth => "oauth-token",
			TokenKind::Device => "device-token",
			TokenKind::Title => "title-token",
			TokenKind::User => "user-token",
			TokenKind::Xsts => "xsts-token",
		};

		identity_body(kind, token, OffsetDateTime::now_utc() + Duration::hours(16))
	}

	/// Identity envelope for `kind` expiring at `not_after`.
	pub fn identity_body(kind: TokenKind, token: &str, not_after: OffsetDateTime) -> String {
		let claims = match kind {
			TokenKind::OAuth => panic!("The OAuth2 step has no identity envelope."),
			TokenKind::Device => serde_json::json!({ "xdi": { "did": "F7000D3C1A2B3C4D" } }),
			TokenKind::Title => serde_json::json!({ "xti": { "tid": "1739947436" } }),
			TokenKind::User => serde_json::json!({ "xui": [{ "uhs": FIXTURE_USERHASH }] }),
			TokenKind::Xsts => serde_json::json!({
				"xui": [{ "uhs": FIXTURE_USERHASH, "xid": FIXTURE_XUID, "gtg": "Fixture" }]
			}),
		};
		let issued = not_after - Duration::hours(16);

		serde_json::json!({
			"IssueInstant": issued.format(&Rfc3339).expect("Fixture instant should format."),
			"NotAfter": not_after.format(&Rfc3339).expect("Fixture instant should format."),
			"Token": token,
			"DisplayClaims": claims,
		})
		.to_string()
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
