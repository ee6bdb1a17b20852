//! Signed request dispatch on top of an [`AuthenticationManager`].
//!
//! [`SignedSession::dispatch`] refreshes the chain, attaches `Authorization`, `MS-CV`, and
//! (when requested) `Signature`, applies the caller's extras, reserves a rate-limit slot, and
//! sends the request through the manager's transport. Transport failures are returned as-is and
//! release the reservation; nothing is retried.

mod correlation;
mod request;

pub use correlation::*;
pub use oauth2::http::Method;
pub use request::*;

// crates.io
use oauth2::http::{
	HeaderMap, HeaderName, HeaderValue, Request,
	header::{AUTHORIZATION, CONTENT_TYPE},
};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::{self, HttpResponse, HttpTransport, path_and_query},
	manager::AuthenticationManager,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

const MS_CV: &str = "ms-cv";
const SIGNATURE: &str = "signature";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Dispatches requests with the manager's credentials and a shared correlation vector.
pub struct SignedSession<C>
where
	C: ?Sized + HttpTransport,
{
	manager: Arc<AuthenticationManager<C>>,
	cv: CorrelationVector,
}
impl<C> SignedSession<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a session with a random correlation vector.
	pub fn new(manager: Arc<AuthenticationManager<C>>) -> Self {
		Self { manager, cv: CorrelationVector::new() }
	}

	/// Replaces the correlation vector.
	pub fn with_correlation_vector(mut self, cv: CorrelationVector) -> Self {
		self.cv = cv;

		self
	}

	/// Manager supplying tokens, signer, and transport.
	pub fn manager(&self) -> &Arc<AuthenticationManager<C>> {
		&self.manager
	}

	/// Correlation vector used for `MS-CV`.
	pub fn correlation_vector(&self) -> &CorrelationVector {
		&self.cv
	}

	/// Sends `request`.
	pub async fn dispatch(&self, request: DispatchRequest) -> Result<HttpResponse> {
		const KIND: FlowKind = FlowKind::Dispatch;

		let span = FlowSpan::new(KIND, "dispatch");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.send(request)).await;

		obs::record_flow_outcome(
			KIND,
			if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		result
	}

	/// `GET url`.
	pub async fn get(&self, url: Url) -> Result<HttpResponse> {
		self.dispatch(DispatchRequest::new(Method::GET, url)).await
	}

	/// `HEAD url`.
	pub async fn head(&self, url: Url) -> Result<HttpResponse> {
		self.dispatch(DispatchRequest::new(Method::HEAD, url)).await
	}

	/// `OPTIONS url`.
	pub async fn options(&self, url: Url) -> Result<HttpResponse> {
		self.dispatch(DispatchRequest::new(Method::OPTIONS, url)).await
	}

	/// `DELETE url`.
	pub async fn delete(&self, url: Url) -> Result<HttpResponse> {
		self.dispatch(DispatchRequest::new(Method::DELETE, url)).await
	}

	/// `POST url` with `body`.
	pub async fn post(&self, url: Url, body: impl Into<Vec<u8>>) -> Result<HttpResponse> {
		self.dispatch(DispatchRequest::new(Method::POST, url).body(body)).await
	}

	/// `PUT url` with `body`.
	pub async fn put(&self, url: Url, body: impl Into<Vec<u8>>) -> Result<HttpResponse> {
		self.dispatch(DispatchRequest::new(Method::PUT, url).body(body)).await
	}

	/// `PATCH url` with `body`.
	pub async fn patch(&self, url: Url, body: impl Into<Vec<u8>>) -> Result<HttpResponse> {
		self.dispatch(DispatchRequest::new(Method::PATCH, url).body(body)).await
	}

	async fn send(&self, request: DispatchRequest) -> Result<HttpResponse> {
		let mut headers = HeaderMap::new();
		let mut authorization = String::new();

		if request.include_auth {
			self.manager.ensure_fresh().await?;

			authorization = self.manager.current_authorization_header()?;

			headers.insert(AUTHORIZATION, header_value(AUTHORIZATION.as_str(), &authorization)?);
		}
		if request.include_cv {
			headers.insert(MS_CV, header_value(MS_CV, &self.cv.increment())?);
		}

		let url = request.resolved_url();
		let body = request.resolved_body();

		if !request.form.is_empty() {
			headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_URLENCODED));
		}
		if request.signed {
			let signature = self.manager.signer().sign_now(
				request.method.as_str(),
				&path_and_query(&url),
				&body,
				&authorization,
			)?;

			headers.insert(SIGNATURE, header_value(SIGNATURE, &signature)?);
		}

		for (name, value) in &request.headers {
			let header = HeaderName::from_bytes(name.as_bytes())
				.map_err(|_| ConfigError::InvalidHeader { name: name.clone() })?;

			headers.insert(header, header_value(name, value)?);
		}

		let permit = match &request.limiter {
			Some(limiter) => Some(limiter.try_acquire(request.direction())?),
			None => None,
		};
		let mut outbound = Request::builder()
			.method(request.method.clone())
			.uri(url.as_str())
			.body(body)
			.map_err(ConfigError::from)?;

		*outbound.headers_mut() = headers;

		let response = http::execute(self.manager.http_client().as_ref(), outbound).await?;

		if let Some(permit) = permit {
			permit.commit();
		}

		Ok(response)
	}
}
impl<C> Debug for SignedSession<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SignedSession")
			.field("manager", &self.manager)
			.field("cv", &self.cv.value())
			.finish()
	}
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ConfigError> {
	HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidHeader { name: name.to_owned() })
}
