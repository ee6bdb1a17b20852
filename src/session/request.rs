//! Per-call dispatch options.

// crates.io
use oauth2::http::Method;
// self
use crate::{
	_prelude::*,
	ratelimit::{Direction, RateLimiter},
};

/// Request handed to [`SignedSession::dispatch`](crate::session::SignedSession::dispatch).
///
/// By default the request is authorized, carries an `MS-CV` header, is unsigned, and skips rate
/// limiting. Extra headers are applied after the computed ones, so a caller-supplied
/// `Authorization`, `MS-CV`, or `Signature` replaces the computed value.
#[derive(Clone, Debug)]
pub struct DispatchRequest {
	/// HTTP method.
	pub method: Method,
	/// Target URL.
	pub url: Url,
	/// Extra headers, applied last.
	pub headers: Vec<(String, String)>,
	/// Query parameters appended to the URL.
	pub query: Vec<(String, String)>,
	/// Form fields; when non-empty they replace `body` with an urlencoded payload.
	pub form: Vec<(String, String)>,
	/// Raw request body.
	pub body: Vec<u8>,
	/// Refreshes the chain and attaches `Authorization`.
	pub include_auth: bool,
	/// Attaches the next correlation vector value.
	pub include_cv: bool,
	/// Attaches a `Signature` header.
	pub signed: bool,
	/// Overrides the direction derived from the method.
	pub direction: Option<Direction>,
	/// Limiter consulted before the network call.
	pub limiter: Option<Arc<RateLimiter>>,
}
impl DispatchRequest {
	/// Creates a request with the default options.
	pub fn new(method: Method, url: Url) -> Self {
		Self {
			method,
			url,
			headers: Vec::new(),
			query: Vec::new(),
			form: Vec::new(),
			body: Vec::new(),
			include_auth: true,
			include_cv: true,
			signed: false,
			direction: None,
			limiter: None,
		}
	}

	/// Adds an extra header.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Adds a query parameter.
	pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((name.into(), value.into()));

		self
	}

	/// Adds a form field.
	pub fn form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.form.push((name.into(), value.into()));

		self
	}

	/// Sets the raw body.
	pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Serializes `value` as the JSON body and sets `Content-Type: application/json`.
	pub fn json<T>(self, value: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		let body = serde_json::to_vec(value)
			.map_err(|source| crate::error::ConfigError::Serialization { source })?;

		Ok(self.header("Content-Type", "application/json").body(body))
	}

	/// Skips the refresh and the `Authorization` header.
	pub fn without_auth(mut self) -> Self {
		self.include_auth = false;

		self
	}

	/// Skips the `MS-CV` header.
	pub fn without_cv(mut self) -> Self {
		self.include_cv = false;

		self
	}

	/// Requests a `Signature` header.
	pub fn signed(mut self) -> Self {
		self.signed = true;

		self
	}

	/// Forces the rate-limit direction.
	pub fn with_direction(mut self, direction: Direction) -> Self {
		self.direction = Some(direction);

		self
	}

	/// Reserves a slot in `limiter` before sending.
	pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
		self.limiter = Some(limiter);

		self
	}

	/// Direction charged against the limiter.
	pub fn direction(&self) -> Direction {
		self.direction.unwrap_or_else(|| Direction::from_method(&self.method))
	}

	/// Final URL with the query parameters appended.
	pub fn resolved_url(&self) -> Url {
		let mut url = self.url.clone();

		if !self.query.is_empty() {
			url.query_pairs_mut().extend_pairs(self.query.iter());
		}

		url
	}

	/// Final body: the urlencoded form when fields are present, otherwise the raw body.
	pub fn resolved_body(&self) -> Vec<u8> {
		if self.form.is_empty() {
			return self.body.clone();
		}

		url::form_urlencoded::Serializer::new(String::new())
			.extend_pairs(self.form.iter())
			.finish()
			.into_bytes()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("URL fixture should parse.")
	}

	#[test]
	fn direction_defaults_from_method() {
		let get = DispatchRequest::new(Method::GET, url("https://profile.xboxlive.com/users"));
		let post = DispatchRequest::new(Method::POST, url("https://profile.xboxlive.com/users"));

		assert_eq!(get.direction(), Direction::Read);
		assert_eq!(post.direction(), Direction::Write);
		assert_eq!(post.with_direction(Direction::Read).direction(), Direction::Read);
	}

	#[test]
	fn query_is_appended_to_existing_pairs() {
		let request =
			DispatchRequest::new(Method::GET, url("https://titlehub.xboxlive.com/titles?maxItems=5"))
				.query("decoration", "detail image");

		assert_eq!(
			request.resolved_url().as_str(),
			"https://titlehub.xboxlive.com/titles?maxItems=5&decoration=detail+image"
		);
	}

	#[test]
	fn form_fields_replace_raw_body() {
		let request = DispatchRequest::new(Method::POST, url("https://example.xboxlive.com/"))
			.body("ignored")
			.form("grant", "a b")
			.form("x", "1&2");

		assert_eq!(request.resolved_body(), b"grant=a+b&x=1%262".to_vec());
		assert_eq!(
			DispatchRequest::new(Method::POST, url("https://example.xboxlive.com/"))
				.body("raw")
				.resolved_body(),
			b"raw".to_vec()
		);
	}
}
