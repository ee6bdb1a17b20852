//! Crate-level error taxonomy shared by the token chain, signer, limiter, and session.

// self
use crate::{_prelude::*, auth::TokenKind, ratelimit::Direction};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// An identity endpoint rejected the request or returned an unusable envelope.
	#[error(transparent)]
	Authentication(#[from] AuthenticationError),
	/// The OAuth2 step requires a second factor that must be completed out-of-band.
	#[error("Two-factor authentication is required: {message}.")]
	TwoFactorRequired {
		/// Provider-supplied description of the challenge.
		message: String,
		/// Raw server payload describing the challenge.
		challenge: serde_json::Value,
	},
	/// Key, signature, or canonicalization failure.
	#[error(transparent)]
	Signature(#[from] SignatureError),
	/// Client-side admission check refused the call before it reached the network.
	#[error("Rate limit exceeded for {direction} calls; retry after {retry_after}.")]
	RateLimitExceeded {
		/// Traffic direction that ran out of budget.
		direction: Direction,
		/// Time until the most constraining window frees a slot.
		retry_after: Duration,
	},
	/// Operation attempted without a prerequisite token.
	#[error(transparent)]
	State(#[from] StateError),
	/// Transport failure passed through from the HTTP layer.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Persisted-session backend failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
}
impl Error {
	/// Returns the retry hint carried by [`Error::RateLimitExceeded`].
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
			_ => None,
		}
	}
}

/// Identity-endpoint failures. None of these are retried automatically.
#[derive(Debug, ThisError)]
pub enum AuthenticationError {
	/// The endpoint answered with a non-success HTTP status.
	#[error("The {endpoint} endpoint rejected the request with HTTP {status}: {reason}.")]
	Rejected {
		/// Token step whose endpoint failed.
		endpoint: TokenKind,
		/// HTTP status code.
		status: u16,
		/// Numeric `XErr` code reported by the service, when present.
		xerr: Option<u64>,
		/// Short description derived from the response.
		reason: String,
	},
	/// The response body could not be decoded into the expected envelope.
	#[error("The {endpoint} endpoint returned a malformed token envelope.")]
	InvalidEnvelope {
		/// Token step whose endpoint failed.
		endpoint: TokenKind,
		/// Structured decoding failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The envelope decoded but violates a token invariant.
	#[error("The {endpoint} endpoint returned an invalid token envelope: {reason}.")]
	EnvelopeValidation {
		/// Token step whose endpoint failed.
		endpoint: TokenKind,
		/// Violated invariant.
		reason: String,
	},
	/// The OAuth2 token endpoint rejected the grant (bad code, expired or revoked refresh token).
	#[error("The OAuth2 token endpoint rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// OAuth2 client authentication failed.
	#[error("OAuth2 client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// The OAuth2 token endpoint answered with something other than a token or a known error.
	#[error("The OAuth2 token endpoint returned an unexpected response: {reason}.")]
	OAuthEndpoint {
		/// Description of the failure.
		reason: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// The OAuth2 token expired and there is no refresh token to renew it.
	#[error("The OAuth2 token expired without a refresh token; interactive login is required.")]
	InteractiveLoginRequired,
	/// A refresh this caller waited on failed.
	#[error("A concurrent token refresh failed; retry the operation.")]
	ConcurrentRefreshFailed {
		/// How the awaited refresh ended, when it recorded a failure.
		cause: Option<RefreshFailure>,
	},
}

/// Summary of the error an awaited refresh ended with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshFailure {
	/// Failure class.
	pub kind: RefreshFailureKind,
	/// Display text of the original error.
	pub message: String,
}
impl From<&Error> for RefreshFailure {
	fn from(err: &Error) -> Self {
		let kind = match err {
			Error::Authentication(AuthenticationError::InteractiveLoginRequired)
			| Error::State(StateError::MissingOAuthToken) =>
				RefreshFailureKind::InteractiveLoginRequired,
			Error::Authentication(AuthenticationError::InvalidGrant { .. }) =>
				RefreshFailureKind::InvalidGrant,
			Error::Authentication(AuthenticationError::InvalidClient { .. }) =>
				RefreshFailureKind::InvalidClient,
			Error::TwoFactorRequired { .. } => RefreshFailureKind::TwoFactorRequired,
			Error::Authentication(
				AuthenticationError::Rejected { .. }
				| AuthenticationError::InvalidEnvelope { .. }
				| AuthenticationError::EnvelopeValidation { .. },
			) => RefreshFailureKind::IdentityRejected,
			Error::Transport(_) => RefreshFailureKind::Transport,
			_ => RefreshFailureKind::Other,
		};

		Self { kind, message: err.to_string() }
	}
}

/// Failure classes shared with callers that waited on a refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshFailureKind {
	/// The OAuth2 root cannot be renewed without a new login.
	InteractiveLoginRequired,
	/// The token endpoint rejected the refresh token.
	InvalidGrant,
	/// The token endpoint rejected the client credentials.
	InvalidClient,
	/// The token endpoint asked for a second factor.
	TwoFactorRequired,
	/// An identity endpoint rejected the request or returned an unusable envelope.
	IdentityRejected,
	/// The transport failed.
	Transport,
	/// Any other failure.
	Other,
}

/// Signing-key, signature, and canonicalization failures.
#[derive(Debug, ThisError)]
pub enum SignatureError {
	/// Key material could not be parsed or generated.
	#[error("Signing key is invalid: {reason}.")]
	InvalidKey {
		/// Description of the failure.
		reason: String,
	},
	/// Raw `r || s` bytes have the wrong length.
	#[error("Signature must be {expected} bytes, got {actual}.")]
	MalformedSignature {
		/// Required length.
		expected: usize,
		/// Observed length.
		actual: usize,
	},
	/// Header value is not valid base64.
	#[error("Signature header is not valid base64.")]
	MalformedHeader {
		/// Underlying decoding failure.
		#[source]
		source: base64::DecodeError,
	},
	/// Header carries a different signature version than the active policy.
	#[error("Signature header carries version {found}, expected {expected}.")]
	VersionMismatch {
		/// Version required by the policy.
		expected: u32,
		/// Version found in the header.
		found: u32,
	},
	/// A canonicalized text field contains non-ASCII characters.
	#[error("The {field} field must be ASCII.")]
	NonAscii {
		/// Field name.
		field: &'static str,
	},
	/// Timestamp cannot be represented as a FILETIME.
	#[error("Timestamp is outside the FILETIME range.")]
	TimestampOutOfRange,
	/// ECDSA operation failed.
	#[error("ECDSA operation failed.")]
	Ecdsa {
		/// Underlying failure.
		#[source]
		source: p256::ecdsa::Error,
	},
}

/// Failures caused by calling an operation before its prerequisite token exists.
#[derive(Debug, ThisError)]
pub enum StateError {
	/// No OAuth2 token has been loaded or obtained.
	#[error("No OAuth2 token is loaded; complete the interactive login first.")]
	MissingOAuthToken,
	/// No XSTS token is present.
	#[error("No XSTS token is available.")]
	MissingXstsToken,
	/// The XSTS token is present but expired.
	#[error("The XSTS token expired at {expired_at}.")]
	XstsTokenExpired {
		/// Expiry instant of the stale token.
		expired_at: OffsetDateTime,
	},
	/// Chain transition not permitted from the current state.
	#[error("Token chain cannot move from {from} to {to}.")]
	InvalidTransition {
		/// Current state label.
		from: &'static str,
		/// Requested state label.
		to: &'static str,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A header value contains characters HTTP does not allow.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeader {
		/// Header name.
		name: String,
	},
	/// Descriptor or request URL cannot be parsed.
	#[error("URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::ProviderDescriptorError),
	/// Scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Rate-limit table is unusable.
	#[error("Rate limit configuration is invalid: {reason}.")]
	InvalidRateLimit {
		/// Description of the problem.
		reason: String,
	},
	/// An authorization-code flow was started without a redirect URI.
	#[error("A redirect URI is required for the authorization code flow.")]
	MissingRedirectUri,
	/// Request body could not be encoded.
	#[error("Request body could not be serialized.")]
	Serialization {
		/// Underlying encoding failure.
		#[source]
		source: serde_json::Error,
	},
	/// OAuth2 token response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// OAuth2 token response carried an out-of-range `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures. Never interpreted or retried by this crate.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a failure.
	#[error("HTTP transport failed.")]
	Network {
		/// Transport-specific error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;

	#[test]
	fn rate_limit_error_exposes_retry_hint() {
		let err = Error::RateLimitExceeded {
			direction: Direction::Write,
			retry_after: Duration::seconds(3),
		};

		assert_eq!(err.retry_after(), Some(Duration::seconds(3)));
		assert!(err.to_string().contains("write"));
		assert_eq!(Error::from(StateError::MissingXstsToken).retry_after(), None);
	}

	#[test]
	fn refresh_failure_classifies_the_original_error() {
		let grant = RefreshFailure::from(&Error::from(AuthenticationError::InvalidGrant {
			reason: "revoked".into(),
		}));

		assert_eq!(grant.kind, RefreshFailureKind::InvalidGrant);
		assert!(grant.message.contains("revoked"));

		let challenge = RefreshFailure::from(&Error::TwoFactorRequired {
			message: "mfa".into(),
			challenge: serde_json::Value::Null,
		});

		assert_eq!(challenge.kind, RefreshFailureKind::TwoFactorRequired);
	}

	#[test]
	fn transport_error_keeps_source() {
		let io = std::io::Error::other("socket closed");
		let err: Error = TransportError::network(io).into();
		let source = StdError::source(&err).expect("Transport errors should expose a source.");

		assert_eq!(source.to_string(), "socket closed");
	}
}
