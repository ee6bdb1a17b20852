//! Persistence contract for the resumable part of a session.
//!
//! Only the OAuth2 token and the signing key survive a restart. Identity tokens are cheap to
//! re-derive, and a device token is bound to the key that proved possession of it, so the
//! bundled stores never persist them.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{OAuth2Token, TokenSecret},
};

/// Boxed future returned by [`SessionStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for persisted sessions.
pub trait SessionStore
where
	Self: Send + Sync,
{
	/// Loads the persisted session, if one was saved.
	fn load(&self) -> StoreFuture<'_, Option<PersistedSession>>;

	/// Persists or replaces the session.
	fn save(&self, session: PersistedSession) -> StoreFuture<'_, ()>;

	/// Removes any persisted session.
	fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Serialized session state: the OAuth2 root and, optionally, the signing key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedSession {
	/// OAuth2 token the chain is rebuilt from.
	pub oauth: OAuth2Token,
	/// SEC1 PEM of the signing key; a fresh key is generated when absent.
	#[serde(default)]
	pub signing_key_pem: Option<TokenSecret>,
}
impl PersistedSession {
	/// Creates a session holding only the OAuth2 token.
	pub fn new(oauth: OAuth2Token) -> Self {
		Self { oauth, signing_key_pem: None }
	}

	/// Attaches the signing key PEM.
	pub fn with_signing_key_pem(mut self, pem: TokenSecret) -> Self {
		self.signing_key_pem = Some(pem);

		self
	}
}

/// Error type produced by [`SessionStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::auth::ScopeSet;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "disk unavailable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("disk unavailable"));

		let source =
			StdError::source(&error).expect("Crate error should expose the store error as source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn persisted_session_tolerates_missing_key() {
		let payload = r#"{
			"oauth": {
				"token_type": "bearer",
				"expires_in": 86400,
				"scope": "Xboxlive.signin Xboxlive.offline_access",
				"access_token": "access",
				"refresh_token": "refresh",
				"issued": "2025-01-01T00:00:00Z"
			}
		}"#;
		let session: PersistedSession =
			serde_json::from_str(payload).expect("Session without a key should decode.");

		assert!(session.signing_key_pem.is_none());
		assert_eq!(session.oauth.scope, ScopeSet::xbox_live());
		assert_eq!(session.oauth.refresh_secret(), Some("refresh"));
	}
}
