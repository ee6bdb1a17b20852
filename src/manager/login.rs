//! Interactive login and session restore.

// self
use crate::{
	_prelude::*,
	auth::{RefreshPlan, TokenChain, TokenKind},
	http::HttpTransport,
	manager::AuthenticationManager,
	oauth::AuthorizationRequest,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	signing::RequestSigner,
};

impl<C> AuthenticationManager<C>
where
	C: ?Sized + HttpTransport,
{
	/// Builds the Microsoft account authorize URL for the configured redirect URI and scopes.
	///
	/// Compare the returned `state` with the one echoed back on the redirect before calling
	/// [`request_tokens`](Self::request_tokens).
	pub fn authorization_url(&self) -> Result<AuthorizationRequest> {
		self.facade()?.authorization_url()
	}

	/// Exchanges an authorization code and builds the full token chain.
	pub async fn request_tokens(&self, code: &str) -> Result<Arc<TokenChain>> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "request_tokens");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				obs::record_identity_call(TokenKind::OAuth);

				let oauth = self.facade()?.exchange_code(self.http_client.as_ref(), code).await?;
				let _singleflight = self.refresh_guard.lock().await;
				let result = async {
					let chain = self.install(TokenChain::Empty.with_oauth(oauth));

					if let Some(oauth) = chain.oauth() {
						self.persist(oauth).await?;
					}

					self.derive_identity(KIND, chain.as_ref().clone(), RefreshPlan::Device).await
				}
				.await;

				self.finish_update(&result);

				result
			})
			.await;

		obs::record_flow_outcome(
			KIND,
			if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		result
	}

	/// Loads the persisted OAuth2 token (and signing key, when saved) from the attached store.
	///
	/// Returns `false` when no store is attached or the store is empty. Identity tokens are not
	/// persisted; the next [`ensure_fresh`](Self::ensure_fresh) derives them.
	pub async fn restore_from_store(&self) -> Result<bool> {
		let Some(store) = &self.store else {
			return Ok(false);
		};
		let Some(session) = store.load().await? else {
			return Ok(false);
		};
		let _singleflight = self.refresh_guard.lock().await;

		if let Some(pem) = &session.signing_key_pem {
			let signer = RequestSigner::from_pem(pem.expose())?
				.with_policy(self.descriptor.signature_policy.clone());

			*self.signer.write() = Arc::new(signer);
		}

		self.install(TokenChain::Empty.with_oauth(session.oauth));
		self.finish_update(&Ok(()));

		Ok(true)
	}

	/// Drops every token and clears the attached store.
	pub async fn sign_out(&self) -> Result<()> {
		let _singleflight = self.refresh_guard.lock().await;

		self.install(TokenChain::Empty);
		self.finish_update(&Ok(()));

		if let Some(store) = &self.store {
			store.clear().await?;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::*,
		error::{ConfigError, StateError},
		store::{MemoryStore, PersistedSession, SessionStore},
	};

	#[test]
	fn authorization_url_requires_redirect_uri() {
		let (manager, _) = fake_manager();
		let err = manager.authorization_url().expect_err("Redirect URI is mandatory.");

		assert!(matches!(err, Error::Config(ConfigError::MissingRedirectUri)));

		let manager = manager.with_redirect_uri(
			Url::parse("https://localhost/auth/callback").expect("Redirect fixture should parse."),
		);
		let request = manager.authorization_url().expect("Authorize URL should build.");
		let query = request.url.query().unwrap_or_default();

		assert!(request.url.as_str().starts_with("https://xbl.test/oauth20_authorize.srf?"));
		assert!(query.contains("response_type=code"));
		assert!(query.contains("approval_prompt=auto"));
		assert!(query.contains(&format!("state={}", request.state)));
	}

	#[tokio::test]
	async fn request_tokens_builds_chain_and_persists_session() {
		let (manager, transport) = fake_manager();
		let store = Arc::new(MemoryStore::default());
		let manager = manager
			.with_redirect_uri(
				Url::parse("https://localhost/auth/callback").expect("Redirect fixture should parse."),
			)
			.with_store(store.clone());
		let chain = manager.request_tokens("M.C123_BAY").await.expect("Login should succeed.");

		assert_eq!(chain.label(), "has_xsts");
		assert_eq!(transport.calls(TOKEN_PATH), 1);

		let body = transport.last_body(TOKEN_PATH).expect("Token endpoint should be called.");

		assert!(body.contains("grant_type=authorization_code"));
		assert!(body.contains("code=M.C123_BAY"));

		let saved = store.snapshot().expect("Login should persist the session.");

		assert_eq!(saved.oauth.access_token.expose(), "fresh-access");
		assert_eq!(saved.oauth.user_id, "msa-user");
	}

	#[tokio::test]
	async fn restore_reinstalls_token_and_signing_key() {
		let (manager, transport) = fake_manager();
		let signer = RequestSigner::generate();
		let pem = signer.export_pem().expect("Fresh key should export.");
		let store = Arc::new(MemoryStore::with_session(
			PersistedSession::new(fresh_oauth()).with_signing_key_pem(pem),
		));
		let manager = manager.with_store(store.clone());

		assert!(manager.restore_from_store().await.expect("Restore should succeed."));
		assert_eq!(manager.chain().label(), "has_oauth");
		assert_eq!(manager.signer().proof_key(), signer.proof_key());

		manager.ensure_fresh().await.expect("Restored root should derive identity tokens.");

		assert_eq!(transport.calls(TOKEN_PATH), 0);

		manager.sign_out().await.expect("Sign out should succeed.");

		assert!(store.load().await.expect("Load should succeed.").is_none());
		assert!(matches!(
			manager.ensure_fresh().await,
			Err(Error::State(StateError::MissingOAuthToken))
		));
	}

	#[tokio::test]
	async fn restore_without_store_is_a_no_op() {
		let (manager, _) = fake_manager();

		assert!(!manager.restore_from_store().await.expect("Restore should succeed."));
		assert_eq!(manager.chain().label(), "empty");
	}
}
