//! Authentication manager: owns the token chain and keeps it fresh.
//!
//! The manager holds the injected transport, the provider descriptor, the request signer, and
//! an immutable snapshot of the [`TokenChain`]. Readers clone the snapshot `Arc`; refreshes
//! build a new chain and swap it in wholesale, so a reader never observes a half-updated chain.
//! Refreshes are serialized by a single-flight guard (see [`AuthenticationManager::ensure_fresh`]).

mod identity;
mod login;
mod metrics;
mod refresh;

pub use metrics::RefreshMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{OAuth2Token, ScopeSet, TokenChain, XstsToken, Xuid},
	error::RefreshFailure,
	http::HttpTransport,
	oauth::MsaFacade,
	provider::ProviderDescriptor,
	signing::RequestSigner,
	store::{PersistedSession, SessionStore},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Manager specialized for the crate's default reqwest transport.
#[cfg(feature = "reqwest")]
pub type ReqwestAuthenticationManager = AuthenticationManager<ReqwestHttpClient>;

/// Coordinates the Microsoft account login and the Xbox Live token chain.
pub struct AuthenticationManager<C>
where
	C: ?Sized + HttpTransport,
{
	http_client: Arc<C>,
	descriptor: ProviderDescriptor,
	client_id: String,
	client_secret: Option<String>,
	redirect_uri: Option<Url>,
	scope: ScopeSet,
	signer: RwLock<Arc<RequestSigner>>,
	store: Option<Arc<dyn SessionStore>>,
	chain: RwLock<Arc<TokenChain>>,
	refresh_guard: AsyncMutex<()>,
	refresh_epoch: AtomicU64,
	last_failure: Mutex<Option<RefreshFailure>>,
	refresh_metrics: Arc<RefreshMetrics>,
}
impl<C> AuthenticationManager<C>
where
	C: ?Sized + HttpTransport,
{
	/// Creates a manager that reuses the caller-provided transport.
	///
	/// A fresh P-256 signing key is generated; replace it with
	/// [`with_signer`](Self::with_signer) or [`restore_from_store`](Self::restore_from_store)
	/// to keep device tokens bound to a persisted key.
	pub fn with_http_client(
		descriptor: ProviderDescriptor,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
	) -> Self {
		let signer = RequestSigner::generate().with_policy(descriptor.signature_policy.clone());

		Self {
			http_client: http_client.into(),
			descriptor,
			client_id: client_id.into(),
			client_secret: None,
			redirect_uri: None,
			scope: ScopeSet::xbox_live(),
			signer: RwLock::new(Arc::new(signer)),
			store: None,
			chain: Default::default(),
			refresh_guard: AsyncMutex::new(()),
			refresh_epoch: AtomicU64::new(0),
			last_failure: Mutex::new(None),
			refresh_metrics: Default::default(),
		}
	}

	/// Sets the client secret for confidential Microsoft account applications.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Sets the redirect URI used by the authorization-code flow.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// Overrides the requested OAuth2 scopes.
	pub fn with_scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Replaces the request signer; the descriptor's signature policy is applied to it.
	pub fn with_signer(mut self, signer: RequestSigner) -> Self {
		*self.signer.get_mut() =
			Arc::new(signer.with_policy(self.descriptor.signature_policy.clone()));

		self
	}

	/// Attaches a store that receives the OAuth2 token and signing key after each rotation.
	pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
		self.store = Some(store);

		self
	}

	/// Seeds the chain with a previously obtained OAuth2 token.
	pub fn with_oauth_token(mut self, oauth: OAuth2Token) -> Self {
		*self.chain.get_mut() = Arc::new(TokenChain::Empty.with_oauth(oauth));

		self
	}

	/// Provider descriptor the manager talks to.
	pub fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	/// Transport shared with sessions built on top of this manager.
	pub fn http_client(&self) -> &Arc<C> {
		&self.http_client
	}

	/// Current chain snapshot.
	pub fn chain(&self) -> Arc<TokenChain> {
		self.chain.read().clone()
	}

	/// Active request signer.
	pub fn signer(&self) -> Arc<RequestSigner> {
		self.signer.read().clone()
	}

	/// XSTS token of the current snapshot, valid or not.
	pub fn xsts_token(&self) -> Option<XstsToken> {
		self.chain().xsts().cloned()
	}

	/// Xbox user id reported by the current XSTS token.
	pub fn xuid(&self) -> Option<Xuid> {
		self.chain().xsts().and_then(XstsToken::xuid).cloned()
	}

	/// Counters for refresh sequences and identity calls.
	pub fn refresh_metrics(&self) -> Arc<RefreshMetrics> {
		self.refresh_metrics.clone()
	}

	fn facade(&self) -> Result<MsaFacade> {
		MsaFacade::from_descriptor(
			&self.descriptor,
			&self.client_id,
			self.client_secret.as_deref(),
			self.redirect_uri.as_ref(),
			self.scope.clone(),
		)
	}

	/// Publishes the outcome of a guarded chain update. Call with the refresh guard held.
	fn finish_update<T>(&self, result: &Result<T>) {
		*self.last_failure.lock() = result.as_ref().err().map(RefreshFailure::from);

		self.refresh_epoch.fetch_add(1, Ordering::AcqRel);
	}

	fn install(&self, chain: TokenChain) -> Arc<TokenChain> {
		let chain = Arc::new(chain);

		*self.chain.write() = chain.clone();

		chain
	}

	async fn persist(&self, oauth: &OAuth2Token) -> Result<()> {
		let Some(store) = &self.store else {
			return Ok(());
		};
		let pem = self.signer().export_pem()?;

		store.save(PersistedSession::new(oauth.clone()).with_signing_key_pem(pem)).await?;

		Ok(())
	}
}
#[cfg(feature = "reqwest")]
impl AuthenticationManager<ReqwestHttpClient> {
	/// Creates a manager for the public Xbox Live service with its own reqwest transport.
	pub fn new(client_id: impl Into<String>) -> Result<Self> {
		let descriptor = ProviderDescriptor::xbox_live().map_err(crate::error::ConfigError::from)?;

		Ok(Self::with_http_client(descriptor, client_id, ReqwestHttpClient::new()?))
	}
}
impl<C> Debug for AuthenticationManager<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthenticationManager")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("redirect_uri", &self.redirect_uri)
			.field("scope", &self.scope)
			.field("chain", &self.chain.read().label())
			.finish()
	}
}
