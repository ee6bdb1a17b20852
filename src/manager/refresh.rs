//! Single-flight refresh of the stale suffix of the token chain.
//!
//! [`AuthenticationManager::ensure_fresh`] computes a [`RefreshPlan`] from the current snapshot
//! and, when anything is stale, takes the refresh guard. Callers that queue behind an in-flight
//! refresh re-check the chain after acquiring the guard; if the refresh they waited on
//! completed without fixing the chain, they fail with
//! [`AuthenticationError::ConcurrentRefreshFailed`] carrying a summary of that refresh's error
//! instead of repeating the sequence. A
//! refresh whose future is dropped never completes, so the next waiter runs the plan itself.

// std
use std::sync::atomic::Ordering;
// self
use crate::{
	_prelude::*,
	auth::{Expiring, RefreshPlan, TokenChain, TokenKind},
	error::{AuthenticationError, StateError},
	http::HttpTransport,
	manager::AuthenticationManager,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl<C> AuthenticationManager<C>
where
	C: ?Sized + HttpTransport,
{
	/// Returns once every token in the chain is valid, refreshing exactly the stale links.
	///
	/// Title, user, and XSTS tokens are re-derived together; the device token only when it (or
	/// the OAuth2 root) is stale. An OAuth2 token that expired without a refresh token, or a
	/// refresh token the server rejects, requires interactive login.
	pub async fn ensure_fresh(&self) -> Result<Arc<TokenChain>> {
		let observed_epoch = self.refresh_epoch.load(Ordering::Acquire);
		let snapshot = self.chain();

		if RefreshPlan::compute(&snapshot, OffsetDateTime::now_utc())?.is_fresh() {
			return Ok(snapshot);
		}

		let _singleflight = self.refresh_guard.lock().await;
		let snapshot = self.chain();
		let plan = RefreshPlan::compute(&snapshot, OffsetDateTime::now_utc())?;

		if plan.is_fresh() {
			return Ok(snapshot);
		}
		if self.refresh_epoch.load(Ordering::Acquire) != observed_epoch {
			let cause = self.last_failure.lock().clone();

			return Err(AuthenticationError::ConcurrentRefreshFailed { cause }.into());
		}

		let result = self.run_refresh(plan, snapshot).await;

		self.finish_update(&result);

		result
	}

	/// `XBL3.0 x=<userhash>;<token>` from the current XSTS token.
	///
	/// Does not refresh; call [`ensure_fresh`](Self::ensure_fresh) first.
	pub fn current_authorization_header(&self) -> Result<String> {
		let chain = self.chain();
		let xsts = chain.xsts().ok_or(StateError::MissingXstsToken)?;

		if !xsts.is_valid() {
			return Err(StateError::XstsTokenExpired { expired_at: xsts.expires_at() }.into());
		}

		Ok(xsts.authorization_header_value())
	}

	async fn run_refresh(&self, plan: RefreshPlan, snapshot: Arc<TokenChain>) -> Result<Arc<TokenChain>> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "ensure_fresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		let result = span
			.instrument(async move {
				let mut chain = (*snapshot).clone();

				if plan.includes(TokenKind::OAuth) {
					let refresh_token = chain
						.oauth()
						.and_then(|oauth| oauth.refresh_secret())
						.ok_or(AuthenticationError::InteractiveLoginRequired)?
						.to_owned();

					obs::record_identity_call(TokenKind::OAuth);
					self.refresh_metrics.record_identity_call(TokenKind::OAuth);

					let oauth = self.facade()?.refresh(self.http_client.as_ref(), &refresh_token).await?;

					// Keep the rotated root even if a later step fails.
					chain = self.install(chain.with_oauth(oauth)).as_ref().clone();

					if let Some(oauth) = chain.oauth() {
						self.persist(oauth).await?;
					}
				}

				self.derive_identity(KIND, chain, plan).await
			})
			.await;

		match &result {
			Ok(_) => {
				self.refresh_metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(_) => {
				self.refresh_metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		result
	}

	/// Regenerates the identity links named by `plan` on top of `chain` and installs the result.
	pub(super) async fn derive_identity(
		&self,
		flow: FlowKind,
		mut chain: TokenChain,
		plan: RefreshPlan,
	) -> Result<Arc<TokenChain>> {
		let signer = self.signer();

		if plan.includes(TokenKind::Device) {
			let device = self.request_device_token(flow, &signer).await?;

			chain = chain.with_device(device)?;
		}
		if plan.includes(TokenKind::Title) || plan.includes(TokenKind::User) {
			let (Some(oauth), Some(device)) = (chain.oauth(), chain.device()) else {
				return Err(StateError::InvalidTransition {
					from: chain.label(),
					to: "has_title_and_user",
				}
				.into());
			};
			let title = self.request_title_token(flow, &signer, oauth, device).await?;
			let user = self.request_user_token(flow, oauth).await?;

			chain = chain.with_title_and_user(title, user)?;
		}
		if plan.includes(TokenKind::Xsts) {
			let xsts = match (chain.device(), chain.title(), chain.user()) {
				(Some(device), Some(title), Some(user)) =>
					self.request_xsts_token(flow, device, title, user).await?,
				_ =>
					return Err(StateError::InvalidTransition {
						from: chain.label(),
						to: "has_xsts",
					}
					.into()),
			};

			chain = chain.with_xsts(xsts)?;
		}

		#[cfg(feature = "tracing")]
		tracing::debug!(
			chain = chain.label(),
			xuid = ?chain.xsts().and_then(|xsts| xsts.xuid()),
			"token chain refreshed"
		);

		Ok(self.install(chain))
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::{OAuth2Token, ScopeSet},
		error::RefreshFailureKind,
		store::{MemoryStore, SessionStore},
	};

	fn expired_oauth() -> OAuth2Token {
		OAuth2Token::bearer("stale-access", Duration::hours(1), ScopeSet::xbox_live())
			.with_refresh_token("refresh-1")
			.with_issued(macros::datetime!(2020-01-01 00:00 UTC))
	}

	#[tokio::test]
	async fn empty_chain_requires_login() {
		let (manager, transport) = fake_manager();
		let err = manager.ensure_fresh().await.expect_err("Empty chain cannot be refreshed.");

		assert!(matches!(err, Error::State(StateError::MissingOAuthToken)));
		assert_eq!(transport.total_calls(), 0);
		assert!(matches!(
			manager.current_authorization_header(),
			Err(Error::State(StateError::MissingXstsToken))
		));
	}

	#[tokio::test]
	async fn fresh_oauth_builds_identity_chain_without_token_call() {
		let (manager, transport) = fake_manager();
		let manager = manager.with_oauth_token(fresh_oauth());
		let chain = manager.ensure_fresh().await.expect("Chain should be built.");

		assert_eq!(chain.label(), "has_xsts");
		assert_eq!(transport.calls(TOKEN_PATH), 0);
		assert_eq!(transport.calls(DEVICE_PATH), 1);
		assert_eq!(transport.calls(XSTS_PATH), 1);
		assert_eq!(
			manager.current_authorization_header().expect("Header should be available."),
			format!("XBL3.0 x={FIXTURE_USERHASH};xsts-token")
		);
		assert_eq!(manager.xuid().map(|xuid| xuid.to_string()), Some(FIXTURE_XUID.to_owned()));
	}

	#[tokio::test]
	async fn unbounded_root_lifetime_plans_without_overflow() {
		let (manager, transport) = fake_manager();
		let mut oauth = fresh_oauth();

		oauth.expires_in = i64::MAX;

		let manager = manager.with_oauth_token(oauth);
		let chain = manager.ensure_fresh().await.expect("Oversized lifetime should stay valid.");

		assert_eq!(chain.label(), "has_xsts");
		assert_eq!(transport.calls(TOKEN_PATH), 0);
	}

	#[tokio::test]
	async fn expired_xsts_rederives_title_user_and_xsts_only() {
		let (manager, transport) = fake_manager();
		let manager = manager.with_oauth_token(fresh_oauth());
		let lapsed = OffsetDateTime::now_utc() - Duration::minutes(5);

		transport.respond(XSTS_PATH, 200, &identity_body(TokenKind::Xsts, "lapsed-xsts", lapsed));
		manager.ensure_fresh().await.expect("Initial chain should be built.");
		transport.respond(XSTS_PATH, 200, &fresh_identity_body(TokenKind::Xsts));

		let chain = manager.ensure_fresh().await.expect("Stale XSTS should be refreshed.");

		assert_eq!(chain.xsts().map(|xsts| xsts.value()), Some("xsts-token"));

		assert_eq!(transport.calls(TOKEN_PATH), 0);
		assert_eq!(transport.calls(DEVICE_PATH), 1);
		assert_eq!(transport.calls(TITLE_PATH), 2);
		assert_eq!(transport.calls(USER_PATH), 2);
		assert_eq!(transport.calls(XSTS_PATH), 2);

		let metrics = manager.refresh_metrics();

		assert_eq!(metrics.attempts(), 2);
		assert_eq!(metrics.successes(), 2);
		assert_eq!(metrics.identity_calls(TokenKind::Device), 1);
	}

	#[tokio::test]
	async fn expired_oauth_refreshes_root_and_persists_rotation() {
		let (manager, transport) = fake_manager();
		let store = Arc::new(MemoryStore::default());
		let manager = manager.with_store(store.clone()).with_oauth_token(expired_oauth());

		manager.ensure_fresh().await.expect("Expired root should be refreshed.");

		assert_eq!(transport.calls(TOKEN_PATH), 1);
		assert_eq!(transport.calls(DEVICE_PATH), 1);

		let body = transport.last_body(TOKEN_PATH).expect("Token endpoint should be called.");

		assert!(body.contains("grant_type=refresh_token"));
		assert!(body.contains("refresh_token=refresh-1"));

		let saved = store.load().await.expect("Load should succeed.").expect("Session saved.");

		assert_eq!(saved.oauth.access_token.expose(), "fresh-access");
		assert!(saved.signing_key_pem.is_some());
	}

	#[tokio::test]
	async fn expired_oauth_without_refresh_token_requires_login() {
		let (manager, transport) = fake_manager();
		let oauth = OAuth2Token::bearer("stale", Duration::hours(1), ScopeSet::xbox_live())
			.with_issued(macros::datetime!(2020-01-01 00:00 UTC));
		let manager = manager.with_oauth_token(oauth);
		let err = manager.ensure_fresh().await.expect_err("Interactive login is required.");

		assert!(matches!(
			err,
			Error::Authentication(AuthenticationError::InteractiveLoginRequired)
		));
		assert_eq!(transport.total_calls(), 0);
	}

	#[tokio::test]
	async fn rejected_refresh_token_is_an_authentication_error() {
		let (manager, transport) = fake_manager();

		transport.respond(
			TOKEN_PATH,
			400,
			r#"{"error":"invalid_grant","error_description":"The refresh token was revoked."}"#,
		);

		let manager = manager.with_oauth_token(expired_oauth());
		let err = manager.ensure_fresh().await.expect_err("Revoked refresh token must fail.");

		assert!(matches!(
			err,
			Error::Authentication(AuthenticationError::InvalidGrant { ref reason })
				if reason.contains("revoked")
		));
		assert_eq!(transport.calls(DEVICE_PATH), 0);
		assert_eq!(manager.refresh_metrics().failures(), 1);
	}

	#[tokio::test]
	async fn identity_rejection_keeps_rotated_root() {
		let (manager, transport) = fake_manager();

		transport.respond(DEVICE_PATH, 400, r#"{"XErr":2148916238,"Message":""}"#);

		let manager = manager.with_oauth_token(expired_oauth());
		let err = manager.ensure_fresh().await.expect_err("Device rejection must fail.");

		assert!(matches!(
			err,
			Error::Authentication(AuthenticationError::Rejected {
				endpoint: TokenKind::Device,
				status: 400,
				xerr: Some(2_148_916_238),
				..
			})
		));

		let chain = manager.chain();

		assert_eq!(chain.label(), "has_oauth");
		assert_eq!(chain.oauth().map(|oauth| oauth.access_token.expose()), Some("fresh-access"));
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_refresh() {
		let (manager, transport) = fake_manager();
		let manager = Arc::new(manager.with_oauth_token(expired_oauth()));
		let mut handles = Vec::new();

		for _ in 0..20 {
			let manager = manager.clone();

			handles.push(tokio::spawn(async move { manager.ensure_fresh().await.map(|_| ()) }));
		}
		for handle in handles {
			handle.await.expect("Task should not panic.").expect("Every caller should succeed.");
		}

		for path in [TOKEN_PATH, DEVICE_PATH, TITLE_PATH, USER_PATH, XSTS_PATH] {
			assert_eq!(transport.calls(path), 1, "{path} should be called exactly once.");
		}
	}

	#[tokio::test]
	async fn waiters_fail_when_the_awaited_refresh_failed() {
		let (manager, transport) = fake_manager();

		transport.respond(XSTS_PATH, 401, r#"{"XErr":2148916233}"#);

		let manager = Arc::new(manager.with_oauth_token(fresh_oauth()));
		let mut handles = Vec::new();

		for _ in 0..8 {
			let manager = manager.clone();

			handles.push(tokio::spawn(async move { manager.ensure_fresh().await.map(|_| ()) }));
		}

		let mut concurrent_failures = 0;

		for handle in handles {
			match handle.await.expect("Task should not panic.") {
				Err(Error::Authentication(AuthenticationError::ConcurrentRefreshFailed { cause })) => {
					let cause = cause.expect("Waiters should see the awaited failure.");

					assert_eq!(cause.kind, RefreshFailureKind::IdentityRejected);
					assert!(cause.message.contains("401"));

					concurrent_failures += 1;
				},
				Err(Error::Authentication(AuthenticationError::Rejected { .. })) => (),
				other => panic!("Unexpected outcome: {other:?}."),
			}
		}

		assert_eq!(
			transport.calls(XSTS_PATH) + concurrent_failures,
			8,
			"Every caller either ran a refresh or observed a failed one."
		);
	}
}
