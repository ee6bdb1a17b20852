//! Token chain state machine and the pure refresh policy evaluated over it.

// self
use crate::{
	_prelude::*,
	auth::{DeviceToken, Expiring, OAuth2Token, TitleToken, TokenKind, UserToken, XstsToken},
	error::{AuthenticationError, StateError},
};

/// Tokens held by the authentication manager.
///
/// Each state carries exactly the tokens its dependencies allow, so a title token without a
/// device token (or an XSTS token without a user token) cannot be represented.
#[derive(Clone, Debug, Default)]
pub enum TokenChain {
	/// Nothing loaded; interactive login is required.
	#[default]
	Empty,
	/// Only the OAuth2 root is present.
	HasOAuth {
		/// OAuth2 root token.
		oauth: OAuth2Token,
	},
	/// OAuth2 root and device token.
	HasDevice {
		/// OAuth2 root token.
		oauth: OAuth2Token,
		/// Device token.
		device: DeviceToken,
	},
	/// Everything except the XSTS token.
	HasTitleAndUser {
		/// OAuth2 root token.
		oauth: OAuth2Token,
		/// Device token.
		device: DeviceToken,
		/// Title token.
		title: TitleToken,
		/// User token.
		user: UserToken,
	},
	/// Complete chain.
	HasXsts {
		/// OAuth2 root token.
		oauth: OAuth2Token,
		/// Device token.
		device: DeviceToken,
		/// Title token.
		title: TitleToken,
		/// User token.
		user: UserToken,
		/// XSTS authorization token.
		xsts: XstsToken,
	},
}
impl TokenChain {
	/// Stable state label used in errors and spans.
	pub const fn label(&self) -> &'static str {
		match self {
			Self::Empty => "empty",
			Self::HasOAuth { .. } => "has_oauth",
			Self::HasDevice { .. } => "has_device",
			Self::HasTitleAndUser { .. } => "has_title_and_user",
			Self::HasXsts { .. } => "has_xsts",
		}
	}

	/// Installs a new OAuth2 root. Downstream tokens are dropped because they were derived
	/// from the previous access token.
	pub fn with_oauth(self, oauth: OAuth2Token) -> Self {
		Self::HasOAuth { oauth }
	}

	/// Installs a device token on top of the OAuth2 root, dropping title, user, and XSTS.
	pub fn with_device(self, device: DeviceToken) -> Result<Self, StateError> {
		match self {
			Self::HasOAuth { oauth }
			| Self::HasDevice { oauth, .. }
			| Self::HasTitleAndUser { oauth, .. }
			| Self::HasXsts { oauth, .. } => Ok(Self::HasDevice { oauth, device }),
			Self::Empty => Err(StateError::InvalidTransition { from: "empty", to: "has_device" }),
		}
	}

	/// Installs title and user tokens, dropping any previous XSTS token.
	pub fn with_title_and_user(self, title: TitleToken, user: UserToken) -> Result<Self, StateError> {
		match self {
			Self::HasDevice { oauth, device }
			| Self::HasTitleAndUser { oauth, device, .. }
			| Self::HasXsts { oauth, device, .. } =>
				Ok(Self::HasTitleAndUser { oauth, device, title, user }),
			other => Err(StateError::InvalidTransition {
				from: other.label(),
				to: "has_title_and_user",
			}),
		}
	}

	/// Installs the XSTS token, completing the chain.
	pub fn with_xsts(self, xsts: XstsToken) -> Result<Self, StateError> {
		match self {
			Self::HasTitleAndUser { oauth, device, title, user }
			| Self::HasXsts { oauth, device, title, user, .. } =>
				Ok(Self::HasXsts { oauth, device, title, user, xsts }),
			other => Err(StateError::InvalidTransition { from: other.label(), to: "has_xsts" }),
		}
	}

	/// OAuth2 root, when loaded.
	pub fn oauth(&self) -> Option<&OAuth2Token> {
		match self {
			Self::Empty => None,
			Self::HasOAuth { oauth }
			| Self::HasDevice { oauth, .. }
			| Self::HasTitleAndUser { oauth, .. }
			| Self::HasXsts { oauth, .. } => Some(oauth),
		}
	}

	/// Device token, when present.
	pub fn device(&self) -> Option<&DeviceToken> {
		match self {
			Self::HasDevice { device, .. }
			| Self::HasTitleAndUser { device, .. }
			| Self::HasXsts { device, .. } => Some(device),
			_ => None,
		}
	}

	/// Title token, when present.
	pub fn title(&self) -> Option<&TitleToken> {
		match self {
			Self::HasTitleAndUser { title, .. } | Self::HasXsts { title, .. } => Some(title),
			_ => None,
		}
	}

	/// User token, when present.
	pub fn user(&self) -> Option<&UserToken> {
		match self {
			Self::HasTitleAndUser { user, .. } | Self::HasXsts { user, .. } => Some(user),
			_ => None,
		}
	}

	/// XSTS token, when present.
	pub fn xsts(&self) -> Option<&XstsToken> {
		match self {
			Self::HasXsts { xsts, .. } => Some(xsts),
			_ => None,
		}
	}

	/// Expiry of the given link, or `None` when the link is absent.
	pub fn expires_at(&self, kind: TokenKind) -> Option<OffsetDateTime> {
		match kind {
			TokenKind::OAuth => self.oauth().map(Expiring::expires_at),
			TokenKind::Device => self.device().map(Expiring::expires_at),
			TokenKind::Title => self.title().map(Expiring::expires_at),
			TokenKind::User => self.user().map(Expiring::expires_at),
			TokenKind::Xsts => self.xsts().map(Expiring::expires_at),
		}
	}

	/// First link, root first, that is missing or no longer valid at `now`.
	pub fn first_stale(&self, now: OffsetDateTime) -> Option<TokenKind> {
		TokenKind::ALL.into_iter().find(|kind| self.expires_at(*kind).is_none_or(|at| now >= at))
	}

	/// Returns `true` when every link is present and valid at `now`.
	pub fn is_fresh_at(&self, now: OffsetDateTime) -> bool {
		self.first_stale(now).is_none()
	}
}

/// Links a refresh must regenerate, derived from the first stale link.
///
/// Title, user, and XSTS tokens are minted together as one authorization unit, so a stale
/// XSTS token re-derives all three while the device token is only replaced when it (or the
/// OAuth2 root) is the stale link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPlan {
	/// Every link is valid.
	Fresh,
	/// Re-derive title, user, and XSTS.
	Authorize,
	/// Re-derive the device token, then title, user, and XSTS.
	Device,
	/// Refresh the OAuth2 root, then every identity token.
	Full,
}
impl RefreshPlan {
	/// Evaluates the chain at `now` without performing any I/O.
	///
	/// An empty chain is a [`StateError::MissingOAuthToken`]; an expired OAuth2 root without a
	/// refresh token is [`AuthenticationError::InteractiveLoginRequired`].
	pub fn compute(chain: &TokenChain, now: OffsetDateTime) -> Result<Self> {
		let Some(oauth) = chain.oauth() else {
			return Err(StateError::MissingOAuthToken.into());
		};

		match chain.first_stale(now) {
			None => Ok(Self::Fresh),
			Some(TokenKind::OAuth) if oauth.refresh_secret().is_none() =>
				Err(AuthenticationError::InteractiveLoginRequired.into()),
			Some(TokenKind::OAuth) => Ok(Self::Full),
			Some(TokenKind::Device) => Ok(Self::Device),
			Some(TokenKind::Title | TokenKind::User | TokenKind::Xsts) => Ok(Self::Authorize),
		}
	}

	/// Links regenerated by this plan, in request order.
	pub const fn steps(self) -> &'static [TokenKind] {
		match self {
			Self::Fresh => &[],
			Self::Authorize => &[TokenKind::Title, TokenKind::User, TokenKind::Xsts],
			Self::Device => &[TokenKind::Device, TokenKind::Title, TokenKind::User, TokenKind::Xsts],
			Self::Full => &TokenKind::ALL,
		}
	}

	/// Returns `true` when nothing needs to be refreshed.
	pub const fn is_fresh(self) -> bool {
		matches!(self, Self::Fresh)
	}

	/// Returns `true` when the plan regenerates `kind`.
	pub fn includes(self, kind: TokenKind) -> bool {
		self.steps().contains(&kind)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::{
		DeviceClaims, ScopeSet, TitleClaims, UserClaims, UserHash, UserIdentity, XstsClaims,
		XstsIdentity,
	};

	const NOW: OffsetDateTime = macros::datetime!(2025-06-01 12:00 UTC);

	struct Lifetimes {
		oauth: Duration,
		device: Duration,
		title: Duration,
		user: Duration,
		xsts: Duration,
	}
	impl Default for Lifetimes {
		fn default() -> Self {
			let hour = Duration::hours(1);

			Self { oauth: hour, device: hour, title: hour, user: hour, xsts: hour }
		}
	}

	fn oauth(remaining: Duration, refresh: bool) -> OAuth2Token {
		let token = OAuth2Token::bearer("access", Duration::hours(24), ScopeSet::xbox_live())
			.with_issued(NOW + remaining - Duration::hours(24));

		if refresh { token.with_refresh_token("refresh") } else { token }
	}

	fn complete_chain(lifetimes: Lifetimes) -> TokenChain {
		let issued = NOW - Duration::hours(2);
		let uhs = UserHash::new("abc").expect("User hash fixture should be valid.");
		let device = DeviceToken::new("d", issued, NOW + lifetimes.device, DeviceClaims::new("F1"))
			.expect("Device fixture should be valid.");
		let title = TitleToken::new("t", issued, NOW + lifetimes.title, TitleClaims::new("1"))
			.expect("Title fixture should be valid.");
		let user = UserToken::new(
			"u",
			issued,
			NOW + lifetimes.user,
			UserClaims::new(UserIdentity { uhs: uhs.clone() }),
		)
		.expect("User fixture should be valid.");
		let xsts = XstsToken::new(
			"x",
			issued,
			NOW + lifetimes.xsts,
			XstsClaims::new(XstsIdentity::new(uhs)),
		)
		.expect("XSTS fixture should be valid.");

		TokenChain::Empty
			.with_oauth(oauth(lifetimes.oauth, true))
			.with_device(device)
			.and_then(|chain| chain.with_title_and_user(title, user))
			.and_then(|chain| chain.with_xsts(xsts))
			.expect("Fixture chain should assemble.")
	}

	#[test]
	fn fresh_chain_needs_nothing() {
		let chain = complete_chain(Lifetimes::default());
		let plan = RefreshPlan::compute(&chain, NOW).expect("Plan should compute.");

		assert_eq!(plan, RefreshPlan::Fresh);
		assert!(plan.steps().is_empty());
		assert!(chain.is_fresh_at(NOW));
	}

	#[test]
	fn expired_xsts_re_derives_authorization_unit_only() {
		let chain =
			complete_chain(Lifetimes { xsts: Duration::minutes(-1), ..Lifetimes::default() });
		let plan = RefreshPlan::compute(&chain, NOW).expect("Plan should compute.");

		assert_eq!(plan.steps(), &[TokenKind::Title, TokenKind::User, TokenKind::Xsts]);
		assert!(!plan.includes(TokenKind::OAuth));
		assert!(!plan.includes(TokenKind::Device));
	}

	#[test]
	fn expiry_boundary_counts_as_stale() {
		let chain = complete_chain(Lifetimes { user: Duration::ZERO, ..Lifetimes::default() });

		assert_eq!(chain.first_stale(NOW), Some(TokenKind::User));
		assert_eq!(
			RefreshPlan::compute(&chain, NOW).expect("Plan should compute."),
			RefreshPlan::Authorize
		);
	}

	#[test]
	fn expired_device_regenerates_device_and_suffix() {
		let chain =
			complete_chain(Lifetimes { device: Duration::seconds(-5), ..Lifetimes::default() });

		assert_eq!(
			RefreshPlan::compute(&chain, NOW).expect("Plan should compute."),
			RefreshPlan::Device
		);
	}

	#[test]
	fn expired_oauth_refreshes_everything_when_refresh_token_exists() {
		let chain =
			complete_chain(Lifetimes { oauth: Duration::seconds(-1), ..Lifetimes::default() });

		let plan = RefreshPlan::compute(&chain, NOW).expect("Plan should compute.");

		assert_eq!(plan.steps(), &TokenKind::ALL);
	}

	#[test]
	fn expired_oauth_without_refresh_token_requires_login() {
		let chain = TokenChain::Empty.with_oauth(oauth(Duration::seconds(-1), false));
		let err = RefreshPlan::compute(&chain, NOW).expect_err("Login should be required.");

		assert!(matches!(
			err,
			Error::Authentication(AuthenticationError::InteractiveLoginRequired)
		));
	}

	#[test]
	fn empty_chain_is_a_state_error() {
		let err =
			RefreshPlan::compute(&TokenChain::Empty, NOW).expect_err("Empty chain must fail.");

		assert!(matches!(err, Error::State(StateError::MissingOAuthToken)));
	}

	#[test]
	fn partial_chain_plans_missing_links() {
		let chain = TokenChain::Empty.with_oauth(oauth(Duration::hours(1), true));

		assert_eq!(chain.first_stale(NOW), Some(TokenKind::Device));
		assert_eq!(
			RefreshPlan::compute(&chain, NOW).expect("Plan should compute."),
			RefreshPlan::Device
		);
	}

	#[test]
	fn transitions_reject_skipped_dependencies() {
		let chain = complete_chain(Lifetimes::default());
		let xsts = chain.xsts().cloned().expect("Fixture chain should carry XSTS.");
		let err = TokenChain::Empty
			.with_oauth(oauth(Duration::hours(1), true))
			.with_xsts(xsts)
			.expect_err("XSTS cannot be installed without title and user.");

		assert!(matches!(err, StateError::InvalidTransition { from: "has_oauth", to: "has_xsts" }));

		let device = chain.device().cloned().expect("Fixture chain should carry a device token.");

		assert!(TokenChain::Empty.with_device(device).is_err());
	}

	#[test]
	fn installing_device_drops_authorization_unit() {
		let chain = complete_chain(Lifetimes::default());
		let device = chain.device().cloned().expect("Fixture chain should carry a device token.");
		let next = chain.with_device(device).expect("Device can replace an existing one.");

		assert_eq!(next.label(), "has_device");
		assert!(next.xsts().is_none());
		assert!(next.oauth().is_some());
	}
}
