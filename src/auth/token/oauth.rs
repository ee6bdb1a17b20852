//! Microsoft account OAuth2 token, the root of the chain.

// crates.io
use serde::{Deserializer, de::Error as _};
use time::PrimitiveDateTime;
// self
use crate::{
	_prelude::*,
	auth::{Expiring, ScopeSet, TokenSecret},
};

/// Longest accepted `expires_in`, in seconds (one year).
pub const MAX_EXPIRES_IN: i64 = 365 * 24 * 60 * 60;

/// OAuth2 token issued by the Microsoft account token endpoint.
///
/// The serialized form mirrors the token endpoint response plus the local `issued`
/// instant, which is what callers persist between runs.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuth2Token {
	/// Token type reported by the provider (normally `bearer`).
	pub token_type: String,
	/// Lifetime in seconds, counted from [`issued`](Self::issued); at most [`MAX_EXPIRES_IN`].
	#[serde(deserialize_with = "deserialize_expires_in")]
	pub expires_in: i64,
	/// Scopes granted to the token.
	pub scope: ScopeSet,
	/// Access token used as the RPS ticket for the user and title tokens.
	pub access_token: TokenSecret,
	/// Refresh token, present when `offline_access` was granted.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// Microsoft account user id.
	#[serde(default)]
	pub user_id: String,
	/// Local instant the token was received; defaults to "now" when absent.
	#[serde(default = "utc_now", with = "time::serde::rfc3339")]
	pub issued: OffsetDateTime,
}
impl OAuth2Token {
	/// Builds a bearer token issued now with the provided lifetime.
	pub fn bearer(access_token: impl Into<String>, expires_in: Duration, scope: ScopeSet) -> Self {
		Self {
			token_type: "bearer".into(),
			expires_in: expires_in.whole_seconds(),
			scope,
			access_token: TokenSecret::new(access_token),
			refresh_token: None,
			user_id: String::new(),
			issued: OffsetDateTime::now_utc(),
		}
	}

	/// Attaches a refresh token.
	pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Overrides the issued-at instant.
	pub fn with_issued(mut self, instant: OffsetDateTime) -> Self {
		self.issued = instant;

		self
	}

	/// Sets the Microsoft account user id.
	pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = user_id.into();

		self
	}

	/// Returns the refresh token, if one was issued.
	pub fn refresh_secret(&self) -> Option<&str> {
		self.refresh_token.as_ref().map(TokenSecret::expose).filter(|value| !value.is_empty())
	}
}
impl Expiring for OAuth2Token {
	fn expires_at(&self) -> OffsetDateTime {
		match self.issued.checked_add(Duration::seconds(self.expires_in)) {
			Some(instant) => instant,
			None if self.expires_in < 0 => PrimitiveDateTime::MIN.assume_utc(),
			None => PrimitiveDateTime::MAX.assume_utc(),
		}
	}
}
impl Debug for OAuth2Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth2Token")
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.field("scope", &self.scope)
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("user_id", &self.user_id)
			.field("issued", &self.issued)
			.finish()
	}
}

fn utc_now() -> OffsetDateTime {
	OffsetDateTime::now_utc()
}

fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
	D: Deserializer<'de>,
{
	let secs = i64::deserialize(deserializer)?;

	if !(0..=MAX_EXPIRES_IN).contains(&secs) {
		return Err(D::Error::custom(format!(
			"expires_in must be between 0 and {MAX_EXPIRES_IN} seconds, got {secs}"
		)));
	}

	Ok(secs)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn validity_follows_issued_plus_lifetime() {
		let token = OAuth2Token::bearer("access", Duration::hours(1), ScopeSet::xbox_live())
			.with_issued(macros::datetime!(2025-01-01 00:00 UTC));

		assert_eq!(token.expires_at(), macros::datetime!(2025-01-01 01:00 UTC));
		assert!(token.is_valid_at(macros::datetime!(2025-01-01 00:59:59 UTC)));
		assert!(!token.is_valid_at(macros::datetime!(2025-01-01 01:00 UTC)));
	}

	#[test]
	fn decodes_token_endpoint_shape_and_defaults_issued() {
		let payload = r#"{
			"token_type": "bearer",
			"expires_in": 3600,
			"scope": "Xboxlive.signin Xboxlive.offline_access",
			"access_token": "EwAIA+pvBAAUKods63Ys1fGlwiccIFJ+9u",
			"refresh_token": "M.R3_BAY.-CTRLQ",
			"user_id": "61d0ab0d0ff8d1c2"
		}"#;
		let before = OffsetDateTime::now_utc();
		let token: OAuth2Token =
			serde_json::from_str(payload).expect("Token endpoint payload should decode.");

		assert_eq!(token.scope, ScopeSet::xbox_live());
		assert_eq!(token.refresh_secret(), Some("M.R3_BAY.-CTRLQ"));
		assert!(token.issued >= before);
		assert!(format!("{token:?}").contains("<redacted>"));
	}

	#[test]
	fn persisted_form_round_trips_issued_instant() {
		let token = OAuth2Token::bearer("access", Duration::minutes(30), ScopeSet::xbox_live())
			.with_refresh_token("refresh")
			.with_issued(macros::datetime!(2025-03-04 05:06:07 UTC));
		let json = serde_json::to_string(&token).expect("Token should serialize.");
		let decoded: OAuth2Token = serde_json::from_str(&json).expect("Token should decode.");

		assert_eq!(decoded.issued, token.issued);
		assert_eq!(decoded.access_token, token.access_token);
		assert_eq!(decoded.refresh_secret(), Some("refresh"));
	}

	#[test]
	fn persisted_lifetime_is_bounded() {
		let payload = r#"{
			"token_type": "bearer",
			"expires_in": 9000000000000,
			"scope": "Xboxlive.signin",
			"access_token": "access"
		}"#;
		let err = serde_json::from_str::<OAuth2Token>(payload)
			.expect_err("Out-of-range lifetimes must not decode.");

		assert!(err.to_string().contains("expires_in"));
	}

	#[test]
	fn expiry_saturates_instead_of_overflowing() {
		let mut token = OAuth2Token::bearer("access", Duration::hours(1), ScopeSet::xbox_live());

		token.expires_in = i64::MAX;

		assert_eq!(token.expires_at(), PrimitiveDateTime::MAX.assume_utc());
		assert!(token.is_valid_at(macros::datetime!(9999-01-01 00:00 UTC)));

		token.expires_in = i64::MIN;

		assert_eq!(token.expires_at(), PrimitiveDateTime::MIN.assume_utc());
		assert!(!token.is_valid());
	}
}
