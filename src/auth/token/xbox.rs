//! Identity-token envelopes returned by the device, title, user, and XSTS endpoints.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{Expiring, TokenKind, TokenSecret, UserHash, Xuid},
	error::AuthenticationError,
};

macro_rules! def_identity_claims {
	($name:ident, $identity:ty, $raw:literal, $kind:expr, $doc:literal) => {
		#[doc = $doc]
		///
		/// Always carries at least one `xui` entry; the first one is the primary identity.
		#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
		#[serde(try_from = $raw, into = $raw)]
		pub struct $name {
			primary: $identity,
			others: Vec<$identity>,
		}
		impl $name {
			/// Creates claims with a single identity.
			pub fn new(primary: $identity) -> Self {
				Self { primary, others: Vec::new() }
			}

			/// First `xui` entry.
			pub fn primary(&self) -> &$identity {
				&self.primary
			}

			/// Every `xui` entry, primary first.
			pub fn identities(&self) -> impl Iterator<Item = &$identity> {
				std::iter::once(&self.primary).chain(self.others.iter())
			}
		}
		impl DisplayClaims for $name {
			const KIND: TokenKind = $kind;
		}
		impl TryFrom<RawXui<$identity>> for $name {
			type Error = String;

			fn try_from(raw: RawXui<$identity>) -> Result<Self, Self::Error> {
				let mut entries = raw.xui.into_iter();
				let primary = entries
					.next()
					.ok_or_else(|| String::from("`xui` must contain at least one identity"))?;

				Ok(Self { primary, others: entries.collect() })
			}
		}
		impl From<$name> for RawXui<$identity> {
			fn from(claims: $name) -> Self {
				let mut xui = Vec::with_capacity(1 + claims.others.len());

				xui.push(claims.primary);
				xui.extend(claims.others);

				Self { xui }
			}
		}
	};
}

/// Display-claims payload attached to an identity-token envelope.
pub trait DisplayClaims: Clone + Debug + Serialize + DeserializeOwned {
	/// Chain link this payload belongs to.
	const KIND: TokenKind;
}

/// Device token (`xdi` claims).
pub type DeviceToken = XboxToken<DeviceClaims>;
/// Title token (`xti` claims).
pub type TitleToken = XboxToken<TitleClaims>;
/// User token (`xui` claims with the user hash).
pub type UserToken = XboxToken<UserClaims>;
/// XSTS authorization token (`xui` claims with the full identity).
pub type XstsToken = XboxToken<XstsClaims>;

/// Envelope shared by every identity endpoint: `{IssueInstant, NotAfter, Token, DisplayClaims}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XboxToken<C> {
	/// Instant the service issued the token.
	#[serde(with = "time::serde::rfc3339")]
	pub issue_instant: OffsetDateTime,
	/// Absolute expiry instant.
	#[serde(with = "time::serde::rfc3339")]
	pub not_after: OffsetDateTime,
	/// Opaque token value.
	pub token: TokenSecret,
	/// Endpoint-specific claims.
	pub display_claims: C,
}
impl<C> XboxToken<C>
where
	C: DisplayClaims,
{
	/// Builds a validated envelope from its parts.
	pub fn new(
		token: impl Into<String>,
		issue_instant: OffsetDateTime,
		not_after: OffsetDateTime,
		display_claims: C,
	) -> Result<Self, AuthenticationError> {
		let envelope =
			Self { issue_instant, not_after, token: TokenSecret::new(token), display_claims };

		envelope.validate()?;

		Ok(envelope)
	}

	/// Decodes and validates a response body.
	pub fn from_slice(body: &[u8]) -> Result<Self, AuthenticationError> {
		let mut deserializer = serde_json::Deserializer::from_slice(body);
		let envelope: Self = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| AuthenticationError::InvalidEnvelope { endpoint: C::KIND, source })?;

		envelope.validate()?;

		Ok(envelope)
	}

	/// Checks the envelope invariants: non-empty token and `NotAfter` after `IssueInstant`.
	pub fn validate(&self) -> Result<(), AuthenticationError> {
		if self.token.is_empty() {
			return Err(AuthenticationError::EnvelopeValidation {
				endpoint: C::KIND,
				reason: "token value is empty".into(),
			});
		}
		if self.not_after <= self.issue_instant {
			return Err(AuthenticationError::EnvelopeValidation {
				endpoint: C::KIND,
				reason: "NotAfter must be later than IssueInstant".into(),
			});
		}

		Ok(())
	}

	/// Returns the opaque token string.
	pub fn value(&self) -> &str {
		self.token.expose()
	}
}
impl<C> Expiring for XboxToken<C> {
	fn expires_at(&self) -> OffsetDateTime {
		self.not_after
	}
}
impl XboxToken<DeviceClaims> {
	/// Device id (`did`).
	pub fn device_id(&self) -> &str {
		&self.display_claims.xdi.did
	}
}
impl XboxToken<TitleClaims> {
	/// Title id (`tid`).
	pub fn title_id(&self) -> &str {
		&self.display_claims.xti.tid
	}
}
impl XboxToken<UserClaims> {
	/// User hash of the primary identity.
	pub fn userhash(&self) -> &UserHash {
		&self.display_claims.primary().uhs
	}
}
impl XboxToken<XstsClaims> {
	fn identity(&self) -> &XstsIdentity {
		self.display_claims.primary()
	}

	/// Xbox user id (`xid`).
	pub fn xuid(&self) -> Option<&Xuid> {
		self.identity().xid.as_ref()
	}

	/// User hash (`uhs`).
	pub fn userhash(&self) -> &UserHash {
		&self.identity().uhs
	}

	/// Gamertag (`gtg`).
	pub fn gamertag(&self) -> Option<&str> {
		self.identity().gtg.as_deref()
	}

	/// Age group (`agg`).
	pub fn age_group(&self) -> Option<&str> {
		self.identity().agg.as_deref()
	}

	/// Space-separated privilege ids (`prv`).
	pub fn privileges(&self) -> Option<&str> {
		self.identity().prv.as_deref()
	}

	/// User-setting privileges (`usr`).
	pub fn user_privileges(&self) -> Option<&str> {
		self.identity().usr.as_deref()
	}

	/// `Authorization` header value: `XBL3.0 x=<userhash>;<token>`.
	pub fn authorization_header_value(&self) -> String {
		format!("XBL3.0 x={};{}", self.userhash(), self.value())
	}
}

/// `xdi` display claims of a device token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClaims {
	/// Device identity.
	pub xdi: DeviceIdentity,
}
impl DeviceClaims {
	/// Creates claims for the given device id.
	pub fn new(did: impl Into<String>) -> Self {
		Self { xdi: DeviceIdentity { did: did.into(), dcs: None } }
	}
}
impl DisplayClaims for DeviceClaims {
	const KIND: TokenKind = TokenKind::Device;
}

/// Device identity entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
	/// Device id.
	pub did: String,
	/// Device class sequence, when reported.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dcs: Option<String>,
}

/// `xti` display claims of a title token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleClaims {
	/// Title identity.
	pub xti: TitleIdentity,
}
impl TitleClaims {
	/// Creates claims for the given title id.
	pub fn new(tid: impl Into<String>) -> Self {
		Self { xti: TitleIdentity { tid: tid.into() } }
	}
}
impl DisplayClaims for TitleClaims {
	const KIND: TokenKind = TokenKind::Title;
}

/// Title identity entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleIdentity {
	/// Title id.
	pub tid: String,
}

/// User identity entry of a user token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
	/// User hash.
	pub uhs: UserHash,
}

/// Identity entry of an XSTS token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct XstsIdentity {
	/// User hash.
	pub uhs: UserHash,
	/// Xbox user id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub xid: Option<Xuid>,
	/// Gamertag.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gtg: Option<String>,
	/// Age group.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub agg: Option<String>,
	/// Privileges.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub prv: Option<String>,
	/// User-setting privileges.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usr: Option<String>,
	/// User title restrictions.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub utr: Option<String>,
}
impl XstsIdentity {
	/// Creates an identity carrying only the user hash.
	pub fn new(uhs: UserHash) -> Self {
		Self { uhs, xid: None, gtg: None, agg: None, prv: None, usr: None, utr: None }
	}

	/// Sets the Xbox user id.
	pub fn with_xuid(mut self, xid: Xuid) -> Self {
		self.xid = Some(xid);

		self
	}

	/// Sets the gamertag.
	pub fn with_gamertag(mut self, gtg: impl Into<String>) -> Self {
		self.gtg = Some(gtg.into());

		self
	}
}

def_identity_claims! {
	UserClaims,
	UserIdentity,
	"RawXui<UserIdentity>",
	TokenKind::User,
	"`xui` display claims of a user token."
}
def_identity_claims! {
	XstsClaims,
	XstsIdentity,
	"RawXui<XstsIdentity>",
	TokenKind::Xsts,
	"`xui` display claims of an XSTS token."
}

#[derive(Serialize, Deserialize)]
struct RawXui<I> {
	xui: Vec<I>,
}
