//! Token records that make up the chain: the OAuth2 root and the four identity envelopes.

pub mod oauth;
pub mod secret;
pub mod xbox;

// self
use crate::_prelude::*;

/// Links of the token chain, in dependency order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
	/// Microsoft account OAuth2 access token (chain root).
	OAuth,
	/// Device token; needs no predecessor.
	Device,
	/// Title token; needs the device token.
	Title,
	/// User token; needs the OAuth2 access token.
	User,
	/// XSTS authorization token; needs the title and user tokens.
	Xsts,
}
impl TokenKind {
	/// Every link, root first.
	pub const ALL: [TokenKind; 5] =
		[TokenKind::OAuth, TokenKind::Device, TokenKind::Title, TokenKind::User, TokenKind::Xsts];

	/// Returns a stable label suitable for span, metric, or error fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenKind::OAuth => "oauth",
			TokenKind::Device => "device",
			TokenKind::Title => "title",
			TokenKind::User => "user",
			TokenKind::Xsts => "xsts",
		}
	}
}
impl Display for TokenKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Shared validity contract: a token is valid strictly before its expiry instant.
pub trait Expiring {
	/// Absolute expiry instant.
	fn expires_at(&self) -> OffsetDateTime;

	/// Returns `true` if the token is still usable at `instant`.
	fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		instant < self.expires_at()
	}

	/// Returns `true` if the token is usable now.
	fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}
}
