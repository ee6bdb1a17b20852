//! Service descriptor: OAuth2 and identity endpoints, relying parties, and signing policy.
//!
//! Defaults target the public Xbox Live endpoints. Every URL can be overridden (or rebased onto
//! a local server for tests) through [`ProviderDescriptorBuilder`], and validation requires
//! HTTPS unless [`ProviderQuirks::allow_insecure_endpoints`] is set.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Provider-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use quirks::*;

// self
use crate::{_prelude::*, auth::TokenKind, signing::SignaturePolicy};

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Microsoft account authorize endpoint.
	pub authorization: Url,
	/// Microsoft account token endpoint.
	pub token: Url,
	/// Device authentication endpoint.
	pub device: Url,
	/// Title authentication endpoint.
	pub title: Url,
	/// User authentication endpoint.
	pub user: Url,
	/// XSTS authorization endpoint.
	pub xsts: Url,
}

/// Relying parties named in identity requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingParties {
	/// Relying party for the device, title, and user tokens.
	pub auth: String,
	/// Relying party for the XSTS token.
	pub xsts: String,
}
impl Default for RelyingParties {
	fn default() -> Self {
		Self { auth: "http://auth.xboxlive.com".into(), xsts: "http://xboxlive.com".into() }
	}
}

/// Device identity presented to the device endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
	/// Device type (`Win32`, `Android`, ...).
	pub device_type: String,
	/// OS version string.
	pub version: String,
}
impl Default for DeviceProfile {
	fn default() -> Self {
		Self { device_type: "Win32".into(), version: "10.0.19041".into() }
	}
}

/// Immutable service descriptor consumed by the manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Endpoint definitions.
	pub endpoints: ProviderEndpoints,
	/// Relying parties for identity requests.
	pub relying_parties: RelyingParties,
	/// Sandbox requested for the XSTS token.
	pub sandbox_id: String,
	/// RPS site name used by title and user authentication.
	pub site_name: String,
	/// Device profile sent with device authentication.
	pub device: DeviceProfile,
	/// Signature policy applied to signed identity requests.
	pub signature_policy: SignaturePolicy,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptor {
	/// Creates a new builder seeded with Xbox Live defaults.
	pub fn builder() -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new()
	}

	/// Descriptor for the public Xbox Live service.
	pub fn xbox_live() -> Result<Self, ProviderDescriptorError> {
		Self::builder().build()
	}

	/// Identity endpoint for a chain link; `None` for the OAuth2 root.
	pub fn identity_endpoint(&self, kind: TokenKind) -> Option<&Url> {
		match kind {
			TokenKind::OAuth => None,
			TokenKind::Device => Some(&self.endpoints.device),
			TokenKind::Title => Some(&self.endpoints.title),
			TokenKind::User => Some(&self.endpoints.user),
			TokenKind::Xsts => Some(&self.endpoints.xsts),
		}
	}
}
