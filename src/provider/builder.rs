// self
use crate::{
	_prelude::*,
	provider::{DeviceProfile, ProviderDescriptor, ProviderEndpoints, ProviderQuirks, RelyingParties},
	signing::SignaturePolicy,
};

const AUTHORIZATION_URL: &str = "https://login.live.com/oauth20_authorize.srf";
const TOKEN_URL: &str = "https://login.live.com/oauth20_token.srf";
const DEVICE_URL: &str = "https://device.auth.xboxlive.com/device/authenticate";
const TITLE_URL: &str = "https://title.auth.xboxlive.com/title/authenticate";
const USER_URL: &str = "https://user.auth.xboxlive.com/user/authenticate";
const XSTS_URL: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// Endpoint URL could not be parsed or joined onto the base URL.
	#[error("The {endpoint} endpoint URL is invalid: {reason}.")]
	InvalidUrl {
		/// Which endpoint failed.
		endpoint: &'static str,
		/// Parser message.
		reason: String,
	},
	/// Endpoints must use HTTPS.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// A required text field is empty.
	#[error("The {field} field cannot be empty.")]
	EmptyField {
		/// Field name.
		field: &'static str,
	},
	/// Only ES256 signatures are produced.
	#[error("Signature algorithm {algorithm} is not supported.")]
	UnsupportedAlgorithm {
		/// Algorithm advertised by the policy.
		algorithm: String,
	},
}

/// Builder for [`ProviderDescriptor`] values.
///
/// Endpoints resolve in order: explicit override, then the default path joined onto
/// [`base_url`](Self::base_url), then the public Xbox Live URL.
#[derive(Debug, Default)]
pub struct ProviderDescriptorBuilder {
	/// Base URL every endpoint without an override is rebased onto.
	pub base_url: Option<Url>,
	/// Authorize endpoint override.
	pub authorization_endpoint: Option<Url>,
	/// Token endpoint override.
	pub token_endpoint: Option<Url>,
	/// Device endpoint override.
	pub device_endpoint: Option<Url>,
	/// Title endpoint override.
	pub title_endpoint: Option<Url>,
	/// User endpoint override.
	pub user_endpoint: Option<Url>,
	/// XSTS endpoint override.
	pub xsts_endpoint: Option<Url>,
	/// Relying parties.
	pub relying_parties: RelyingParties,
	/// Sandbox id; `RETAIL` unless overridden.
	pub sandbox_id: Option<String>,
	/// RPS site name; `user.auth.xboxlive.com` unless overridden.
	pub site_name: Option<String>,
	/// Device profile.
	pub device: DeviceProfile,
	/// Signature policy.
	pub signature_policy: SignaturePolicy,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptorBuilder {
	/// Creates a builder seeded with Xbox Live defaults.
	pub fn new() -> Self {
		Self::default()
	}

	/// Rebases every endpoint without an explicit override onto `url`.
	pub fn base_url(mut self, url: Url) -> Self {
		self.base_url = Some(url);

		self
	}

	/// Sets the authorize endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the device endpoint.
	pub fn device_endpoint(mut self, url: Url) -> Self {
		self.device_endpoint = Some(url);

		self
	}

	/// Sets the title endpoint.
	pub fn title_endpoint(mut self, url: Url) -> Self {
		self.title_endpoint = Some(url);

		self
	}

	/// Sets the user endpoint.
	pub fn user_endpoint(mut self, url: Url) -> Self {
		self.user_endpoint = Some(url);

		self
	}

	/// Sets the XSTS endpoint.
	pub fn xsts_endpoint(mut self, url: Url) -> Self {
		self.xsts_endpoint = Some(url);

		self
	}

	/// Overrides the relying parties.
	pub fn relying_parties(mut self, parties: RelyingParties) -> Self {
		self.relying_parties = parties;

		self
	}

	/// Overrides the sandbox id.
	pub fn sandbox_id(mut self, sandbox: impl Into<String>) -> Self {
		self.sandbox_id = Some(sandbox.into());

		self
	}

	/// Overrides the RPS site name.
	pub fn site_name(mut self, site: impl Into<String>) -> Self {
		self.site_name = Some(site.into());

		self
	}

	/// Overrides the device profile.
	pub fn device(mut self, device: DeviceProfile) -> Self {
		self.device = device;

		self
	}

	/// Overrides the signature policy.
	pub fn signature_policy(mut self, policy: SignaturePolicy) -> Self {
		self.signature_policy = policy;

		self
	}

	/// Overrides the provider quirks.
	pub fn quirks(mut self, quirks: ProviderQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let base = self.base_url.as_ref();
		let endpoints = ProviderEndpoints {
			authorization: resolve(
				"authorization",
				self.authorization_endpoint,
				base,
				AUTHORIZATION_URL,
			)?,
			token: resolve("token", self.token_endpoint, base, TOKEN_URL)?,
			device: resolve("device", self.device_endpoint, base, DEVICE_URL)?,
			title: resolve("title", self.title_endpoint, base, TITLE_URL)?,
			user: resolve("user", self.user_endpoint, base, USER_URL)?,
			xsts: resolve("xsts", self.xsts_endpoint, base, XSTS_URL)?,
		};
		let descriptor = ProviderDescriptor {
			endpoints,
			relying_parties: self.relying_parties,
			sandbox_id: self.sandbox_id.unwrap_or_else(|| "RETAIL".into()),
			site_name: self.site_name.unwrap_or_else(|| "user.auth.xboxlive.com".into()),
			device: self.device,
			signature_policy: self.signature_policy,
			quirks: self.quirks,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ProviderDescriptor {
	/// Validates invariants for the descriptor.
	fn validate(&self) -> Result<(), ProviderDescriptorError> {
		let endpoints = &self.endpoints;

		for (name, url) in [
			("authorization", &endpoints.authorization),
			("token", &endpoints.token),
			("device", &endpoints.device),
			("title", &endpoints.title),
			("user", &endpoints.user),
			("xsts", &endpoints.xsts),
		] {
			validate_endpoint(name, url, self.quirks.allow_insecure_endpoints)?;
		}
		for (field, value) in [
			("sandbox_id", &self.sandbox_id),
			("site_name", &self.site_name),
			("relying_parties.auth", &self.relying_parties.auth),
			("relying_parties.xsts", &self.relying_parties.xsts),
			("device.device_type", &self.device.device_type),
		] {
			if value.trim().is_empty() {
				return Err(ProviderDescriptorError::EmptyField { field });
			}
		}

		let algorithm = self.signature_policy.algorithm();

		if algorithm != "ES256" {
			return Err(ProviderDescriptorError::UnsupportedAlgorithm {
				algorithm: algorithm.to_owned(),
			});
		}

		Ok(())
	}
}

fn resolve(
	endpoint: &'static str,
	explicit: Option<Url>,
	base: Option<&Url>,
	default: &str,
) -> Result<Url, ProviderDescriptorError> {
	let invalid = |e: url::ParseError| ProviderDescriptorError::InvalidUrl {
		endpoint,
		reason: e.to_string(),
	};

	if let Some(url) = explicit {
		return Ok(url);
	}

	let default = Url::parse(default).map_err(invalid)?;

	match base {
		Some(base) => base.join(default.path()).map_err(invalid),
		None => Ok(default),
	}
}

fn validate_endpoint(
	name: &'static str,
	url: &Url,
	allow_insecure: bool,
) -> Result<(), ProviderDescriptorError> {
	match url.scheme() {
		"https" => Ok(()),
		"http" if allow_insecure => Ok(()),
		_ => Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() }),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::TokenKind;

	#[test]
	fn defaults_target_public_endpoints() {
		let descriptor = ProviderDescriptor::xbox_live().expect("Defaults should validate.");

		assert_eq!(descriptor.endpoints.token.as_str(), TOKEN_URL);
		assert_eq!(
			descriptor.identity_endpoint(TokenKind::Xsts).map(Url::as_str),
			Some(XSTS_URL)
		);
		assert_eq!(descriptor.identity_endpoint(TokenKind::OAuth), None);
		assert_eq!(descriptor.sandbox_id, "RETAIL");
		assert_eq!(descriptor.relying_parties.xsts, "http://xboxlive.com");
	}

	#[test]
	fn base_url_rebases_default_paths() {
		let base = Url::parse("http://127.0.0.1:8080/").expect("Base URL fixture should parse.");
		let descriptor = ProviderDescriptor::builder()
			.base_url(base)
			.quirks(ProviderQuirks { allow_insecure_endpoints: true, ..ProviderQuirks::default() })
			.build()
			.expect("Rebased descriptor should validate.");

		assert_eq!(descriptor.endpoints.device.as_str(), "http://127.0.0.1:8080/device/authenticate");
		assert_eq!(descriptor.endpoints.token.as_str(), "http://127.0.0.1:8080/oauth20_token.srf");
	}

	#[test]
	fn http_endpoints_require_the_insecure_quirk() {
		let err = ProviderDescriptor::builder()
			.user_endpoint(Url::parse("http://localhost/user").expect("URL fixture should parse."))
			.build()
			.expect_err("Plain HTTP must be rejected by default.");

		assert_eq!(
			err,
			ProviderDescriptorError::InsecureEndpoint {
				endpoint: "user",
				url: "http://localhost/user".into()
			}
		);
	}

	#[test]
	fn policy_must_advertise_es256() {
		let policy = SignaturePolicy {
			supported_algorithms: vec!["RS256".into()],
			..SignaturePolicy::default()
		};
		let err = ProviderDescriptor::builder()
			.signature_policy(policy)
			.build()
			.expect_err("Unsupported algorithms must be rejected.");

		assert!(matches!(err, ProviderDescriptorError::UnsupportedAlgorithm { .. }));
		assert!(ProviderDescriptor::builder().sandbox_id(" ").build().is_err());
	}
}
