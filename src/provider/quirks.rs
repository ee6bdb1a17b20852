// self
use crate::_prelude::*;

/// Provider-specific quirks that influence validation and request shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Accepts `http://` endpoints (local test servers only).
	pub allow_insecure_endpoints: bool,
	/// Value of the `x-xbl-contract-version` header sent to every identity endpoint.
	pub contract_version: u32,
	/// Prefixes the RPS ticket with `d=` (Azure-registered clients) instead of `t=`.
	pub delegated_rps_ticket: bool,
}
impl ProviderQuirks {
	/// RPS ticket presented to the title and user endpoints for `access_token`.
	pub fn rps_ticket(&self, access_token: &str) -> String {
		let prefix = if self.delegated_rps_ticket { 'd' } else { 't' };

		format!("{prefix}={access_token}")
	}
}
impl Default for ProviderQuirks {
	fn default() -> Self {
		Self { allow_insecure_endpoints: false, contract_version: 1, delegated_rps_ticket: true }
	}
}
