//! Requests against the device, title, user, and XSTS endpoints.

// crates.io
use oauth2::{
	HttpRequest, HttpResponse,
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::{
		DeviceToken, DisplayClaims, OAuth2Token, TitleToken, TokenKind, UserToken, XboxToken,
		XstsToken,
	},
	error::{AuthenticationError, ConfigError},
	http::{self, HttpTransport, path_and_query},
	manager::AuthenticationManager,
	obs::{self, FlowKind, FlowSpan},
	signing::{ProofKey, RequestSigner},
};

const CONTRACT_VERSION: &str = "x-xbl-contract-version";
const SIGNATURE: &str = "Signature";
const XERR: &str = "x-err";
const TOKEN_TYPE: &str = "JWT";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct IdentityRequest<'a, P> {
	relying_party: &'a str,
	token_type: &'static str,
	properties: P,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeviceProperties<'a> {
	auth_method: &'static str,
	id: String,
	device_type: &'a str,
	version: &'a str,
	proof_key: ProofKey,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TitleProperties<'a> {
	auth_method: &'static str,
	device_token: &'a str,
	rps_ticket: String,
	site_name: &'a str,
	proof_key: ProofKey,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct UserProperties<'a> {
	auth_method: &'static str,
	site_name: &'a str,
	rps_ticket: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct XstsProperties<'a> {
	user_tokens: [&'a str; 1],
	device_token: &'a str,
	title_token: &'a str,
	sandbox_id: &'a str,
}

/// Error body returned by identity endpoints on rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XErrBody {
	#[serde(default, rename = "XErr")]
	xerr: Option<u64>,
	#[serde(default)]
	message: Option<String>,
}

impl<C> AuthenticationManager<C>
where
	C: ?Sized + HttpTransport,
{
	pub(super) async fn request_device_token(
		&self,
		flow: FlowKind,
		signer: &RequestSigner,
	) -> Result<DeviceToken> {
		let descriptor = &self.descriptor;
		let body = IdentityRequest {
			relying_party: &descriptor.relying_parties.auth,
			token_type: TOKEN_TYPE,
			properties: DeviceProperties {
				auth_method: "ProofOfPossession",
				id: format!("{{{}}}", Uuid::new_v4()),
				device_type: &descriptor.device.device_type,
				version: &descriptor.device.version,
				proof_key: signer.proof_key(),
			},
		};

		self.call_identity(flow, &descriptor.endpoints.device, &body, Some(signer)).await
	}

	pub(super) async fn request_title_token(
		&self,
		flow: FlowKind,
		signer: &RequestSigner,
		oauth: &OAuth2Token,
		device: &DeviceToken,
	) -> Result<TitleToken> {
		let descriptor = &self.descriptor;
		let body = IdentityRequest {
			relying_party: &descriptor.relying_parties.auth,
			token_type: TOKEN_TYPE,
			properties: TitleProperties {
				auth_method: "RPS",
				device_token: device.value(),
				rps_ticket: descriptor.quirks.rps_ticket(oauth.access_token.expose()),
				site_name: &descriptor.site_name,
				proof_key: signer.proof_key(),
			},
		};

		self.call_identity(flow, &descriptor.endpoints.title, &body, Some(signer)).await
	}

	pub(super) async fn request_user_token(
		&self,
		flow: FlowKind,
		oauth: &OAuth2Token,
	) -> Result<UserToken> {
		let descriptor = &self.descriptor;
		let body = IdentityRequest {
			relying_party: &descriptor.relying_parties.auth,
			token_type: TOKEN_TYPE,
			properties: UserProperties {
				auth_method: "RPS",
				site_name: &descriptor.site_name,
				rps_ticket: descriptor.quirks.rps_ticket(oauth.access_token.expose()),
			},
		};

		self.call_identity(flow, &descriptor.endpoints.user, &body, None).await
	}

	pub(super) async fn request_xsts_token(
		&self,
		flow: FlowKind,
		device: &DeviceToken,
		title: &TitleToken,
		user: &UserToken,
	) -> Result<XstsToken> {
		let descriptor = &self.descriptor;
		let body = IdentityRequest {
			relying_party: &descriptor.relying_parties.xsts,
			token_type: TOKEN_TYPE,
			properties: XstsProperties {
				user_tokens: [user.value()],
				device_token: device.value(),
				title_token: title.value(),
				sandbox_id: &descriptor.sandbox_id,
			},
		};

		self.call_identity(flow, &descriptor.endpoints.xsts, &body, None).await
	}

	async fn call_identity<T, B>(
		&self,
		flow: FlowKind,
		endpoint: &Url,
		body: &B,
		signer: Option<&RequestSigner>,
	) -> Result<XboxToken<T>>
	where
		T: DisplayClaims,
		B: Serialize,
	{
		let kind = T::KIND;
		let request = build_request(
			endpoint,
			body,
			self.descriptor.quirks.contract_version,
			signer,
		)?;
		let span = FlowSpan::step(flow, "identity_call", kind);

		obs::record_identity_call(kind);
		self.refresh_metrics.record_identity_call(kind);

		let response = span.instrument(http::execute(self.http_client.as_ref(), request)).await?;

		if !response.status().is_success() {
			return Err(rejection(kind, &response).into());
		}

		Ok(XboxToken::<T>::from_slice(response.body())?)
	}
}

fn build_request<B>(
	endpoint: &Url,
	body: &B,
	contract_version: u32,
	signer: Option<&RequestSigner>,
) -> Result<HttpRequest>
where
	B: Serialize,
{
	let payload =
		serde_json::to_vec(body).map_err(|source| ConfigError::Serialization { source })?;
	let mut builder = Request::builder()
		.method(Method::POST)
		.uri(endpoint.as_str())
		.header(CONTENT_TYPE, "application/json")
		.header(ACCEPT, "application/json")
		.header(CONTRACT_VERSION, contract_version.to_string());

	if let Some(signer) = signer {
		let signature = signer.sign_now("POST", &path_and_query(endpoint), &payload, "")?;

		builder = builder.header(SIGNATURE, signature);
	}

	builder.body(payload).map_err(|e| ConfigError::from(e).into())
}

fn rejection(kind: TokenKind, response: &HttpResponse) -> AuthenticationError {
	let status = response.status();
	let body: XErrBody = serde_json::from_slice(response.body()).unwrap_or_default();
	let header_xerr = response
		.headers()
		.get(XERR)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.trim().parse().ok());
	let reason = body
		.message
		.filter(|message| !message.is_empty())
		.or_else(|| status.canonical_reason().map(str::to_owned))
		.unwrap_or_else(|| "unknown error".into());

	AuthenticationError::Rejected {
		endpoint: kind,
		status: status.as_u16(),
		xerr: body.xerr.or(header_xerr),
		reason,
	}
}
