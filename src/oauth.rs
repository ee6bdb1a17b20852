//! Microsoft account OAuth2 facade built on the `oauth2` crate.
//!
//! The token endpoint returns a `user_id` next to the standard fields, so the facade plugs a
//! custom [`ExtraTokenFields`] into `oauth2`'s client and maps the result onto
//! [`OAuth2Token`]. Requests run through an [`HttpTransport`] handle whose metadata slot lets
//! error mapping report the HTTP status.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken,
	EndpointNotSet, EndpointSet, ExtraTokenFields, HttpClientError, RedirectUrl, RefreshToken,
	RequestTokenError, Scope, StandardRevocableToken, StandardTokenResponse, TokenResponse,
	TokenUrl,
	basic::{
		BasicErrorResponse, BasicErrorResponseType, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{MAX_EXPIRES_IN, OAuth2Token, ScopeSet, TokenSecret},
	error::{AuthenticationError, ConfigError, TransportError},
	http::{HttpTransport, ResponseMetadata, ResponseMetadataSlot},
	provider::ProviderDescriptor,
};

/// OAuth error code the token endpoint uses when a second factor is needed.
pub const INTERACTION_REQUIRED: &str = "interaction_required";

type MsaClient = Client<
	BasicErrorResponse,
	MsaTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type MsaRequestError<E> = RequestTokenError<HttpClientError<E>, BasicErrorResponse>;

/// Token-response fields specific to Microsoft accounts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MsaTokenFields {
	/// Microsoft account user id.
	#[serde(default)]
	pub user_id: Option<String>,
}
impl ExtraTokenFields for MsaTokenFields {}

/// Token response returned by the Microsoft account token endpoint.
pub type MsaTokenResponse = StandardTokenResponse<MsaTokenFields, BasicTokenType>;

/// Authorize URL plus the CSRF state the redirect must echo back.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	/// URL the user opens in a browser.
	pub url: Url,
	/// Opaque `state` value to compare against the redirect.
	pub state: String,
}

/// Configured Microsoft account client.
#[derive(Clone, Debug)]
pub(crate) struct MsaFacade {
	client: MsaClient,
	scope: ScopeSet,
	has_redirect: bool,
}
impl MsaFacade {
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_id: &str,
		client_secret: Option<&str>,
		redirect_uri: Option<&Url>,
		scope: ScopeSet,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidUrl { source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidUrl { source })?;
		let mut client: MsaClient = Client::new(ClientId::new(client_id.to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		if let Some(secret) = client_secret {
			client = client.set_client_secret(ClientSecret::new(secret.to_owned()));
		}
		if let Some(redirect) = redirect_uri {
			let redirect = RedirectUrl::new(redirect.to_string())
				.map_err(|source| ConfigError::InvalidUrl { source })?;

			client = client.set_redirect_uri(redirect);
		}

		Ok(Self { client, scope, has_redirect: redirect_uri.is_some() })
	}

	pub(crate) fn authorization_url(&self) -> Result<AuthorizationRequest> {
		if !self.has_redirect {
			return Err(ConfigError::MissingRedirectUri.into());
		}

		let (url, state) = self
			.client
			.authorize_url(CsrfToken::new_random)
			.add_scopes(self.scope.iter().map(|scope| Scope::new(scope.to_owned())))
			.add_extra_param("approval_prompt", "auto")
			.url();

		Ok(AuthorizationRequest { url, state: state.secret().to_owned() })
	}

	pub(crate) async fn exchange_code<T>(&self, transport: &T, code: &str) -> Result<OAuth2Token>
	where
		T: ?Sized + HttpTransport,
	{
		if !self.has_redirect {
			return Err(ConfigError::MissingRedirectUri.into());
		}

		let slot = ResponseMetadataSlot::default();
		let handle = transport.with_metadata(slot.clone());
		let response = self
			.client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.add_extra_param("scope", self.scope.normalized())
			.request_async(&handle)
			.await
			.map_err(|e| map_request_error(slot.take(), e))?;

		map_token_response(&self.scope, response)
	}

	pub(crate) async fn refresh<T>(&self, transport: &T, refresh_token: &str) -> Result<OAuth2Token>
	where
		T: ?Sized + HttpTransport,
	{
		let slot = ResponseMetadataSlot::default();
		let handle = transport.with_metadata(slot.clone());
		let secret = RefreshToken::new(refresh_token.to_owned());
		let response = self
			.client
			.exchange_refresh_token(&secret)
			.add_scopes(self.scope.iter().map(|scope| Scope::new(scope.to_owned())))
			.request_async(&handle)
			.await
			.map_err(|e| map_request_error(slot.take(), e))?;
		let mut token = map_token_response(&self.scope, response)?;

		// The endpoint may omit the refresh token when it is still valid.
		if token.refresh_token.is_none() {
			token.refresh_token = Some(TokenSecret::new(refresh_token));
		}

		Ok(token)
	}
}

fn map_token_response(requested: &ScopeSet, response: MsaTokenResponse) -> Result<OAuth2Token> {
	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in)
		.ok()
		.filter(|secs| *secs <= MAX_EXPIRES_IN)
		.ok_or(ConfigError::ExpiresInOutOfRange)?;
	let scope = match response.scopes() {
		Some(scopes) => ScopeSet::new(scopes.iter().map(|scope| scope.as_str().to_owned()))
			.map_err(ConfigError::from)?,
		None => requested.clone(),
	};

	Ok(OAuth2Token {
		token_type: response.token_type().as_ref().to_owned(),
		expires_in,
		scope,
		access_token: TokenSecret::new(response.access_token().secret().to_owned()),
		refresh_token: response
			.refresh_token()
			.map(|token| TokenSecret::new(token.secret().to_owned())),
		user_id: response.extra_fields().user_id.clone().unwrap_or_default(),
		issued: OffsetDateTime::now_utc(),
	})
}

fn map_request_error<E>(meta: Option<ResponseMetadata>, err: MsaRequestError<E>) -> Error
where
	E: 'static + Send + Sync + StdError,
{
	let (status, error_body) = match meta {
		Some(meta) => (meta.status, meta.error_body),
		None => (None, None),
	};

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response(response, status, error_body.as_deref()),
		RequestTokenError::Request(HttpClientError::Http(e)) => ConfigError::from(e).into(),
		RequestTokenError::Request(HttpClientError::Io(e)) => TransportError::Io(e).into(),
		RequestTokenError::Request(e) => TransportError::network(e).into(),
		RequestTokenError::Parse(e, _body) =>
			AuthenticationError::OAuthEndpoint { reason: e.to_string(), status }.into(),
		RequestTokenError::Other(reason) =>
			AuthenticationError::OAuthEndpoint { reason, status }.into(),
	}
}

fn map_server_response(
	response: BasicErrorResponse,
	status: Option<u16>,
	raw_body: Option<&[u8]>,
) -> Error {
	let reason = response
		.error_description()
		.cloned()
		.unwrap_or_else(|| response.error().as_ref().to_owned());

	match response.error() {
		BasicErrorResponseType::InvalidGrant => AuthenticationError::InvalidGrant { reason }.into(),
		BasicErrorResponseType::InvalidClient | BasicErrorResponseType::UnauthorizedClient =>
			AuthenticationError::InvalidClient { reason }.into(),
		BasicErrorResponseType::Extension(code) if code == INTERACTION_REQUIRED => {
			let challenge = raw_body
				.and_then(|body| serde_json::from_slice::<serde_json::Value>(body).ok())
				.or_else(|| serde_json::to_value(&response).ok())
				.unwrap_or(serde_json::Value::Null);

			Error::TwoFactorRequired { message: reason, challenge }
		},
		_ => AuthenticationError::OAuthEndpoint { reason, status }.into(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn facade(redirect: Option<&str>) -> MsaFacade {
		let descriptor = ProviderDescriptor::xbox_live().expect("Defaults should validate.");
		let redirect = redirect.map(|uri| Url::parse(uri).expect("Redirect fixture should parse."));

		MsaFacade::from_descriptor(
			&descriptor,
			"000000004C12AE6F",
			None,
			redirect.as_ref(),
			ScopeSet::xbox_live(),
		)
		.expect("Facade should build from the default descriptor.")
	}

	fn server_error(code: BasicErrorResponseType, description: Option<&str>) -> Error {
		let response = BasicErrorResponse::new(code, description.map(str::to_owned), None);

		map_request_error::<std::io::Error>(
			Some(ResponseMetadata { status: Some(400), ..ResponseMetadata::default() }),
			RequestTokenError::ServerResponse(response),
		)
	}

	#[test]
	fn authorization_url_carries_microsoft_parameters() {
		let request = facade(Some("https://login.live.com/oauth20_desktop.srf"))
			.authorization_url()
			.expect("Authorize URL should build with a redirect URI.");
		let pairs: HashMap<_, _> = request.url.query_pairs().into_owned().collect();

		assert_eq!(request.url.path(), "/oauth20_authorize.srf");
		assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
		assert_eq!(pairs.get("approval_prompt").map(String::as_str), Some("auto"));
		assert_eq!(pairs.get("client_id").map(String::as_str), Some("000000004C12AE6F"));
		assert_eq!(pairs.get("state"), Some(&request.state));
		assert_eq!(
			pairs.get("scope").map(String::as_str),
			Some("Xboxlive.offline_access Xboxlive.signin")
		);
	}

	#[test]
	fn authorization_url_requires_redirect() {
		let err = facade(None).authorization_url().expect_err("Redirect URI is mandatory.");

		assert!(matches!(err, Error::Config(ConfigError::MissingRedirectUri)));
	}

	#[test]
	fn interaction_required_surfaces_challenge_payload() {
		let err = server_error(
			BasicErrorResponseType::Extension(INTERACTION_REQUIRED.into()),
			Some("Second factor required"),
		);
		let Error::TwoFactorRequired { message, challenge } = err else {
			panic!("Expected TwoFactorRequired, got {err:?}.");
		};

		assert_eq!(message, "Second factor required");
		assert_eq!(challenge["error"], INTERACTION_REQUIRED);
	}

	#[test]
	fn interaction_required_keeps_every_raw_challenge_field() {
		let raw = serde_json::json!({
			"error": "interaction_required",
			"error_description": "2FA",
			"suberror": "mfa",
			"claims": "{\"access_token\":{\"polids\":{\"essential\":true}}}",
			"trace_id": "0f6a3c1e"
		});
		let response: BasicErrorResponse =
			serde_json::from_value(raw.clone()).expect("Error fixture should decode.");
		let err = map_request_error::<std::io::Error>(
			Some(ResponseMetadata {
				status: Some(400),
				retry_after: None,
				error_body: Some(raw.to_string().into_bytes()),
			}),
			RequestTokenError::ServerResponse(response),
		);
		let Error::TwoFactorRequired { message, challenge } = err else {
			panic!("Expected TwoFactorRequired, got {err:?}.");
		};

		assert_eq!(message, "2FA");
		assert_eq!(challenge, raw);
	}

	#[test]
	fn token_response_rejects_unrepresentable_lifetime() {
		let response: MsaTokenResponse = serde_json::from_str(
			r#"{ "token_type": "bearer", "expires_in": 9000000000000, "access_token": "access" }"#,
		)
		.expect("Token response fixture should decode.");
		let err = map_token_response(&ScopeSet::xbox_live(), response)
			.expect_err("Lifetimes past the supported range must be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::ExpiresInOutOfRange)));
	}

	#[test]
	fn server_errors_map_to_authentication_failures() {
		assert!(matches!(
			server_error(BasicErrorResponseType::InvalidGrant, None),
			Error::Authentication(AuthenticationError::InvalidGrant { ref reason })
				if reason == "invalid_grant"
		));
		assert!(matches!(
			server_error(BasicErrorResponseType::UnauthorizedClient, None),
			Error::Authentication(AuthenticationError::InvalidClient { .. })
		));
		assert!(matches!(
			server_error(BasicErrorResponseType::InvalidScope, Some("bad scope")),
			Error::Authentication(AuthenticationError::OAuthEndpoint { status: Some(400), .. })
		));
	}

	#[test]
	fn token_response_maps_user_id_and_scope() {
		let response: MsaTokenResponse = serde_json::from_str(
			r#"{
				"token_type": "bearer",
				"expires_in": 3600,
				"scope": "Xboxlive.signin Xboxlive.offline_access",
				"access_token": "access",
				"refresh_token": "refresh",
				"user_id": "61d0ab0d0ff8d1c2"
			}"#,
		)
		.expect("Token response fixture should decode.");
		let token = map_token_response(&ScopeSet::default(), response)
			.expect("Token response should map onto an OAuth2 token.");

		assert_eq!(token.expires_in, 3600);
		assert_eq!(token.user_id, "61d0ab0d0ff8d1c2");
		assert_eq!(token.scope, ScopeSet::xbox_live());
		assert_eq!(token.refresh_secret(), Some("refresh"));
	}
}
