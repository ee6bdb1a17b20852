//! Dispatches a signed, rate-limited request against a local mock of the Xbox Live services.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use time::{Duration, OffsetDateTime, format_description::well_known::Rfc3339};
use url::Url;
// self
use xbl_core::{
	auth::{OAuth2Token, ScopeSet},
	http::ReqwestHttpClient,
	manager::AuthenticationManager,
	provider::{ProviderDescriptor, ProviderQuirks},
	ratelimit::{LimitSpec, RateLimitConfig, RateLimiter},
	session::{DispatchRequest, Method, SignedSession},
};

fn envelope(token: &str, claims: serde_json::Value) -> Result<String> {
	let issued = OffsetDateTime::now_utc();

	Ok(json!({
		"IssueInstant": issued.format(&Rfc3339)?,
		"NotAfter": (issued + Duration::hours(16)).format(&Rfc3339)?,
		"Token": token,
		"DisplayClaims": claims,
	})
	.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let user_claims = json!({ "xui": [{ "uhs": "2535405290" }] });
	let xsts_claims = json!({ "xui": [{ "uhs": "2535405290", "xid": "2535405291234567" }] });

	for (path, body) in [
		("/device/authenticate", envelope("device", json!({ "xdi": { "did": "F700" } }))?),
		("/title/authenticate", envelope("title", json!({ "xti": { "tid": "1739947436" } }))?),
		("/user/authenticate", envelope("user", user_claims)?),
		("/xsts/authorize", envelope("xsts", xsts_claims)?),
	] {
		server
			.mock_async(|when, then| {
				when.method(POST).path(path);
				then.status(200).header("content-type", "application/json").body(body);
			})
			.await;
	}

	let profile = server
		.mock_async(|when, then| {
			when.method(POST).path("/users/batch/profile/settings").header_exists("signature");
			then.status(200).header("content-type", "application/json").body("{\"profileUsers\":[]}");
		})
		.await;
	let descriptor = ProviderDescriptor::builder()
		.base_url(Url::parse(&server.url("/"))?)
		.quirks(ProviderQuirks { allow_insecure_endpoints: true, ..ProviderQuirks::default() })
		.build()?;
	let oauth = OAuth2Token::bearer("demo-access", Duration::hours(1), ScopeSet::xbox_live());
	let manager = Arc::new(
		AuthenticationManager::with_http_client(descriptor, "demo-client", ReqwestHttpClient::new()?)
			.with_oauth_token(oauth),
	);
	let limiter = Arc::new(RateLimiter::new(RateLimitConfig::new(LimitSpec::split(10, 3), 30))?);
	let session = SignedSession::new(manager);
	let request = DispatchRequest::new(
		Method::POST,
		Url::parse(&server.url("/users/batch/profile/settings"))?,
	)
	.json(&json!({ "userIds": ["2535405291234567"], "settings": ["Gamertag"] }))?
	.signed()
	.with_limiter(limiter.clone());
	let response = session.dispatch(request).await?;

	profile.assert_async().await;

	println!(
		"HTTP {} with MS-CV {}; write budget used: {:?}.",
		response.status(),
		session.correlation_vector().value(),
		limiter.usage(xbl_core::ratelimit::Direction::Write),
	);

	Ok(())
}
