//! Signs in with a Microsoft account and caches the session on disk.
//!
//! Set `XBL_CLIENT_ID` (and `XBL_CLIENT_SECRET` for confidential clients). The first run prints
//! the authorize URL and reads the `code` query parameter from stdin; later runs restore the
//! saved session from `XBL_TOKEN_FILE` (default `xbl_tokens.json`) and only refresh what expired.

// std
use std::{env, io, sync::Arc};
// crates.io
use color_eyre::{Result, eyre::eyre};
use url::Url;
// self
use xbl_core::{
	manager::ReqwestAuthenticationManager,
	store::{FileStore, SessionStore},
};

const REDIRECT_URI: &str = "https://login.live.com/oauth20_desktop.srf";

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let client_id = env::var("XBL_CLIENT_ID").map_err(|_| eyre!("XBL_CLIENT_ID is not set"))?;
	let token_file = env::var("XBL_TOKEN_FILE").unwrap_or_else(|_| "xbl_tokens.json".into());
	let store: Arc<dyn SessionStore> = Arc::new(FileStore::open(token_file)?);
	let mut manager = ReqwestAuthenticationManager::new(client_id)?
		.with_redirect_uri(Url::parse(REDIRECT_URI)?)
		.with_store(store);

	if let Ok(secret) = env::var("XBL_CLIENT_SECRET") {
		manager = manager.with_client_secret(secret);
	}

	let chain = if manager.restore_from_store().await? {
		manager.ensure_fresh().await?
	} else {
		let request = manager.authorization_url()?;

		println!("Open this URL and paste the `code` parameter of the redirect:\n{}", request.url);

		let mut code = String::new();

		io::stdin().read_line(&mut code)?;

		manager.request_tokens(code.trim()).await?
	};
	let xsts = chain.xsts().ok_or_else(|| eyre!("the chain has no XSTS token"))?;

	println!("Signed in as {} ({}).", xsts.gamertag().unwrap_or("<unknown>"), xsts.userhash());
	println!("Authorization: {}", manager.current_authorization_header()?);

	Ok(())
}
