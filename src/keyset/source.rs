//! HTTP client for the provider's key discovery endpoint.

// crates.io
use jsonwebtoken::jwk::JwkSet;
use reqwest::Client;
use url::Url;
// self
use crate::{
	_prelude::*,
	config::IdentityProviderConfig,
	error::{KeySourceError, ValidationError},
	keyset::snapshot::KeySetSnapshot,
};

/// Fetches the full published key set over HTTP with bounded timeouts.
///
/// The client never retries; a stale-but-valid cached snapshot is preferred over
/// blocking a request on repeated fetch attempts, so retry policy belongs to the
/// caller.
#[derive(Clone, Debug)]
pub struct KeySourceClient {
	client: Client,
	jwks_url: Url,
	request_timeout: Duration,
}
impl KeySourceClient {
	/// Build a key source client from the provider configuration.
	pub fn new(config: &IdentityProviderConfig) -> Result<Self, ValidationError> {
		config.validate()?;

		let client = Client::builder()
			.user_agent(format!("auth-bridge/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(config.connect_timeout)
			.build()
			.map_err(|err| ValidationError::new("http_client", err.to_string()))?;

		Ok(Self::with_client(config, client))
	}

	/// Build a key source client using the supplied HTTP client (primarily for tests).
	pub fn with_client(config: &IdentityProviderConfig, client: Client) -> Self {
		Self { client, jwks_url: config.jwks_url(), request_timeout: config.request_timeout }
	}

	/// Discovery endpoint this client fetches from.
	pub fn jwks_url(&self) -> &Url {
		&self.jwks_url
	}

	/// Fetch and parse the published key set.
	#[tracing::instrument(skip(self), fields(url = %self.jwks_url))]
	pub async fn fetch_key_set(&self) -> Result<KeySetSnapshot, KeySourceError> {
		let start = Instant::now();
		let response = self
			.client
			.get(self.jwks_url.clone())
			.timeout(self.request_timeout)
			.send()
			.await?
			.error_for_status()?;
		let bytes = response.bytes().await?;
		let set: JwkSet = serde_json::from_slice(&bytes)
			.map_err(|err| KeySourceError::Malformed(err.to_string()))?;
		let snapshot = KeySetSnapshot::from_jwk_set(&set, Instant::now())?;

		tracing::debug!(keys = snapshot.len(), elapsed = ?start.elapsed(), "key set fetched");

		Ok(snapshot)
	}
}
