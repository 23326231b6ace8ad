//! Remote identity provider interface and the admin API client backing it.

// crates.io
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::LOCATION};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
// self
use crate::{
	_prelude::*,
	config::IdentityProviderConfig,
	error::{IdentityProviderError, ValidationError},
	provision::records::ProvisioningRequest,
};

/// Renew the cached service token this long before it expires.
const SERVICE_TOKEN_MARGIN: Duration = Duration::from_secs(10);

/// Identity fields sent to the provider when creating an account.
///
/// The raw request values are forwarded unmodified; local record normalization
/// (such as the last-name sentinel) does not apply to the remote side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAccount {
	/// Username the account logs in with; the registrant's email.
	pub username: String,
	/// Email address.
	pub email: String,
	/// First name.
	pub first_name: String,
	/// Last name, possibly empty.
	pub last_name: String,
}
impl NewAccount {
	/// Project the identity fields out of a provisioning request.
	pub fn from_request(request: &ProvisioningRequest) -> Self {
		Self {
			username: request.email.clone(),
			email: request.email.clone(),
			first_name: request.first_name.clone(),
			last_name: request.last_name.clone(),
		}
	}
}

/// Handle to a remote identity created during one provisioning attempt.
///
/// Transient: it is either promoted into a persisted local record or deleted
/// remotely before the attempt finishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteIdentityHandle {
	/// Provider-assigned identity id.
	pub remote_id: String,
}

/// Account-management operations of the remote identity provider.
///
/// Implementations are injected into the coordinator, mirroring how the key set
/// client is injected into the cache.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
	/// Create a remote account and return its provider-assigned id.
	async fn create_account(
		&self,
		account: &NewAccount,
	) -> Result<RemoteIdentityHandle, IdentityProviderError>;

	/// Assign the login credential to an existing account.
	async fn set_credential(
		&self,
		remote_id: &str,
		secret: &str,
	) -> Result<(), IdentityProviderError>;

	/// Delete an account. Best-effort; used by the compensation path.
	async fn delete_account(&self, remote_id: &str) -> Result<(), IdentityProviderError>;

	/// Exchange a username and password for an access token.
	async fn authenticate(
		&self,
		username: &str,
		password: &str,
	) -> Result<String, IdentityProviderError>;
}

/// Admin REST client for a Keycloak-shaped identity provider.
///
/// Admin calls authenticate with a client-credentials service token that is cached
/// until shortly before it expires.
#[derive(Debug)]
pub struct AdminApiClient {
	client: Client,
	config: IdentityProviderConfig,
	service_token: Mutex<Option<ServiceToken>>,
}
impl AdminApiClient {
	/// Build an admin client from the provider configuration.
	pub fn new(config: IdentityProviderConfig) -> Result<Self, ValidationError> {
		config.validate()?;

		let client = Client::builder()
			.user_agent(format!("auth-bridge/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(config.connect_timeout)
			.build()
			.map_err(|err| ValidationError::new("http_client", err.to_string()))?;

		Ok(Self::with_client(config, client))
	}

	/// Build an admin client using the supplied HTTP client (primarily for tests).
	pub fn with_client(config: IdentityProviderConfig, client: Client) -> Self {
		Self { client, config, service_token: Mutex::new(None) }
	}

	async fn service_token(&self) -> Result<String, IdentityProviderError> {
		let mut slot = self.service_token.lock().await;

		if let Some(token) = slot.as_ref()
			&& Instant::now() < token.renew_at
		{
			return Ok(token.access_token.clone());
		}

		let response = self
			.client
			.post(self.config.token_url())
			.timeout(self.config.request_timeout)
			.form(&[
				("grant_type", "client_credentials"),
				("client_id", self.config.client_id.as_str()),
				("client_secret", self.config.client_secret.as_str()),
			])
			.send()
			.await?;
		let status = response.status();

		if !status.is_success() {
			return Err(IdentityProviderError::UnexpectedStatus {
				status,
				operation: "service token",
			});
		}

		let grant: TokenGrant = response
			.json()
			.await
			.map_err(|err| IdentityProviderError::Malformed(err.to_string()))?;
		let lifetime = Duration::from_secs(grant.expires_in.max(30));
		let renew_at = Instant::now() + lifetime.saturating_sub(SERVICE_TOKEN_MARGIN);
		let access_token = grant.access_token.clone();

		*slot = Some(ServiceToken { access_token: grant.access_token, renew_at });

		Ok(access_token)
	}
}
#[async_trait]
impl IdentityProvider for AdminApiClient {
	#[tracing::instrument(skip(self, account), fields(username = %account.username))]
	async fn create_account(
		&self,
		account: &NewAccount,
	) -> Result<RemoteIdentityHandle, IdentityProviderError> {
		let token = self.service_token().await?;
		let body = AccountRepresentation {
			username: &account.username,
			email: &account.email,
			first_name: &account.first_name,
			last_name: &account.last_name,
			enabled: true,
			email_verified: true,
		};
		let response = self
			.client
			.post(self.config.admin_users_url())
			.timeout(self.config.request_timeout)
			.bearer_auth(&token)
			.json(&body)
			.send()
			.await?;

		match response.status() {
			StatusCode::CREATED => {
				let remote_id = response
					.headers()
					.get(LOCATION)
					.and_then(|value| value.to_str().ok())
					.and_then(|location| location.rsplit('/').next())
					.filter(|id| !id.is_empty())
					.map(str::to_owned)
					.ok_or_else(|| {
						IdentityProviderError::Malformed(
							"Create response carries no Location id.".into(),
						)
					})?;

				tracing::debug!(%remote_id, "remote account created");

				Ok(RemoteIdentityHandle { remote_id })
			},
			StatusCode::CONFLICT => Err(IdentityProviderError::Conflict),
			status => Err(IdentityProviderError::UnexpectedStatus {
				status,
				operation: "create account",
			}),
		}
	}

	#[tracing::instrument(skip(self, secret))]
	async fn set_credential(
		&self,
		remote_id: &str,
		secret: &str,
	) -> Result<(), IdentityProviderError> {
		let token = self.service_token().await?;
		let body = CredentialRepresentation { kind: "password", value: secret, temporary: false };
		let response = self
			.client
			.put(self.config.reset_password_url(remote_id))
			.timeout(self.config.request_timeout)
			.bearer_auth(&token)
			.json(&body)
			.send()
			.await?;
		let status = response.status();

		if status.is_success() {
			Ok(())
		} else {
			Err(IdentityProviderError::UnexpectedStatus { status, operation: "set credential" })
		}
	}

	#[tracing::instrument(skip(self))]
	async fn delete_account(&self, remote_id: &str) -> Result<(), IdentityProviderError> {
		let token = self.service_token().await?;
		let response = self
			.client
			.delete(self.config.admin_user_url(remote_id))
			.timeout(self.config.request_timeout)
			.bearer_auth(&token)
			.send()
			.await?;
		let status = response.status();

		if status.is_success() {
			Ok(())
		} else {
			Err(IdentityProviderError::UnexpectedStatus { status, operation: "delete account" })
		}
	}

	#[tracing::instrument(skip(self, password))]
	async fn authenticate(
		&self,
		username: &str,
		password: &str,
	) -> Result<String, IdentityProviderError> {
		let response = self
			.client
			.post(self.config.token_url())
			.timeout(self.config.request_timeout)
			.form(&[
				("grant_type", "password"),
				("client_id", self.config.client_id.as_str()),
				("client_secret", self.config.client_secret.as_str()),
				("username", username),
				("password", password),
			])
			.send()
			.await?;
		let status = response.status();

		if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
			return Err(IdentityProviderError::CredentialsRejected);
		}
		if !status.is_success() {
			return Err(IdentityProviderError::UnexpectedStatus {
				status,
				operation: "authenticate",
			});
		}

		let grant: TokenGrant = response
			.json()
			.await
			.map_err(|err| IdentityProviderError::Malformed(err.to_string()))?;

		Ok(grant.access_token)
	}
}

#[derive(Debug)]
struct ServiceToken {
	access_token: String,
	renew_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
	access_token: String,
	#[serde(default)]
	expires_in: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountRepresentation<'a> {
	username: &'a str,
	email: &'a str,
	first_name: &'a str,
	last_name: &'a str,
	enabled: bool,
	email_verified: bool,
}

#[derive(Debug, Serialize)]
struct CredentialRepresentation<'a> {
	#[serde(rename = "type")]
	kind: &'static str,
	value: &'a str,
	temporary: bool,
}
