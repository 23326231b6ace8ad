//! Identity provider configuration and validation.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{_prelude::*, error::ValidationError};

/// Default freshness window for the cached key set.
pub const DEFAULT_KEYS_TTL: Duration = Duration::from_secs(60 * 60);
/// Default connect timeout applied to provider HTTP calls.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default per-request timeout applied to provider HTTP calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Smallest accepted key set freshness window.
pub const MIN_KEYS_TTL: Duration = Duration::from_secs(60);

/// Connection details for one identity provider realm.
///
/// Endpoint URLs for key discovery, the token endpoint, and the account admin API are
/// derived from `server_url` and `realm` the way the provider publishes them.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityProviderConfig {
	/// Base URL of the identity provider, without a realm path.
	pub server_url: Url,
	/// Realm that issues tokens and owns provisioned accounts.
	pub realm: String,
	/// Service client id used for admin API calls.
	pub client_id: String,
	/// Service client secret used for admin API calls.
	pub client_secret: String,
	/// Whether HTTPS is required for provider endpoints.
	#[serde(default = "default_true")]
	pub require_https: bool,
	/// Freshness window for the cached key set.
	#[serde(default = "default_keys_ttl")]
	pub keys_ttl: Duration,
	/// Connect timeout for provider HTTP calls.
	#[serde(default = "default_connect_timeout")]
	pub connect_timeout: Duration,
	/// Per-request timeout for provider HTTP calls.
	#[serde(default = "default_request_timeout")]
	pub request_timeout: Duration,
}
impl IdentityProviderConfig {
	/// Construct a configuration with default cache and timeout settings.
	pub fn new(
		server_url: impl AsRef<str>,
		realm: impl Into<String>,
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> Result<Self, ValidationError> {
		let server_url = Url::parse(server_url.as_ref())
			.map_err(|err| ValidationError::new("server_url", err.to_string()))?;

		Ok(Self {
			server_url,
			realm: realm.into(),
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			require_https: true,
			keys_ttl: DEFAULT_KEYS_TTL,
			connect_timeout: DEFAULT_CONNECT_TIMEOUT,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
		})
	}

	/// Set the HTTPS requirement to the desired value.
	pub fn with_require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Set the key set freshness window.
	pub fn with_keys_ttl(mut self, keys_ttl: Duration) -> Self {
		self.keys_ttl = keys_ttl;

		self
	}

	/// Key discovery endpoint for the realm.
	pub fn jwks_url(&self) -> Url {
		self.endpoint(&["realms", &self.realm, "protocol", "openid-connect", "certs"])
	}

	/// Token endpoint for the realm.
	pub fn token_url(&self) -> Url {
		self.endpoint(&["realms", &self.realm, "protocol", "openid-connect", "token"])
	}

	/// Account collection endpoint of the admin API.
	pub fn admin_users_url(&self) -> Url {
		self.endpoint(&["admin", "realms", &self.realm, "users"])
	}

	/// Account endpoint of the admin API for one remote id.
	pub fn admin_user_url(&self, remote_id: &str) -> Url {
		self.endpoint(&["admin", "realms", &self.realm, "users", remote_id])
	}

	/// Credential reset endpoint of the admin API for one remote id.
	pub fn reset_password_url(&self, remote_id: &str) -> Url {
		self.endpoint(&["admin", "realms", &self.realm, "users", remote_id, "reset-password"])
	}

	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<(), ValidationError> {
		if self.require_https && self.server_url.scheme() != "https" {
			return Err(ValidationError::new("server_url", "Must use HTTPS.".to_string()));
		}
		if self.server_url.host_str().is_none() || self.server_url.cannot_be_a_base() {
			return Err(ValidationError::new("server_url", "Must include a host component."));
		}

		validate_realm(&self.realm)?;

		if self.client_id.is_empty() {
			return Err(ValidationError::new("client_id", "Must not be empty."));
		}
		if self.keys_ttl < MIN_KEYS_TTL {
			return Err(ValidationError::new(
				"keys_ttl",
				format!("Must be at least {MIN_KEYS_TTL:?}."),
			));
		}
		if self.connect_timeout < Duration::from_millis(100) {
			return Err(ValidationError::new("connect_timeout", "Must be at least 100 ms."));
		}
		if self.request_timeout < self.connect_timeout {
			return Err(ValidationError::new(
				"request_timeout",
				"Must be greater than or equal to connect_timeout.",
			));
		}

		Ok(())
	}

	fn endpoint(&self, segments: &[&str]) -> Url {
		let mut url = self.server_url.clone();

		if let Ok(mut path) = url.path_segments_mut() {
			path.pop_if_empty();

			for segment in segments {
				path.push(segment);
			}
		}

		url
	}
}
impl Debug for IdentityProviderConfig {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("IdentityProviderConfig")
			.field("server_url", &self.server_url.as_str())
			.field("realm", &self.realm)
			.field("client_id", &self.client_id)
			.field("client_secret", &"<redacted>")
			.field("require_https", &self.require_https)
			.field("keys_ttl", &self.keys_ttl)
			.field("connect_timeout", &self.connect_timeout)
			.field("request_timeout", &self.request_timeout)
			.finish()
	}
}

fn validate_realm(value: &str) -> Result<(), ValidationError> {
	if value.is_empty() {
		return Err(ValidationError::new("realm", "Must not be empty."));
	}
	if value.len() > 64 {
		return Err(ValidationError::new("realm", "Must be 64 characters or fewer."));
	}
	if !value.as_bytes().iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_')) {
		return Err(ValidationError::new(
			"realm",
			"May only contain ASCII letters, numbers, '-', or '_'.",
		));
	}

	Ok(())
}

fn default_true() -> bool {
	true
}

fn default_keys_ttl() -> Duration {
	DEFAULT_KEYS_TTL
}

fn default_connect_timeout() -> Duration {
	DEFAULT_CONNECT_TIMEOUT
}

fn default_request_timeout() -> Duration {
	DEFAULT_REQUEST_TIMEOUT
}
