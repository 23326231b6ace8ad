//! Async bearer-token verification and compensating cross-system user provisioning for
//! JWKS-backed identity providers.
//!
//! Two subsystems make up the crate. The verification side ([`TokenVerifier`] backed by
//! [`KeyCache`] and [`KeySourceClient`]) validates RSA-signed bearer tokens against the
//! provider's published, rotating key set with TTL caching, single-flight refresh, and
//! serve-stale failure isolation. The provisioning side ([`ProvisioningCoordinator`])
//! performs the remote-first two-step write (create the identity on the provider, then
//! persist the local record) and rolls back the remote identity when the local step
//! fails.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod keyset;
pub mod metrics;
pub mod provision;
pub mod verifier;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;
}

pub use crate::{
	config::IdentityProviderConfig,
	error::{
		Compensation, IdentityProviderError, KeySourceError, ProvisioningError, StoreError,
		ValidationError, VerificationError,
	},
	keyset::{
		cache::KeyCache,
		snapshot::{KeySetSnapshot, VerificationKey},
		source::KeySourceClient,
	},
	provision::{
		coordinator::ProvisioningCoordinator,
		records::{ProfileAttributes, ProvisioningRequest, User, UserProfile, UserType},
		remote::{AdminApiClient, IdentityProvider, NewAccount, RemoteIdentityHandle},
		store::{MemoryRecordStore, RecordStore},
	},
	verifier::{TokenClaims, TokenVerifier, VerifierOptions},
};
#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
