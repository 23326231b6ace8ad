//! Tagged error types, one per operation, so callers branch on kind instead of
//! string-matching messages.

/// Configuration or record validation failure.
#[derive(Clone, Debug, thiserror::Error)]
#[error("Validation failed for {field}: {reason}")]
pub struct ValidationError {
	/// Field that failed validation.
	pub field: &'static str,
	/// Reason the value was rejected.
	pub reason: String,
}
impl ValidationError {
	pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
		Self { field, reason: reason.into() }
	}
}

/// Failures raised while fetching the published key set.
///
/// Both variants are recoverable infrastructure failures; the cache prefers a
/// stale snapshot over surfacing them when one exists.
#[derive(Clone, Debug, thiserror::Error)]
pub enum KeySourceError {
	/// The discovery endpoint could not be reached, timed out, or answered with a
	/// non-success status.
	#[error("Key source unavailable: {0}")]
	Unavailable(String),
	/// The endpoint answered, but the body is not a usable key set document.
	#[error("Key source returned a malformed key set: {0}")]
	Malformed(String),
}
impl From<reqwest::Error> for KeySourceError {
	fn from(value: reqwest::Error) -> Self {
		Self::Unavailable(value.to_string())
	}
}

/// Failures raised by token verification.
///
/// Every variant except [`KeySource`](Self::KeySource) is a terminal rejection of the
/// presented token and must never be retried.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
	/// The token is not a decodable three-part signed structure, or its claims are
	/// unusable.
	#[error("Token is structurally malformed: {0}")]
	Malformed(String),
	/// The token declares an algorithm outside the accepted asymmetric family.
	#[error("Token declares algorithm {alg:?}, which is not accepted")]
	AlgorithmRejected {
		/// Algorithm named in the token header.
		alg: jsonwebtoken::Algorithm,
	},
	/// No published key matches the token's key identifier, even after a refresh.
	#[error("No verification key published for kid '{kid}'")]
	KeyUnresolved {
		/// Key identifier named in the token header.
		kid: String,
	},
	/// Cryptographic verification failed against the resolved key.
	#[error("Token signature does not match the resolved key")]
	SignatureInvalid,
	/// The token is outside its validity window.
	#[error("Token is expired or not yet valid")]
	Expired,
	/// No cached keys exist and the key set could not be fetched.
	#[error(transparent)]
	KeySource(#[from] KeySourceError),
}

/// Failures returned by the remote identity provider client.
#[derive(Debug, thiserror::Error)]
pub enum IdentityProviderError {
	/// The identity already exists on the provider (duplicate username or email).
	#[error("Identity already exists on the provider")]
	Conflict,
	/// The presented credentials were rejected.
	#[error("Identity provider rejected the credentials")]
	CredentialsRejected,
	/// Transport-level failure reaching the provider.
	#[error("Identity provider unreachable: {0}")]
	Unavailable(#[from] reqwest::Error),
	/// The provider answered with a status the client does not expect.
	#[error("Identity provider returned HTTP {status} during {operation}")]
	UnexpectedStatus {
		/// Status code the provider answered with.
		status: reqwest::StatusCode,
		/// Operation being performed.
		operation: &'static str,
	},
	/// The provider response could not be decoded.
	#[error("Identity provider returned an undecodable response: {0}")]
	Malformed(String),
}

/// Failures returned by the local record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	/// A unique constraint was violated.
	#[error("Unique constraint violated on {field}")]
	ConstraintViolation {
		/// Field carrying the uniqueness constraint.
		field: &'static str,
	},
	/// Backend failure (connection, transaction, serialization).
	#[error("Record store failure: {0}")]
	Backend(String),
}

/// Outcome of the compensating remote rollback attached to a provisioning failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compensation {
	/// Nothing was created remotely, so there was nothing to undo.
	NotRequired,
	/// The just-created remote identity was deleted.
	Completed,
	/// The rollback delete failed. An orphaned remote identity may exist and needs
	/// out-of-band reconciliation.
	Failed,
}

/// Failures raised by the provisioning coordinator.
///
/// Each variant identifies the step that failed and, where a remote identity had
/// already been created, the [`Compensation`] outcome of the rollback attempt.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
	/// An account already exists on the remote provider for this identity.
	#[error("An account already exists for '{email}'")]
	RemoteConflict {
		/// Email the duplicate was detected on.
		email: String,
	},
	/// Remote identity creation failed before anything was written.
	#[error("Remote identity creation failed")]
	RemoteCreateFailed(#[source] IdentityProviderError),
	/// The identity was created remotely but assigning its credential failed,
	/// leaving it unusable.
	#[error("Credential assignment failed on the new remote identity")]
	CredentialFailed {
		/// Rollback outcome.
		compensation: Compensation,
		/// Underlying provider failure.
		#[source]
		source: IdentityProviderError,
	},
	/// The request failed record validation after the remote identity was created.
	#[error("Provisioning request failed validation")]
	InvalidRecord {
		/// Rollback outcome.
		compensation: Compensation,
		/// Underlying validation failure.
		#[source]
		source: ValidationError,
	},
	/// A local record with the same unique fields already exists.
	#[error("A local record already exists for this identity")]
	LocalConflict {
		/// Rollback outcome.
		compensation: Compensation,
		/// Field carrying the violated constraint.
		field: &'static str,
	},
	/// Local persistence failed after the remote identity was created.
	#[error("Local persistence failed after remote identity creation")]
	LocalPersistFailed {
		/// Rollback outcome.
		compensation: Compensation,
		/// Underlying store failure.
		#[source]
		source: StoreError,
	},
}
impl ProvisioningError {
	/// Compensation outcome attached to this failure.
	pub fn compensation(&self) -> Compensation {
		match self {
			Self::RemoteConflict { .. } | Self::RemoteCreateFailed(_) => Compensation::NotRequired,
			Self::CredentialFailed { compensation, .. }
			| Self::InvalidRecord { compensation, .. }
			| Self::LocalConflict { compensation, .. }
			| Self::LocalPersistFailed { compensation, .. } => *compensation,
		}
	}

	/// Whether this failure may have left an orphaned remote identity behind.
	pub fn needs_reconciliation(&self) -> bool {
		self.compensation() == Compensation::Failed
	}
}
