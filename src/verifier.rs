//! Bearer-token verification against the cached key set.

// crates.io
use jsonwebtoken::{Algorithm, TokenData, Validation};
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	error::VerificationError,
	keyset::cache::KeyCache,
	metrics,
};

/// Signature algorithms the verifier accepts.
///
/// Fixed to the asymmetric RSA family. Tokens declaring anything else, in
/// particular a symmetric algorithm, are rejected before any key material is
/// touched, so a stolen public key can never be replayed as an HMAC secret.
pub const ACCEPTED_ALGORITHMS: [Algorithm; 3] =
	[Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Default clock skew tolerated when validating time claims.
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(30);

/// Knobs controlling claim validation.
#[derive(Clone, Debug)]
pub struct VerifierOptions {
	/// Whether `exp` and `nbf` claims are validated.
	pub check_expiry: bool,
	/// Clock skew tolerated when validating time claims.
	pub leeway: Duration,
}
impl Default for VerifierOptions {
	fn default() -> Self {
		Self { check_expiry: true, leeway: DEFAULT_LEEWAY }
	}
}

/// Claims extracted from a verified token.
///
/// Produced fresh per verification call and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct TokenClaims {
	subject: String,
	issued_at: Option<DateTime<Utc>>,
	expires_at: Option<DateTime<Utc>>,
	raw: Map<String, Value>,
}
impl TokenClaims {
	/// Principal identifier (`sub`) the token was issued to.
	pub fn subject(&self) -> &str {
		&self.subject
	}

	/// Issue timestamp (`iat`) when present.
	pub fn issued_at(&self) -> Option<DateTime<Utc>> {
		self.issued_at
	}

	/// Expiry timestamp (`exp`) when present.
	pub fn expires_at(&self) -> Option<DateTime<Utc>> {
		self.expires_at
	}

	/// Full claim mapping as decoded from the payload.
	pub fn raw(&self) -> &Map<String, Value> {
		&self.raw
	}

	/// Look up a single claim by name.
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.raw.get(name)
	}

	fn from_raw(raw: Map<String, Value>) -> Result<Self, VerificationError> {
		let subject = raw
			.get("sub")
			.and_then(Value::as_str)
			.map(str::to_owned)
			.ok_or_else(|| VerificationError::Malformed("Token has no subject claim.".into()))?;
		let issued_at = timestamp_claim(&raw, "iat");
		let expires_at = timestamp_claim(&raw, "exp");

		Ok(Self { subject, issued_at, expires_at, raw })
	}
}

/// Verifies bearer tokens against the cached key set.
///
/// Read-only with respect to the cache apart from the refreshes its lookups
/// trigger.
#[derive(Debug)]
pub struct TokenVerifier {
	keys: Arc<KeyCache>,
	options: VerifierOptions,
}
impl TokenVerifier {
	/// Build a verifier with default options over the given key cache.
	pub fn new(keys: Arc<KeyCache>) -> Self {
		Self::with_options(keys, VerifierOptions::default())
	}

	/// Build a verifier with explicit options.
	pub fn with_options(keys: Arc<KeyCache>, options: VerifierOptions) -> Self {
		Self { keys, options }
	}

	/// Verify a bearer token and return its claims.
	///
	/// Every failure is terminal for the presented token; nothing here retries.
	#[tracing::instrument(skip(self, token))]
	pub async fn verify(&self, token: &str) -> Result<TokenClaims, VerificationError> {
		let outcome = self.verify_inner(token).await;

		metrics::record_verification(outcome_label(&outcome));

		if let Err(ref err) = outcome {
			tracing::debug!(error = %err, "token rejected");
		}

		outcome
	}

	async fn verify_inner(&self, token: &str) -> Result<TokenClaims, VerificationError> {
		let header = jsonwebtoken::decode_header(token)
			.map_err(|err| VerificationError::Malformed(err.to_string()))?;

		if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
			return Err(VerificationError::AlgorithmRejected { alg: header.alg });
		}

		let kid = header.kid.ok_or_else(|| {
			VerificationError::Malformed("Token header carries no key identifier.".into())
		})?;
		let key = self
			.keys
			.resolve(&kid)
			.await?
			.ok_or(VerificationError::KeyUnresolved { kid })?;
		let validation = self.validation();
		let decoded: TokenData<Map<String, Value>> =
			jsonwebtoken::decode(token, key.decoding_key(), &validation)
				.map_err(map_decode_error)?;

		TokenClaims::from_raw(decoded.claims)
	}

	fn validation(&self) -> Validation {
		let mut validation = Validation::new(Algorithm::RS256);

		validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
		validation.validate_exp = self.options.check_expiry;
		validation.validate_nbf = self.options.check_expiry;
		validation.validate_aud = false;
		validation.leeway = self.options.leeway.as_secs();

		if !self.options.check_expiry {
			validation.required_spec_claims.clear();
		}

		validation
	}
}

fn timestamp_claim(raw: &Map<String, Value>, name: &str) -> Option<DateTime<Utc>> {
	raw.get(name).and_then(Value::as_i64).and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> VerificationError {
	use jsonwebtoken::errors::ErrorKind;

	match err.kind() {
		ErrorKind::InvalidSignature => VerificationError::SignatureInvalid,
		ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => VerificationError::Expired,
		_ => VerificationError::Malformed(err.to_string()),
	}
}

fn outcome_label(outcome: &Result<TokenClaims, VerificationError>) -> &'static str {
	match outcome {
		Ok(_) => "ok",
		Err(VerificationError::Malformed(_)) => "malformed",
		Err(VerificationError::AlgorithmRejected { .. }) => "algorithm_rejected",
		Err(VerificationError::KeyUnresolved { .. }) => "key_unresolved",
		Err(VerificationError::SignatureInvalid) => "signature_invalid",
		Err(VerificationError::Expired) => "expired",
		Err(VerificationError::KeySource(_)) => "key_source",
	}
}
