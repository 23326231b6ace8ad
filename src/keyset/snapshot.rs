//! Immutable snapshots of the provider's published key set.

// std
use std::{
	collections::HashMap,
	fmt::{Debug, Formatter, Result as FmtResult},
};
// crates.io
use jsonwebtoken::{
	Algorithm, DecodingKey,
	jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm},
};
// self
use crate::{_prelude::*, error::KeySourceError};

/// A single published verification key.
///
/// Immutable once constructed; identity is the key id. Only RSA signing keys are
/// representable, matching the asymmetric-only verification policy.
#[derive(Clone)]
pub struct VerificationKey {
	kid: String,
	algorithm: Algorithm,
	decoding_key: Arc<DecodingKey>,
}
impl VerificationKey {
	/// Key identifier the provider published this key under.
	pub fn kid(&self) -> &str {
		&self.kid
	}

	/// Signature algorithm the provider tagged this key with.
	pub fn algorithm(&self) -> Algorithm {
		self.algorithm
	}

	/// Prepared decoding key for signature verification.
	pub fn decoding_key(&self) -> &DecodingKey {
		&self.decoding_key
	}

	/// Build a verification key from a JWK entry.
	///
	/// Entries without a key id, and entries that are not RSA keys, are skipped.
	fn from_jwk(jwk: &Jwk) -> Option<Self> {
		let kid = jwk.common.key_id.clone()?;
		let AlgorithmParameters::RSA(ref rsa) = jwk.algorithm else {
			return None;
		};
		let decoding_key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e).ok()?;
		let algorithm = match jwk.common.key_algorithm {
			Some(KeyAlgorithm::RS384) => Algorithm::RS384,
			Some(KeyAlgorithm::RS512) => Algorithm::RS512,
			_ => Algorithm::RS256,
		};

		Some(Self { kid, algorithm, decoding_key: Arc::new(decoding_key) })
	}
}
impl Debug for VerificationKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("VerificationKey")
			.field("kid", &self.kid)
			.field("algorithm", &self.algorithm)
			.finish_non_exhaustive()
	}
}

/// Snapshot of the provider's key set at one fetch instant.
///
/// A snapshot is replaced wholesale and never merged; individual keys are never
/// evicted.
#[derive(Clone, Debug)]
pub struct KeySetSnapshot {
	keys: HashMap<String, VerificationKey>,
	fetched_at: Instant,
}
impl KeySetSnapshot {
	/// Build a snapshot from a parsed JWKS document.
	///
	/// A document yielding zero usable RSA keys counts as malformed; serving it
	/// would reject every token while looking healthy.
	pub fn from_jwk_set(set: &JwkSet, fetched_at: Instant) -> Result<Self, KeySourceError> {
		let keys: HashMap<_, _> = set
			.keys
			.iter()
			.filter_map(VerificationKey::from_jwk)
			.map(|key| (key.kid.clone(), key))
			.collect();

		if keys.is_empty() {
			return Err(KeySourceError::Malformed(
				"Key set document contains no usable RSA signing keys.".into(),
			));
		}

		Ok(Self { keys, fetched_at })
	}

	/// Look up a key by its identifier.
	pub fn get(&self, kid: &str) -> Option<&VerificationKey> {
		self.keys.get(kid)
	}

	/// Monotonic instant the snapshot was fetched at.
	pub fn fetched_at(&self) -> Instant {
		self.fetched_at
	}

	/// Number of usable keys in the snapshot.
	pub fn len(&self) -> usize {
		self.keys.len()
	}

	/// Whether the snapshot holds no keys.
	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}

	/// Whether the snapshot has outlived the given freshness window.
	pub fn is_stale(&self, ttl: Duration, now: Instant) -> bool {
		now.saturating_duration_since(self.fetched_at) >= ttl
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const RSA_N: &str = "u2hYo9eNTlgp61RR-HM_D6NbfgGvqa7SEAHQKpUD4HdpZkt9_9XRNL7uIS6s7hr2ebwIrL47zIT7mogqx7cxp4IzVSgDI4nu2r_ksBq4ohUlJez_l0e2SwdG2-hgN9AejeVwK2nho3WkYLm-UeadJQmAoCo9jZxPIS0BmskgnoKGC7SoRKBwyRhvR5UJpdT2wu2gljcEDRHShN9dgJ0em0fhAu0i1EXtYOMocFrvIA7TsqAIcRSRiHclQ4TIg0Dbszj71cFaNg1USNU42ep3E9nKve71rv3sssvYlT8gcduezz-eMWGtC-rYu-ZvFMkkuWYXwYQFdY7JoAjch4azmw";

	fn jwk_set(json: serde_json::Value) -> JwkSet {
		serde_json::from_value(json).expect("jwk set")
	}

	#[test]
	fn builds_keys_from_rsa_entries_only() {
		let set = jwk_set(serde_json::json!({
			"keys": [
				{ "kty": "RSA", "alg": "RS256", "use": "sig", "kid": "primary", "n": RSA_N, "e": "AQAB" },
				{ "kty": "oct", "kid": "symmetric", "k": "c2VjcmV0" },
			]
		}));
		let snapshot = KeySetSnapshot::from_jwk_set(&set, Instant::now()).expect("snapshot");

		assert_eq!(snapshot.len(), 1);
		assert!(snapshot.get("primary").is_some());
		assert!(snapshot.get("symmetric").is_none());
	}

	#[test]
	fn entries_without_a_kid_are_skipped() {
		let set = jwk_set(serde_json::json!({
			"keys": [
				{ "kty": "RSA", "alg": "RS256", "use": "sig", "n": RSA_N, "e": "AQAB" },
				{ "kty": "RSA", "alg": "RS512", "use": "sig", "kid": "tagged", "n": RSA_N, "e": "AQAB" },
			]
		}));
		let snapshot = KeySetSnapshot::from_jwk_set(&set, Instant::now()).expect("snapshot");

		assert_eq!(snapshot.len(), 1);
		assert_eq!(snapshot.get("tagged").map(VerificationKey::algorithm), Some(Algorithm::RS512));
	}

	#[test]
	fn a_set_without_usable_keys_is_malformed() {
		let set = jwk_set(serde_json::json!({
			"keys": [{ "kty": "oct", "kid": "symmetric", "k": "c2VjcmV0" }]
		}));
		let err = KeySetSnapshot::from_jwk_set(&set, Instant::now()).unwrap_err();

		assert!(matches!(err, KeySourceError::Malformed(_)));
	}

	#[test]
	fn staleness_follows_the_ttl() {
		let fetched_at = Instant::now();
		let set = jwk_set(serde_json::json!({
			"keys": [{ "kty": "RSA", "alg": "RS256", "use": "sig", "kid": "primary", "n": RSA_N, "e": "AQAB" }]
		}));
		let snapshot = KeySetSnapshot::from_jwk_set(&set, fetched_at).expect("snapshot");

		assert!(!snapshot.is_stale(Duration::from_secs(60), fetched_at));
		assert!(snapshot.is_stale(Duration::from_secs(60), fetched_at + Duration::from_secs(61)));
	}

	#[test]
	fn debug_output_omits_key_material() {
		let set = jwk_set(serde_json::json!({
			"keys": [{ "kty": "RSA", "alg": "RS256", "use": "sig", "kid": "primary", "n": RSA_N, "e": "AQAB" }]
		}));
		let snapshot = KeySetSnapshot::from_jwk_set(&set, Instant::now()).expect("snapshot");
		let rendered = format!("{:?}", snapshot.get("primary").expect("key"));

		assert!(rendered.contains("primary"));
		assert!(!rendered.contains(&RSA_N[..16]));
	}
}
