//! Registration requests and locally persisted records.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use serde::{Deserialize, Serialize};
use uuid::Uuid;
// self
use crate::{_prelude::*, error::ValidationError};

/// Sentinel stored as the local last name when a registrant omits theirs.
///
/// Applied only to the local record; the remote identity keeps whatever the
/// registrant submitted, empty included.
pub const LAST_NAME_UNKNOWN: &str = "LNU";

/// Initial reputation score assigned to new users.
pub const DEFAULT_SCORE: i32 = 500;

/// Accepted id proof document types.
pub const ID_PROOF_TYPES: [&str; 4] = ["AADHAAR", "PAN", "PASSPORT", "DRIVING_LICENSE"];

/// Kind of account being provisioned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
	/// A renting user; requires a phone number on record.
	Tenant,
	/// A property owner.
	Owner,
}

/// Profile attributes captured at registration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProfileAttributes {
	/// First address line.
	pub address_line1: String,
	/// Second address line.
	#[serde(default)]
	pub address_line2: Option<String>,
	/// City.
	pub city: String,
	/// State or region.
	#[serde(default)]
	pub state: Option<String>,
	/// Country.
	pub country: String,
	/// Postal code.
	#[serde(default)]
	pub postal_code: Option<String>,
	/// Id proof document type; one of [`ID_PROOF_TYPES`].
	#[serde(default)]
	pub id_proof_type: Option<String>,
	/// Id proof document number.
	#[serde(default)]
	pub id_proof_number: Option<String>,
	/// Emergency contact name.
	#[serde(default)]
	pub emergency_contact_name: Option<String>,
	/// Emergency contact phone number.
	#[serde(default)]
	pub emergency_contact_phone: Option<String>,
}

/// One registration request, immutable for the duration of a provisioning attempt.
#[derive(Clone, Deserialize)]
pub struct ProvisioningRequest {
	/// Email; doubles as the remote username.
	pub email: String,
	/// Initial credential assigned to the remote identity.
	pub password: String,
	/// First name.
	pub first_name: String,
	/// Last name; may be empty, see [`LAST_NAME_UNKNOWN`].
	#[serde(default)]
	pub last_name: String,
	/// Phone number; required for tenants.
	#[serde(default)]
	pub phone_number: Option<String>,
	/// Kind of account being created.
	pub user_type: UserType,
	/// Profile attributes persisted alongside the user.
	pub profile: ProfileAttributes,
}
impl Debug for ProvisioningRequest {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("ProvisioningRequest")
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.field("first_name", &self.first_name)
			.field("last_name", &self.last_name)
			.field("phone_number", &self.phone_number)
			.field("user_type", &self.user_type)
			.field("profile", &self.profile)
			.finish()
	}
}

/// Locally persisted user record linked to a remote identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
	/// Local record id.
	pub id: Uuid,
	/// Provider-assigned identity id; unique, non-owning back-reference.
	pub remote_id: String,
	/// Email.
	pub email: String,
	/// First name.
	pub first_name: String,
	/// Last name, normalized to [`LAST_NAME_UNKNOWN`] when omitted.
	pub last_name: String,
	/// Phone number.
	pub phone_number: Option<String>,
	/// Kind of account.
	pub user_type: UserType,
	/// Reputation score.
	pub score: i32,
	/// Whether the account is active.
	pub is_active: bool,
	/// Whether the email has been verified.
	pub email_verified: bool,
	/// Creation timestamp.
	pub created_at: DateTime<Utc>,
}
impl User {
	/// Build the local record for a request and the remote identity it produced.
	pub fn from_request(request: &ProvisioningRequest, remote_id: &str) -> Self {
		Self {
			id: Uuid::new_v4(),
			remote_id: remote_id.into(),
			email: request.email.clone(),
			first_name: request.first_name.clone(),
			last_name: normalize_last_name(&request.last_name),
			phone_number: request.phone_number.clone(),
			user_type: request.user_type,
			score: DEFAULT_SCORE,
			is_active: true,
			email_verified: false,
			created_at: Utc::now(),
		}
	}

	/// Validate the record against the documented constraints.
	pub fn validate(&self) -> Result<(), ValidationError> {
		if self.email.trim().is_empty() {
			return Err(ValidationError::new("email", "Must not be empty."));
		}
		if self.remote_id.trim().is_empty() {
			return Err(ValidationError::new("remote_id", "Must not be empty."));
		}
		if self.user_type == UserType::Tenant
			&& !self.phone_number.as_deref().is_some_and(|phone| !phone.trim().is_empty())
		{
			return Err(ValidationError::new(
				"phone_number",
				"Required for tenant accounts.",
			));
		}

		Ok(())
	}
}

/// Locally persisted profile record, one per user.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserProfile {
	/// Local record id.
	pub id: Uuid,
	/// Owning user record id.
	pub user_id: Uuid,
	/// First address line.
	pub address_line1: String,
	/// Second address line.
	pub address_line2: Option<String>,
	/// City.
	pub city: String,
	/// State or region.
	pub state: Option<String>,
	/// Country.
	pub country: String,
	/// Postal code.
	pub postal_code: Option<String>,
	/// Id proof document type.
	pub id_proof_type: Option<String>,
	/// Id proof document number.
	pub id_proof_number: Option<String>,
	/// Whether the id proof has been verified.
	pub id_proof_verified: bool,
	/// Emergency contact name.
	pub emergency_contact_name: Option<String>,
	/// Emergency contact phone number.
	pub emergency_contact_phone: Option<String>,
	/// Creation timestamp.
	pub created_at: DateTime<Utc>,
}
impl UserProfile {
	/// Build the profile record for a request and its owning user.
	pub fn from_request(request: &ProvisioningRequest, user_id: Uuid) -> Self {
		let profile = &request.profile;

		Self {
			id: Uuid::new_v4(),
			user_id,
			address_line1: profile.address_line1.clone(),
			address_line2: profile.address_line2.clone(),
			city: profile.city.clone(),
			state: profile.state.clone(),
			country: profile.country.clone(),
			postal_code: profile.postal_code.clone(),
			id_proof_type: profile.id_proof_type.clone(),
			id_proof_number: profile.id_proof_number.clone(),
			id_proof_verified: false,
			emergency_contact_name: profile.emergency_contact_name.clone(),
			emergency_contact_phone: profile.emergency_contact_phone.clone(),
			created_at: Utc::now(),
		}
	}

	/// Validate the record against the documented constraints.
	pub fn validate(&self) -> Result<(), ValidationError> {
		if self.address_line1.trim().is_empty() {
			return Err(ValidationError::new("address_line1", "Must not be empty."));
		}
		if self.city.trim().is_empty() {
			return Err(ValidationError::new("city", "Must not be empty."));
		}
		if self.country.trim().is_empty() {
			return Err(ValidationError::new("country", "Must not be empty."));
		}

		check_len("address_line1", &self.address_line1, 500)?;
		check_opt_len("address_line2", self.address_line2.as_deref(), 500)?;
		check_len("city", &self.city, 100)?;
		check_opt_len("state", self.state.as_deref(), 100)?;
		check_len("country", &self.country, 100)?;
		check_opt_len("postal_code", self.postal_code.as_deref(), 20)?;
		check_opt_len("id_proof_number", self.id_proof_number.as_deref(), 100)?;
		check_opt_len("emergency_contact_name", self.emergency_contact_name.as_deref(), 200)?;
		check_opt_len("emergency_contact_phone", self.emergency_contact_phone.as_deref(), 20)?;

		if let Some(kind) = self.id_proof_type.as_deref() {
			let canonical = kind.to_ascii_uppercase();

			if !ID_PROOF_TYPES.contains(&canonical.as_str()) {
				return Err(ValidationError::new(
					"id_proof_type",
					format!("Must be one of {}.", ID_PROOF_TYPES.join(", ")),
				));
			}
		}

		Ok(())
	}
}

fn normalize_last_name(raw: &str) -> String {
	if raw.trim().is_empty() { LAST_NAME_UNKNOWN.into() } else { raw.into() }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
	if value.len() > max {
		Err(ValidationError::new(field, format!("Cannot exceed {max} characters.")))
	} else {
		Ok(())
	}
}

fn check_opt_len(
	field: &'static str,
	value: Option<&str>,
	max: usize,
) -> Result<(), ValidationError> {
	match value {
		Some(value) => check_len(field, value, max),
		None => Ok(()),
	}
}
