//! Local record store boundary and an in-memory reference implementation.

// std
use std::collections::HashMap;
// crates.io
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;
// self
use crate::{
	error::StoreError,
	provision::records::{User, UserProfile},
};

/// Persistence boundary for user and profile records.
///
/// The store is authoritative for this system's own data; the coordinator only
/// ever writes to it after the remote identity exists.
#[async_trait]
pub trait RecordStore: Send + Sync {
	/// Persist a new user and their profile in one step.
	///
	/// Fails with [`StoreError::ConstraintViolation`] when a record with the same
	/// email or remote id already exists.
	async fn save_user(&self, user: User, profile: UserProfile) -> Result<User, StoreError>;

	/// Look up a user by the remote identity id.
	async fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<User>, StoreError>;

	/// Look up a user by email.
	async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}

/// In-memory store for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
	inner: RwLock<MemoryInner>,
}
impl MemoryRecordStore {
	/// Create an empty store.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of persisted users.
	pub async fn user_count(&self) -> usize {
		self.inner.read().await.users.len()
	}

	/// Fetch the profile persisted for a user, if any.
	pub async fn profile_for(&self, user_id: Uuid) -> Option<UserProfile> {
		self.inner.read().await.profiles.get(&user_id).cloned()
	}
}
#[async_trait]
impl RecordStore for MemoryRecordStore {
	async fn save_user(&self, user: User, profile: UserProfile) -> Result<User, StoreError> {
		let mut inner = self.inner.write().await;

		if inner.users.values().any(|existing| existing.email == user.email) {
			return Err(StoreError::ConstraintViolation { field: "email" });
		}
		if inner.users.values().any(|existing| existing.remote_id == user.remote_id) {
			return Err(StoreError::ConstraintViolation { field: "remote_id" });
		}

		inner.profiles.insert(user.id, profile);
		inner.users.insert(user.id, user.clone());

		Ok(user)
	}

	async fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<User>, StoreError> {
		let inner = self.inner.read().await;

		Ok(inner.users.values().find(|user| user.remote_id == remote_id).cloned())
	}

	async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
		let inner = self.inner.read().await;

		Ok(inner.users.values().find(|user| user.email == email).cloned())
	}
}

#[derive(Debug, Default)]
struct MemoryInner {
	users: HashMap<Uuid, User>,
	profiles: HashMap<Uuid, UserProfile>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::provision::records::{ProfileAttributes, ProvisioningRequest, UserType};

	fn sample_records(email: &str, remote_id: &str) -> (User, UserProfile) {
		let request = ProvisioningRequest {
			email: email.into(),
			password: "secret".into(),
			first_name: "A".into(),
			last_name: "B".into(),
			phone_number: None,
			user_type: UserType::Owner,
			profile: ProfileAttributes {
				address_line1: "1 Main St".into(),
				city: "Pune".into(),
				country: "India".into(),
				..ProfileAttributes::default()
			},
		};
		let user = User::from_request(&request, remote_id);
		let profile = UserProfile::from_request(&request, user.id);

		(user, profile)
	}

	#[tokio::test]
	async fn saved_users_are_findable_by_both_keys() {
		let store = MemoryRecordStore::new();
		let (user, profile) = sample_records("a@b.com", "remote-1");
		let saved = store.save_user(user, profile).await.expect("save");

		assert_eq!(
			store.find_by_email("a@b.com").await.expect("lookup").map(|u| u.id),
			Some(saved.id)
		);
		assert_eq!(
			store.find_by_remote_id("remote-1").await.expect("lookup").map(|u| u.id),
			Some(saved.id)
		);
		assert!(store.profile_for(saved.id).await.is_some());
	}

	#[tokio::test]
	async fn duplicate_email_and_remote_id_are_rejected() {
		let store = MemoryRecordStore::new();
		let (user, profile) = sample_records("a@b.com", "remote-1");

		store.save_user(user, profile).await.expect("save");

		let (user, profile) = sample_records("a@b.com", "remote-2");
		let err = store.save_user(user, profile).await.unwrap_err();

		assert!(matches!(err, StoreError::ConstraintViolation { field: "email" }));

		let (user, profile) = sample_records("c@d.com", "remote-1");
		let err = store.save_user(user, profile).await.unwrap_err();

		assert!(matches!(err, StoreError::ConstraintViolation { field: "remote_id" }));
		assert_eq!(store.user_count().await, 1);
	}
}
