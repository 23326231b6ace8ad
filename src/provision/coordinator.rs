//! Two-step provisioning saga with compensating rollback.
//!
//! Ordering is remote-first by design: local persistence is never attempted before
//! the remote identity exists, so the only partial-failure window is "remote
//! exists, local write failed", which the compensating delete closes.

// self
use crate::{
	_prelude::*,
	error::{Compensation, IdentityProviderError, ProvisioningError, StoreError},
	metrics::{self, ProvisioningMetrics},
	provision::{
		records::{ProvisioningRequest, User, UserProfile},
		remote::{IdentityProvider, NewAccount, RemoteIdentityHandle},
		store::RecordStore,
	},
};

/// Orchestrates remote identity creation and local persistence for one
/// registration request at a time.
///
/// Attempts for unrelated requests run freely in parallel; uniqueness for
/// same-identity races is enforced by the remote provider and the local store,
/// whose conflicts the coordinator surfaces as such.
pub struct ProvisioningCoordinator {
	provider: Arc<dyn IdentityProvider>,
	store: Arc<dyn RecordStore>,
	metrics: Arc<ProvisioningMetrics>,
}
impl ProvisioningCoordinator {
	/// Build a coordinator over the given provider and store handles.
	pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn RecordStore>) -> Self {
		Self { provider, store, metrics: ProvisioningMetrics::new() }
	}

	/// Access the per-coordinator telemetry accumulator.
	pub fn metrics(&self) -> Arc<ProvisioningMetrics> {
		self.metrics.clone()
	}

	/// Provision a user across the remote provider and the local store.
	///
	/// On failure after the remote identity was created, exactly one compensating
	/// delete is attempted; its outcome travels with the returned error.
	#[tracing::instrument(skip(self, request), fields(email = %request.email))]
	pub async fn provision(
		&self,
		request: ProvisioningRequest,
	) -> Result<User, ProvisioningError> {
		self.metrics.record_attempt();

		let account = NewAccount::from_request(&request);
		let handle = match self.provider.create_account(&account).await {
			Ok(handle) => handle,
			Err(IdentityProviderError::Conflict) => {
				self.metrics.record_remote_conflict();
				metrics::record_provisioning("remote_conflict");

				return Err(ProvisioningError::RemoteConflict { email: request.email });
			},
			Err(err) => {
				self.metrics.record_remote_failure();
				metrics::record_provisioning("remote_create_failed");

				return Err(ProvisioningError::RemoteCreateFailed(err));
			},
		};

		tracing::debug!(remote_id = %handle.remote_id, "remote identity created");

		// Without its credential the account is unusable, so a failure here is a
		// remote-creation failure that already left state behind: same rollback
		// as a failed local persist.
		if let Err(err) = self.provider.set_credential(&handle.remote_id, &request.password).await
		{
			let compensation = self.compensate(&handle).await;

			self.metrics.record_local_failure();
			metrics::record_provisioning("credential_failed");

			return Err(ProvisioningError::CredentialFailed { compensation, source: err });
		}

		let user = User::from_request(&request, &handle.remote_id);
		let profile = UserProfile::from_request(&request, user.id);

		if let Err(err) = user.validate().and_then(|()| profile.validate()) {
			let compensation = self.compensate(&handle).await;

			self.metrics.record_local_failure();
			metrics::record_provisioning("invalid_record");

			return Err(ProvisioningError::InvalidRecord { compensation, source: err });
		}

		match self.store.save_user(user, profile).await {
			Ok(saved) => {
				self.metrics.record_provisioned();
				metrics::record_provisioning("provisioned");
				tracing::info!(user_id = %saved.id, remote_id = %saved.remote_id, "user provisioned");

				Ok(saved)
			},
			Err(StoreError::ConstraintViolation { field }) => {
				let compensation = self.compensate(&handle).await;

				self.metrics.record_local_failure();
				metrics::record_provisioning("local_conflict");

				Err(ProvisioningError::LocalConflict { compensation, field })
			},
			Err(err) => {
				let compensation = self.compensate(&handle).await;

				self.metrics.record_local_failure();
				metrics::record_provisioning("local_persist_failed");

				Err(ProvisioningError::LocalPersistFailed { compensation, source: err })
			},
		}
	}

	/// Roll back the remote identity. One attempt, never retried; a failure here
	/// means an orphan may exist and is flagged for out-of-band reconciliation.
	async fn compensate(&self, handle: &RemoteIdentityHandle) -> Compensation {
		match self.provider.delete_account(&handle.remote_id).await {
			Ok(()) => {
				tracing::info!(remote_id = %handle.remote_id, "rolled back remote identity");
				self.metrics.record_compensation(true);

				Compensation::Completed
			},
			Err(err) => {
				tracing::error!(
					remote_id = %handle.remote_id,
					error = %err,
					"remote rollback failed; orphaned identity needs reconciliation"
				);
				self.metrics.record_compensation(false);
				metrics::record_compensation_failure();

				Compensation::Failed
			},
		}
	}
}
