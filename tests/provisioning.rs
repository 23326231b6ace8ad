//! Integration tests for the provisioning saga: remote-first ordering, compensation,
//! and conflict handling against a mocked identity provider admin API.

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use async_trait::async_trait;
use auth_bridge::{
	AdminApiClient, Compensation, IdentityProvider, IdentityProviderConfig,
	IdentityProviderError, MemoryRecordStore, ProfileAttributes, ProvisioningCoordinator,
	ProvisioningError, ProvisioningRequest, RecordStore, StoreError, User, UserProfile, UserType,
};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_partial_json, method, path},
};

const TOKEN_PATH: &str = "/realms/testing/protocol/openid-connect/token";
const USERS_PATH: &str = "/admin/realms/testing/users";
const REMOTE_ID: &str = "remote-123";

fn config_for(server: &MockServer) -> IdentityProviderConfig {
	IdentityProviderConfig::new(server.uri(), "testing", "svc-client", "svc-secret")
		.expect("config")
		.with_require_https(false)
}

fn sample_request() -> ProvisioningRequest {
	ProvisioningRequest {
		email: "a@b.com".into(),
		password: "secret".into(),
		first_name: "A".into(),
		last_name: "Kale".into(),
		phone_number: Some("555-0100".into()),
		user_type: UserType::Tenant,
		profile: ProfileAttributes {
			address_line1: "1 Main St".into(),
			city: "Pune".into(),
			country: "India".into(),
			..ProfileAttributes::default()
		},
	}
}

async fn mount_service_token(server: &MockServer) {
	Mock::given(method("POST"))
		.and(path(TOKEN_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"access_token": "svc-access-token",
			"expires_in": 300,
		})))
		.mount(server)
		.await;
}

async fn mount_create_success(server: &MockServer) {
	Mock::given(method("POST"))
		.and(path(USERS_PATH))
		.respond_with(
			ResponseTemplate::new(201)
				.insert_header("Location", format!("{}{USERS_PATH}/{REMOTE_ID}", server.uri())),
		)
		.mount(server)
		.await;
}

async fn mount_credential_success(server: &MockServer) {
	Mock::given(method("PUT"))
		.and(path(format!("{USERS_PATH}/{REMOTE_ID}/reset-password")))
		.respond_with(ResponseTemplate::new(204))
		.mount(server)
		.await;
}

async fn mount_delete(server: &MockServer, status: u16, expected_calls: u64) {
	Mock::given(method("DELETE"))
		.and(path(format!("{USERS_PATH}/{REMOTE_ID}")))
		.respond_with(ResponseTemplate::new(status))
		.expect(expected_calls)
		.mount(server)
		.await;
}

fn coordinator(
	server: &MockServer,
	store: Arc<dyn RecordStore>,
) -> ProvisioningCoordinator {
	let provider = AdminApiClient::new(config_for(server)).expect("admin client");

	ProvisioningCoordinator::new(Arc::new(provider), store)
}

/// Store decorator counting how often the saga reaches local persistence.
struct CountingStore {
	inner: MemoryRecordStore,
	save_calls: AtomicUsize,
}
impl CountingStore {
	fn new() -> Self {
		Self { inner: MemoryRecordStore::new(), save_calls: AtomicUsize::new(0) }
	}

	fn save_calls(&self) -> usize {
		self.save_calls.load(Ordering::SeqCst)
	}
}
#[async_trait]
impl RecordStore for CountingStore {
	async fn save_user(&self, user: User, profile: UserProfile) -> Result<User, StoreError> {
		self.save_calls.fetch_add(1, Ordering::SeqCst);
		self.inner.save_user(user, profile).await
	}

	async fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<User>, StoreError> {
		self.inner.find_by_remote_id(remote_id).await
	}

	async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
		self.inner.find_by_email(email).await
	}
}

/// Store whose writes always fail with a backend error.
struct BrokenStore;
#[async_trait]
impl RecordStore for BrokenStore {
	async fn save_user(&self, _: User, _: UserProfile) -> Result<User, StoreError> {
		Err(StoreError::Backend("disk on fire".into()))
	}

	async fn find_by_remote_id(&self, _: &str) -> Result<Option<User>, StoreError> {
		Ok(None)
	}

	async fn find_by_email(&self, _: &str) -> Result<Option<User>, StoreError> {
		Ok(None)
	}
}

#[tokio::test]
async fn provisions_a_user_across_both_systems() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_service_token(&server).await;
	mount_create_success(&server).await;
	mount_credential_success(&server).await;
	mount_delete(&server, 204, 0).await;

	let store = Arc::new(MemoryRecordStore::new());
	let coordinator = coordinator(&server, store.clone());

	let user = coordinator.provision(sample_request()).await.expect("provisioned");

	assert_eq!(user.remote_id, REMOTE_ID);
	assert_eq!(user.email, "a@b.com");
	assert_eq!(user.score, 500);
	assert!(user.is_active);
	assert!(!user.email_verified);

	let found = store.find_by_remote_id(REMOTE_ID).await.expect("lookup").expect("stored");
	assert_eq!(found.id, user.id);
	assert!(store.profile_for(user.id).await.is_some());

	assert_eq!(coordinator.metrics().snapshot().provisioned, 1);

	// expect(0) on the delete mock proves no compensation ran.
	server.verify().await;
}

#[tokio::test]
async fn empty_last_name_is_sentinel_locally_but_raw_remotely() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_service_token(&server).await;
	mount_credential_success(&server).await;

	// The create mock only matches when the remote payload still carries the
	// empty last name; local normalization must not leak into it.
	Mock::given(method("POST"))
		.and(path(USERS_PATH))
		.and(body_partial_json(serde_json::json!({ "lastName": "", "username": "a@b.com" })))
		.respond_with(
			ResponseTemplate::new(201)
				.insert_header("Location", format!("{}{USERS_PATH}/{REMOTE_ID}", server.uri())),
		)
		.expect(1)
		.mount(&server)
		.await;

	let store = Arc::new(MemoryRecordStore::new());
	let coordinator = coordinator(&server, store.clone());
	let mut request = sample_request();

	request.last_name = String::new();

	let user = coordinator.provision(request).await.expect("provisioned");

	assert_eq!(user.last_name, "LNU");
	assert_eq!(
		store.find_by_email("a@b.com").await.expect("lookup").expect("stored").last_name,
		"LNU"
	);

	server.verify().await;
}

#[tokio::test]
async fn remote_conflict_fails_fast_without_local_writes() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_service_token(&server).await;
	mount_delete(&server, 204, 0).await;

	Mock::given(method("POST"))
		.and(path(USERS_PATH))
		.respond_with(ResponseTemplate::new(409))
		.mount(&server)
		.await;

	let store = Arc::new(CountingStore::new());
	let coordinator = coordinator(&server, store.clone());

	let err = coordinator.provision(sample_request()).await.unwrap_err();

	assert!(matches!(err, ProvisioningError::RemoteConflict { ref email } if email == "a@b.com"));
	assert_eq!(err.compensation(), Compensation::NotRequired);
	assert_eq!(store.save_calls(), 0);
	assert_eq!(coordinator.metrics().snapshot().remote_conflicts, 1);

	server.verify().await;
}

#[tokio::test]
async fn local_persist_failure_compensates_exactly_once() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_service_token(&server).await;
	mount_create_success(&server).await;
	mount_credential_success(&server).await;
	mount_delete(&server, 204, 1).await;

	let coordinator = coordinator(&server, Arc::new(BrokenStore));

	let err = coordinator.provision(sample_request()).await.unwrap_err();

	assert!(matches!(
		err,
		ProvisioningError::LocalPersistFailed { compensation: Compensation::Completed, .. }
	));
	assert!(!err.needs_reconciliation());

	let snapshot = coordinator.metrics().snapshot();

	assert_eq!(snapshot.local_failures, 1);
	assert_eq!(snapshot.compensations_completed, 1);

	// expect(1) on the delete mock pins the single compensating attempt.
	server.verify().await;
}

#[tokio::test]
async fn failed_compensation_is_flagged_for_reconciliation() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_service_token(&server).await;
	mount_create_success(&server).await;
	mount_credential_success(&server).await;
	mount_delete(&server, 500, 1).await;

	let coordinator = coordinator(&server, Arc::new(BrokenStore));

	let err = coordinator.provision(sample_request()).await.unwrap_err();

	assert!(matches!(
		err,
		ProvisioningError::LocalPersistFailed { compensation: Compensation::Failed, .. }
	));
	assert!(err.needs_reconciliation());
	assert_eq!(coordinator.metrics().snapshot().compensations_failed, 1);

	server.verify().await;
}

#[tokio::test]
async fn local_conflicts_surface_as_such_after_compensation() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_service_token(&server).await;
	mount_create_success(&server).await;
	mount_credential_success(&server).await;
	mount_delete(&server, 204, 1).await;

	let store = Arc::new(MemoryRecordStore::new());

	// Seed a user holding the email so the local write conflicts.
	let seeded = sample_request();
	let user = User::from_request(&seeded, "remote-existing");
	let profile = UserProfile::from_request(&seeded, user.id);

	store.save_user(user, profile).await.expect("seeded");

	let coordinator = coordinator(&server, store);

	let err = coordinator.provision(sample_request()).await.unwrap_err();

	assert!(matches!(
		err,
		ProvisioningError::LocalConflict {
			compensation: Compensation::Completed,
			field: "email",
		}
	));

	server.verify().await;
}

#[tokio::test]
async fn credential_failure_follows_the_compensation_path() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_service_token(&server).await;
	mount_create_success(&server).await;
	mount_delete(&server, 204, 1).await;

	Mock::given(method("PUT"))
		.and(path(format!("{USERS_PATH}/{REMOTE_ID}/reset-password")))
		.respond_with(ResponseTemplate::new(500))
		.mount(&server)
		.await;

	let store = Arc::new(CountingStore::new());
	let coordinator = coordinator(&server, store.clone());

	let err = coordinator.provision(sample_request()).await.unwrap_err();

	assert!(matches!(
		err,
		ProvisioningError::CredentialFailed { compensation: Compensation::Completed, .. }
	));
	assert_eq!(store.save_calls(), 0, "local persistence must not run without a credential");

	server.verify().await;
}

#[tokio::test]
async fn validation_failures_after_remote_creation_compensate() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	mount_service_token(&server).await;
	mount_create_success(&server).await;
	mount_credential_success(&server).await;
	mount_delete(&server, 204, 1).await;

	let store = Arc::new(CountingStore::new());
	let coordinator = coordinator(&server, store.clone());
	let mut request = sample_request();

	// Tenants require a phone number; validation fails after the remote write.
	request.phone_number = None;

	let err = coordinator.provision(request).await.unwrap_err();

	assert!(matches!(
		err,
		ProvisioningError::InvalidRecord { compensation: Compensation::Completed, ref source }
			if source.field == "phone_number"
	));
	assert_eq!(store.save_calls(), 0);

	server.verify().await;
}

#[tokio::test]
async fn authenticate_exchanges_credentials_for_a_token() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path(TOKEN_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
			"access_token": "user-access-token",
			"expires_in": 300,
		})))
		.mount(&server)
		.await;

	let provider = AdminApiClient::new(config_for(&server)).expect("admin client");

	let token = provider.authenticate("a@b.com", "secret").await.expect("token");
	assert_eq!(token, "user-access-token");
}

#[tokio::test]
async fn authenticate_maps_rejections_to_credentials_rejected() {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path(TOKEN_PATH))
		.respond_with(ResponseTemplate::new(401))
		.mount(&server)
		.await;

	let provider = AdminApiClient::new(config_for(&server)).expect("admin client");

	let err = provider.authenticate("a@b.com", "wrong").await.unwrap_err();
	assert!(matches!(err, IdentityProviderError::CredentialsRejected));
}
