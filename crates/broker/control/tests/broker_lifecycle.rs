//! Lifecycle operations through the broker facade

use async_trait::async_trait;
use broker_adapters::{
    CacheAdapter, CacheDetails, InMemorySqlAdmin, LoginDetails, LoginSecureDetails,
    ServerSecureDetails, SqlAdapter,
};
use broker_control::{Broker, BrokerError, ProvisionRequest, UpdateRequest, INSTANCE_TAG};
use broker_crypto::NoopCodec;
use broker_deployment::{
    ApiError, DeploymentEngine, EngineConfig, InMemoryResourceManager, SubmitBehavior,
};
use broker_registry::{AdapterError, AdapterRegistry, CatalogError};
use broker_state::{InMemoryRecordStore, InstanceStore, SealedStore, StoreError};
use broker_types::{
    Binding, BindingId, Instance, InstanceId, InstanceStatus, Parameters, PipelineKind, PlanId,
    ServiceId,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Store whose writes of a Failed instance never land
struct FailedWritesLost {
    inner: SealedStore,
}

#[async_trait]
impl InstanceStore for FailedWritesLost {
    async fn get_instance(&self, id: &InstanceId) -> broker_state::Result<Option<Instance>> {
        self.inner.get_instance(id).await
    }

    async fn put_instance(&self, instance: &Instance) -> broker_state::Result<()> {
        if instance.status == InstanceStatus::Failed {
            return Err(StoreError::Connection("store went away".to_string()));
        }
        self.inner.put_instance(instance).await
    }

    async fn delete_instance(&self, id: &InstanceId) -> broker_state::Result<bool> {
        self.inner.delete_instance(id).await
    }

    async fn list_instances(&self) -> broker_state::Result<Vec<Instance>> {
        self.inner.list_instances().await
    }

    async fn get_binding(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
    ) -> broker_state::Result<Option<Binding>> {
        self.inner.get_binding(instance_id, binding_id).await
    }

    async fn put_binding(&self, binding: &Binding) -> broker_state::Result<()> {
        self.inner.put_binding(binding).await
    }

    async fn delete_binding(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
    ) -> broker_state::Result<bool> {
        self.inner.delete_binding(instance_id, binding_id).await
    }

    async fn list_bindings(&self, instance_id: &InstanceId) -> broker_state::Result<Vec<Binding>> {
        self.inner.list_bindings(instance_id).await
    }
}

struct Harness {
    api: Arc<InMemoryResourceManager>,
    admin: Arc<InMemorySqlAdmin>,
    store: Arc<dyn InstanceStore>,
    broker: Broker,
    cancel: CancellationToken,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(|sealed| Arc::new(sealed))
    }

    fn with_store(wrap: impl FnOnce(SealedStore) -> Arc<dyn InstanceStore>) -> Self {
        let api = Arc::new(InMemoryResourceManager::new());
        let engine = DeploymentEngine::new(api.clone(), EngineConfig::default());
        let admin = Arc::new(InMemorySqlAdmin::new());
        let registry = AdapterRegistry::builder()
            .register(CacheAdapter::new(engine.clone()))
            .register(SqlAdapter::new(engine, admin.clone()))
            .build()
            .unwrap();
        let store = wrap(SealedStore::new(
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(NoopCodec),
        ));

        Self {
            broker: Broker::new(Arc::new(registry), store.clone()),
            api,
            admin,
            store,
            cancel: CancellationToken::new(),
        }
    }

    async fn provision(&self, request: ProvisionRequest) -> Result<Instance, BrokerError> {
        self.broker.provision(request, &self.cancel).await
    }
}

fn params(pairs: &[(&str, &str)]) -> Parameters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

fn cache_request() -> ProvisionRequest {
    ProvisionRequest::new("cache-1", "redis-cache", "redis-cache-basic")
        .with_resource_group("rg-1")
        .with_location("eastus")
        .with_parameters(params(&[("cacheName", "redis1")]))
}

fn server_request() -> ProvisionRequest {
    ProvisionRequest::new("srv-1", "sql-server", "sql-server-standard")
        .with_resource_group("rg-1")
        .with_location("westeurope")
        .with_parameters(params(&[("serverName", "srv1")]))
}

fn database_request() -> ProvisionRequest {
    ProvisionRequest::new("db-1", "sql-database", "sql-database-basic")
        .with_parameters(params(&[("databaseName", "orders")]))
        .with_parent("srv-1")
}

#[tokio::test(start_paused = true)]
async fn test_database_lifecycle() {
    let h = Harness::new();
    h.provision(server_request()).await.unwrap();

    let database = h.provision(database_request()).await.unwrap();
    assert_eq!(database.status, InstanceStatus::Provisioned);
    assert_eq!(database.resource_group, "rg-1");
    assert_eq!(database.location, "westeurope");
    assert_eq!(database.tags.get(INSTANCE_TAG).map(String::as_str), Some("db-1"));

    let binding_id = BindingId::new("b-1");
    let binding = h
        .broker
        .bind(&database.id, &binding_id, Parameters::new(), &h.cancel)
        .await
        .unwrap();
    assert!(!binding.details.is_empty());

    let again = h
        .broker
        .bind(&database.id, &binding_id, Parameters::new(), &h.cancel)
        .await
        .unwrap();
    assert_eq!(again.details, binding.details);
    assert_eq!(again.secure_details, binding.secure_details);
    assert_eq!(h.admin.creates(), 1);

    let credentials = h.broker.credentials(&database.id, &binding_id).await.unwrap();
    assert_eq!(credentials["host"], json!("srv1.database.windows.net"));
    assert_eq!(credentials["database"], json!("orders"));

    h.broker.unbind(&database.id, &binding_id, &h.cancel).await.unwrap();
    assert_eq!(h.admin.login_count(), 0);
    assert!(matches!(
        h.broker.credentials(&database.id, &binding_id).await,
        Err(BrokerError::NotFound(_))
    ));

    h.broker.deprovision(&database.id, &h.cancel).await.unwrap();
    h.broker
        .deprovision(&InstanceId::new("srv-1"), &h.cancel)
        .await
        .unwrap();
    assert!(h.broker.list_instances().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_identical_provision_is_a_noop() {
    let h = Harness::new();
    let first = h.provision(cache_request()).await.unwrap();
    let second = h.provision(cache_request()).await.unwrap();

    assert_eq!(first.details, second.details);
    assert_eq!(second.status, InstanceStatus::Provisioned);
    assert_eq!(h.api.submissions(), 1);

    let different = cache_request().with_parameters(params(&[("cacheName", "redis2")]));
    assert!(matches!(
        h.provision(different).await,
        Err(BrokerError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_unknown_plan_is_rejected_before_any_write() {
    let h = Harness::new();
    let request = ProvisionRequest::new("cache-1", "redis-cache", "sql-server-standard");

    let err = h.provision(request).await.unwrap_err();
    assert!(matches!(
        err,
        BrokerError::Catalog(CatalogError::UnknownPlan { .. })
    ));

    let err = h
        .provision(ProvisionRequest::new("x-1", "mongo", "mongo-basic"))
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Catalog(CatalogError::UnknownService(_))));
    assert!(h.store.list_instances().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_parent_is_checked_before_any_write() {
    let h = Harness::new();

    let orphan = ProvisionRequest::new("db-1", "sql-database", "sql-database-basic");
    assert!(matches!(
        h.provision(orphan).await,
        Err(BrokerError::InvalidRequest(_))
    ));
    assert!(matches!(
        h.provision(database_request()).await,
        Err(BrokerError::NotFound(_))
    ));

    let nested_cache = cache_request().with_parent("srv-1");
    assert!(matches!(
        h.provision(nested_cache).await,
        Err(BrokerError::InvalidRequest(_))
    ));
    assert!(h.store.list_instances().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_parameters_are_rejected() {
    let h = Harness::new();
    let request = cache_request().with_parameters(params(&[("cacheName", "no spaces")]));
    assert!(matches!(
        h.provision(request).await,
        Err(BrokerError::Adapter(AdapterError::InvalidParameters(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failed_step_is_recorded_and_resumed() {
    let h = Harness::new();
    h.api
        .fail_lookups_with(Some(ApiError::Transport("connection reset".to_string())));

    let err = h.provision(cache_request()).await.unwrap_err();
    assert!(err.is_retryable());

    let id = InstanceId::new("cache-1");
    let failed = h.broker.get_instance(&id).await.unwrap();
    assert_eq!(failed.status, InstanceStatus::Failed);
    assert!(failed
        .status_reason
        .as_deref()
        .is_some_and(|reason| reason.contains("connection reset")));
    assert_eq!(failed.last_completed_step(), Some("preprocess"));

    h.api.fail_lookups_with(None);
    let resumed = h.broker.resume(&id, &h.cancel).await.unwrap().unwrap();
    assert_eq!(resumed.status, InstanceStatus::Provisioned);
    assert!(resumed.status_reason.is_none());
    assert!(resumed.checkpoint.is_none());
    assert_eq!(h.api.submissions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_provision_stays_in_flight() {
    let h = Harness::new();
    h.api.set_submit_behavior(SubmitBehavior::Hang);

    let broker = h.broker.clone();
    let cancel = h.cancel.clone();
    let task = tokio::spawn(async move { broker.provision(cache_request(), &cancel).await });

    tokio::time::sleep(Duration::from_secs(30)).await;
    h.cancel.cancel();
    assert!(task.await.unwrap().is_err());

    let instance = h.broker.get_instance(&InstanceId::new("cache-1")).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Provisioning);
    assert_eq!(instance.last_completed_step(), Some("preprocess"));
}

#[tokio::test(start_paused = true)]
async fn test_deprovision_refuses_parent_with_children() {
    let h = Harness::new();
    h.provision(server_request()).await.unwrap();
    h.provision(database_request()).await.unwrap();

    let err = h
        .broker
        .deprovision(&InstanceId::new("srv-1"), &h.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Conflict(ref m) if m.contains("db-1")));
}

#[tokio::test(start_paused = true)]
async fn test_deprovision_refuses_bound_instance() {
    let h = Harness::new();
    let cache = h.provision(cache_request()).await.unwrap();
    h.broker
        .bind(&cache.id, &BindingId::new("b-1"), Parameters::new(), &h.cancel)
        .await
        .unwrap();

    assert!(matches!(
        h.broker.deprovision(&cache.id, &h.cancel).await,
        Err(BrokerError::Conflict(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_update_switches_plan() {
    let h = Harness::new();
    let cache = h.provision(cache_request()).await.unwrap();

    let updated = h
        .broker
        .update(&cache.id, UpdateRequest::plan("redis-cache-standard"), &h.cancel)
        .await
        .unwrap();
    assert_eq!(updated.plan_id, PlanId::new("redis-cache-standard"));
    assert_eq!(updated.status, InstanceStatus::Provisioned);
    assert_eq!(h.api.submissions(), 2);

    let err = h
        .broker
        .update(&cache.id, UpdateRequest::plan("sql-database-s0"), &h.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Catalog(CatalogError::UnknownPlan { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_failed_update_can_be_retried() {
    let h = Harness::new();
    let cache = h.provision(cache_request()).await.unwrap();

    h.api.set_submit_behavior(SubmitBehavior::Fail);
    let err = h
        .broker
        .update(&cache.id, UpdateRequest::plan("redis-cache-standard"), &h.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Pipeline(_)));
    let failed = h.broker.get_instance(&cache.id).await.unwrap();
    assert_eq!(failed.status, InstanceStatus::Failed);
    assert_eq!(
        failed.checkpoint.as_ref().map(|c| c.pipeline),
        Some(PipelineKind::Update)
    );
    let failed_details: CacheDetails = failed.details.decode().unwrap();
    let failed_deployment = failed_details.update_deployment_name.clone().unwrap();

    h.api.set_submit_behavior(SubmitBehavior::Succeed);
    let updated = h
        .broker
        .update(&cache.id, UpdateRequest::plan("redis-cache-standard"), &h.cancel)
        .await
        .unwrap();
    assert_eq!(updated.status, InstanceStatus::Provisioned);
    assert!(updated.checkpoint.is_none());
    assert!(updated.status_reason.is_none());
    assert_eq!(updated.plan_id, PlanId::new("redis-cache-standard"));
    assert_eq!(h.api.submissions(), 3);

    let details: CacheDetails = updated.details.decode().unwrap();
    assert_eq!(details.update_deployments.len(), 2);
    assert!(details.update_deployments.contains(&failed_deployment));
    assert_ne!(details.update_deployments[1], failed_deployment);

    h.broker.deprovision(&cache.id, &h.cancel).await.unwrap();
    assert_eq!(h.api.deletions(), h.api.submissions());
}

#[tokio::test(start_paused = true)]
async fn test_update_refuses_other_unfinished_pipelines() {
    let h = Harness::new();
    h.api
        .fail_lookups_with(Some(ApiError::Transport("connection reset".to_string())));
    h.provision(cache_request()).await.unwrap_err();
    h.api.fail_lookups_with(None);

    let err = h
        .broker
        .update(
            &InstanceId::new("cache-1"),
            UpdateRequest::plan("redis-cache-standard"),
            &h.cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Conflict(ref m) if m.contains("resume")));
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_bind_completes_with_the_prepared_login() {
    let h = Harness::new();
    h.provision(server_request()).await.unwrap();
    let database = h.provision(database_request()).await.unwrap();
    let binding_id = BindingId::new("b-1");

    h.admin
        .require_admin_password("srv1.database.windows.net", "not-the-admin-password");
    let err = h
        .broker
        .bind(&database.id, &binding_id, Parameters::new(), &h.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Adapter(AdapterError::Remote { .. })));

    let partial = h.broker.get_binding(&database.id, &binding_id).await.unwrap();
    assert!(!partial.bound);
    let prepared: LoginDetails = partial.details.decode().unwrap();
    assert!(!prepared.login.is_empty());
    assert_eq!(h.admin.creates(), 0);

    let server = h.broker.get_instance(&InstanceId::new("srv-1")).await.unwrap();
    let server_secure: ServerSecureDetails = server.secure_details.decode().unwrap();
    h.admin.require_admin_password(
        "srv1.database.windows.net",
        server_secure.admin_password.as_deref().unwrap(),
    );

    let binding = h
        .broker
        .bind(&database.id, &binding_id, Parameters::new(), &h.cancel)
        .await
        .unwrap();
    assert!(binding.bound);
    let login: LoginDetails = binding.details.decode().unwrap();
    assert_eq!(login, prepared);
    let secure: LoginSecureDetails = binding.secure_details.decode().unwrap();
    let prepared_secure: LoginSecureDetails = partial.secure_details.decode().unwrap();
    assert_eq!(secure, prepared_secure);
    assert_eq!(h.admin.creates(), 1);
    assert_eq!(h.admin.login_count(), 1);

    h.broker.unbind(&database.id, &binding_id, &h.cancel).await.unwrap();
    assert_eq!(h.admin.login_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unrecorded_failure_is_reported() {
    let h = Harness::with_store(|sealed| Arc::new(FailedWritesLost { inner: sealed }));
    h.api
        .fail_lookups_with(Some(ApiError::Transport("connection reset".to_string())));

    let err = h.provision(cache_request()).await.unwrap_err();
    assert!(matches!(
        err,
        BrokerError::FailureNotRecorded { store: StoreError::Connection(_), .. }
    ));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("connection reset"));

    let stored = h.broker.get_instance(&InstanceId::new("cache-1")).await.unwrap();
    assert_eq!(stored.status, InstanceStatus::Provisioning);
    assert_eq!(stored.last_completed_step(), Some("preprocess"));

    h.api.fail_lookups_with(None);
    let resumed = h
        .broker
        .resume(&stored.id, &h.cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resumed.status, InstanceStatus::Provisioned);
}

#[tokio::test(start_paused = true)]
async fn test_server_is_not_bindable() {
    let h = Harness::new();
    let server = h.provision(server_request()).await.unwrap();
    let err = h
        .broker
        .bind(&server.id, &BindingId::new("b-1"), Parameters::new(), &h.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, BrokerError::Adapter(AdapterError::NotBindable(_))));
}

#[tokio::test(start_paused = true)]
async fn test_resume_pending_runs_parents_first() {
    let h = Harness::new();
    let server = Instance::new(
        InstanceId::new("srv-1"),
        ServiceId::new("sql-server"),
        PlanId::new("sql-server-standard"),
    )
    .with_resource_group("rg-1")
    .with_location("eastus")
    .with_parameters(params(&[("serverName", "srv1")]));
    let database = Instance::new(
        InstanceId::new("db-1"),
        ServiceId::new("sql-database"),
        PlanId::new("sql-database-basic"),
    )
    .with_resource_group("rg-1")
    .with_location("eastus")
    .with_parent(InstanceId::new("srv-1"));
    h.store.put_instance(&database).await.unwrap();
    h.store.put_instance(&server).await.unwrap();

    let resumed = h.broker.resume_pending(&h.cancel).await.unwrap();
    assert_eq!(resumed.len(), 2);
    assert_eq!(resumed[0].instance_id.as_str(), "srv-1");
    assert!(resumed.iter().all(|r| r.result.is_ok()));

    for instance in h.broker.list_instances().await.unwrap() {
        assert_eq!(instance.status, InstanceStatus::Provisioned);
    }
}
