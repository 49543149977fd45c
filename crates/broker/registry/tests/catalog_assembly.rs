//! Catalog assembly and routing

use async_trait::async_trait;
use broker_pipeline::{Pipeline, StepOutput};
use broker_registry::{
    AdapterError, AdapterRegistry, BindContext, CatalogError, Credentials, ServiceAdapter,
};
use broker_types::{Binding, Instance, PipelineKind, Plan, PlanId, Service, ServiceId};
use futures::FutureExt;

struct Stub {
    name: &'static str,
    services: Vec<Service>,
}

impl Stub {
    fn new(name: &'static str, services: Vec<Service>) -> Self {
        Self { name, services }
    }
}

#[async_trait]
impl ServiceAdapter for Stub {
    fn name(&self) -> &str {
        self.name
    }

    fn services(&self) -> Vec<Service> {
        self.services.clone()
    }

    fn pipeline(&self, _service: &ServiceId, kind: PipelineKind) -> Result<Pipeline, AdapterError> {
        Ok(Pipeline::builder(kind)
            .step_fn("noop", |_, instance| {
                async move { Ok(StepOutput::unchanged(&instance)) }.boxed()
            })
            .build()?)
    }

    async fn bind(
        &self,
        _ctx: &BindContext,
        _instance: &Instance,
        _binding: &Binding,
    ) -> Result<StepOutput, AdapterError> {
        Ok(StepOutput::default())
    }

    async fn unbind(
        &self,
        _ctx: &BindContext,
        _instance: &Instance,
        _binding: &Binding,
    ) -> Result<(), AdapterError> {
        Ok(())
    }

    fn credentials(&self, _instance: &Instance, _binding: &Binding) -> Result<Credentials, AdapterError> {
        Ok(Credentials::new())
    }
}

fn service(id: &str, plan: &str) -> Service {
    Service::new(id, id).with_plan(Plan::new(plan, plan))
}

#[test]
fn test_disjoint_adapters_merge_in_order() {
    let registry = AdapterRegistry::builder()
        .register(Stub::new("cache", vec![service("redis", "redis-basic")]))
        .register(Stub::new(
            "sql",
            vec![service("sql-server", "sql-server-std"), service("sql-db", "sql-db-s0")],
        ))
        .build()
        .unwrap();

    let ids: Vec<_> = registry
        .catalog()
        .services
        .iter()
        .map(|s| s.id.as_str())
        .collect();
    assert_eq!(ids, vec!["redis", "sql-server", "sql-db"]);
    assert_eq!(
        registry.adapter_for(&ServiceId::new("sql-db")).unwrap().name(),
        "sql"
    );
    assert!(registry.adapter_for(&ServiceId::new("mongo")).is_none());
}

#[test]
fn test_service_collision_names_both_adapters() {
    let err = AdapterRegistry::builder()
        .register(Stub::new("alpha", vec![service("shared", "plan-a")]))
        .register(Stub::new("beta", vec![service("shared", "plan-b")]))
        .build()
        .unwrap_err();

    assert!(matches!(
        err,
        CatalogError::DuplicateService { ref first, ref second, .. }
            if first == "alpha" && second == "beta"
    ));
    let message = err.to_string();
    assert!(message.contains("alpha") && message.contains("beta"));
}

#[test]
fn test_plan_collision_is_rejected() {
    let err = AdapterRegistry::builder()
        .register(Stub::new("alpha", vec![service("svc-a", "basic")]))
        .register(Stub::new("beta", vec![service("svc-b", "basic")]))
        .build()
        .unwrap_err();
    assert!(matches!(err, CatalogError::DuplicatePlan { ref plan, .. } if plan.as_str() == "basic"));
}

#[test]
fn test_unknown_parent_is_rejected() {
    let child = service("sql-db", "sql-db-s0").with_parent(ServiceId::new("sql-server"));
    let err = AdapterRegistry::builder()
        .register(Stub::new("sql", vec![child]))
        .build()
        .unwrap_err();
    assert!(matches!(err, CatalogError::UnknownParent { .. }));
}

#[test]
fn test_resolve_checks_plan_membership() {
    let registry = AdapterRegistry::builder()
        .register(Stub::new("cache", vec![service("redis", "redis-basic")]))
        .register(Stub::new("sql", vec![service("sql-server", "sql-server-std")]))
        .build()
        .unwrap();

    let resolved = registry
        .resolve(&ServiceId::new("redis"), &PlanId::new("redis-basic"))
        .unwrap();
    assert_eq!(resolved.adapter.name(), "cache");
    assert_eq!(resolved.plan.id.as_str(), "redis-basic");

    assert!(matches!(
        registry.resolve(&ServiceId::new("redis"), &PlanId::new("sql-server-std")),
        Err(CatalogError::UnknownPlan { .. })
    ));
    assert!(matches!(
        registry.resolve(&ServiceId::new("mongo"), &PlanId::new("redis-basic")),
        Err(CatalogError::UnknownService(_))
    ));
}

#[test]
fn test_default_pipeline_accessors() {
    let adapter = Stub::new("cache", vec![service("redis", "redis-basic")]);
    let id = ServiceId::new("redis");
    assert_eq!(adapter.provisioner(&id).unwrap().kind(), PipelineKind::Provision);
    assert_eq!(adapter.updater(&id).unwrap().kind(), PipelineKind::Update);
    assert_eq!(adapter.deprovisioner(&id).unwrap().kind(), PipelineKind::Deprovision);
}
