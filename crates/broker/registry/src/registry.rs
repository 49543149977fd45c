//! Immutable adapter registry

use crate::adapter::ServiceAdapter;
use crate::catalog::assemble_catalog;
use crate::error::{CatalogError, Result};
use broker_types::{Catalog, Plan, PlanId, Service, ServiceId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// A request's service and plan, resolved against the catalog
pub struct Resolved<'a> {
    pub adapter: &'a Arc<dyn ServiceAdapter>,
    pub service: &'a Service,
    pub plan: &'a Plan,
}

/// Adapters and their assembled catalog, built once at startup
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn ServiceAdapter>>,
    catalog: Catalog,
    routes: HashMap<ServiceId, usize>,
}

impl AdapterRegistry {
    /// Assemble the catalog from `adapters`, in order
    pub fn new(adapters: Vec<Arc<dyn ServiceAdapter>>) -> Result<Self> {
        let assembled = assemble_catalog(&adapters)?;
        info!(
            adapters = adapters.len(),
            services = assembled.catalog.len(),
            "Adapter registry assembled"
        );
        Ok(Self {
            adapters,
            catalog: assembled.catalog,
            routes: assembled.routes,
        })
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn adapters(&self) -> &[Arc<dyn ServiceAdapter>] {
        &self.adapters
    }

    /// Adapter that owns `service`
    pub fn adapter_for(&self, service: &ServiceId) -> Option<&Arc<dyn ServiceAdapter>> {
        self.routes.get(service).and_then(|&i| self.adapters.get(i))
    }

    /// Resolve a service and a plan that must belong to it
    pub fn resolve(&self, service_id: &ServiceId, plan_id: &PlanId) -> Result<Resolved<'_>> {
        let (adapter, service) = self
            .adapter_for(service_id)
            .zip(self.catalog.service(service_id))
            .ok_or_else(|| CatalogError::UnknownService(service_id.clone()))?;

        let plan = service
            .plan(plan_id)
            .ok_or_else(|| CatalogError::UnknownPlan {
                service: service_id.clone(),
                plan: plan_id.clone(),
            })?;

        Ok(Resolved {
            adapter,
            service,
            plan,
        })
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field(
                "adapters",
                &self.adapters.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .field("services", &self.catalog.len())
            .finish()
    }
}

/// Collects adapters in registration order
#[derive(Default)]
pub struct RegistryBuilder {
    adapters: Vec<Arc<dyn ServiceAdapter>>,
}

impl RegistryBuilder {
    pub fn register<A: ServiceAdapter + 'static>(mut self, adapter: A) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    pub fn register_arc(mut self, adapter: Arc<dyn ServiceAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn build(self) -> Result<AdapterRegistry> {
        AdapterRegistry::new(self.adapters)
    }
}
