//! Catalog assembly
//!
//! Services from every adapter are merged in registration order. The first
//! service or plan ID declared twice aborts assembly with an error naming both
//! adapters; no partial catalog is ever returned.

use crate::adapter::ServiceAdapter;
use crate::error::{CatalogError, Result};
use broker_types::{Catalog, PlanId, ServiceId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Merged catalog plus the owning adapter of every service
#[derive(Debug, Clone)]
pub struct AssembledCatalog {
    pub catalog: Catalog,

    /// Service ID to index into the adapter list
    pub routes: HashMap<ServiceId, usize>,
}

/// Merge every adapter's services into one catalog
pub fn assemble_catalog(adapters: &[Arc<dyn ServiceAdapter>]) -> Result<AssembledCatalog> {
    let mut catalog = Catalog::default();
    let mut routes: HashMap<ServiceId, usize> = HashMap::new();
    let mut plans: HashMap<PlanId, (usize, ServiceId)> = HashMap::new();

    for (index, adapter) in adapters.iter().enumerate() {
        for service in adapter.services() {
            if let Some(&owner) = routes.get(&service.id) {
                return Err(CatalogError::DuplicateService {
                    service: service.id,
                    first: adapters[owner].name().to_string(),
                    second: adapter.name().to_string(),
                });
            }

            for plan in &service.plans {
                if let Some((owner, owner_service)) = plans.get(&plan.id) {
                    return Err(CatalogError::DuplicatePlan {
                        plan: plan.id.clone(),
                        first: adapters[*owner].name().to_string(),
                        first_service: owner_service.clone(),
                        second: adapter.name().to_string(),
                        second_service: service.id.clone(),
                    });
                }
                plans.insert(plan.id.clone(), (index, service.id.clone()));
            }

            debug!(adapter = adapter.name(), service = %service.id, plans = service.plans.len(), "Service registered");
            routes.insert(service.id.clone(), index);
            catalog.services.push(service);
        }
    }

    for service in &catalog.services {
        if let Some(parent) = &service.parent_service_id {
            if !routes.contains_key(parent) {
                return Err(CatalogError::UnknownParent {
                    service: service.id.clone(),
                    parent: parent.clone(),
                });
            }
        }
    }

    Ok(AssembledCatalog { catalog, routes })
}
