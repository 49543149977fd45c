//! In-memory record store

use crate::error::Result;
use crate::record::{BindingRecord, InstanceRecord};
use crate::traits::RecordStore;
use async_trait::async_trait;
use broker_types::{BindingId, InstanceId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory record storage for development and testing
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    instances: DashMap<InstanceId, InstanceRecord>,
    bindings: DashMap<(InstanceId, BindingId), BindingRecord>,
    instance_writes: AtomicU64,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instance writes accepted so far
    pub fn instance_writes(&self) -> u64 {
        self.instance_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_instance(&self, id: &InstanceId) -> Result<Option<InstanceRecord>> {
        Ok(self.instances.get(id).map(|r| r.value().clone()))
    }

    async fn put_instance(&self, record: InstanceRecord) -> Result<()> {
        self.instance_writes.fetch_add(1, Ordering::SeqCst);
        self.instances.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete_instance(&self, id: &InstanceId) -> Result<bool> {
        Ok(self.instances.remove(id).is_some())
    }

    async fn list_instances(&self) -> Result<Vec<InstanceRecord>> {
        let mut records: Vec<_> = self.instances.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn get_binding(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
    ) -> Result<Option<BindingRecord>> {
        Ok(self
            .bindings
            .get(&(instance_id.clone(), binding_id.clone()))
            .map(|r| r.value().clone()))
    }

    async fn put_binding(&self, record: BindingRecord) -> Result<()> {
        self.bindings
            .insert((record.instance_id.clone(), record.id.clone()), record);
        Ok(())
    }

    async fn delete_binding(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
    ) -> Result<bool> {
        Ok(self
            .bindings
            .remove(&(instance_id.clone(), binding_id.clone()))
            .is_some())
    }

    async fn list_bindings(&self, instance_id: &InstanceId) -> Result<Vec<BindingRecord>> {
        let mut records: Vec<_> = self
            .bindings
            .iter()
            .filter(|r| &r.key().0 == instance_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_types::{DetailsDocument, InstanceStatus, PlanId, ServiceId};
    use chrono::Utc;

    fn record(id: &str) -> InstanceRecord {
        InstanceRecord {
            id: InstanceId::new(id),
            service_id: ServiceId::new("svc"),
            plan_id: PlanId::new("plan"),
            resource_group: "rg-1".to_string(),
            location: "eastus".to_string(),
            tags: Default::default(),
            parameters: Default::default(),
            details: DetailsDocument::empty(),
            parent_id: None,
            status: InstanceStatus::Provisioning,
            status_reason: None,
            checkpoint: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            sealed_parameters: vec![1, 2, 3],
            sealed_details: vec![],
        }
    }

    #[tokio::test]
    async fn test_instance_crud() {
        let store = InMemoryRecordStore::new();
        store.put_instance(record("b")).await.unwrap();
        store.put_instance(record("a")).await.unwrap();

        let fetched = store.get_instance(&InstanceId::new("b")).await.unwrap().unwrap();
        assert_eq!(fetched.sealed_parameters, vec![1, 2, 3]);

        let ids: Vec<_> = store
            .list_instances()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![InstanceId::new("a"), InstanceId::new("b")]);

        assert!(store.delete_instance(&InstanceId::new("a")).await.unwrap());
        assert!(!store.delete_instance(&InstanceId::new("a")).await.unwrap());
        assert_eq!(store.instance_writes(), 2);
    }

    #[tokio::test]
    async fn test_bindings_are_scoped_to_instance() {
        let store = InMemoryRecordStore::new();
        for (instance, binding) in [("i-1", "b-1"), ("i-1", "b-2"), ("i-2", "b-1")] {
            store
                .put_binding(BindingRecord {
                    id: BindingId::new(binding),
                    instance_id: InstanceId::new(instance),
                    parameters: Default::default(),
                    details: DetailsDocument::empty(),
                    bound: false,
                    created_at: Utc::now(),
                    sealed_details: vec![],
                })
                .await
                .unwrap();
        }

        let bindings = store.list_bindings(&InstanceId::new("i-1")).await.unwrap();
        assert_eq!(bindings.len(), 2);

        assert!(store
            .delete_binding(&InstanceId::new("i-2"), &BindingId::new("b-1"))
            .await
            .unwrap());
        assert!(store
            .get_binding(&InstanceId::new("i-1"), &BindingId::new("b-1"))
            .await
            .unwrap()
            .is_some());
    }
}
