//! Codec-wrapped store
//!
//! [`SealedStore`] is the only path between plaintext [`Instance`]s and a
//! [`RecordStore`]. Secure parameters and secure details are encrypted on the
//! way in and decrypted right after load; nothing else is touched.

use crate::error::{Result, StoreError};
use crate::record::{BindingRecord, InstanceRecord};
use crate::traits::{InstanceStore, RecordStore};
use async_trait::async_trait;
use broker_crypto::Codec;
use broker_types::{Binding, BindingId, DetailsDocument, Instance, InstanceId, Parameters};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Plaintext [`InstanceStore`] over a [`RecordStore`] and a [`Codec`]
#[derive(Clone)]
pub struct SealedStore {
    records: Arc<dyn RecordStore>,
    codec: Arc<dyn Codec>,
}

impl SealedStore {
    pub fn new(records: Arc<dyn RecordStore>, codec: Arc<dyn Codec>) -> Self {
        debug!(codec = codec.name(), "Sealed store ready");
        Self { records, codec }
    }

    pub fn codec_name(&self) -> &str {
        self.codec.name()
    }

    fn seal<T: Serialize>(&self, record: &str, field: &'static str, value: &T) -> Result<Vec<u8>> {
        let plaintext = serde_json::to_vec(value).map_err(|source| StoreError::InvalidData {
            record: record.to_string(),
            source,
        })?;
        self.codec
            .encrypt(&plaintext)
            .map_err(|source| StoreError::Codec {
                record: record.to_string(),
                field,
                source,
            })
    }

    fn open<T: DeserializeOwned>(
        &self,
        record: &str,
        field: &'static str,
        sealed: &[u8],
    ) -> Result<T> {
        let plaintext = self
            .codec
            .decrypt(sealed)
            .map_err(|source| StoreError::Codec {
                record: record.to_string(),
                field,
                source,
            })?;
        serde_json::from_slice(&plaintext).map_err(|source| StoreError::InvalidData {
            record: record.to_string(),
            source,
        })
    }

    fn seal_instance(&self, instance: &Instance) -> Result<InstanceRecord> {
        let label = instance.id.to_string();
        Ok(InstanceRecord {
            id: instance.id.clone(),
            service_id: instance.service_id.clone(),
            plan_id: instance.plan_id.clone(),
            resource_group: instance.resource_group.clone(),
            location: instance.location.clone(),
            tags: instance.tags.clone(),
            parameters: instance.parameters.clone(),
            details: instance.details.clone(),
            parent_id: instance.parent_id.clone(),
            status: instance.status,
            status_reason: instance.status_reason.clone(),
            checkpoint: instance.checkpoint.clone(),
            created_at: instance.created_at,
            updated_at: instance.updated_at,
            sealed_parameters: self.seal(&label, "secure_parameters", &instance.secure_parameters)?,
            sealed_details: self.seal(&label, "secure_details", &instance.secure_details)?,
        })
    }

    fn open_instance(&self, record: InstanceRecord) -> Result<Instance> {
        let label = record.id.to_string();
        let secure_parameters: Parameters =
            self.open(&label, "secure_parameters", &record.sealed_parameters)?;
        let secure_details: DetailsDocument =
            self.open(&label, "secure_details", &record.sealed_details)?;

        Ok(Instance {
            id: record.id,
            service_id: record.service_id,
            plan_id: record.plan_id,
            resource_group: record.resource_group,
            location: record.location,
            tags: record.tags,
            parameters: record.parameters,
            secure_parameters,
            details: record.details,
            secure_details,
            parent_id: record.parent_id,
            status: record.status,
            status_reason: record.status_reason,
            checkpoint: record.checkpoint,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    fn seal_binding(&self, binding: &Binding) -> Result<BindingRecord> {
        let label = binding.id.to_string();
        Ok(BindingRecord {
            id: binding.id.clone(),
            instance_id: binding.instance_id.clone(),
            parameters: binding.parameters.clone(),
            details: binding.details.clone(),
            bound: binding.bound,
            created_at: binding.created_at,
            sealed_details: self.seal(&label, "secure_details", &binding.secure_details)?,
        })
    }

    fn open_binding(&self, record: BindingRecord) -> Result<Binding> {
        let label = record.id.to_string();
        let secure_details = self.open(&label, "secure_details", &record.sealed_details)?;
        Ok(Binding {
            id: record.id,
            instance_id: record.instance_id,
            parameters: record.parameters,
            details: record.details,
            secure_details,
            bound: record.bound,
            created_at: record.created_at,
        })
    }
}

#[async_trait]
impl InstanceStore for SealedStore {
    async fn get_instance(&self, id: &InstanceId) -> Result<Option<Instance>> {
        match self.records.get_instance(id).await? {
            Some(record) => Ok(Some(self.open_instance(record)?)),
            None => Ok(None),
        }
    }

    async fn put_instance(&self, instance: &Instance) -> Result<()> {
        let record = self.seal_instance(instance)?;
        self.records.put_instance(record).await
    }

    async fn delete_instance(&self, id: &InstanceId) -> Result<bool> {
        self.records.delete_instance(id).await
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        self.records
            .list_instances()
            .await?
            .into_iter()
            .map(|record| self.open_instance(record))
            .collect()
    }

    async fn get_binding(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
    ) -> Result<Option<Binding>> {
        match self.records.get_binding(instance_id, binding_id).await? {
            Some(record) => Ok(Some(self.open_binding(record)?)),
            None => Ok(None),
        }
    }

    async fn put_binding(&self, binding: &Binding) -> Result<()> {
        let record = self.seal_binding(binding)?;
        self.records.put_binding(record).await
    }

    async fn delete_binding(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
    ) -> Result<bool> {
        self.records.delete_binding(instance_id, binding_id).await
    }

    async fn list_bindings(&self, instance_id: &InstanceId) -> Result<Vec<Binding>> {
        self.records
            .list_bindings(instance_id)
            .await?
            .into_iter()
            .map(|record| self.open_binding(record))
            .collect()
    }
}
