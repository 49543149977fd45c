//! Storage trait definitions

use crate::error::Result;
use crate::record::{BindingRecord, InstanceRecord};
use async_trait::async_trait;
use broker_types::{Binding, BindingId, Instance, InstanceId};

/// Raw persistence of records whose secure fields are already sealed
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get an instance record by ID
    async fn get_instance(&self, id: &InstanceId) -> Result<Option<InstanceRecord>>;

    /// Create or replace an instance record
    async fn put_instance(&self, record: InstanceRecord) -> Result<()>;

    /// Delete an instance record; false if it did not exist
    async fn delete_instance(&self, id: &InstanceId) -> Result<bool>;

    /// List all instance records
    async fn list_instances(&self) -> Result<Vec<InstanceRecord>>;

    /// Get a binding record
    async fn get_binding(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
    ) -> Result<Option<BindingRecord>>;

    /// Create or replace a binding record
    async fn put_binding(&self, record: BindingRecord) -> Result<()>;

    /// Delete a binding record; false if it did not exist
    async fn delete_binding(&self, instance_id: &InstanceId, binding_id: &BindingId)
        -> Result<bool>;

    /// List the bindings of one instance
    async fn list_bindings(&self, instance_id: &InstanceId) -> Result<Vec<BindingRecord>>;
}

/// Plaintext instance and binding persistence.
///
/// Implementations must return details exactly as they were written.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get_instance(&self, id: &InstanceId) -> Result<Option<Instance>>;

    async fn put_instance(&self, instance: &Instance) -> Result<()>;

    async fn delete_instance(&self, id: &InstanceId) -> Result<bool>;

    async fn list_instances(&self) -> Result<Vec<Instance>>;

    async fn get_binding(
        &self,
        instance_id: &InstanceId,
        binding_id: &BindingId,
    ) -> Result<Option<Binding>>;

    async fn put_binding(&self, binding: &Binding) -> Result<()>;

    async fn delete_binding(&self, instance_id: &InstanceId, binding_id: &BindingId)
        -> Result<bool>;

    async fn list_bindings(&self, instance_id: &InstanceId) -> Result<Vec<Binding>>;
}
