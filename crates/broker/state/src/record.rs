//! Persisted record shapes
//!
//! Records are what a backend actually stores. Sensitive fields are held as
//! sealed byte strings produced by the configured codec; everything else is
//! stored as-is.

use broker_types::{
    DetailsDocument, InstanceId, InstanceStatus, OperationCheckpoint, Parameters, PlanId,
    ServiceId, BindingId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Instance as stored, with secure fields sealed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub service_id: ServiceId,
    pub plan_id: PlanId,
    pub resource_group: String,
    pub location: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub parameters: Parameters,
    pub details: DetailsDocument,
    #[serde(default)]
    pub parent_id: Option<InstanceId>,
    pub status: InstanceStatus,
    #[serde(default)]
    pub status_reason: Option<String>,
    #[serde(default)]
    pub checkpoint: Option<OperationCheckpoint>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Sealed `secure_parameters`
    pub sealed_parameters: Vec<u8>,

    /// Sealed `secure_details`
    pub sealed_details: Vec<u8>,
}

/// Binding as stored, with secure details sealed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingRecord {
    pub id: BindingId,
    pub instance_id: InstanceId,
    #[serde(default)]
    pub parameters: Parameters,
    pub details: DetailsDocument,
    #[serde(default)]
    pub bound: bool,
    pub created_at: DateTime<Utc>,

    /// Sealed `secure_details`
    pub sealed_details: Vec<u8>,
}
