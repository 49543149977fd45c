//! In-memory resource manager
//!
//! Behaves like the provider's deployment API closely enough to drive the
//! engine in tests and in `brokerd simulate`: deployments are keyed by
//! resource group and name, submissions can succeed, fail, stay running or
//! hang until cancelled, and every mutating call is counted.

use crate::api::{DeploymentProperties, RemoteDeployment, ResourceManager};
use crate::error::ApiError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Computes provider-form outputs for a submitted deployment
pub type OutputResolver = dyn Fn(&DeploymentProperties) -> Map<String, Value> + Send + Sync;

/// What a submission does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitBehavior {
    /// Record finishes as Succeeded with resolved outputs
    Succeed,
    /// Record finishes as Failed
    Fail,
    /// Record is left Running and returned immediately
    Accept,
    /// Record is left Running and the call blocks until cancelled
    Hang,
}

/// What a deletion does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteBehavior {
    Complete,
    /// Block until cancelled, leaving the record in place
    Hang,
}

#[derive(Debug, Clone)]
struct ResourceGroup {
    location: String,
    tags: BTreeMap<String, String>,
}

type DeploymentKey = (String, String);

fn key(resource_group: &str, name: &str) -> DeploymentKey {
    (resource_group.to_string(), name.to_string())
}

/// In-memory [`ResourceManager`]
pub struct InMemoryResourceManager {
    resource_groups: DashMap<String, ResourceGroup>,
    deployments: DashMap<DeploymentKey, RemoteDeployment>,
    submitted: DashMap<DeploymentKey, DeploymentProperties>,
    submit_behavior: RwLock<SubmitBehavior>,
    delete_behavior: RwLock<DeleteBehavior>,
    submit_latency: RwLock<Option<Duration>>,
    lookup_failure: Mutex<Option<ApiError>>,
    resolver: Arc<OutputResolver>,
    submissions: AtomicUsize,
    resource_group_writes: AtomicUsize,
    deletions: AtomicUsize,
}

impl InMemoryResourceManager {
    pub fn new() -> Self {
        Self {
            resource_groups: DashMap::new(),
            deployments: DashMap::new(),
            submitted: DashMap::new(),
            submit_behavior: RwLock::new(SubmitBehavior::Succeed),
            delete_behavior: RwLock::new(DeleteBehavior::Complete),
            submit_latency: RwLock::new(None),
            lookup_failure: Mutex::new(None),
            resolver: Arc::new(resolve_outputs),
            submissions: AtomicUsize::new(0),
            resource_group_writes: AtomicUsize::new(0),
            deletions: AtomicUsize::new(0),
        }
    }

    /// Replace the default output resolver
    pub fn with_output_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&DeploymentProperties) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn set_submit_behavior(&self, behavior: SubmitBehavior) {
        *self
            .submit_behavior
            .write()
            .unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    pub fn set_delete_behavior(&self, behavior: DeleteBehavior) {
        *self
            .delete_behavior
            .write()
            .unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    /// Simulated duration of a successful submission's long-running operation
    pub fn set_submit_latency(&self, latency: Option<Duration>) {
        *self
            .submit_latency
            .write()
            .unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Make every lookup fail with `error` until cleared with `None`
    pub fn fail_lookups_with(&self, error: Option<ApiError>) {
        *self.lookup_failure.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    /// Seed a deployment record without counting it as a submission
    pub fn insert_deployment(&self, resource_group: &str, name: &str, state: &str) {
        self.set_state(resource_group, name, state, Map::new());
    }

    /// Create or overwrite a deployment record
    pub fn set_state(
        &self,
        resource_group: &str,
        name: &str,
        state: &str,
        outputs: Map<String, Value>,
    ) {
        self.deployments.insert(
            key(resource_group, name),
            RemoteDeployment {
                name: name.to_string(),
                resource_group: resource_group.to_string(),
                provisioning_state: state.to_string(),
                outputs,
            },
        );
    }

    /// Mark a submitted deployment Succeeded with the outputs its template resolves to
    pub fn complete(&self, resource_group: &str, name: &str) {
        let outputs = self
            .submitted
            .get(&key(resource_group, name))
            .map(|properties| (self.resolver)(properties.value()))
            .unwrap_or_default();
        self.set_state(resource_group, name, "Succeeded", outputs);
    }

    pub fn remove_deployment(&self, resource_group: &str, name: &str) {
        self.deployments.remove(&key(resource_group, name));
    }

    pub fn deployment(&self, resource_group: &str, name: &str) -> Option<RemoteDeployment> {
        self.deployments
            .get(&key(resource_group, name))
            .map(|d| d.value().clone())
    }

    /// Properties of the last submission for a deployment
    pub fn submitted(&self, resource_group: &str, name: &str) -> Option<DeploymentProperties> {
        self.submitted
            .get(&key(resource_group, name))
            .map(|p| p.value().clone())
    }

    pub fn has_resource_group(&self, name: &str) -> bool {
        self.resource_groups.contains_key(name)
    }

    pub fn resource_group_location(&self, name: &str) -> Option<String> {
        self.resource_groups.get(name).map(|rg| rg.location.clone())
    }

    pub fn resource_group_tags(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.resource_groups.get(name).map(|rg| rg.tags.clone())
    }

    /// Number of deployment submissions received
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    pub fn resource_group_writes(&self) -> usize {
        self.resource_group_writes.load(Ordering::SeqCst)
    }

    pub fn deletions(&self) -> usize {
        self.deletions.load(Ordering::SeqCst)
    }

    fn submit_behavior(&self) -> SubmitBehavior {
        *self
            .submit_behavior
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn delete_behavior(&self) -> DeleteBehavior {
        *self
            .delete_behavior
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn submit_latency(&self) -> Option<Duration> {
        *self
            .submit_latency
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    async fn hang(&self, cancel: &CancellationToken) -> ApiError {
        cancel.cancelled().await;
        debug!("Operation abandoned after cancellation");
        ApiError::Cancelled
    }
}

impl Default for InMemoryResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceManager for InMemoryResourceManager {
    async fn get_deployment(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<RemoteDeployment, ApiError> {
        if let Some(error) = self
            .lookup_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(error);
        }

        self.deployment(resource_group, name)
            .ok_or_else(|| ApiError::NotFound(format!("deployment {resource_group}/{name}")))
    }

    async fn create_or_update_resource_group(
        &self,
        name: &str,
        location: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), ApiError> {
        self.resource_group_writes.fetch_add(1, Ordering::SeqCst);
        self.resource_groups.insert(
            name.to_string(),
            ResourceGroup {
                location: location.to_string(),
                tags: tags.clone(),
            },
        );
        debug!(resource_group = %name, %location, "Resource group written");
        Ok(())
    }

    async fn create_deployment(
        &self,
        resource_group: &str,
        name: &str,
        properties: DeploymentProperties,
        cancel: CancellationToken,
    ) -> Result<RemoteDeployment, ApiError> {
        if !self.resource_groups.contains_key(resource_group) {
            return Err(ApiError::NotFound(format!("resource group {resource_group}")));
        }

        self.submissions.fetch_add(1, Ordering::SeqCst);
        self.submitted
            .insert(key(resource_group, name), properties.clone());
        self.set_state(resource_group, name, "Running", Map::new());
        debug!(%resource_group, deployment = %name, "Deployment submitted");

        match self.submit_behavior() {
            SubmitBehavior::Accept => {}
            SubmitBehavior::Hang => return Err(self.hang(&cancel).await),
            SubmitBehavior::Fail => self.set_state(resource_group, name, "Failed", Map::new()),
            SubmitBehavior::Succeed => {
                if let Some(latency) = self.submit_latency() {
                    tokio::select! {
                        _ = tokio::time::sleep(latency) => {}
                        error = self.hang(&cancel) => return Err(error),
                    }
                }
                self.complete(resource_group, name);
            }
        }

        self.deployment(resource_group, name)
            .ok_or_else(|| ApiError::NotFound(format!("deployment {resource_group}/{name}")))
    }

    async fn delete_deployment(
        &self,
        resource_group: &str,
        name: &str,
        cancel: CancellationToken,
    ) -> Result<(), ApiError> {
        if !self.deployments.contains_key(&key(resource_group, name)) {
            return Err(ApiError::NotFound(format!(
                "deployment {resource_group}/{name}"
            )));
        }

        if self.delete_behavior() == DeleteBehavior::Hang {
            return Err(self.hang(&cancel).await);
        }

        self.deletions.fetch_add(1, Ordering::SeqCst);
        self.remove_deployment(resource_group, name);
        Ok(())
    }
}

/// Default output resolution. Supports literal values, `[parameters('x')]`
/// and `[concat(...)]` over parameter references and quoted literals; any
/// other expression is returned verbatim.
fn resolve_outputs(properties: &DeploymentProperties) -> Map<String, Value> {
    let Some(outputs) = properties
        .template
        .get("outputs")
        .and_then(Value::as_object)
    else {
        return Map::new();
    };

    outputs
        .iter()
        .map(|(name, output)| {
            let kind = output
                .get("type")
                .cloned()
                .unwrap_or_else(|| Value::String("string".to_string()));
            let value = match output.get("value") {
                Some(Value::String(expr)) => evaluate(expr, &properties.parameters)
                    .unwrap_or_else(|| Value::String(expr.clone())),
                Some(other) => other.clone(),
                None => Value::Null,
            };
            (name.clone(), json!({ "type": kind, "value": value }))
        })
        .collect()
}

fn evaluate(expr: &str, parameters: &Value) -> Option<Value> {
    let inner = expr.strip_prefix('[')?.strip_suffix(']')?;

    if let Some(args) = inner
        .strip_prefix("concat(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let mut joined = String::new();
        for arg in args.split(',').map(str::trim) {
            match argument(arg, parameters)? {
                Value::String(s) => joined.push_str(&s),
                other => joined.push_str(&other.to_string()),
            }
        }
        return Some(Value::String(joined));
    }

    argument(inner, parameters)
}

fn argument(arg: &str, parameters: &Value) -> Option<Value> {
    if let Some(name) = arg
        .strip_prefix("parameters('")
        .and_then(|rest| rest.strip_suffix("')"))
    {
        return parameters.get(name)?.get("value").cloned();
    }
    arg.strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .map(|literal| Value::String(literal.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::DeploymentMode;

    fn properties() -> DeploymentProperties {
        DeploymentProperties {
            template: json!({
                "outputs": {
                    "serverName": { "type": "string", "value": "[parameters('name')]" },
                    "port": { "type": "int", "value": 6380 },
                    "hostName": {
                        "type": "string",
                        "value": "[concat(parameters('name'), '.redis.cache.windows.net')]"
                    },
                    "primaryKey": { "type": "string", "value": "[listKeys(parameters('name')).primaryKey]" }
                }
            }),
            parameters: json!({ "name": { "value": "srv1" } }),
            mode: DeploymentMode::Incremental,
        }
    }

    #[test]
    fn test_default_resolver() {
        let outputs = resolve_outputs(&properties());
        assert_eq!(outputs["serverName"], json!({ "type": "string", "value": "srv1" }));
        assert_eq!(outputs["port"], json!({ "type": "int", "value": 6380 }));
        assert_eq!(outputs["hostName"]["value"], json!("srv1.redis.cache.windows.net"));
        assert_eq!(
            outputs["primaryKey"]["value"],
            json!("[listKeys(parameters('name')).primaryKey]")
        );
    }

    #[tokio::test]
    async fn test_submission_requires_resource_group() {
        let api = InMemoryResourceManager::new();
        let err = api
            .create_deployment("rg-1", "d1", properties(), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(api.submissions(), 0);
    }

    #[tokio::test]
    async fn test_successful_submission() {
        let api = InMemoryResourceManager::new();
        api.create_or_update_resource_group("rg-1", "eastus", &BTreeMap::new())
            .await
            .unwrap();
        let remote = api
            .create_deployment("rg-1", "d1", properties(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(remote.provisioning_state, "Succeeded");
        assert_eq!(remote.outputs["serverName"]["value"], json!("srv1"));
        assert_eq!(api.submissions(), 1);
        assert_eq!(api.resource_group_location("rg-1").as_deref(), Some("eastus"));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let api = InMemoryResourceManager::new();
        let err = api
            .delete_deployment("rg-1", "d1", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
