//! Helpers shared by the built-in adapters

use broker_deployment::{DeploymentRequest, DeploymentTemplate};
use broker_pipeline::StepError;
use broker_types::{Instance, InstanceStatus, Parameters, Plan, PlanId};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Plans of one service, keyed by ID
pub(crate) type PlanTable = Arc<HashMap<PlanId, Plan>>;

pub(crate) fn plan_table<'a>(plans: impl IntoIterator<Item = &'a Plan>) -> PlanTable {
    Arc::new(plans.into_iter().map(|p| (p.id.clone(), p.clone())).collect())
}

pub(crate) fn plan_for<'a>(plans: &'a PlanTable, instance: &Instance) -> Result<&'a Plan, StepError> {
    plans.get(&instance.plan_id).ok_or_else(|| {
        StepError::Precondition(format!("plan {} is not offered", instance.plan_id))
    })
}

/// A new deployment name; persisted before use so a re-run reuses it
pub(crate) fn deployment_name(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

/// Every deployment an instance recorded, original first, without blanks or repeats
pub(crate) fn recorded_deployments(
    deployment_name: &str,
    update_deployments: &[String],
    pending_update: Option<&str>,
) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let candidates = std::iter::once(deployment_name)
        .chain(update_deployments.iter().map(String::as_str))
        .chain(pending_update);
    for name in candidates {
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// A resource name from an optional consumer parameter, else generated
pub(crate) fn resource_name(parameters: &Parameters, key: &str, prefix: &str) -> String {
    match parameters.get(key).and_then(Value::as_str) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{prefix}{}", &Uuid::new_v4().simple().to_string()[..12]),
    }
}

const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!-_.~";

/// Random password with upper, lower, digit and symbol classes present,
/// each at a random position
pub(crate) fn generate_password(length: usize) -> String {
    let classes = [UPPER, LOWER, DIGITS, SYMBOLS];
    let alphabet = classes.concat();
    let mut rng = rand::thread_rng();

    let mut chars: Vec<u8> = classes
        .iter()
        .map(|class| class[rng.gen_range(0..class.len())])
        .collect();
    while chars.len() < length {
        chars.push(alphabet[rng.gen_range(0..alphabet.len())]);
    }
    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

/// Deployment request scoped to the instance's resource group and location
pub(crate) fn request_for(
    instance: &Instance,
    name: &str,
    template: DeploymentTemplate,
    parameters: serde_json::Map<String, Value>,
) -> DeploymentRequest {
    DeploymentRequest::new(
        name,
        instance.resource_group.clone(),
        instance.location.clone(),
        template,
    )
    .with_parameters(parameters)
    .with_tags(instance.tags.clone())
}

pub(crate) fn ensure_provisioned(instance: &Instance, what: &str) -> Result<(), StepError> {
    if instance.status == InstanceStatus::Provisioned {
        Ok(())
    } else {
        Err(StepError::Precondition(format!(
            "{what} {} is {:?}, not provisioned",
            instance.id, instance.status
        )))
    }
}
