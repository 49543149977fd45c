//! Deployment templates, parameters and outputs
//!
//! The engine treats a template body as opaque. It only checks the fixed
//! top-level shape on construction and, after a deployment completes, reads
//! back the named outputs.

use crate::error::{DeploymentError, Result};
use serde_json::{json, Map, Value};

const REQUIRED_KEYS: [&str; 3] = ["$schema", "contentVersion", "resources"];

/// A declarative deployment template
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentTemplate(Value);

impl DeploymentTemplate {
    /// Wrap a template document, checking its top-level shape
    pub fn from_value(value: Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(DeploymentError::InvalidTemplate(
                "template must be a JSON object".to_string(),
            ));
        };

        for key in REQUIRED_KEYS {
            if !object.contains_key(key) {
                return Err(DeploymentError::InvalidTemplate(format!(
                    "missing top-level key {key:?}"
                )));
            }
        }

        for key in ["parameters", "outputs"] {
            if object.get(key).is_some_and(|v| !v.is_object()) {
                return Err(DeploymentError::InvalidTemplate(format!(
                    "top-level {key:?} must be an object"
                )));
            }
        }

        Ok(Self(value))
    }

    /// Parse a template from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let value = serde_json::from_str(text)
            .map_err(|e| DeploymentError::InvalidTemplate(e.to_string()))?;
        Self::from_value(value)
    }

    /// Names of the outputs the template declares
    pub fn output_names(&self) -> Vec<&str> {
        self.0
            .get("outputs")
            .and_then(Value::as_object)
            .map(|outputs| outputs.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Convert a plain parameter map into the provider's `{name: {value}}` form
pub fn provider_parameters(parameters: &Map<String, Value>) -> Value {
    let wrapped: Map<String, Value> = parameters
        .iter()
        .map(|(name, value)| (name.clone(), json!({ "value": value })))
        .collect();
    Value::Object(wrapped)
}

/// Outputs of a completed deployment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeploymentOutputs {
    deployment: String,
    values: Map<String, Value>,
}

impl DeploymentOutputs {
    /// Flatten the provider's `{key: {type, value}}` outputs
    pub fn from_provider(deployment: impl Into<String>, outputs: &Map<String, Value>) -> Self {
        let values = outputs
            .iter()
            .map(|(key, output)| {
                let value = match output.get("value") {
                    Some(value) => value.clone(),
                    None => output.clone(),
                };
                (key.clone(), value)
            })
            .collect();

        Self {
            deployment: deployment.into(),
            values,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Look up a string output that the template is expected to declare
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key)
            .ok_or_else(|| DeploymentError::MissingOutput {
                deployment: self.deployment.clone(),
                key: key.to_string(),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Value {
        json!({
            "$schema": "https://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#",
            "contentVersion": "1.0.0.0",
            "parameters": { "name": { "type": "string" } },
            "resources": [],
            "outputs": {
                "fullyQualifiedDomainName": { "type": "string", "value": "x" }
            }
        })
    }

    #[test]
    fn test_accepts_well_formed_template() {
        let template = DeploymentTemplate::from_value(template()).unwrap();
        assert_eq!(template.output_names(), vec!["fullyQualifiedDomainName"]);
    }

    #[test]
    fn test_rejects_missing_resources() {
        let mut value = template();
        value.as_object_mut().unwrap().remove("resources");
        let err = DeploymentTemplate::from_value(value).unwrap_err();
        assert!(err.to_string().contains("resources"));
    }

    #[test]
    fn test_rejects_non_object() {
        assert!(DeploymentTemplate::from_json("[]").is_err());
        assert!(DeploymentTemplate::from_json("not json").is_err());
    }

    #[test]
    fn test_provider_parameters_wrap_values() {
        let mut params = Map::new();
        params.insert("name".to_string(), json!("srv1"));
        assert_eq!(
            provider_parameters(&params),
            json!({ "name": { "value": "srv1" } })
        );
    }

    #[test]
    fn test_outputs_flatten_and_require() {
        let mut raw = Map::new();
        raw.insert(
            "fqdn".to_string(),
            json!({ "type": "string", "value": "srv1.example.net" }),
        );
        let outputs = DeploymentOutputs::from_provider("d1", &raw);
        assert_eq!(outputs.get_str("fqdn"), Some("srv1.example.net"));

        let err = outputs.require_str("missing").unwrap_err();
        assert!(matches!(err, DeploymentError::MissingOutput { ref key, .. } if key == "missing"));
    }
}
