//! SQL server and database deployment templates

use broker_deployment::{DeploymentTemplate, Result};
use serde_json::json;

const SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#";

pub(crate) fn server_template() -> Result<DeploymentTemplate> {
    DeploymentTemplate::from_value(json!({
        "$schema": SCHEMA,
        "contentVersion": "1.0.0.0",
        "parameters": {
            "serverName": { "type": "string" },
            "location": { "type": "string" },
            "administratorLogin": { "type": "string" },
            "administratorLoginPassword": { "type": "securestring" },
            "version": { "type": "string" }
        },
        "resources": [
            {
                "apiVersion": "2014-04-01-preview",
                "name": "[parameters('serverName')]",
                "type": "Microsoft.Sql/servers",
                "location": "[parameters('location')]",
                "properties": {
                    "administratorLogin": "[parameters('administratorLogin')]",
                    "administratorLoginPassword": "[parameters('administratorLoginPassword')]",
                    "version": "[parameters('version')]"
                },
                "resources": [
                    {
                        "apiVersion": "2014-04-01-preview",
                        "name": "AllowAllAzureIPs",
                        "type": "firewallrules",
                        "dependsOn": ["[parameters('serverName')]"],
                        "properties": {
                            "startIpAddress": "0.0.0.0",
                            "endIpAddress": "0.0.0.0"
                        }
                    }
                ]
            }
        ],
        "outputs": {
            "fullyQualifiedDomainName": {
                "type": "string",
                "value": "[concat(parameters('serverName'), '.database.windows.net')]"
            }
        }
    }))
}

pub(crate) fn database_template() -> Result<DeploymentTemplate> {
    DeploymentTemplate::from_value(json!({
        "$schema": SCHEMA,
        "contentVersion": "1.0.0.0",
        "parameters": {
            "serverName": { "type": "string" },
            "databaseName": { "type": "string" },
            "location": { "type": "string" },
            "edition": { "type": "string" },
            "requestedServiceObjectiveName": { "type": "string" },
            "maxSizeBytes": { "type": "string" }
        },
        "resources": [
            {
                "apiVersion": "2014-04-01-preview",
                "name": "[concat(parameters('serverName'), '/', parameters('databaseName'))]",
                "type": "Microsoft.Sql/servers/databases",
                "location": "[parameters('location')]",
                "properties": {
                    "edition": "[parameters('edition')]",
                    "requestedServiceObjectiveName": "[parameters('requestedServiceObjectiveName')]",
                    "maxSizeBytes": "[parameters('maxSizeBytes')]"
                }
            }
        ],
        "outputs": {
            "databaseName": {
                "type": "string",
                "value": "[parameters('databaseName')]"
            }
        }
    }))
}
