//! Redis cache deployment template

use broker_deployment::{DeploymentTemplate, Result};
use serde_json::json;

pub(crate) fn cache_template() -> Result<DeploymentTemplate> {
    DeploymentTemplate::from_value(json!({
        "$schema": "https://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#",
        "contentVersion": "1.0.0.0",
        "parameters": {
            "cacheName": { "type": "string" },
            "location": { "type": "string" },
            "skuName": { "type": "string" },
            "skuFamily": { "type": "string" },
            "skuCapacity": { "type": "int" },
            "enableNonSslPort": { "type": "bool" }
        },
        "resources": [
            {
                "apiVersion": "2016-04-01",
                "name": "[parameters('cacheName')]",
                "type": "Microsoft.Cache/Redis",
                "location": "[parameters('location')]",
                "properties": {
                    "enableNonSslPort": "[parameters('enableNonSslPort')]",
                    "sku": {
                        "capacity": "[parameters('skuCapacity')]",
                        "family": "[parameters('skuFamily')]",
                        "name": "[parameters('skuName')]"
                    }
                }
            }
        ],
        "outputs": {
            "hostName": {
                "type": "string",
                "value": "[concat(parameters('cacheName'), '.redis.cache.windows.net')]"
            },
            "sslPort": { "type": "int", "value": 6380 },
            "primaryKey": {
                "type": "string",
                "value": "[listKeys(resourceId('Microsoft.Cache/Redis', parameters('cacheName')), '2016-04-01').primaryKey]"
            }
        }
    }))
}
