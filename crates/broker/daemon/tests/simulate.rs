//! End-to-end simulation through the assembled runtime

use broker_crypto::{AesGcmCodec, CodecSettings};
use broker_daemon::{BrokerConfig, DaemonError, Runtime};
use broker_types::{Parameters, PlanId, ServiceId};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn encrypted_config() -> BrokerConfig {
    BrokerConfig {
        crypto: CodecSettings::Aes256Gcm {
            key: AesGcmCodec::generate_key(),
        },
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_simulate_cache() {
    let runtime = Runtime::new(&encrypted_config()).unwrap();
    let report = runtime
        .simulate(
            &ServiceId::new("redis-cache"),
            &PlanId::new("redis-cache-basic"),
            Parameters::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.instances.len(), 1);
    assert_eq!(report.submissions, 1);
    assert!(report.deletions >= 1);
    assert!(report.credentials["host"]
        .as_str()
        .is_some_and(|host| host.ends_with(".redis.cache.windows.net")));
    assert!(runtime.broker().list_instances().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_simulate_database_provisions_parent_first() {
    let runtime = Runtime::new(&BrokerConfig::default()).unwrap();
    let mut parameters = Parameters::new();
    parameters.insert("databaseName".to_string(), json!("orders"));

    let report = runtime
        .simulate(
            &ServiceId::new("sql-database"),
            &PlanId::new("sql-database-basic"),
            parameters,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let ids: Vec<&str> = report.instances.iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, vec!["sim-sql-server", "sim-sql-database"]);
    assert_eq!(report.submissions, 2);
    assert_eq!(report.credentials["database"], json!("orders"));
    assert_eq!(runtime.sql_logins(), 0);
    assert!(runtime.broker().list_instances().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_simulate_unknown_service() {
    let runtime = Runtime::new(&BrokerConfig::default()).unwrap();
    let err = runtime
        .simulate(
            &ServiceId::new("mongo"),
            &PlanId::new("mongo-basic"),
            Parameters::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::Simulation(_)));
}

#[test]
fn test_bad_codec_key_fails_assembly() {
    let config = BrokerConfig {
        crypto: CodecSettings::Aes256Gcm {
            key: "c2hvcnQ=".to_string(),
        },
        ..Default::default()
    };
    assert!(matches!(Runtime::new(&config), Err(DaemonError::Codec(_))));
}
