//! Sealed store behavior over the in-memory backend

use broker_crypto::{AesGcmCodec, Codec, NoopCodec};
use broker_state::{InMemoryRecordStore, InstanceStore, RecordStore, SealedStore, StoreError};
use broker_types::{
    Binding, BindingId, DetailsDocument, Instance, InstanceId, PlanId, ServiceId, TypedDetails,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
struct ServerSecrets {
    admin_password: String,
}

impl TypedDetails for ServerSecrets {
    const KIND: &'static str = "sql-server-secrets";
    const VERSION: u32 = 1;
}

const PASSWORD: &str = "Sup3r-S3cret-Adm1n";

fn instance() -> Instance {
    let mut secure = serde_json::Map::new();
    secure.insert("adminPassword".to_string(), json!(PASSWORD));

    let mut instance = Instance::new(
        InstanceId::new("i-1"),
        ServiceId::new("sql-server"),
        PlanId::new("sql-server-basic"),
    )
    .with_resource_group("rg-1")
    .with_location("eastus")
    .with_secure_parameters(secure);
    instance.secure_details = DetailsDocument::encode(&ServerSecrets {
        admin_password: PASSWORD.to_string(),
    })
    .unwrap();
    instance
}

fn contains(haystack: &[u8], needle: &str) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle.as_bytes())
}

fn aes() -> Arc<dyn Codec> {
    Arc::new(AesGcmCodec::from_base64_key(&AesGcmCodec::generate_key()).unwrap())
}

#[tokio::test]
async fn test_round_trip_preserves_instance() {
    let records = Arc::new(InMemoryRecordStore::new());
    let store = SealedStore::new(records.clone(), aes());
    let original = instance();

    store.put_instance(&original).await.unwrap();
    let loaded = store
        .get_instance(&original.id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(loaded, original);
    let secrets: ServerSecrets = loaded.secure_details.decode().unwrap();
    assert_eq!(secrets.admin_password, PASSWORD);
}

#[tokio::test]
async fn test_persisted_record_holds_no_plaintext_secret() {
    let records = Arc::new(InMemoryRecordStore::new());
    let store = SealedStore::new(records.clone(), aes());
    store.put_instance(&instance()).await.unwrap();

    let raw = records
        .get_instance(&InstanceId::new("i-1"))
        .await
        .unwrap()
        .unwrap();
    let serialized = serde_json::to_vec(&raw).unwrap();

    assert!(!contains(&raw.sealed_parameters, PASSWORD));
    assert!(!contains(&raw.sealed_details, PASSWORD));
    assert!(!contains(&serialized, PASSWORD));
}

#[tokio::test]
async fn test_noop_codec_leaves_bytes_readable() {
    let records = Arc::new(InMemoryRecordStore::new());
    let store = SealedStore::new(records.clone(), Arc::new(NoopCodec));
    store.put_instance(&instance()).await.unwrap();

    let raw = records
        .get_instance(&InstanceId::new("i-1"))
        .await
        .unwrap()
        .unwrap();
    assert!(contains(&raw.sealed_parameters, PASSWORD));
}

#[tokio::test]
async fn test_wrong_key_is_a_codec_error() {
    let records = Arc::new(InMemoryRecordStore::new());
    SealedStore::new(records.clone(), aes())
        .put_instance(&instance())
        .await
        .unwrap();

    let other = SealedStore::new(records, aes());
    let err = other
        .get_instance(&InstanceId::new("i-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Codec { field: "secure_parameters", .. }));
}

#[tokio::test]
async fn test_binding_round_trip() {
    let records = Arc::new(InMemoryRecordStore::new());
    let store = SealedStore::new(records.clone(), aes());

    let mut binding = Binding::new(BindingId::new("b-1"), InstanceId::new("i-1"));
    binding.secure_details = DetailsDocument::encode(&ServerSecrets {
        admin_password: PASSWORD.to_string(),
    })
    .unwrap();
    store.put_binding(&binding).await.unwrap();

    let raw = records
        .get_binding(&binding.instance_id, &binding.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!contains(&raw.sealed_details, PASSWORD));

    let listed = store.list_bindings(&binding.instance_id).await.unwrap();
    assert_eq!(listed, vec![binding.clone()]);

    assert!(store
        .delete_binding(&binding.instance_id, &binding.id)
        .await
        .unwrap());
    assert!(store
        .get_binding(&binding.instance_id, &binding.id)
        .await
        .unwrap()
        .is_none());
}
