//! Entity CRUD against the in-process mock engine.

use papiea_client::{ClientOptions, EntityClient};
use papiea_domain::error::{Error, ErrorKind};
use papiea_domain::model::EntityReference;
use papiea_testkit::MockEngine;
use serde_json::json;

async fn locations(engine: &MockEngine) -> EntityClient {
    let opts = ClientOptions::new(engine.url()).key("user-key");
    EntityClient::new(&opts, "location_provider", "0.1.0", "Location").unwrap()
}

#[tokio::test]
async fn create_then_get_returns_first_version() {
    let engine = MockEngine::start().await.unwrap();
    let client = locations(&engine).await;

    let spec = json!({ "x": 10, "y": 11 });
    let created = client.create(spec.clone(), None).await.unwrap();
    assert_eq!(created.metadata.spec_version, 1);
    assert_eq!(created.metadata.kind, "Location");

    let fetched = client.get(&created.metadata.entity_ref()).await.unwrap();
    assert_eq!(fetched.spec, spec);
    assert_eq!(fetched.metadata.spec_version, 1);
    assert_eq!(fetched.metadata.provider_prefix, "location_provider");
}

#[tokio::test]
async fn create_carries_metadata_extension() {
    let engine = MockEngine::start().await.unwrap();
    let client = locations(&engine).await;

    let created = client
        .create(json!({ "x": 1 }), Some(json!({ "owner": "alice" })))
        .await
        .unwrap();
    let fetched = client.get(&created.metadata.entity_ref()).await.unwrap();
    assert_eq!(fetched.metadata.extension, Some(json!({ "owner": "alice" })));
}

#[tokio::test]
async fn update_bumps_version_and_rejects_stale_one() {
    let engine = MockEngine::start().await.unwrap();
    let client = locations(&engine).await;

    let created = client.create(json!({ "x": 1 }), None).await.unwrap();
    let stale = created.metadata.clone();

    client.update(&created.metadata, json!({ "x": 2 })).await.unwrap();
    let after = client.get(&created.metadata.entity_ref()).await.unwrap();
    assert_eq!(after.metadata.spec_version, 2);
    assert_eq!(after.spec, json!({ "x": 2 }));

    let err = client.update(&stale, json!({ "x": 3 })).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::ConflictingEntity), "{err}");
    assert_eq!(err.status_code(), Some(409));
}

#[tokio::test]
async fn create_with_existing_uuid_conflicts() {
    let engine = MockEngine::start().await.unwrap();
    let client = locations(&engine).await;

    let meta = json!({ "uuid": "fixed-uuid" });
    client.create_with_meta(&meta, json!({ "x": 1 })).await.unwrap();
    let err = client
        .create_with_meta(&meta, json!({ "x": 1 }))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConflictingEntity(_)), "{err}");
}

#[tokio::test]
async fn missing_entity_is_not_found_with_response_metadata() {
    let engine = MockEngine::start().await.unwrap();
    let client = locations(&engine).await;

    let err = client
        .get(&EntityReference::new("nope", "Location"))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");
    let details = err.details().unwrap();
    assert_eq!(details.response.status, 404);
    assert!(details.response.url.ends_with("/Location/nope"));
}

#[tokio::test]
async fn delete_removes_and_second_delete_fails() {
    let engine = MockEngine::start().await.unwrap();
    let client = locations(&engine).await;

    let created = client.create(json!({ "x": 1 }), None).await.unwrap();
    let entity_ref = created.metadata.entity_ref();
    client.delete(&entity_ref).await.unwrap();

    assert!(client.get(&entity_ref).await.unwrap_err().is_not_found());
    assert!(client.delete(&entity_ref).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn get_all_and_filter_respect_criteria() {
    let engine = MockEngine::start().await.unwrap();
    let client = locations(&engine).await;

    for x in [1, 2, 2] {
        client.create(json!({ "x": x }), None).await.unwrap();
    }
    assert_eq!(client.get_all().await.unwrap().len(), 3);

    let page = client.filter(&json!({ "spec": { "x": 2 } })).await.unwrap();
    assert_eq!(page.entity_count, 2);
    assert!(page.results.iter().all(|e| e.spec["x"] == json!(2)));
}

#[tokio::test]
async fn bearer_key_is_sent_on_every_call() {
    let engine = MockEngine::start().await.unwrap();
    let client = locations(&engine).await;

    client.create(json!({ "x": 1 }), None).await.unwrap();
    client.get_all().await.unwrap();

    let requests = engine.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|r| r.authorization.as_deref() == Some("Bearer user-key")));
}
