//! Offset/limit iteration: every entity once, ceil(N/B)+1 page fetches.

use futures_util::StreamExt;
use papiea_client::{ClientOptions, EntityClient};
use papiea_testkit::MockEngine;
use serde_json::json;

async fn seeded(engine: &MockEngine, n: usize) -> EntityClient {
    let opts = ClientOptions::new(engine.url());
    let client = EntityClient::new(&opts, "p", "1", "Item").unwrap();
    for i in 0..n {
        client.create(json!({ "i": i }), None).await.unwrap();
    }
    client
}

#[tokio::test]
async fn yields_each_entity_once_with_one_extra_fetch() {
    let engine = MockEngine::start().await.unwrap();
    let client = seeded(&engine, 7).await;

    let mut iter = client.filter_iter_with(json!({}), 3);
    let mut seen = Vec::new();
    while let Some(entity) = iter.next().await.unwrap() {
        seen.push(entity.spec["i"].as_u64().unwrap());
    }

    seen.sort_unstable();
    assert_eq!(seen, (0..7).collect::<Vec<u64>>());
    // ceil(7 / 3) + 1
    assert_eq!(iter.pages_fetched(), 4);
    assert_eq!(engine.filter_calls(), 4);
    assert!(!iter.has_more());
}

#[tokio::test]
async fn exact_multiple_still_needs_the_empty_page() {
    let engine = MockEngine::start().await.unwrap();
    let client = seeded(&engine, 4).await;

    let all = client.filter_iter_with(json!({}), 2).collect_all().await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(engine.filter_calls(), 3);
}

#[tokio::test]
async fn offset_advances_by_batch_size() {
    let engine = MockEngine::start().await.unwrap();
    let client = seeded(&engine, 5).await;

    let mut iter = client.filter_iter_with(json!({}), 2);
    assert_eq!(iter.offset(), 0);
    assert_eq!(iter.next_page().await.unwrap().unwrap().len(), 2);
    assert_eq!(iter.offset(), 2);
    assert_eq!(iter.next_page().await.unwrap().unwrap().len(), 2);
    // short page: not yet known to be the last one
    assert_eq!(iter.next_page().await.unwrap().unwrap().len(), 1);
    assert!(iter.has_more());
    assert!(iter.next_page().await.unwrap().is_none());
    assert!(!iter.has_more());
}

#[tokio::test]
async fn empty_collection_costs_one_fetch() {
    let engine = MockEngine::start().await.unwrap();
    let client = seeded(&engine, 0).await;

    let mut iter = client.list_iter();
    assert!(iter.next().await.unwrap().is_none());
    assert_eq!(iter.pages_fetched(), 1);
}

#[tokio::test]
async fn new_iterator_restarts_and_early_exit_is_safe() {
    let engine = MockEngine::start().await.unwrap();
    let client = seeded(&engine, 5).await;

    let mut first = client.filter_iter_with(json!({}), 2);
    first.next().await.unwrap();
    drop(first);

    let restarted = client.filter_iter_with(json!({}), 2);
    assert_eq!(restarted.offset(), 0);
    assert_eq!(restarted.collect_all().await.unwrap().len(), 5);

    // the client stays usable after abandoning a cursor
    assert_eq!(client.get_all().await.unwrap().len(), 5);
}

#[tokio::test]
async fn stream_adapter_filters() {
    let engine = MockEngine::start().await.unwrap();
    let client = seeded(&engine, 6).await;

    let stream = client.filter_iter(json!({ "spec": { "i": 4 } })).into_stream();
    let items: Vec<_> = stream.collect().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].as_ref().unwrap().spec["i"], json!(4));
}
