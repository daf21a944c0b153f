//! Schema validator cache behavior.
//!
//! The cache must keep compiled validators for a TTL window so schema
//! loads do not hit storage per request, must cache the absence of a
//! schema, and must never cache a schema document that fails to compile.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use atrio_core::id::{SessionId, SourceId};
use atrio_track::error::Error;
use atrio_track::payload::{EventPayload, TrackerPayload};
use atrio_track::runtime::TrackerConfig;
use atrio_track::schema::{EventTypeSchema, SchemaValidationCache};
use atrio_track::source::Source;
use atrio_track::store::memory::{MemorySchemaStore, MemorySourceStore};
use atrio_track::tracker::Tracker;

fn purchase_schema() -> EventTypeSchema {
    EventTypeSchema::single(
        "purchase",
        "event@properties",
        json!({
            "type": "object",
            "required": ["price"],
            "properties": {"price": {"type": "number"}}
        }),
    )
}

#[tokio::test]
async fn validator_is_loaded_once_per_ttl_window() {
    let store = MemorySchemaStore::new();
    store.insert_schema(purchase_schema()).unwrap();
    let cache = SchemaValidationCache::new(Duration::from_secs(300));

    for _ in 0..5 {
        let compiled = cache.get("purchase", &store).await.unwrap();
        assert!(compiled.is_some());
    }

    assert_eq!(store.load_count(), 1, "cached validator must be reused");
}

#[tokio::test]
async fn expired_validator_is_reloaded() {
    let store = MemorySchemaStore::new();
    store.insert_schema(purchase_schema()).unwrap();
    let cache = SchemaValidationCache::new(Duration::ZERO);

    cache.get("purchase", &store).await.unwrap();
    cache.get("purchase", &store).await.unwrap();

    assert_eq!(store.load_count(), 2);
}

#[tokio::test]
async fn schema_absence_is_cached() {
    let store = MemorySchemaStore::new();
    let cache = SchemaValidationCache::new(Duration::from_secs(300));

    assert!(cache.get("page-view", &store).await.unwrap().is_none());
    assert!(cache.get("page-view", &store).await.unwrap().is_none());

    assert_eq!(
        store.load_count(),
        1,
        "missing schemas must not hit storage per request"
    );
}

#[tokio::test]
async fn uncompilable_schema_is_not_cached() {
    let store = MemorySchemaStore::new();
    store
        .insert_schema(EventTypeSchema::single(
            "purchase",
            "event@properties",
            json!({"type": 12}),
        ))
        .unwrap();
    let cache = SchemaValidationCache::new(Duration::from_secs(300));

    for _ in 0..2 {
        let err = cache.get("purchase", &store).await.unwrap_err();
        assert!(matches!(err, Error::SchemaValidation { .. }));
    }

    assert_eq!(
        store.load_count(),
        2,
        "a broken schema document must stay retryable"
    );
}

#[tokio::test]
async fn pipeline_reuses_cached_validator_across_requests() {
    let sources = Arc::new(MemorySourceStore::new());
    let schemas = Arc::new(MemorySchemaStore::new());
    let source_id = SourceId::generate();
    sources
        .insert_source(Source::new(source_id.clone(), "web"))
        .unwrap();
    schemas.insert_schema(purchase_schema()).unwrap();

    let tracker = Tracker::builder(TrackerConfig::default())
        .sources(sources)
        .schemas(schemas.clone())
        .build();

    for _ in 0..3 {
        let payload = TrackerPayload::new(source_id.clone(), Some(SessionId::generate()))
            .with_event(EventPayload::new("purchase", json!({"price": 9.5})));
        tracker.track(payload, None).await.unwrap();
    }

    assert_eq!(schemas.load_count(), 1);
}
