//! Per-event-type JSON Schema validation.
//!
//! Sources may register validation schemas per event type. Each schema maps
//! dot-path selectors (see [`crate::dot::DotView`]) to JSON Schema
//! documents. Compiled validators are held in a TTL cache so schema edits
//! take effect within one TTL window without recompiling on every request.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use atrio_core::cache::TtlCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dot::DotView;
use crate::error::{Error, Result};
use crate::event::{Event, EventStatus};
use crate::metrics::TrackMetrics;
use crate::profile::Profile;
use crate::session::Session;
use crate::store::SchemaStore;

/// Validation schema registered for one event type.
///
/// `validation` maps `entity@dot.path` selectors to JSON Schema documents.
/// The map is ordered so violations are reported deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeSchema {
    /// Event type the schema applies to.
    pub event_type: String,
    /// Selector to JSON Schema document.
    pub validation: BTreeMap<String, Value>,
}

impl EventTypeSchema {
    /// Creates a schema with a single selector rule.
    #[must_use]
    pub fn single(
        event_type: impl Into<String>,
        selector: impl Into<String>,
        schema: Value,
    ) -> Self {
        let mut validation = BTreeMap::new();
        validation.insert(selector.into(), schema);
        Self {
            event_type: event_type.into(),
            validation,
        }
    }
}

struct SelectorRule {
    selector: String,
    validator: jsonschema::Validator,
}

/// An [`EventTypeSchema`] with every JSON Schema document compiled.
pub struct CompiledSchema {
    event_type: String,
    rules: Vec<SelectorRule>,
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("event_type", &self.event_type)
            .field(
                "selectors",
                &self
                    .rules
                    .iter()
                    .map(|rule| rule.selector.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CompiledSchema {
    /// Compiles every selector rule of the given schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaValidation`] when a JSON Schema document is
    /// itself invalid.
    pub fn compile(schema: &EventTypeSchema) -> Result<Self> {
        let mut rules = Vec::with_capacity(schema.validation.len());
        for (selector, document) in &schema.validation {
            let validator = jsonschema::validator_for(document).map_err(|err| {
                Error::schema_validation(
                    &schema.event_type,
                    format!("invalid schema for `{selector}`: {err}"),
                )
            })?;
            rules.push(SelectorRule {
                selector: selector.clone(),
                validator,
            });
        }
        Ok(Self {
            event_type: schema.event_type.clone(),
            rules,
        })
    }

    /// Validates one request view against every selector rule.
    ///
    /// A selector that does not resolve counts as a violation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaValidation`] carrying all violations.
    pub fn validate(&self, view: &DotView) -> Result<()> {
        let mut violations = Vec::new();
        for rule in &self.rules {
            match view.resolve(&rule.selector) {
                None => violations.push(format!("`{}` does not resolve", rule.selector)),
                Some(value) => {
                    violations.extend(
                        rule.validator
                            .iter_errors(value)
                            .map(|err| format!("`{}` {}: {}", rule.selector, err.instance_path, err)),
                    );
                }
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::schema_validation(
                &self.event_type,
                violations.join("; "),
            ))
        }
    }
}

/// TTL cache of compiled validators, keyed by event type.
///
/// Event types with no registered schema are cached as `None`, so their
/// absence is also served without a storage round trip until the entry
/// expires.
pub struct SchemaValidationCache {
    cache: TtlCache<Option<Arc<CompiledSchema>>>,
    ttl: Duration,
    metrics: TrackMetrics,
}

impl SchemaValidationCache {
    /// Creates an empty cache with the given entry TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(),
            ttl,
            metrics: TrackMetrics::new(),
        }
    }

    /// Returns the compiled validator for an event type, loading and
    /// compiling it on a cache miss. `None` means no schema is registered.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the lookup fails and
    /// [`Error::SchemaValidation`] when a loaded schema does not compile.
    /// Compilation failures are not cached.
    pub async fn get(
        &self,
        event_type: &str,
        store: &dyn SchemaStore,
    ) -> Result<Option<Arc<CompiledSchema>>> {
        if let Some(cached) = self.cache.get(event_type)? {
            self.metrics.record_validator_cache("hit");
            return Ok(cached);
        }
        self.metrics.record_validator_cache("miss");
        let compiled = match store.load_schema(event_type).await? {
            Some(schema) => Some(Arc::new(CompiledSchema::compile(&schema)?)),
            None => None,
        };
        self.cache.insert(event_type, compiled.clone(), self.ttl)?;
        Ok(compiled)
    }

    /// Number of cached event types, expired entries included.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.cache.len()?)
    }

    /// Whether the cache holds no entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.cache.is_empty()?)
    }
}

/// Validates every event of a request against its event type schema.
///
/// Events whose type has no registered schema pass through untouched.
/// Events with a schema are stamped [`EventStatus::Validated`] before the
/// schema is evaluated.
///
/// # Errors
///
/// Any violation fails the whole request with
/// [`Error::SchemaValidation`].
pub async fn validate_events(
    events: &mut [Event],
    profile: &Profile,
    session: &Session,
    cache: &SchemaValidationCache,
    store: &dyn SchemaStore,
) -> Result<()> {
    for event in events.iter_mut() {
        let Some(compiled) = cache.get(&event.event_type, store).await? else {
            continue;
        };
        event.set_status(EventStatus::Validated);
        let view = DotView::new(profile, session, event)?;
        compiled.validate(&view)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemorySchemaStore;
    use atrio_core::id::{SessionId, SourceId};
    use serde_json::json;

    fn price_schema(event_type: &str) -> EventTypeSchema {
        EventTypeSchema::single(
            event_type,
            "event@properties.price",
            json!({"type": "number", "minimum": 0}),
        )
    }

    fn purchase_event(properties: Value) -> (Profile, Session, Event) {
        let profile = Profile::new();
        let session = Session::new(SessionId::generate());
        let event = Event::new("purchase", session.id.clone(), SourceId::generate())
            .with_properties(properties);
        (profile, session, event)
    }

    #[test]
    fn compiled_schema_accepts_valid_payload() {
        let compiled = CompiledSchema::compile(&price_schema("purchase")).unwrap();
        let (profile, session, event) = purchase_event(json!({"price": 10}));
        let view = DotView::new(&profile, &session, &event).unwrap();
        assert!(compiled.validate(&view).is_ok());
    }

    #[test]
    fn compiled_schema_rejects_wrong_type() {
        let compiled = CompiledSchema::compile(&price_schema("purchase")).unwrap();
        let (profile, session, event) = purchase_event(json!({"price": "ten"}));
        let view = DotView::new(&profile, &session, &event).unwrap();
        let err = compiled.validate(&view).unwrap_err();
        assert!(matches!(err, Error::SchemaValidation { .. }));
    }

    #[test]
    fn unresolvable_selector_is_a_violation() {
        let compiled = CompiledSchema::compile(&price_schema("purchase")).unwrap();
        let (profile, session, event) = purchase_event(json!({}));
        let view = DotView::new(&profile, &session, &event).unwrap();
        let err = compiled.validate(&view).unwrap_err();
        assert!(err.to_string().contains("does not resolve"));
    }

    #[test]
    fn invalid_schema_document_fails_compilation() {
        let schema = EventTypeSchema::single(
            "purchase",
            "event@properties.price",
            json!({"type": "not-a-real-type"}),
        );
        assert!(CompiledSchema::compile(&schema).is_err());
    }

    #[tokio::test]
    async fn missing_schema_is_cached_as_none() {
        let store = MemorySchemaStore::new();
        let cache = SchemaValidationCache::new(Duration::from_secs(60));

        assert!(cache.get("page-view", &store).await.unwrap().is_none());
        assert!(cache.get("page-view", &store).await.unwrap().is_none());
        assert_eq!(store.load_count(), 1);
    }

    #[tokio::test]
    async fn validate_events_stamps_validated_status() {
        let store = MemorySchemaStore::new();
        store.insert_schema(price_schema("purchase")).unwrap();
        let cache = SchemaValidationCache::new(Duration::from_secs(60));

        let (profile, session, event) = purchase_event(json!({"price": 3}));
        let mut events = vec![event];
        validate_events(&mut events, &profile, &session, &cache, &store)
            .await
            .unwrap();
        assert_eq!(events[0].metadata.status, Some(EventStatus::Validated));
    }

    #[tokio::test]
    async fn validate_events_skips_types_without_schema() {
        let store = MemorySchemaStore::new();
        let cache = SchemaValidationCache::new(Duration::from_secs(60));

        let (profile, session, event) = purchase_event(json!({"price": "free-form"}));
        let mut events = vec![event];
        validate_events(&mut events, &profile, &session, &cache, &store)
            .await
            .unwrap();
        assert!(events[0].metadata.status.is_none());
    }
}
