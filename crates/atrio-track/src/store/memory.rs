//! Memory-backed store implementations.
//!
//! Used by tests and single-process deployments. Each store keeps its data
//! under an `RwLock` and exposes inspection helpers so tests can assert on
//! what was persisted. A poisoned lock surfaces as a storage error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use atrio_core::bulk::BulkInsertResult;
use atrio_core::id::{ProfileId, SessionId, SourceId};

use crate::console::ConsoleEntry;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::profile::{Profile, ProfileOperation};
use crate::schema::EventTypeSchema;
use crate::segment::{SegmentDefinition, SegmentLoader};
use crate::session::Session;
use crate::source::Source;
use crate::store::{
    ConsoleLogStore, DebugInfoStore, EventStore, ProfileStore, RuleStore, SchemaStore,
    SessionStore, SourceStore,
};
use crate::workflow::{DebugInfo, Flow, FlowLoader, Rule, RuleBindings};

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// Memory-backed source registry.
#[derive(Debug, Default)]
pub struct MemorySourceStore {
    sources: RwLock<HashMap<String, Source>>,
}

impl MemorySourceStore {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_source(&self, source: Source) -> Result<()> {
        let mut sources = self.sources.write().map_err(poison_err)?;
        sources.insert(source.id.as_str().to_owned(), source);
        Ok(())
    }
}

#[async_trait]
impl SourceStore for MemorySourceStore {
    async fn load_source(&self, id: &SourceId) -> Result<Option<Source>> {
        let source = {
            let sources = self.sources.read().map_err(poison_err)?;
            sources.get(id.as_str()).cloned()
        };
        Ok(source)
    }
}

/// Memory-backed profile persistence.
///
/// Saves store the profile with its per-request operation flags cleared,
/// mirroring backends that treat the operation descriptor as transient
/// bookkeeping rather than persisted state.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, Profile>>,
    profile_saves: AtomicUsize,
    bulk_saves: AtomicUsize,
}

impl MemoryProfileStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a profile directly, bypassing save accounting.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_profile(&self, profile: Profile) -> Result<()> {
        let mut profiles = self.profiles.write().map_err(poison_err)?;
        profiles.insert(profile.id.as_str().to_owned(), profile);
        Ok(())
    }

    /// Returns a stored profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn profile(&self, id: &ProfileId) -> Result<Option<Profile>> {
        let profiles = self.profiles.read().map_err(poison_err)?;
        Ok(profiles.get(id.as_str()).cloned())
    }

    /// Number of single-profile saves performed.
    #[must_use]
    pub fn profile_save_count(&self) -> usize {
        self.profile_saves.load(Ordering::SeqCst)
    }

    /// Number of bulk saves performed.
    #[must_use]
    pub fn bulk_save_count(&self) -> usize {
        self.bulk_saves.load(Ordering::SeqCst)
    }

    fn store(&self, profile: &Profile) -> Result<()> {
        let mut stored = profile.clone();
        stored.operation = ProfileOperation::default();
        let mut profiles = self.profiles.write().map_err(poison_err)?;
        profiles.insert(stored.id.as_str().to_owned(), stored);
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load_merged_profile(&self, id: &ProfileId) -> Result<Option<Profile>> {
        let profile = {
            let profiles = self.profiles.read().map_err(poison_err)?;
            profiles.get(id.as_str()).cloned()
        };
        Ok(profile)
    }

    async fn save_profile(&self, profile: &Profile) -> Result<BulkInsertResult> {
        self.store(profile)?;
        self.profile_saves.fetch_add(1, Ordering::SeqCst);
        Ok(BulkInsertResult::saved(vec![profile.id.as_str().to_owned()]))
    }

    async fn save_profiles(&self, profiles: &[Profile]) -> Result<BulkInsertResult> {
        let mut ids = Vec::with_capacity(profiles.len());
        for profile in profiles {
            self.store(profile)?;
            ids.push(profile.id.as_str().to_owned());
        }
        self.bulk_saves.fetch_add(1, Ordering::SeqCst);
        Ok(BulkInsertResult::saved(ids))
    }
}

/// Memory-backed session persistence.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    persisted_saves: AtomicUsize,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a session directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_session(&self, session: Session) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poison_err)?;
        sessions.insert(session.id.as_str().to_owned(), session);
        Ok(())
    }

    /// Returns a stored session.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn session(&self, id: &SessionId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().map_err(poison_err)?;
        Ok(sessions.get(id.as_str()).cloned())
    }

    /// Number of saves that actually persisted.
    #[must_use]
    pub fn persisted_count(&self) -> usize {
        self.persisted_saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load_session(&self, id: &SessionId) -> Result<Option<Session>> {
        let session = {
            let sessions = self.sessions.read().map_err(poison_err)?;
            sessions.get(id.as_str()).cloned()
        };
        Ok(session)
    }

    async fn save_session(
        &self,
        session: &Session,
        profile: &Profile,
        persist: bool,
    ) -> Result<BulkInsertResult> {
        if !persist {
            return Ok(BulkInsertResult::default());
        }
        let mut stored = session.clone();
        stored.attach_profile(profile.id.clone());
        {
            let mut sessions = self.sessions.write().map_err(poison_err)?;
            sessions.insert(stored.id.as_str().to_owned(), stored);
        }
        self.persisted_saves.fetch_add(1, Ordering::SeqCst);
        Ok(BulkInsertResult::saved(vec![session.id.as_str().to_owned()]))
    }
}

/// Memory-backed event persistence.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<Event>>,
    save_calls: AtomicUsize,
}

impl MemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All persisted events, in save order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn saved_events(&self) -> Result<Vec<Event>> {
        let events = self.events.read().map_err(poison_err)?;
        Ok(events.clone())
    }

    /// Number of `save_events` calls, skipped saves included.
    #[must_use]
    pub fn save_call_count(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn save_events(&self, events: &[Event], persist: bool) -> Result<BulkInsertResult> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if !persist {
            return Ok(BulkInsertResult::default());
        }
        let ids = events
            .iter()
            .map(|event| event.id.as_str().to_owned())
            .collect::<Vec<_>>();
        {
            let mut stored = self.events.write().map_err(poison_err)?;
            stored.extend(events.iter().cloned());
        }
        Ok(BulkInsertResult::saved(ids))
    }
}

/// Memory-backed schema registry. Counts loads so cache behavior is
/// observable.
#[derive(Debug, Default)]
pub struct MemorySchemaStore {
    schemas: RwLock<HashMap<String, EventTypeSchema>>,
    loads: AtomicUsize,
}

impl MemorySchemaStore {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema under its event type.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_schema(&self, schema: EventTypeSchema) -> Result<()> {
        let mut schemas = self.schemas.write().map_err(poison_err)?;
        schemas.insert(schema.event_type.clone(), schema);
        Ok(())
    }

    /// Number of `load_schema` calls served.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaStore for MemorySchemaStore {
    async fn load_schema(&self, event_type: &str) -> Result<Option<EventTypeSchema>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let schema = {
            let schemas = self.schemas.read().map_err(poison_err)?;
            schemas.get(event_type).cloned()
        };
        Ok(schema)
    }
}

/// Memory-backed rule registry.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: RwLock<HashMap<String, Vec<Rule>>>,
}

impl MemoryRuleStore {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule under its event type.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_rule(&self, rule: Rule) -> Result<()> {
        let mut rules = self.rules.write().map_err(poison_err)?;
        rules.entry(rule.event_type.clone()).or_default().push(rule);
        Ok(())
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn load_rules(&self, events: &[Event]) -> Result<RuleBindings> {
        let rules = self.rules.read().map_err(poison_err)?;
        let mut bindings = RuleBindings::new();
        for event in events {
            let Some(candidates) = rules.get(&event.event_type) else {
                continue;
            };
            for rule in candidates.iter().filter(|rule| rule.enabled) {
                bindings.bind(event.id.clone(), rule.clone());
            }
        }
        Ok(bindings)
    }
}

/// Memory-backed flow registry.
#[derive(Debug, Default)]
pub struct MemoryFlowStore {
    flows: RwLock<HashMap<String, Flow>>,
}

impl MemoryFlowStore {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_flow(&self, flow: Flow) -> Result<()> {
        let mut flows = self.flows.write().map_err(poison_err)?;
        flows.insert(flow.id.clone(), flow);
        Ok(())
    }
}

#[async_trait]
impl FlowLoader for MemoryFlowStore {
    async fn load_production_flow(&self, flow_id: &str) -> Result<Option<Flow>> {
        let flow = {
            let flows = self.flows.read().map_err(poison_err)?;
            flows.get(flow_id).cloned()
        };
        Ok(flow)
    }
}

/// Memory-backed segment registry.
#[derive(Debug, Default)]
pub struct MemorySegmentStore {
    segments: RwLock<HashMap<String, Vec<SegmentDefinition>>>,
}

impl MemorySegmentStore {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a segment definition under its event type.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn insert_segment(&self, segment: SegmentDefinition) -> Result<()> {
        let mut segments = self.segments.write().map_err(poison_err)?;
        segments
            .entry(segment.event_type.clone())
            .or_default()
            .push(segment);
        Ok(())
    }
}

#[async_trait]
impl SegmentLoader for MemorySegmentStore {
    async fn load_segments(&self, event_type: &str) -> Result<Vec<SegmentDefinition>> {
        let segments = {
            let stored = self.segments.read().map_err(poison_err)?;
            stored.get(event_type).cloned().unwrap_or_default()
        };
        Ok(segments)
    }
}

/// Memory-backed trace persistence. Counts calls so background-task joins
/// are observable.
#[derive(Debug, Default)]
pub struct MemoryDebugInfoStore {
    saved: RwLock<Vec<DebugInfo>>,
    calls: AtomicUsize,
}

impl MemoryDebugInfoStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Traces persisted so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn saved(&self) -> Result<Vec<DebugInfo>> {
        let saved = self.saved.read().map_err(poison_err)?;
        Ok(saved.clone())
    }

    /// Number of `save_debug_info` calls, empty traces included.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DebugInfoStore for MemoryDebugInfoStore {
    async fn save_debug_info(&self, debug_info: Option<&DebugInfo>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(info) = debug_info {
            if !info.is_empty() {
                let mut saved = self.saved.write().map_err(poison_err)?;
                saved.push(info.clone());
            }
        }
        Ok(())
    }
}

/// Memory-backed console log persistence.
#[derive(Debug, Default)]
pub struct MemoryConsoleLogStore {
    entries: RwLock<Vec<ConsoleEntry>>,
    calls: AtomicUsize,
}

impl MemoryConsoleLogStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries persisted so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn entries(&self) -> Result<Vec<ConsoleEntry>> {
        let entries = self.entries.read().map_err(poison_err)?;
        Ok(entries.clone())
    }

    /// Number of `save_entries` calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConsoleLogStore for MemoryConsoleLogStore {
    async fn save_entries(&self, entries: &[ConsoleEntry]) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.entries.write().map_err(poison_err)?;
        stored.extend(entries.iter().cloned());
        Ok(())
    }
}
