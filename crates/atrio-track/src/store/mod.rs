//! Storage abstractions for the tracking pipeline.
//!
//! Every external collaborator sits behind its own narrow trait, so tests
//! can swap exactly the seam they exercise and production can wire each
//! concern to a different backend. Memory-backed implementations live in
//! [`memory`].

pub mod memory;

use async_trait::async_trait;

use atrio_core::bulk::BulkInsertResult;
use atrio_core::id::{ProfileId, SessionId, SourceId};

use crate::console::ConsoleEntry;
use crate::error::Result;
use crate::event::Event;
use crate::profile::Profile;
use crate::schema::EventTypeSchema;
use crate::session::Session;
use crate::source::Source;
use crate::workflow::{DebugInfo, RuleBindings};

/// Registry of tracking sources.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Loads a source by id, or `None` if it is not registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry lookup fails.
    async fn load_source(&self, id: &SourceId) -> Result<Option<Source>>;
}

/// Profile persistence.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Loads a profile by id, following merge redirects to the surviving
    /// profile. Returns `None` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn load_merged_profile(&self, id: &ProfileId) -> Result<Option<Profile>>;

    /// Saves one profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails or the data is rejected.
    async fn save_profile(&self, profile: &Profile) -> Result<BulkInsertResult>;

    /// Bulk-saves profiles, used for disabled duplicates after merging.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails or any row is rejected.
    async fn save_profiles(&self, profiles: &[Profile]) -> Result<BulkInsertResult>;
}

/// Session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads a session by id, or `None` if it was never persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn load_session(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Saves a session attributed to the given profile. When `persist` is
    /// false the save is skipped and an empty result is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails or the data is rejected.
    async fn save_session(
        &self,
        session: &Session,
        profile: &Profile,
        persist: bool,
    ) -> Result<BulkInsertResult>;
}

/// Event persistence.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Bulk-saves events. When `persist` is false the save is skipped and
    /// an empty result is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails or any row is rejected.
    async fn save_events(&self, events: &[Event], persist: bool) -> Result<BulkInsertResult>;
}

/// Registry of per-event-type validation schemas.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Loads the validation schema for an event type, or `None` if the
    /// type has no schema registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn load_schema(&self, event_type: &str) -> Result<Option<EventTypeSchema>>;
}

/// Registry of routing rules.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Resolves the enabled rules triggered by the given events, grouped
    /// by the event that triggers them.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    async fn load_rules(&self, events: &[Event]) -> Result<RuleBindings>;
}

/// Persistence for workflow execution traces.
#[async_trait]
pub trait DebugInfoStore: Send + Sync {
    /// Saves the execution traces of one request. Implementations decide
    /// how to handle an absent or empty trace.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    async fn save_debug_info(&self, debug_info: Option<&DebugInfo>) -> Result<()>;
}

/// Persistence for request diagnostics.
#[async_trait]
pub trait ConsoleLogStore: Send + Sync {
    /// Bulk-saves console entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the save fails.
    async fn save_entries(&self, entries: &[ConsoleEntry]) -> Result<()>;
}
