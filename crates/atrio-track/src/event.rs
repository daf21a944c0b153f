//! Behavioral events collected from tracking sources.

use std::net::IpAddr;

use atrio_core::id::{EventId, ProfileId, SessionId, SourceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Processing status stamped on an event as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventStatus {
    /// The event passed through without warnings or errors.
    Ok,
    /// At least one error was logged against the event.
    Error,
    /// At least one warning was logged against the event.
    Warning,
    /// The event passed schema validation.
    Validated,
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Validated => "validated",
        };
        write!(f, "{label}")
    }
}

/// Metadata stamped on every event at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// When the event was accepted by the collector.
    pub time: DateTime<Utc>,
    /// Client address the event arrived from, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    /// Current processing status. `None` until a stage stamps one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
}

impl EventMetadata {
    /// Creates metadata timestamped now, with no address and no status.
    #[must_use]
    pub fn now() -> Self {
        Self {
            time: Utc::now(),
            ip: None,
            status: None,
        }
    }
}

/// A single behavioral event attributed to a profile and session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique event id.
    pub id: EventId,
    /// Event type, e.g. `page-view` or `purchase`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Profile the event belongs to, once attribution has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<ProfileId>,
    /// Session the event arrived in.
    pub session_id: SessionId,
    /// Source the event was collected from.
    pub source_id: SourceId,
    /// Event properties supplied by the client.
    pub properties: Value,
    /// Contextual data captured alongside the event.
    pub context: Value,
    /// Set by the workflow engine when it produced a mutated copy of this
    /// event that should replace the original before persistence.
    #[serde(default)]
    pub update: bool,
    /// Collector metadata.
    pub metadata: EventMetadata,
}

impl Event {
    /// Creates a new event with a generated id and empty payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>, session_id: SessionId, source_id: SourceId) -> Self {
        Self {
            id: EventId::generate(),
            event_type: event_type.into(),
            profile_id: None,
            session_id,
            source_id,
            properties: Value::Object(serde_json::Map::new()),
            context: Value::Object(serde_json::Map::new()),
            update: false,
            metadata: EventMetadata::now(),
        }
    }

    /// Replaces the event properties.
    #[must_use]
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    /// Attributes the event to a profile.
    #[must_use]
    pub fn with_profile(mut self, profile_id: ProfileId) -> Self {
        self.profile_id = Some(profile_id);
        self
    }

    /// Stamps a processing status on the event.
    pub fn set_status(&mut self, status: EventStatus) {
        self.metadata.status = Some(status);
    }
}
