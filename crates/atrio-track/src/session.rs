//! Visit sessions linking events to profiles.

use atrio_core::id::{ProfileId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timing metadata for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// When the session was opened.
    pub opened_at: DateTime<Utc>,
}

/// A visit session. Sessions are client-assigned and may refer to a profile
/// once attribution has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Client-assigned session id.
    pub id: SessionId,
    /// Profile this session is attributed to, once resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<ProfileId>,
    /// Contextual data captured for the whole visit.
    pub context: Value,
    /// Timing metadata.
    pub metadata: SessionMetadata,
}

impl Session {
    /// Creates a fresh session opened now, with no profile attribution.
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            profile_id: None,
            context: Value::Object(serde_json::Map::new()),
            metadata: SessionMetadata { opened_at: Utc::now() },
        }
    }

    /// Attributes the session to a profile.
    pub fn attach_profile(&mut self, profile_id: ProfileId) {
        self.profile_id = Some(profile_id);
    }
}
