//! Customer profiles and their per-request bookkeeping.

use std::collections::BTreeMap;

use atrio_core::id::ProfileId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-request bookkeeping recorded against a profile as the pipeline runs.
///
/// `new` marks a profile created during this request; `update` marks a
/// profile mutated by the workflow engine or segmentation. Both drive
/// persistence decisions later in the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOperation {
    /// The profile was created during this request and has never been saved.
    pub new: bool,
    /// The profile was mutated and should be saved eagerly.
    pub update: bool,
}

impl ProfileOperation {
    /// Whether the profile needs an eager save before the request completes.
    #[must_use]
    pub const fn needs_update(&self) -> bool {
        self.update
    }
}

/// Profile traits split by visibility. Private traits and PII never leave
/// the platform in tracker responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileTraits {
    /// Traits that may be echoed back to clients.
    pub public: Value,
    /// Traits that stay inside the platform.
    pub private: Value,
}

impl Default for ProfileTraits {
    fn default() -> Self {
        Self {
            public: Value::Object(serde_json::Map::new()),
            private: Value::Object(serde_json::Map::new()),
        }
    }
}

/// A customer profile aggregating behavior across sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Unique profile id.
    pub id: ProfileId,
    /// Per-request bookkeeping flags.
    #[serde(default)]
    pub operation: ProfileOperation,
    /// Traits split by visibility.
    #[serde(default)]
    pub traits: ProfileTraits,
    /// Personally identifiable information. Never echoed to clients.
    #[serde(default)]
    pub pii: Value,
    /// Segments the profile currently belongs to.
    #[serde(default)]
    pub segments: Vec<String>,
    /// Consents granted by the customer, keyed by consent type.
    #[serde(default)]
    pub consents: BTreeMap<String, Value>,
    /// Whether the profile is active. Duplicates disabled by merging are
    /// kept with `active = false`.
    pub active: bool,
}

impl Profile {
    /// Creates a brand-new profile with a generated id, flagged for insert.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ProfileId::generate(),
            operation: ProfileOperation {
                new: true,
                update: false,
            },
            traits: ProfileTraits::default(),
            pii: Value::Null,
            segments: Vec::new(),
            consents: BTreeMap::new(),
            active: true,
        }
    }

    /// Creates a profile shell for an id loaded from storage.
    #[must_use]
    pub fn with_id(id: ProfileId) -> Self {
        Self {
            id,
            operation: ProfileOperation::default(),
            traits: ProfileTraits::default(),
            pii: Value::Null,
            segments: Vec::new(),
            consents: BTreeMap::new(),
            active: true,
        }
    }

    /// Flags the profile for an eager save.
    pub fn mark_updated(&mut self) {
        self.operation.update = true;
    }

    /// Adds the profile to a segment if it is not already a member.
    pub fn add_segment(&mut self, segment: impl Into<String>) {
        let segment = segment.into();
        if !self.segments.contains(&segment) {
            self.segments.push(segment);
        }
    }

    /// Marks the profile as a disabled duplicate.
    pub fn disable(&mut self) {
        self.active = false;
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}
