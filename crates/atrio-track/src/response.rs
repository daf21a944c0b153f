//! Tracker response assembly.
//!
//! The response echoes the source consent configuration and a sanitized
//! view of the profile, plus an optional debugging facet with everything
//! the pipeline produced. Private traits and PII never appear here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use atrio_core::bulk::BulkInsertResult;
use atrio_core::id::ProfileId;

use crate::console::ConsoleEntry;
use crate::profile::Profile;
use crate::segment::SegmentationResult;
use crate::source::Source;
use crate::workflow::DebugInfo;

/// Outcome of the three durable saves of one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectResult {
    /// Profile save outcome. Empty when the profile was not new.
    pub profile: BulkInsertResult,
    /// Session save outcome. Empty when `saveSession` was disabled.
    pub session: BulkInsertResult,
    /// Event save outcome. Empty when `saveEvents` was disabled.
    pub events: BulkInsertResult,
}

/// Sanitized profile view echoed to clients.
///
/// The full variant carries public traits, segments, consents and the
/// active flag; private traits, PII and operation bookkeeping are excluded
/// by construction. The reference variant carries the id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileEcho {
    /// Full sanitized profile, returned when the client asked for it.
    Full {
        /// Profile id.
        id: ProfileId,
        /// Public traits only.
        traits: Value,
        /// Segment memberships.
        segments: Vec<String>,
        /// Granted consents.
        consents: BTreeMap<String, Value>,
        /// Whether the profile is active.
        active: bool,
    },
    /// Id-only reference, the default.
    Reference {
        /// Profile id.
        id: ProfileId,
    },
}

impl ProfileEcho {
    /// Builds the full sanitized view of a profile.
    #[must_use]
    pub fn full(profile: &Profile) -> Self {
        Self::Full {
            id: profile.id.clone(),
            traits: profile.traits.public.clone(),
            segments: profile.segments.clone(),
            consents: profile.consents.clone(),
            active: profile.active,
        }
    }

    /// Builds the id-only reference view of a profile.
    #[must_use]
    pub fn reference(profile: &Profile) -> Self {
        Self::Reference {
            id: profile.id.clone(),
        }
    }

    /// The echoed profile id.
    #[must_use]
    pub fn id(&self) -> &ProfileId {
        match self {
            Self::Full { id, .. } | Self::Reference { id } => id,
        }
    }
}

/// Source view echoed to clients. Only the consent configuration leaves
/// the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEcho {
    /// Consent configuration of the source.
    pub consent: Value,
}

impl SourceEcho {
    /// Extracts the echoable part of a source.
    #[must_use]
    pub fn from_source(source: &Source) -> Self {
        Self {
            consent: source.consent.clone(),
        }
    }
}

/// Debugging facet of the response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerDebugging {
    /// Durable save outcomes.
    #[serde(flatten)]
    pub collect: CollectResult,
    /// Workflow execution traces, absent when the workflow stage failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<DebugInfo>,
    /// Segmentation decisions, absent when the workflow stage failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<SegmentationResult>,
    /// Diagnostics accumulated during the request.
    pub logs: Vec<ConsoleEntry>,
}

/// Response returned for one tracking request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerResponse {
    /// Sanitized profile echo.
    pub profile: ProfileEcho,
    /// Source consent echo.
    pub source: SourceEcho,
    /// Debugging facet, present unless disabled by deployment or request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debugging: Option<TrackerDebugging>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_echo_excludes_private_traits_and_pii() {
        let mut profile = Profile::new();
        profile.traits.public = json!({"city": "Oslo"});
        profile.traits.private = json!({"income": "high"});
        profile.pii = json!({"email": "a@example.com"});
        profile.add_segment("buyers");

        let echo = ProfileEcho::full(&profile);
        let value = serde_json::to_value(&echo).unwrap();

        assert_eq!(value["traits"], json!({"city": "Oslo"}));
        assert_eq!(value["segments"], json!(["buyers"]));
        assert!(value.get("pii").is_none());
        assert!(value.get("operation").is_none());
        assert!(!value.to_string().contains("income"));
    }

    #[test]
    fn reference_echo_is_id_only() {
        let profile = Profile::new();
        let echo = ProfileEcho::reference(&profile);
        let value = serde_json::to_value(&echo).unwrap();

        assert_eq!(value["id"], json!(profile.id.as_str()));
        assert_eq!(value.as_object().unwrap().len(), 1);
    }

    #[test]
    fn source_echo_carries_consent_only() {
        let mut source = Source::new(atrio_core::id::SourceId::generate(), "web widget");
        source.consent = json!({"gdpr": true});

        let echo = SourceEcho::from_source(&source);
        let value = serde_json::to_value(&echo).unwrap();

        assert_eq!(value, json!({"consent": {"gdpr": true}}));
    }

    #[test]
    fn response_omits_absent_debugging() {
        let profile = Profile::new();
        let source = Source::new(atrio_core::id::SourceId::generate(), "web widget");
        let response = TrackerResponse {
            profile: ProfileEcho::reference(&profile),
            source: SourceEcho::from_source(&source),
            debugging: None,
        };

        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("debugging").is_none());
    }
}
