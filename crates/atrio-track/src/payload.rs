//! Inbound tracking payloads.
//!
//! A [`TrackerPayload`] is the unit of ingestion: one source, one session,
//! a batch of events and a map of feature toggles. It also owns the logic
//! that turns payload data into domain entities: building events and
//! resolving the profile/session pair the request runs against.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use atrio_core::id::{ProfileId, SessionId, SourceId};

use crate::error::Result;
use crate::event::Event;
use crate::profile::Profile;
use crate::session::Session;
use crate::store::ProfileStore;

/// Well-known option keys.
pub mod options {
    /// Toggles durable session persistence.
    pub const SAVE_SESSION: &str = "saveSession";
    /// Toggles durable event persistence.
    pub const SAVE_EVENTS: &str = "saveEvents";
    /// Toggles the debugging facet of the response.
    pub const DEBUGGER: &str = "debugger";
    /// Requests the full profile in the response instead of an id
    /// reference.
    pub const PROFILE: &str = "profile";
}

/// One event carried by a tracking payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event properties.
    #[serde(default)]
    pub properties: Value,
}

impl EventPayload {
    /// Creates an event payload.
    #[must_use]
    pub fn new(event_type: impl Into<String>, properties: Value) -> Self {
        Self {
            event_type: event_type.into(),
            properties,
        }
    }
}

/// Feature toggles carried by the payload.
///
/// A feature is disabled only when its key is present with a `false`
/// value; absent keys keep the default behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerOptions {
    toggles: BTreeMap<String, bool>,
}

impl TrackerOptions {
    /// Sets a toggle.
    pub fn set(&mut self, key: impl Into<String>, value: bool) {
        self.toggles.insert(key.into(), value);
    }

    /// Whether the key is present with a `false` value.
    #[must_use]
    pub fn is_disabled(&self, key: &str) -> bool {
        self.toggles.get(key) == Some(&false)
    }

    /// Whether the key is present with a `true` value.
    #[must_use]
    pub fn is_enabled(&self, key: &str) -> bool {
        self.toggles.get(key) == Some(&true)
    }
}

/// Source reference of a payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    /// Source id presented by the client.
    pub id: SourceId,
}

/// Session reference of a payload. The id is client-assigned and may be
/// absent, which makes the request unauthorized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRef {
    /// Client-assigned session id.
    #[serde(default)]
    pub id: Option<SessionId>,
}

/// Optional profile hint of a payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRef {
    /// Profile id the client believes it is.
    pub id: ProfileId,
}

/// Collector metadata for the payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayloadMetadata {
    /// Client address, stamped by the collector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
}

/// One inbound tracking request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerPayload {
    /// Source the payload claims to come from.
    pub source: SourceRef,
    /// Session the payload belongs to.
    #[serde(default)]
    pub session: SessionRef,
    /// Profile hint, when the client already knows its profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileRef>,
    /// Request-level context copied onto every built event.
    #[serde(default)]
    pub context: Value,
    /// Request-level properties.
    #[serde(default)]
    pub properties: Value,
    /// Events to ingest, in client order.
    #[serde(default)]
    pub events: Vec<EventPayload>,
    /// Collector metadata.
    #[serde(default)]
    pub metadata: PayloadMetadata,
    /// Feature toggles.
    #[serde(default)]
    pub options: TrackerOptions,
}

impl TrackerPayload {
    /// Creates a payload with no events and no toggles.
    #[must_use]
    pub fn new(source_id: SourceId, session_id: Option<SessionId>) -> Self {
        Self {
            source: SourceRef { id: source_id },
            session: SessionRef { id: session_id },
            profile: None,
            context: Value::Object(serde_json::Map::new()),
            properties: Value::Object(serde_json::Map::new()),
            events: Vec::new(),
            metadata: PayloadMetadata::default(),
            options: TrackerOptions::default(),
        }
    }

    /// Appends an event.
    #[must_use]
    pub fn with_event(mut self, event: EventPayload) -> Self {
        self.events.push(event);
        self
    }

    /// Sets a profile hint.
    #[must_use]
    pub fn with_profile_hint(mut self, profile_id: ProfileId) -> Self {
        self.profile = Some(ProfileRef { id: profile_id });
        self
    }

    /// Sets a feature toggle.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: bool) -> Self {
        self.options.set(key, value);
        self
    }

    /// Client-assigned session id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.id.as_ref()
    }

    /// Whether a feature toggle disables the given key.
    #[must_use]
    pub fn is_disabled(&self, key: &str) -> bool {
        self.options.is_disabled(key)
    }

    /// Whether the client asked for the full profile in the response.
    #[must_use]
    pub fn return_profile(&self) -> bool {
        self.options.is_enabled(options::PROFILE)
    }

    /// Builds domain events from the payload, attributed to the resolved
    /// profile and session. Events are created in payload order with fresh
    /// ids, the request context and the collector address.
    #[must_use]
    pub fn build_events(&self, session: &Session, profile: &Profile) -> Vec<Event> {
        self.events
            .iter()
            .map(|payload| {
                let mut event = Event::new(
                    payload.event_type.clone(),
                    session.id.clone(),
                    self.source.id.clone(),
                )
                .with_profile(profile.id.clone())
                .with_properties(payload.properties.clone());
                event.context = self.context.clone();
                event.metadata.ip = self.metadata.ip;
                event
            })
            .collect()
    }

    /// Resolves the profile and session this request runs against.
    ///
    /// A missing session becomes a new session under the client-assigned
    /// id. The profile is looked up through merge redirects from the
    /// payload hint first, then from the session attribution; when neither
    /// resolves, a new profile is created. The session always leaves
    /// attributed to the resolved profile.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the profile lookup fails.
    pub async fn resolve_profile_and_session(
        &self,
        session_id: SessionId,
        loaded: Option<Session>,
        profiles: &dyn ProfileStore,
    ) -> Result<(Profile, Session)> {
        let mut session = loaded.unwrap_or_else(|| {
            let mut session = Session::new(session_id);
            session.context = self.context.clone();
            session
        });
        let hinted = self
            .profile
            .as_ref()
            .map(|profile| profile.id.clone())
            .or_else(|| session.profile_id.clone());
        let profile = match hinted {
            Some(profile_id) => match profiles.load_merged_profile(&profile_id).await? {
                Some(profile) => profile,
                None => Profile::new(),
            },
            None => Profile::new(),
        };
        session.attach_profile(profile.id.clone());
        Ok((profile, session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryProfileStore;
    use serde_json::json;

    fn payload() -> TrackerPayload {
        TrackerPayload::new(SourceId::generate(), Some(SessionId::generate()))
    }

    #[test]
    fn absent_toggle_is_not_disabled() {
        let payload = payload();
        assert!(!payload.is_disabled(options::SAVE_EVENTS));
    }

    #[test]
    fn false_toggle_is_disabled() {
        let payload = payload().with_option(options::SAVE_EVENTS, false);
        assert!(payload.is_disabled(options::SAVE_EVENTS));
        assert!(!payload.is_disabled(options::SAVE_SESSION));
    }

    #[test]
    fn return_profile_requires_true_toggle() {
        assert!(!payload().return_profile());
        assert!(payload().with_option(options::PROFILE, true).return_profile());
        assert!(!payload().with_option(options::PROFILE, false).return_profile());
    }

    #[test]
    fn build_events_attributes_and_stamps() {
        let mut payload = payload()
            .with_event(EventPayload::new("page-view", json!({"url": "/pricing"})))
            .with_event(EventPayload::new("purchase", json!({"price": 9})));
        payload.context = json!({"browser": "firefox"});
        payload.metadata.ip = Some("203.0.113.7".parse().unwrap());

        let session = Session::new(payload.session_id().unwrap().clone());
        let profile = Profile::new();
        let events = payload.build_events(&session, &profile);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "page-view");
        assert_eq!(events[1].event_type, "purchase");
        for event in &events {
            assert_eq!(event.profile_id, Some(profile.id.clone()));
            assert_eq!(event.session_id, session.id);
            assert_eq!(event.source_id, payload.source.id);
            assert_eq!(event.context, json!({"browser": "firefox"}));
            assert_eq!(event.metadata.ip, payload.metadata.ip);
            assert!(event.metadata.status.is_none());
        }
        assert_ne!(events[0].id, events[1].id);
    }

    #[tokio::test]
    async fn resolve_creates_profile_and_session_when_unknown() {
        let payload = payload();
        let session_id = payload.session_id().unwrap().clone();
        let profiles = MemoryProfileStore::new();

        let (profile, session) = payload
            .resolve_profile_and_session(session_id.clone(), None, &profiles)
            .await
            .unwrap();

        assert!(profile.operation.new);
        assert_eq!(session.id, session_id);
        assert_eq!(session.profile_id, Some(profile.id));
    }

    #[tokio::test]
    async fn resolve_prefers_payload_hint_over_session() {
        let profiles = MemoryProfileStore::new();
        let hinted = Profile::with_id(ProfileId::generate());
        profiles.insert_profile(hinted.clone()).unwrap();

        let session_profile = Profile::with_id(ProfileId::generate());
        profiles.insert_profile(session_profile.clone()).unwrap();

        let payload = payload().with_profile_hint(hinted.id.clone());
        let session_id = payload.session_id().unwrap().clone();
        let mut stored_session = Session::new(session_id.clone());
        stored_session.attach_profile(session_profile.id.clone());

        let (profile, session) = payload
            .resolve_profile_and_session(session_id, Some(stored_session), &profiles)
            .await
            .unwrap();

        assert_eq!(profile.id, hinted.id);
        assert!(!profile.operation.new);
        assert_eq!(session.profile_id, Some(hinted.id));
    }

    #[tokio::test]
    async fn resolve_falls_back_to_new_profile_when_hint_unknown() {
        let profiles = MemoryProfileStore::new();
        let payload = payload().with_profile_hint(ProfileId::generate());
        let session_id = payload.session_id().unwrap().clone();

        let (profile, _session) = payload
            .resolve_profile_and_session(session_id, None, &profiles)
            .await
            .unwrap();

        assert!(profile.operation.new);
    }

    #[test]
    fn payload_deserializes_camel_case() {
        let raw = json!({
            "source": {"id": "01J9ZC3SOURCEULID0000000000"},
            "session": {"id": "01J9ZC3SESSIONULID000000000"},
            "context": {"page": "/"},
            "events": [{"type": "page-view", "properties": {"url": "/"}}],
            "options": {"saveEvents": false}
        });
        let payload: TrackerPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(payload.events.len(), 1);
        assert!(payload.is_disabled(options::SAVE_EVENTS));
        assert!(payload.session_id().is_some());
    }
}
