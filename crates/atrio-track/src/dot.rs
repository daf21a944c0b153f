//! Dot-path views over the entities of a tracking request.
//!
//! Validation schemas address data with selectors such as
//! `event@properties.price` or `profile@traits.public.city`. A [`DotView`]
//! snapshots the profile, session and event as JSON trees and resolves those
//! selectors against them.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::event::Event;
use crate::profile::Profile;
use crate::session::Session;

/// JSON snapshot of one event together with its profile and session,
/// addressable by `entity@dot.path` selectors.
#[derive(Debug)]
pub struct DotView {
    profile: Value,
    session: Value,
    event: Value,
}

impl DotView {
    /// Snapshots the given entities.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if any entity cannot be converted to
    /// JSON.
    pub fn new(profile: &Profile, session: &Session, event: &Event) -> Result<Self> {
        let snapshot = |what: &str, value: serde_json::Result<Value>| {
            value.map_err(|err| {
                Error::from(atrio_core::error::Error::serialization(format!(
                    "could not snapshot {what}: {err}"
                )))
            })
        };
        Ok(Self {
            profile: snapshot("profile", serde_json::to_value(profile))?,
            session: snapshot("session", serde_json::to_value(session))?,
            event: snapshot("event", serde_json::to_value(event))?,
        })
    }

    /// Resolves a selector of the form `entity@dot.path`.
    ///
    /// The entity must be one of `profile`, `session` or `event`. Path
    /// segments index into objects by key and into arrays by number. An
    /// empty path addresses the entity root. Returns `None` when the entity
    /// is unknown or any segment does not resolve.
    #[must_use]
    pub fn resolve(&self, selector: &str) -> Option<&Value> {
        let (entity, path) = selector.split_once('@')?;
        let root = match entity {
            "profile" => &self.profile,
            "session" => &self.session,
            "event" => &self.event,
            _ => return None,
        };
        if path.is_empty() {
            return Some(root);
        }
        let mut current = root;
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrio_core::id::{SessionId, SourceId};
    use serde_json::json;

    fn view() -> DotView {
        let profile = Profile::new();
        let session = Session::new(SessionId::generate());
        let event = Event::new("purchase", session.id.clone(), SourceId::generate())
            .with_properties(json!({"price": 12.5, "items": [{"sku": "A-1"}]}));
        DotView::new(&profile, &session, &event).unwrap()
    }

    #[test]
    fn resolves_object_paths() {
        let view = view();
        assert_eq!(view.resolve("event@properties.price"), Some(&json!(12.5)));
    }

    #[test]
    fn resolves_array_indices() {
        let view = view();
        assert_eq!(
            view.resolve("event@properties.items.0.sku"),
            Some(&json!("A-1"))
        );
    }

    #[test]
    fn resolves_entity_root_for_empty_path() {
        let view = view();
        let root = view.resolve("event@").unwrap();
        assert_eq!(root["type"], "purchase");
    }

    #[test]
    fn unknown_entity_does_not_resolve() {
        let view = view();
        assert!(view.resolve("payload@properties.price").is_none());
    }

    #[test]
    fn missing_key_does_not_resolve() {
        let view = view();
        assert!(view.resolve("event@properties.missing").is_none());
        assert!(view.resolve("profile@traits.public.city").is_none());
    }

    #[test]
    fn selector_without_separator_does_not_resolve() {
        let view = view();
        assert!(view.resolve("event.properties.price").is_none());
    }
}
