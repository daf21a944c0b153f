//! Strongly-typed identifiers for Atrio entities.
//!
//! All identifiers are:
//! - **Strongly typed**: mixing up a session id and a profile id is a
//!   compile error
//! - **Caller-friendly**: sessions and sources are identified by ids minted
//!   outside this system, so the underlying representation is an opaque
//!   non-empty string
//! - **Sortable when generated**: ids minted here are ULIDs, which encode
//!   creation time and sort lexicographically without coordination
//!
//! # Example
//!
//! ```rust
//! use atrio_core::id::{EventId, ProfileId};
//!
//! let event = EventId::generate();
//! let profile = ProfileId::generate();
//!
//! // Ids are different types - this won't compile:
//! // let wrong: EventId = profile;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Error, Result};

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generates a new unique id.
            ///
            /// Uses ULID generation: lexicographically sortable by creation
            /// time, globally unique without coordination, URL-safe.
            #[must_use]
            pub fn generate() -> Self {
                Self(Ulid::new().to_string())
            }

            /// Wraps a caller-supplied id.
            ///
            /// # Errors
            ///
            /// Returns `Error::InvalidId` when the id is empty or blank.
            pub fn new(id: impl Into<String>) -> Result<Self> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(Error::InvalidId {
                        message: format!("{} id must not be empty", $label),
                    });
                }
                Ok(Self(id))
            }

            /// Returns the id as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

entity_id!(
    /// A unique identifier for a tracked event.
    ///
    /// Generated when the event is extracted from an inbound payload; the
    /// workflow engine keys its mutated copies by this id.
    EventId,
    "event"
);

entity_id!(
    /// A unique identifier for a profile.
    ///
    /// Profiles are the long-lived identity aggregate; new profiles mint a
    /// ULID, merged profiles keep the canonical profile's id.
    ProfileId,
    "profile"
);

entity_id!(
    /// A unique identifier for a session.
    ///
    /// Session ids are issued outside this system and must accompany every
    /// tracking request.
    SessionId,
    "session"
);

entity_id!(
    /// A unique identifier for an event source.
    ///
    /// Sources are registered out of band; tracking requests carry the id
    /// of the source they claim to originate from.
    SourceId,
    "source"
);
