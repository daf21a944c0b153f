//! # atrio-track
//!
//! Event tracking pipeline for the Atrio customer data platform.
//!
//! This crate implements the collection domain, providing:
//!
//! - **Source Authorization**: TTL-cached validation of inbound event sources
//! - **Schema Validation**: Per-event-type JSON Schema checks over dotted views
//! - **Workflow Orchestration**: Rule-bound flow execution with segmentation
//! - **Durable Collection**: Ordered profile, session and event persistence
//!
//! ## Core Concepts
//!
//! - **Payload**: One inbound request carrying a source, a session and a
//!   batch of raw events
//! - **Profile**: The person the events describe, resolved through the
//!   session or created on first contact
//! - **Console Log**: Per-request journal of degraded stages, folded into
//!   stored event statuses
//!
//! ## Guarantees
//!
//! - **Isolation**: Workflow, merge and eager-update failures degrade to
//!   console entries and never block persistence
//! - **Durability**: Persistence failures abort the request with the
//!   offending rows attached
//! - **Reconciliation**: Events flagged by the workflow are stored in their
//!   post-invoke form, in original order
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use atrio_core::id::{SessionId, SourceId};
//! use atrio_track::payload::{EventPayload, TrackerPayload};
//! use atrio_track::runtime::TrackerConfig;
//! use atrio_track::source::Source;
//! use atrio_track::store::memory::MemorySourceStore;
//! use atrio_track::tracker::Tracker;
//! use serde_json::json;
//!
//! # async fn run() -> atrio_track::error::Result<()> {
//! let sources = Arc::new(MemorySourceStore::new());
//! let source_id = SourceId::generate();
//! sources.insert_source(Source::new(source_id.clone(), "web"))?;
//!
//! let tracker = Tracker::builder(TrackerConfig::default())
//!     .sources(sources)
//!     .build();
//!
//! let payload = TrackerPayload::new(source_id, Some(SessionId::generate()))
//!     .with_event(EventPayload::new("page-view", json!({"url": "/pricing"})));
//! let response = tracker.track(payload, None).await?;
//! println!("tracked for profile {}", response.profile.id());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod console;
pub mod dot;
pub mod error;
pub mod event;
pub mod merge;
pub mod metrics;
pub mod payload;
pub mod profile;
pub mod response;
pub mod runtime;
pub mod schema;
pub mod segment;
pub mod session;
pub mod source;
pub mod store;
pub mod tracker;
pub mod workflow;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::console::{ConsoleEntry, ConsoleLog, Severity};
    pub use crate::error::{Error, Result};
    pub use crate::event::{Event, EventStatus};
    pub use crate::merge::Merger;
    pub use crate::metrics::TrackMetrics;
    pub use crate::payload::{EventPayload, TrackerPayload};
    pub use crate::profile::Profile;
    pub use crate::response::{CollectResult, TrackerResponse};
    pub use crate::runtime::TrackerConfig;
    pub use crate::schema::{EventTypeSchema, SchemaValidationCache};
    pub use crate::segment::{SegmentationResult, Segmenter};
    pub use crate::session::Session;
    pub use crate::source::Source;
    pub use crate::store::{
        ConsoleLogStore, DebugInfoStore, EventStore, ProfileStore, RuleStore, SchemaStore,
        SessionStore, SourceStore,
    };
    pub use crate::tracker::{Tracker, TrackerBuilder};
    pub use crate::workflow::{Flow, FlowLoader, Rule, WorkflowEngine, WorkflowSummary};
}
