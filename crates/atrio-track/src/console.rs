//! Request-scoped diagnostic log.
//!
//! Every tracking request accumulates a [`ConsoleLog`] of diagnostics from
//! the stages that ran. The log feeds three consumers: event status
//! overrides before persistence, the debugging facet of the response, and a
//! detached background save at the end of the request.

use std::collections::HashMap;

use atrio_core::id::{EventId, ProfileId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a console entry. Ordering is by increasing severity so the
/// worst entry for an event is simply the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    /// Informational note.
    Info,
    /// Something degraded but the request continued.
    Warning,
    /// A stage failed.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// A single diagnostic recorded while processing a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
    /// Event the diagnostic is about, when attributable to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    /// Profile the diagnostic is about, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<ProfileId>,
    /// Domain the diagnostic originates from, e.g. `profile`.
    pub origin: String,
    /// Component that produced the diagnostic, e.g. `workflow`.
    pub component: String,
    /// Module path of the producing code.
    pub module: String,
    /// Severity of the diagnostic.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// When the diagnostic was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl ConsoleEntry {
    /// Creates an entry recorded now, not yet attributed to an event or
    /// profile.
    #[must_use]
    pub fn new(
        origin: impl Into<String>,
        component: impl Into<String>,
        module: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_id: None,
            profile_id: None,
            origin: origin.into(),
            component: component.into(),
            module: module.into(),
            severity,
            message: message.into(),
            recorded_at: Utc::now(),
        }
    }

    /// Attributes the entry to an event.
    #[must_use]
    pub fn with_event(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }

    /// Attributes the entry to a profile.
    #[must_use]
    pub fn with_profile(mut self, profile_id: ProfileId) -> Self {
        self.profile_id = Some(profile_id);
        self
    }
}

/// Accumulated diagnostics for one tracking request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsoleLog {
    entries: Vec<ConsoleEntry>,
}

impl ConsoleLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry.
    pub fn append(&mut self, entry: ConsoleEntry) {
        self.entries.push(entry);
    }

    /// Appends every entry from an iterator.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = ConsoleEntry>) {
        self.entries.extend(entries);
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[ConsoleEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Worst severity recorded per event. Entries without an event id do
    /// not contribute.
    #[must_use]
    pub fn indexed_event_journal(&self) -> HashMap<EventId, Severity> {
        let mut journal: HashMap<EventId, Severity> = HashMap::new();
        for entry in &self.entries {
            let Some(event_id) = entry.event_id.clone() else {
                continue;
            };
            journal
                .entry(event_id)
                .and_modify(|worst| *worst = (*worst).max(entry.severity))
                .or_insert(entry.severity);
        }
        journal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(severity: Severity, event_id: Option<EventId>) -> ConsoleEntry {
        let entry = ConsoleEntry::new("profile", "workflow", module_path!(), severity, "diag");
        match event_id {
            Some(id) => entry.with_event(id),
            None => entry,
        }
    }

    #[test]
    fn severity_orders_by_badness() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn journal_keeps_worst_severity_per_event() {
        let event_id = EventId::generate();
        let mut log = ConsoleLog::new();
        log.append(entry(Severity::Info, Some(event_id.clone())));
        log.append(entry(Severity::Error, Some(event_id.clone())));
        log.append(entry(Severity::Warning, Some(event_id.clone())));

        let journal = log.indexed_event_journal();
        assert_eq!(journal.get(&event_id), Some(&Severity::Error));
    }

    #[test]
    fn journal_skips_unattributed_entries() {
        let mut log = ConsoleLog::new();
        log.append(entry(Severity::Error, None));
        assert!(log.indexed_event_journal().is_empty());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn journal_tracks_events_independently() {
        let first = EventId::generate();
        let second = EventId::generate();
        let mut log = ConsoleLog::new();
        log.append(entry(Severity::Warning, Some(first.clone())));
        log.append(entry(Severity::Info, Some(second.clone())));

        let journal = log.indexed_event_journal();
        assert_eq!(journal.get(&first), Some(&Severity::Warning));
        assert_eq!(journal.get(&second), Some(&Severity::Info));
    }
}
