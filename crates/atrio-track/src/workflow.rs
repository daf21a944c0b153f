//! Workflow engine trait and implementations.
//!
//! The workflow engine runs rule-bound flows against the events of a
//! request, typically by delegating to a flow runtime. The pipeline treats
//! it as a best-effort stage: whatever it mutated before failing is kept,
//! and its failure never aborts the request.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use atrio_core::id::{EventId, SourceId};

use crate::console::{ConsoleEntry, ConsoleLog};
use crate::error::Result;
use crate::event::Event;
use crate::profile::Profile;
use crate::session::Session;

/// A routing rule binding an event type to a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Unique rule id.
    pub id: String,
    /// Human-readable rule name, used as the debug info key.
    pub name: String,
    /// Event type the rule triggers on.
    pub event_type: String,
    /// Flow the rule routes matching events to.
    pub flow_id: String,
    /// Disabled rules never trigger.
    pub enabled: bool,
}

/// Rules resolved for a request, grouped by the event that triggers them.
#[derive(Debug, Clone, Default)]
pub struct RuleBindings {
    by_event: HashMap<EventId, Vec<Rule>>,
}

impl RuleBindings {
    /// Creates an empty binding set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a rule to the event that triggers it.
    pub fn bind(&mut self, event_id: EventId, rule: Rule) {
        self.by_event.entry(event_id).or_default().push(rule);
    }

    /// Rules bound to the given event.
    #[must_use]
    pub fn rules_for(&self, event_id: &EventId) -> &[Rule] {
        self.by_event.get(event_id).map_or(&[], Vec::as_slice)
    }

    /// Whether no event has any rule bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }

    /// Number of events with at least one rule bound.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_event.len()
    }
}

/// A workflow definition routed to by rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    /// Unique flow id.
    pub id: String,
    /// Human-readable flow name.
    pub name: String,
    /// Flow graph definition.
    pub definition: Value,
}

/// Loads production flow definitions for the workflow engine.
#[async_trait]
pub trait FlowLoader: Send + Sync {
    /// Loads the production revision of a flow, or `None` if the flow does
    /// not exist.
    async fn load_production_flow(&self, flow_id: &str) -> Result<Option<Flow>>;
}

/// Execution traces grouped by event type, then by rule name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DebugInfo {
    entries: BTreeMap<String, BTreeMap<String, Value>>,
}

impl DebugInfo {
    /// Creates an empty trace collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one execution trace.
    pub fn record(
        &mut self,
        event_type: impl Into<String>,
        rule_name: impl Into<String>,
        trace: Value,
    ) {
        self.entries
            .entry(event_type.into())
            .or_default()
            .insert(rule_name.into(), trace);
    }

    /// Whether no trace has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Traces recorded for one event type.
    #[must_use]
    pub fn for_event_type(&self, event_type: &str) -> Option<&BTreeMap<String, Value>> {
        self.entries.get(event_type)
    }
}

/// Everything the workflow engine produced for one request.
#[derive(Debug, Clone, Default)]
pub struct WorkflowSummary {
    /// Execution traces for the debugging facet of the response.
    pub debug_info: DebugInfo,
    /// Event types that actually had flows executed, in execution order.
    /// Drives post-workflow segmentation.
    pub ran_event_types: Vec<String>,
    /// Mutated event copies keyed by event id. An event is replaced before
    /// persistence only if it is flagged for update and listed here.
    pub post_invoke_events: Option<HashMap<EventId, Event>>,
}

/// Mutable request state handed to the workflow engine.
///
/// The engine mutates these in place, so everything it changed before a
/// failure is visible to later stages.
pub struct WorkflowContext<'a> {
    /// Session of the request.
    pub session: &'a mut Session,
    /// Profile of the request.
    pub profile: &'a mut Profile,
    /// Events of the request, in arrival order.
    pub events: &'a mut [Event],
    /// Diagnostic log for per-event flow diagnostics.
    pub console: &'a mut ConsoleLog,
}

/// Trait for workflow execution.
///
/// Implementations resolve the flows bound to each event and execute them,
/// mutating the context as flows dictate.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Executes all flows bound to the events of a request.
    async fn invoke(
        &self,
        ctx: WorkflowContext<'_>,
        rules: &RuleBindings,
        flows: &dyn FlowLoader,
        source_id: &SourceId,
    ) -> Result<WorkflowSummary>;
}

/// A no-op engine for testing that executes nothing.
#[derive(Debug, Default)]
pub struct NoOpWorkflowEngine;

#[async_trait]
impl WorkflowEngine for NoOpWorkflowEngine {
    async fn invoke(
        &self,
        _ctx: WorkflowContext<'_>,
        _rules: &RuleBindings,
        _flows: &dyn FlowLoader,
        _source_id: &SourceId,
    ) -> Result<WorkflowSummary> {
        Ok(WorkflowSummary::default())
    }
}

/// An engine for testing that applies configured mutations and returns a
/// canned summary.
#[derive(Debug, Default)]
pub struct StaticWorkflowEngine {
    summary: WorkflowSummary,
    mark_updated: Vec<EventId>,
    mark_profile_updated: bool,
    console_entries: Vec<ConsoleEntry>,
}

impl StaticWorkflowEngine {
    /// Creates an engine that returns the given summary.
    #[must_use]
    pub fn new(summary: WorkflowSummary) -> Self {
        Self {
            summary,
            mark_updated: Vec::new(),
            mark_profile_updated: false,
            console_entries: Vec::new(),
        }
    }

    /// Flags an event for update during invocation.
    #[must_use]
    pub fn with_event_marked_for_update(mut self, event_id: EventId) -> Self {
        self.mark_updated.push(event_id);
        self
    }

    /// Flags the profile for an eager save during invocation.
    #[must_use]
    pub fn with_profile_update(mut self) -> Self {
        self.mark_profile_updated = true;
        self
    }

    /// Appends a diagnostic to the console during invocation.
    #[must_use]
    pub fn with_console_entry(mut self, entry: ConsoleEntry) -> Self {
        self.console_entries.push(entry);
        self
    }
}

#[async_trait]
impl WorkflowEngine for StaticWorkflowEngine {
    async fn invoke(
        &self,
        ctx: WorkflowContext<'_>,
        _rules: &RuleBindings,
        _flows: &dyn FlowLoader,
        _source_id: &SourceId,
    ) -> Result<WorkflowSummary> {
        for event in ctx.events.iter_mut() {
            if self.mark_updated.contains(&event.id) {
                event.update = true;
            }
        }
        if self.mark_profile_updated {
            ctx.profile.mark_updated();
        }
        ctx.console.extend(self.console_entries.iter().cloned());
        Ok(self.summary.clone())
    }
}

/// An engine that always fails, optionally after a partial profile
/// mutation.
#[derive(Debug)]
pub struct FailingWorkflowEngine {
    message: String,
    partial_segment: Option<String>,
}

impl FailingWorkflowEngine {
    /// Creates an engine failing with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            partial_segment: None,
        }
    }

    /// Adds a segment to the profile before failing, to simulate a flow
    /// that got halfway through.
    #[must_use]
    pub fn with_partial_segment(mut self, segment: impl Into<String>) -> Self {
        self.partial_segment = Some(segment.into());
        self
    }
}

#[async_trait]
impl WorkflowEngine for FailingWorkflowEngine {
    async fn invoke(
        &self,
        ctx: WorkflowContext<'_>,
        _rules: &RuleBindings,
        _flows: &dyn FlowLoader,
        _source_id: &SourceId,
    ) -> Result<WorkflowSummary> {
        if let Some(segment) = &self.partial_segment {
            ctx.profile.add_segment(segment.clone());
        }
        Err(atrio_core::error::Error::internal(self.message.clone()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Severity;
    use crate::store::memory::MemoryFlowStore;
    use atrio_core::id::SessionId;
    use serde_json::json;

    fn request_state() -> (Session, Profile, Vec<Event>) {
        let session = Session::new(SessionId::generate());
        let profile = Profile::new();
        let events = vec![Event::new(
            "page-view",
            session.id.clone(),
            SourceId::generate(),
        )];
        (session, profile, events)
    }

    #[test]
    fn bindings_group_rules_by_event() {
        let mut bindings = RuleBindings::new();
        let event_id = EventId::generate();
        bindings.bind(
            event_id.clone(),
            Rule {
                id: "r1".into(),
                name: "route page views".into(),
                event_type: "page-view".into(),
                flow_id: "f1".into(),
                enabled: true,
            },
        );

        assert_eq!(bindings.rules_for(&event_id).len(), 1);
        assert!(bindings.rules_for(&EventId::generate()).is_empty());
    }

    #[test]
    fn debug_info_groups_by_event_type_and_rule() {
        let mut debug = DebugInfo::new();
        debug.record("page-view", "route page views", json!({"nodes": 3}));

        let traces = debug.for_event_type("page-view").unwrap();
        assert_eq!(traces["route page views"], json!({"nodes": 3}));
        assert!(!debug.is_empty());
    }

    #[tokio::test]
    async fn static_engine_applies_configured_mutations() {
        let (mut session, mut profile, mut events) = request_state();
        let mut console = ConsoleLog::new();
        let event_id = events[0].id.clone();

        let engine = StaticWorkflowEngine::new(WorkflowSummary::default())
            .with_event_marked_for_update(event_id.clone())
            .with_profile_update()
            .with_console_entry(ConsoleEntry::new(
                "profile",
                "workflow",
                module_path!(),
                Severity::Info,
                "flow ran",
            ));

        let flows = MemoryFlowStore::new();
        let source_id = SourceId::generate();
        engine
            .invoke(
                WorkflowContext {
                    session: &mut session,
                    profile: &mut profile,
                    events: &mut events,
                    console: &mut console,
                },
                &RuleBindings::new(),
                &flows,
                &source_id,
            )
            .await
            .unwrap();

        assert!(events[0].update);
        assert!(profile.operation.needs_update());
        assert_eq!(console.len(), 1);
    }

    #[tokio::test]
    async fn failing_engine_keeps_partial_profile_state() {
        let (mut session, mut profile, mut events) = request_state();
        let mut console = ConsoleLog::new();

        let engine = FailingWorkflowEngine::new("boom").with_partial_segment("halfway");
        let flows = MemoryFlowStore::new();
        let source_id = SourceId::generate();
        let result = engine
            .invoke(
                WorkflowContext {
                    session: &mut session,
                    profile: &mut profile,
                    events: &mut events,
                    console: &mut console,
                },
                &RuleBindings::new(),
                &flows,
                &source_id,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(profile.segments, vec!["halfway".to_string()]);
    }
}
