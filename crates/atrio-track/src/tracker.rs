//! The tracking pipeline orchestrator.
//!
//! [`Tracker::track`] runs one request through the full pipeline:
//!
//! 1. source authorization and session/profile resolution (fatal on error)
//! 2. schema validation (fatal on error)
//! 3. workflow engine + segmentation, merge, eager profile update
//!    (best-effort; failures degrade to console entries)
//! 4. background task join
//! 5. event reconciliation + durable persistence (guaranteed; runs after
//!    every best-effort outcome, fatal on error)
//! 6. response assembly
//!
//! The split matters: a broken workflow must never block data durability,
//! while a broken save must never be silently swallowed.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;

use atrio_core::bulk::BulkInsertResult;
use atrio_core::id::{EventId, SourceId};

use crate::console::{ConsoleEntry, ConsoleLog, Severity};
use crate::error::{Error, Result};
use crate::event::{Event, EventStatus};
use crate::merge::{Merger, NoOpMerger};
use crate::metrics::{time_track_request, TrackMetrics};
use crate::payload::{options, TrackerPayload};
use crate::profile::Profile;
use crate::response::{CollectResult, ProfileEcho, SourceEcho, TrackerDebugging, TrackerResponse};
use crate::runtime::TrackerConfig;
use crate::schema::{validate_events, SchemaValidationCache};
use crate::segment::{NoOpSegmenter, SegmentLoader, SegmentationResult, Segmenter};
use crate::session::Session;
use crate::source::SourceCache;
use crate::store::memory::{
    MemoryConsoleLogStore, MemoryDebugInfoStore, MemoryEventStore, MemoryFlowStore,
    MemoryProfileStore, MemoryRuleStore, MemorySchemaStore, MemorySegmentStore,
    MemorySessionStore, MemorySourceStore,
};
use crate::store::{
    ConsoleLogStore, DebugInfoStore, EventStore, ProfileStore, RuleStore, SchemaStore,
    SessionStore, SourceStore,
};
use crate::workflow::{
    DebugInfo, FlowLoader, NoOpWorkflowEngine, WorkflowContext, WorkflowEngine, WorkflowSummary,
};

/// Upper bound on duplicate candidates considered per merge call.
const PROFILE_MERGE_LIMIT: usize = 2000;

const DISABLED_PROFILES_TASK: &str = "disabled-profiles";
const DEBUG_INFO_TASK: &str = "debug-info";

const STAGE_WORKFLOW: &str = "workflow";
const STAGE_MERGE: &str = "merge";
const STAGE_PROFILE_UPDATE: &str = "profile_update";
const STAGE_BACKGROUND: &str = "background";

/// A background save scheduled during the request, joined before the
/// guaranteed block.
struct NamedTask {
    name: &'static str,
    handle: JoinHandle<Result<()>>,
}

impl NamedTask {
    fn new(name: &'static str, handle: JoinHandle<Result<()>>) -> Self {
        Self { name, handle }
    }
}

/// What the workflow stage produced, with `None` standing for "stage
/// failed, products absent".
struct WorkflowStageOutcome {
    summary: Option<WorkflowSummary>,
    segmentation: Option<SegmentationResult>,
}

/// The tracking pipeline. Construct via [`Tracker::builder`], share behind
/// an [`Arc`] and call [`Tracker::track`] once per inbound request.
pub struct Tracker {
    sources: SourceCache,
    profiles: Arc<dyn ProfileStore>,
    sessions: Arc<dyn SessionStore>,
    events: Arc<dyn EventStore>,
    schemas: Arc<dyn SchemaStore>,
    rules: Arc<dyn RuleStore>,
    flows: Arc<dyn FlowLoader>,
    debug_info: Arc<dyn DebugInfoStore>,
    console_log: Arc<dyn ConsoleLogStore>,
    engine: Arc<dyn WorkflowEngine>,
    segmenter: Arc<dyn Segmenter>,
    segment_loader: Arc<dyn SegmentLoader>,
    merger: Arc<dyn Merger>,
    schema_cache: SchemaValidationCache,
    config: TrackerConfig,
    metrics: TrackMetrics,
}

impl Tracker {
    /// Starts building a tracker with memory-backed collaborators.
    #[must_use]
    pub fn builder(config: TrackerConfig) -> TrackerBuilder {
        TrackerBuilder::new(config)
    }

    /// Processes one tracking request.
    ///
    /// `client_ip` is the transport-level peer address; when present it
    /// overrides any address the client put in the payload metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] for unknown/disabled sources or a
    /// missing session id, [`Error::SchemaValidation`] when an event fails
    /// its type schema, and [`Error::FieldTypeConflict`] when a durable
    /// save rejects data.
    #[tracing::instrument(
        name = "track",
        skip(self, payload),
        fields(
            source_id = %payload.source.id,
            session_id = tracing::field::Empty,
            event_count = payload.events.len(),
        )
    )]
    pub async fn track(
        &self,
        payload: TrackerPayload,
        client_ip: Option<IpAddr>,
    ) -> Result<TrackerResponse> {
        let _timer = time_track_request();
        let result = self.track_inner(payload, client_ip).await;
        match &result {
            Ok(_) => self.metrics.record_request("accepted"),
            Err(err) => self.metrics.record_request(outcome_label(err)),
        }
        result
    }

    async fn track_inner(
        &self,
        mut payload: TrackerPayload,
        client_ip: Option<IpAddr>,
    ) -> Result<TrackerResponse> {
        // Transport address wins over client-supplied metadata.
        if let Some(ip) = client_ip {
            payload.metadata.ip = Some(ip);
        }

        let source = self.sources.validate(&payload.source.id).await?;

        let Some(session_id) = payload.session_id().cloned() else {
            return Err(Error::unauthorized("session id must be set"));
        };
        tracing::Span::current().record("session_id", tracing::field::display(&session_id));

        let loaded = self.sessions.load_session(&session_id).await?;
        let (mut profile, mut session) = payload
            .resolve_profile_and_session(session_id, loaded, self.profiles.as_ref())
            .await?;

        let mut events = payload.build_events(&session, &profile);
        self.metrics.record_events(events.len());

        validate_events(
            &mut events,
            &profile,
            &session,
            &self.schema_cache,
            self.schemas.as_ref(),
        )
        .await?;

        let mut console = ConsoleLog::new();
        let mut background: Vec<NamedTask> = Vec::new();

        let WorkflowStageOutcome {
            summary,
            segmentation,
        } = self
            .run_workflow_stage(
                &mut session,
                &mut profile,
                &mut events,
                &mut console,
                &payload.source.id,
            )
            .await;

        self.run_merge_stage(&profile, &mut console, &mut background)
            .await;
        self.run_profile_update_stage(&profile, &mut console).await;

        let debug_info = summary.as_ref().map(|summary| summary.debug_info.clone());
        self.spawn_debug_info_save(debug_info.clone(), &mut background);
        self.join_background_tasks(background, &profile, &mut console)
            .await;

        // Guaranteed block: reconcile first, then persist. Everything
        // above may have degraded; these two always run.
        let post_invoke = summary.and_then(|summary| summary.post_invoke_events);
        reconcile_events(&mut events, post_invoke.as_ref());
        let collect = self
            .persist(&console, &session, &mut events, &payload, &profile)
            .await?;

        self.spawn_console_save(&console);

        let debugging = (!self.config.debug_disabled && !payload.is_disabled(options::DEBUGGER))
            .then(|| TrackerDebugging {
                collect: collect.clone(),
                execution: debug_info,
                segmentation,
                logs: console.entries().to_vec(),
            });
        let profile_echo = if payload.return_profile() {
            ProfileEcho::full(&profile)
        } else {
            ProfileEcho::reference(&profile)
        };

        Ok(TrackerResponse {
            profile: profile_echo,
            source: SourceEcho::from_source(&source),
            debugging,
        })
    }

    /// Workflow engine and segmentation, one best-effort failure domain.
    /// On failure the request keeps whatever state the engine mutated
    /// before the error; traces and segmentation are absent downstream.
    async fn run_workflow_stage(
        &self,
        session: &mut Session,
        profile: &mut Profile,
        events: &mut [Event],
        console: &mut ConsoleLog,
        source_id: &SourceId,
    ) -> WorkflowStageOutcome {
        match self
            .invoke_workflow(session, profile, events, console, source_id)
            .await
        {
            Ok((summary, segmentation)) => WorkflowStageOutcome {
                summary: Some(summary),
                segmentation: Some(segmentation),
            },
            Err(err) => {
                tracing::error!(error = %err, "workflow stage failed");
                self.metrics.record_stage_failure(STAGE_WORKFLOW);
                console.append(
                    ConsoleEntry::new(
                        "profile",
                        "RulesEngine",
                        module_path!(),
                        Severity::Error,
                        format!("workflow execution failed: {err}"),
                    )
                    .with_profile(profile.id.clone()),
                );
                WorkflowStageOutcome {
                    summary: None,
                    segmentation: None,
                }
            }
        }
    }

    async fn invoke_workflow(
        &self,
        session: &mut Session,
        profile: &mut Profile,
        events: &mut [Event],
        console: &mut ConsoleLog,
        source_id: &SourceId,
    ) -> Result<(WorkflowSummary, SegmentationResult)> {
        let rules = self.rules.load_rules(events).await?;
        let summary = self
            .engine
            .invoke(
                WorkflowContext {
                    session: &mut *session,
                    profile: &mut *profile,
                    events: &mut *events,
                    console: &mut *console,
                },
                &rules,
                self.flows.as_ref(),
                source_id,
            )
            .await?;
        let segmentation = self
            .segmenter
            .segment(
                profile,
                &summary.ran_event_types,
                self.segment_loader.as_ref(),
            )
            .await?;
        Ok((summary, segmentation))
    }

    /// Merge lookup is best-effort; a non-empty duplicate list schedules a
    /// background bulk save joined later.
    async fn run_merge_stage(
        &self,
        profile: &Profile,
        console: &mut ConsoleLog,
        background: &mut Vec<NamedTask>,
    ) {
        match self.merger.merge(profile, PROFILE_MERGE_LIMIT).await {
            Ok(Some(duplicates)) if !duplicates.is_empty() => {
                tracing::debug!(
                    count = duplicates.len(),
                    "scheduling disabled profile save"
                );
                let store = Arc::clone(&self.profiles);
                let handle =
                    tokio::spawn(async move { store.save_profiles(&duplicates).await.map(|_| ()) });
                background.push(NamedTask::new(DISABLED_PROFILES_TASK, handle));
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "profile merge failed");
                self.metrics.record_stage_failure(STAGE_MERGE);
                console.append(
                    ConsoleEntry::new(
                        "profile",
                        "merge",
                        module_path!(),
                        Severity::Error,
                        format!("profile merge failed: {err}"),
                    )
                    .with_profile(profile.id.clone()),
                );
            }
        }
    }

    /// Eagerly saves a profile the workflow flagged as updated. Failure is
    /// a staleness risk, not a request abort.
    async fn run_profile_update_stage(&self, profile: &Profile, console: &mut ConsoleLog) {
        if !profile.operation.needs_update() {
            return;
        }
        if let Err(err) = self.profiles.save_profile(profile).await {
            tracing::error!(error = %err, "eager profile update failed");
            self.metrics.record_stage_failure(STAGE_PROFILE_UPDATE);
            console.append(
                ConsoleEntry::new(
                    "profile",
                    "tracker",
                    module_path!(),
                    Severity::Error,
                    format!("eager profile update failed: {err}"),
                )
                .with_profile(profile.id.clone()),
            );
        }
    }

    /// The trace save runs even for absent traces; the store decides how
    /// to handle emptiness.
    fn spawn_debug_info_save(
        &self,
        debug_info: Option<DebugInfo>,
        background: &mut Vec<NamedTask>,
    ) {
        let store = Arc::clone(&self.debug_info);
        let handle = tokio::spawn(async move { store.save_debug_info(debug_info.as_ref()).await });
        background.push(NamedTask::new(DEBUG_INFO_TASK, handle));
    }

    /// Joins every scheduled background task. All failures are logged;
    /// the console receives a single entry for the first one.
    async fn join_background_tasks(
        &self,
        tasks: Vec<NamedTask>,
        profile: &Profile,
        console: &mut ConsoleLog,
    ) {
        if tasks.is_empty() {
            return;
        }
        let (names, handles): (Vec<_>, Vec<_>) = tasks
            .into_iter()
            .map(|task| (task.name, task.handle))
            .unzip();
        let mut first_failure: Option<String> = None;
        for (name, outcome) in names.into_iter().zip(join_all(handles).await) {
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(format!("background task `{name}` failed: {err}")),
                Err(err) => Some(format!("background task `{name}` panicked: {err}")),
            };
            if let Some(message) = failure {
                tracing::error!(task = name, error = %message, "background task failed");
                self.metrics.record_stage_failure(STAGE_BACKGROUND);
                if first_failure.is_none() {
                    first_failure = Some(message);
                }
            }
        }
        if let Some(message) = first_failure {
            console.append(
                ConsoleEntry::new(
                    "profile",
                    "tracker",
                    module_path!(),
                    Severity::Error,
                    message,
                )
                .with_profile(profile.id.clone()),
            );
        }
    }

    /// Three ordered durable saves, each independently fatal. Status
    /// overrides from the console journal are applied before the event
    /// save, whether or not the save then persists.
    async fn persist(
        &self,
        console: &ConsoleLog,
        session: &Session,
        events: &mut [Event],
        payload: &TrackerPayload,
        profile: &Profile,
    ) -> Result<CollectResult> {
        let profile_result = if profile.operation.new {
            self.profiles
                .save_profile(profile)
                .await
                .map_err(|err| conflict("profile", err))?
        } else {
            BulkInsertResult::default()
        };

        let persist_session = !payload.is_disabled(options::SAVE_SESSION);
        let session_result = self
            .sessions
            .save_session(session, profile, persist_session)
            .await
            .map_err(|err| conflict("session", err))?;

        let journal = console.indexed_event_journal();
        for event in events.iter_mut() {
            if let Some(worst) = journal.get(&event.id) {
                event.set_status(match worst {
                    Severity::Error => EventStatus::Error,
                    Severity::Warning => EventStatus::Warning,
                    Severity::Info => EventStatus::Ok,
                });
            }
        }
        let persist_events = !payload.is_disabled(options::SAVE_EVENTS);
        let events_result = self
            .events
            .save_events(events, persist_events)
            .await
            .map_err(|err| conflict("events", err))?;

        Ok(CollectResult {
            profile: profile_result,
            session: session_result,
            events: events_result,
        })
    }

    /// Console entries outlive the response; their save is detached and
    /// never awaited.
    fn spawn_console_save(&self, console: &ConsoleLog) {
        if console.is_empty() {
            return;
        }
        let store = Arc::clone(&self.console_log);
        let entries = console.entries().to_vec();
        drop(tokio::spawn(async move {
            if let Err(err) = store.save_entries(&entries).await {
                tracing::error!(error = %err, "console log save failed");
            }
        }));
    }
}

/// Replaces events with their post-invoke counterparts. An event is
/// replaced only when it is flagged for update and a counterpart exists
/// under its id; order and count never change.
fn reconcile_events(events: &mut [Event], post_invoke: Option<&HashMap<EventId, Event>>) {
    let Some(post_invoke) = post_invoke else {
        return;
    };
    for event in events.iter_mut() {
        if !event.update {
            continue;
        }
        if let Some(replacement) = post_invoke.get(&event.id) {
            *event = replacement.clone();
        }
    }
}

fn conflict(what: &str, err: Error) -> Error {
    match err {
        Error::Storage {
            message, details, ..
        } => Error::field_type_conflict(format!("could not save {what}: {message}"), details),
        other => Error::field_type_conflict(format!("could not save {what}: {other}"), Vec::new()),
    }
}

fn outcome_label(error: &Error) -> &'static str {
    match error {
        Error::Unauthorized { .. } => "unauthorized",
        Error::SchemaValidation { .. } => "invalid",
        Error::FieldTypeConflict { .. } => "conflict",
        Error::Storage { .. } | Error::Core(_) => "storage",
        Error::Configuration { .. } => "configuration",
    }
}

/// Builder for [`Tracker`]. Starts with memory-backed collaborators and
/// no-op engine, segmenter and merger; override the seams you need.
pub struct TrackerBuilder {
    config: TrackerConfig,
    sources: Arc<dyn SourceStore>,
    profiles: Arc<dyn ProfileStore>,
    sessions: Arc<dyn SessionStore>,
    events: Arc<dyn EventStore>,
    schemas: Arc<dyn SchemaStore>,
    rules: Arc<dyn RuleStore>,
    flows: Arc<dyn FlowLoader>,
    debug_info: Arc<dyn DebugInfoStore>,
    console_log: Arc<dyn ConsoleLogStore>,
    engine: Arc<dyn WorkflowEngine>,
    segmenter: Arc<dyn Segmenter>,
    segment_loader: Arc<dyn SegmentLoader>,
    merger: Arc<dyn Merger>,
}

impl TrackerBuilder {
    fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            sources: Arc::new(MemorySourceStore::new()),
            profiles: Arc::new(MemoryProfileStore::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            events: Arc::new(MemoryEventStore::new()),
            schemas: Arc::new(MemorySchemaStore::new()),
            rules: Arc::new(MemoryRuleStore::new()),
            flows: Arc::new(MemoryFlowStore::new()),
            debug_info: Arc::new(MemoryDebugInfoStore::new()),
            console_log: Arc::new(MemoryConsoleLogStore::new()),
            engine: Arc::new(NoOpWorkflowEngine),
            segmenter: Arc::new(NoOpSegmenter),
            segment_loader: Arc::new(MemorySegmentStore::new()),
            merger: Arc::new(NoOpMerger),
        }
    }

    /// Sets the source registry.
    #[must_use]
    pub fn sources(mut self, sources: Arc<dyn SourceStore>) -> Self {
        self.sources = sources;
        self
    }

    /// Sets the profile store.
    #[must_use]
    pub fn profiles(mut self, profiles: Arc<dyn ProfileStore>) -> Self {
        self.profiles = profiles;
        self
    }

    /// Sets the session store.
    #[must_use]
    pub fn sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Sets the event store.
    #[must_use]
    pub fn events(mut self, events: Arc<dyn EventStore>) -> Self {
        self.events = events;
        self
    }

    /// Sets the schema registry.
    #[must_use]
    pub fn schemas(mut self, schemas: Arc<dyn SchemaStore>) -> Self {
        self.schemas = schemas;
        self
    }

    /// Sets the rule registry.
    #[must_use]
    pub fn rules(mut self, rules: Arc<dyn RuleStore>) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the flow loader.
    #[must_use]
    pub fn flows(mut self, flows: Arc<dyn FlowLoader>) -> Self {
        self.flows = flows;
        self
    }

    /// Sets the trace store.
    #[must_use]
    pub fn debug_info(mut self, debug_info: Arc<dyn DebugInfoStore>) -> Self {
        self.debug_info = debug_info;
        self
    }

    /// Sets the console log store.
    #[must_use]
    pub fn console_log(mut self, console_log: Arc<dyn ConsoleLogStore>) -> Self {
        self.console_log = console_log;
        self
    }

    /// Sets the workflow engine.
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn WorkflowEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Sets the segmenter.
    #[must_use]
    pub fn segmenter(mut self, segmenter: Arc<dyn Segmenter>) -> Self {
        self.segmenter = segmenter;
        self
    }

    /// Sets the segment loader.
    #[must_use]
    pub fn segment_loader(mut self, segment_loader: Arc<dyn SegmentLoader>) -> Self {
        self.segment_loader = segment_loader;
        self
    }

    /// Sets the merger.
    #[must_use]
    pub fn merger(mut self, merger: Arc<dyn Merger>) -> Self {
        self.merger = merger;
        self
    }

    /// Builds the tracker, wiring the caches from the configured TTLs.
    #[must_use]
    pub fn build(self) -> Tracker {
        let schema_cache = SchemaValidationCache::new(self.config.validator_cache_ttl());
        let sources = SourceCache::new(self.sources, self.config.source_cache_ttl());
        Tracker {
            sources,
            profiles: self.profiles,
            sessions: self.sessions,
            events: self.events,
            schemas: self.schemas,
            rules: self.rules,
            flows: self.flows,
            debug_info: self.debug_info,
            console_log: self.console_log,
            engine: self.engine,
            segmenter: self.segmenter,
            segment_loader: self.segment_loader,
            merger: self.merger,
            schema_cache,
            config: self.config,
            metrics: TrackMetrics::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrio_core::id::SessionId;
    use serde_json::json;

    fn event_pair() -> (Event, Event) {
        let session_id = SessionId::generate();
        let source_id = SourceId::generate();
        let original = Event::new("purchase", session_id.clone(), source_id.clone())
            .with_properties(json!({"price": 1}));
        let mut mutated = original.clone();
        mutated.properties = json!({"price": 99});
        (original, mutated)
    }

    #[test]
    fn reconcile_replaces_flagged_event_with_counterpart() {
        let (mut original, mutated) = event_pair();
        original.update = true;
        let mut post_invoke = HashMap::new();
        post_invoke.insert(original.id.clone(), mutated);

        let mut events = vec![original];
        reconcile_events(&mut events, Some(&post_invoke));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].properties, json!({"price": 99}));
    }

    #[test]
    fn reconcile_keeps_unflagged_event() {
        let (original, mutated) = event_pair();
        let mut post_invoke = HashMap::new();
        post_invoke.insert(original.id.clone(), mutated);

        let mut events = vec![original];
        reconcile_events(&mut events, Some(&post_invoke));

        assert_eq!(events[0].properties, json!({"price": 1}));
    }

    #[test]
    fn reconcile_keeps_flagged_event_without_counterpart() {
        let (mut original, _) = event_pair();
        original.update = true;

        let mut events = vec![original];
        reconcile_events(&mut events, Some(&HashMap::new()));

        assert_eq!(events[0].properties, json!({"price": 1}));
        reconcile_events(&mut events, None);
        assert_eq!(events[0].properties, json!({"price": 1}));
    }

    #[test]
    fn conflict_carries_storage_details() {
        let err = conflict(
            "events",
            Error::storage_with_details(
                "index rejected rows",
                vec!["price must be numeric".into()],
            ),
        );
        match err {
            Error::FieldTypeConflict { message, rows } => {
                assert!(message.contains("events"));
                assert_eq!(rows, vec!["price must be numeric".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn outcome_labels_cover_fatal_kinds() {
        assert_eq!(outcome_label(&Error::unauthorized("no")), "unauthorized");
        assert_eq!(
            outcome_label(&Error::schema_validation("purchase", "bad")),
            "invalid"
        );
        assert_eq!(
            outcome_label(&Error::field_type_conflict("save failed", Vec::new())),
            "conflict"
        );
        assert_eq!(outcome_label(&Error::storage("down")), "storage");
    }
}
