//! Orchestrator: drives the replication workflow's phases in fixed order,
//! per spec §4.9.
//!
//! Mirrors the teacher's snapshot-pattern state transitions in
//! `db::state_transitions` — each phase change is recorded as an event
//! rather than derived after the fact, and only the current phase (not the
//! history) is load-bearing for control flow.

use crate::backend::adapter::{BackendAdapter, ListOptions};
use crate::builder::{BuildResult, Builder, RollbackResult};
use crate::config::ReplicationConfig;
use crate::error::ReplicationError;
use crate::graph;
use crate::logging::Logger;
use crate::mapper::IdMapper;
use crate::naming;
use crate::planner::{self, PlanOptions};
use crate::session::SessionHandle;
use crate::types::{
    CreatedEntity, CreationPlan, IdMapping, Phase, ProgressView, ReplicationEvent, SessionId, WorkflowSummary,
    WorkspaceSnapshot,
};
use crate::validate::{self, PostValidateReport};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Progress percentage at the *start* of `phase`: the cumulative weight of
/// every phase that precedes it in the fixed order (spec §4.9).
fn cumulative_percentage(phase: Phase) -> f64 {
    const ORDER: [Phase; 6] = [
        Phase::Analyzing,
        Phase::Naming,
        Phase::Planning,
        Phase::Building,
        Phase::Validating,
        Phase::Completed,
    ];
    if matches!(phase, Phase::Completed | Phase::Error) {
        return 100.0;
    }
    let mut total = 0.0;
    for p in ORDER {
        if p == phase {
            break;
        }
        total += p.weight();
    }
    total * 100.0
}

/// Naming-pattern-driven name generation inputs, used only when the caller
/// opts into the Naming phase instead of a flat prefix/suffix/override.
#[derive(Debug, Clone, Default)]
pub struct NamingOptions {
    /// Existing names to infer a pattern from (e.g. the target workspace's
    /// tags of the same kind being replicated).
    pub sample_names: Vec<String>,
    /// Per-source-entity-id variable values to substitute into the pattern.
    pub params_by_source_id: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplicationOptions {
    pub skip_existing: bool,
    pub name_prefix: String,
    pub name_suffix: String,
    pub name_overrides: HashMap<String, String>,
    pub naming: Option<NamingOptions>,
    pub validate_after_build: bool,
}

/// Progress/event sink the Orchestrator sends into. Per spec §5, emitting
/// must not block the pipeline; an unbounded channel lets the Orchestrator
/// send-and-forget while a consumer drains at its own pace.
pub type ProgressSink = mpsc::UnboundedSender<ReplicationEvent>;

#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub success: bool,
    pub session_id: SessionId,
    pub duration_ms: i64,
    pub summary: WorkflowSummary,
    pub created_entities: Vec<CreatedEntity>,
    pub id_mapping: Vec<IdMapping>,
    pub validation_report: Option<PostValidateReport>,
    pub rollback_result: Option<RollbackResult>,
    pub errors: Vec<ReplicationError>,
    pub warnings: Vec<String>,
}

/// Drives one end-to-end replication session: pre-loads the target
/// snapshot, then runs Analyze -> [Name] -> Plan -> Build -> [Validate].
pub struct Orchestrator {
    source_backend: Arc<dyn BackendAdapter>,
    target_backend: Arc<dyn BackendAdapter>,
    config: ReplicationConfig,
    events: Option<ProgressSink>,
    logger: Logger,
}

impl Orchestrator {
    pub fn new(
        source_backend: Arc<dyn BackendAdapter>,
        target_backend: Arc<dyn BackendAdapter>,
        config: ReplicationConfig,
    ) -> Self {
        Self {
            source_backend,
            target_backend,
            config,
            events: None,
            logger: Logger::new(),
        }
    }

    pub fn with_events(mut self, sink: ProgressSink) -> Self {
        self.events = Some(sink);
        self
    }

    fn emit(&self, event: ReplicationEvent) {
        if let Some(sink) = &self.events {
            let _ = sink.send(event);
        }
    }

    fn report_phase(&self, session: &SessionHandle, phase: Phase, description: &str, current_step: usize, total_steps: usize) {
        let percentage = cumulative_percentage(phase);
        let progress = ProgressView {
            phase,
            current_step,
            total_steps,
            description: description.to_string(),
            percentage,
        };
        session.update_progress(progress.clone());
        self.emit(ReplicationEvent::PhaseChanged {
            session_id: session.session_id.clone(),
            timestamp: now_ms(),
            phase,
        });
        self.emit(ReplicationEvent::ProgressUpdated {
            session_id: session.session_id.clone(),
            timestamp: now_ms(),
            progress,
        });
    }

    /// Run the full workflow for `session_id` against the source backend's
    /// current snapshot.
    pub async fn run(&self, session_id: SessionId, options: ReplicationOptions) -> WorkflowResult {
        let started_at = now_ms();
        let session = crate::session::register(session_id.clone());
        let logger = self.logger.clone().with_session(session_id.clone());

        self.emit(ReplicationEvent::WorkflowStarted {
            session_id: session_id.clone(),
            timestamp: started_at,
        });

        let result = self.run_inner(&session, &session_id, &options, &logger).await;

        match &result {
            Ok(workflow_result) => {
                self.emit(ReplicationEvent::WorkflowCompleted {
                    session_id: session_id.clone(),
                    timestamp: now_ms(),
                });
                crate::session::unregister(&session_id);
                workflow_result.clone()
            }
            Err(err) => {
                self.report_phase(&session, Phase::Error, &err.message, 0, 0);
                self.emit(ReplicationEvent::WorkflowFailed {
                    session_id: session_id.clone(),
                    timestamp: now_ms(),
                    message: err.message.clone(),
                });
                let failed = WorkflowResult {
                    success: false,
                    session_id: session_id.clone(),
                    duration_ms: now_ms() - started_at,
                    summary: WorkflowSummary::default(),
                    created_entities: Vec::new(),
                    id_mapping: Vec::new(),
                    validation_report: None,
                    rollback_result: None,
                    errors: vec![err.clone()],
                    warnings: Vec::new(),
                };
                crate::session::unregister(&session_id);
                failed
            }
        }
    }

    async fn run_inner(
        &self,
        session: &SessionHandle,
        session_id: &SessionId,
        options: &ReplicationOptions,
        logger: &Logger,
    ) -> Result<WorkflowResult, ReplicationError> {
        let started_at = now_ms();

        let target_snapshot = self.load_snapshot(self.target_backend.as_ref()).await?;
        let source_snapshot = self.load_snapshot(self.source_backend.as_ref()).await?;

        if session.is_cancelled() {
            return Err(ReplicationError::workflow_aborted("orchestrator", "cancelled before analysis"));
        }
        self.report_phase(session, Phase::Analyzing, "analyzing dependency graph", 0, 0);
        let analysis = graph::analyze(&source_snapshot)?;
        for warning in &analysis.warnings {
            logger.warn(warning);
        }

        let mut name_overrides = options.name_overrides.clone();
        if session.is_cancelled() {
            return Err(ReplicationError::workflow_aborted("orchestrator", "cancelled before naming"));
        }
        if let Some(naming_options) = &options.naming {
            self.report_phase(session, Phase::Naming, "inferring naming pattern", 0, 0);
            let pattern = naming::extract_pattern(&naming_options.sample_names);
            for entity in &analysis.order {
                if name_overrides.contains_key(entity.id()) {
                    continue;
                }
                if let Some(params) = naming_options.params_by_source_id.get(entity.id()) {
                    name_overrides.insert(entity.id().to_string(), naming::generate_name(&pattern, params));
                }
            }
        }

        if session.is_cancelled() {
            return Err(ReplicationError::workflow_aborted("orchestrator", "cancelled before planning"));
        }
        self.report_phase(session, Phase::Planning, "building creation plan", 0, 0);
        let plan_options = PlanOptions {
            skip_existing: options.skip_existing,
            name_overrides,
            name_prefix: options.name_prefix.clone(),
            name_suffix: options.name_suffix.clone(),
        };
        let (plan, plan_warnings) = planner::build_plan(&analysis.order, &analysis.edges, &target_snapshot, &plan_options);
        for warning in &plan_warnings.messages {
            logger.warn(warning);
        }
        let expected_count = plan.len();

        if session.is_cancelled() {
            return Err(ReplicationError::workflow_aborted("orchestrator", "cancelled before building"));
        }
        self.report_phase(session, Phase::Building, "creating entities", 0, expected_count);
        let mapper = IdMapper::new();
        let builder = Builder::new(self.target_backend.clone(), mapper.clone(), self.config.builder.clone());
        let build_result = builder.execute(&plan, Some(session)).await;
        self.emit_build_events(session_id, &plan, &build_result);

        let mut warnings = plan_warnings.messages;
        warnings.extend(build_result.warnings.clone());

        let rollback_result = build_result.rollback_result.clone();

        let validation_report = if options.validate_after_build {
            if session.is_cancelled() {
                return Err(ReplicationError::workflow_aborted("orchestrator", "cancelled before validation"));
            }
            self.report_phase(session, Phase::Validating, "validating target snapshot", 0, 0);
            let fresh_target = self.load_snapshot(self.target_backend.as_ref()).await?;
            Some(validate::post_validate(&source_snapshot, &fresh_target, &mapper))
        } else {
            None
        };

        self.report_phase(session, Phase::Completed, "replication complete", expected_count, expected_count);

        let id_mapping: Vec<IdMapping> = mapper
            .entries()
            .into_iter()
            .map(|(source_id, entry)| IdMapping {
                source_id,
                target_id: entry.target_id,
                kind: entry.kind,
                final_name: entry.name,
            })
            .collect();

        let summary = WorkflowSummary {
            expected_count,
            created_count: build_result.created_entities.len(),
            skipped_count: plan.iter().filter(|s| s.action == crate::types::PlanAction::Skip).count(),
            failed_count: build_result.errors.iter().filter(|e| !e.recoverable).count(),
        };

        Ok(WorkflowResult {
            success: build_result.success,
            session_id: session_id.clone(),
            duration_ms: now_ms() - started_at,
            summary,
            created_entities: build_result.created_entities,
            id_mapping,
            validation_report,
            rollback_result,
            errors: build_result.errors,
            warnings,
        })
    }

    fn emit_build_events(&self, session_id: &SessionId, plan: &CreationPlan, build_result: &BuildResult) {
        for created in &build_result.created_entities {
            self.emit(ReplicationEvent::EntityCreated {
                session_id: session_id.clone(),
                timestamp: now_ms(),
                kind: created.kind,
                source_id: created.source_id.clone(),
                target_id: created.target_id.clone(),
            });
        }
        for step in plan {
            if step.action == crate::types::PlanAction::Skip {
                self.emit(ReplicationEvent::EntitySkipped {
                    session_id: session_id.clone(),
                    timestamp: now_ms(),
                    kind: step.kind,
                    source_id: step.source_id.clone(),
                    target_id: step.target_id.clone(),
                });
            }
        }
        for failed in &build_result.failed_entities {
            self.emit(ReplicationEvent::EntityFailed {
                session_id: session_id.clone(),
                timestamp: now_ms(),
                kind: failed.kind,
                source_id: failed.source_id.clone(),
                message: failed.error.message.clone(),
            });
        }
    }

    async fn load_snapshot(&self, backend: &dyn BackendAdapter) -> Result<WorkspaceSnapshot, ReplicationError> {
        Ok(WorkspaceSnapshot {
            tags: backend.list_tags(ListOptions::default()).await?,
            triggers: backend.list_triggers(ListOptions::default()).await?,
            variables: backend.list_variables(ListOptions::default()).await?,
            templates: backend.list_templates(ListOptions::default()).await?,
        })
    }
}
