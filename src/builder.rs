//! Builder: execute a creation plan against a [`BackendAdapter`] with rate
//! limiting, retry, and rollback, per spec §4.8.
//!
//! Owns the [`IdMapper`] during its run. Grounded on the teacher's
//! `db/import.rs` dry-run/mode discipline and `db/locks.rs` sequential
//! mutation style, re-expressed here as a rate-limited async loop instead
//! of a SQL transaction.

use crate::backend::adapter::BackendAdapter;
use crate::config::BuilderConfig;
use crate::error::{ErrorKind, ReplicationError};
use crate::logging::Logger;
use crate::mapper::IdMapper;
use crate::session::SessionHandle;
use crate::transform::{find_gallery_ids, transform_entity};
use crate::types::{CreatedEntity, CreationPlan, Entity, EntityKind, PlanAction, PlanStep};
use std::sync::Arc;
use std::time::Duration;

/// One rollback delete attempt's outcome.
#[derive(Debug, Clone)]
pub struct RollbackFailure {
    pub entity_id: String,
    pub kind: EntityKind,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct RollbackResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<RollbackFailure>,
    pub is_partial: bool,
}

/// A CREATE step that did not result in a created entity, associated with
/// the source entity it was attempting to replicate.
#[derive(Debug, Clone)]
pub struct FailedEntity {
    pub source_id: String,
    pub kind: EntityKind,
    pub error: ReplicationError,
}

/// Outcome of executing a full creation plan.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub success: bool,
    pub partial_success: bool,
    pub created_entities: Vec<CreatedEntity>,
    pub failed_entities: Vec<FailedEntity>,
    pub rollback_result: Option<RollbackResult>,
    pub errors: Vec<ReplicationError>,
    pub warnings: Vec<String>,
}

pub struct Builder {
    backend: Arc<dyn BackendAdapter>,
    mapper: IdMapper,
    config: BuilderConfig,
    logger: Logger,
}

impl Builder {
    pub fn new(backend: Arc<dyn BackendAdapter>, mapper: IdMapper, config: BuilderConfig) -> Self {
        Self {
            backend,
            mapper,
            config,
            logger: Logger::new().with_phase("building"),
        }
    }

    pub fn mapper(&self) -> &IdMapper {
        &self.mapper
    }

    /// Execute `plan` in order, honoring the rate limit between successive
    /// CREATE requests and rolling back on a non-recoverable failure.
    pub async fn execute(&self, plan: &CreationPlan, session: Option<&SessionHandle>) -> BuildResult {
        let mut created_entities: Vec<CreatedEntity> = Vec::new();
        let mut failed_entities: Vec<FailedEntity> = Vec::new();
        let mut errors: Vec<ReplicationError> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut issued_first_create = false;
        let mut aborted_for_rollback = false;

        for step in plan {
            if let Some(session) = session {
                if session.is_cancelled() {
                    errors.push(ReplicationError::workflow_aborted("builder", "session cancelled"));
                    aborted_for_rollback = true;
                    break;
                }
            }

            match step.action {
                PlanAction::Skip => {
                    self.handle_skip(step, &mut warnings).await;
                }
                PlanAction::Create => {
                    if issued_first_create {
                        tokio::time::sleep(Duration::from_millis(self.config.inter_request_delay_ms)).await;
                    }

                    match self.create_one(step).await {
                        CreateOutcome::Created(created) => {
                            issued_first_create = true;
                            created_entities.push(created);
                        }
                        CreateOutcome::DuplicateSkipped(err) => {
                            // Recoverable: recorded, but the step is simply not created.
                            issued_first_create = true;
                            failed_entities.push(FailedEntity {
                                source_id: step.source_id.clone(),
                                kind: step.kind,
                                error: err.clone(),
                            });
                            errors.push(err);
                        }
                        CreateOutcome::RateLimitExhausted(err) => {
                            // Fatal, but the build does not roll back on exhausted retries.
                            issued_first_create = true;
                            let err = err.recoverable(false);
                            failed_entities.push(FailedEntity {
                                source_id: step.source_id.clone(),
                                kind: step.kind,
                                error: err.clone(),
                            });
                            errors.push(err);
                            break;
                        }
                        CreateOutcome::Failed(err) => {
                            issued_first_create = true;
                            let err = err.recoverable(false);
                            failed_entities.push(FailedEntity {
                                source_id: step.source_id.clone(),
                                kind: step.kind,
                                error: err.clone(),
                            });
                            errors.push(err);
                            if !created_entities.is_empty() {
                                aborted_for_rollback = true;
                            }
                            break;
                        }
                    }
                }
            }
        }

        let rollback_result = if aborted_for_rollback && !created_entities.is_empty() {
            Some(self.rollback(&mut created_entities).await)
        } else {
            None
        };

        let has_fatal_error = errors.iter().any(|e| !e.recoverable);
        let success = !has_fatal_error;
        // spec: partialSuccess is true iff some creates succeeded and some
        // failed — a recoverable duplicate-name skip still counts as a
        // failed create here, not just a fatal error.
        let partial_success = !created_entities.is_empty() && !errors.is_empty();

        BuildResult {
            success,
            partial_success,
            created_entities,
            failed_entities,
            rollback_result,
            errors,
            warnings,
        }
    }

    async fn handle_skip(&self, step: &PlanStep, warnings: &mut Vec<String>) {
        let Some(target_id) = &step.target_id else {
            warnings.push(format!(
                "{} '{}' skipped with no target id, not bound",
                step.kind, step.new_name
            ));
            return;
        };

        if let Err(err) = self.mapper.bind(&step.source_id, target_id, step.kind, &step.new_name) {
            warnings.push(err.message);
            return;
        }

        if step.kind == EntityKind::Template {
            self.register_template_type_remap(step, target_id).await;
        }
    }

    async fn register_template_type_remap(&self, step: &PlanStep, target_id: &str) {
        let Entity::Template(source_template) = &step.payload else {
            return;
        };
        let Ok(Some(target_template)) = self.backend.get_template(target_id).await else {
            return;
        };
        let source_type = source_template.type_string();
        let target_type = target_template.type_string();
        let _ = self.mapper.bind_template_type(&source_type, &target_type);
        for gallery_id in find_gallery_ids(&source_template.template_data) {
            let _ = self.mapper.bind_template_type(&gallery_id, &target_type);
        }
    }

    async fn create_one(&self, step: &PlanStep) -> CreateOutcome {
        let (payload, transform_warnings) = transform_entity(&step.payload, &step.new_name, &self.mapper);
        for message in transform_warnings.messages {
            tracing::warn!("{}", message);
        }

        if self.duplicate_exists(step.kind, &step.new_name).await {
            return CreateOutcome::DuplicateSkipped(ReplicationError::duplicate_name(
                "builder",
                format!(
                    "{} '{}' conflicts with an existing target entity, skipped",
                    step.kind, step.new_name
                ),
            ));
        }

        let mut attempt = 0u32;
        loop {
            let result = self.create_via_backend(payload.clone()).await;
            match result {
                Ok((target_id, name)) => {
                    if let Err(err) = self.mapper.bind(&step.source_id, &target_id, step.kind, &name) {
                        return CreateOutcome::Failed(err);
                    }
                    if step.kind == EntityKind::Template {
                        self.register_template_type_remap(step, &target_id).await;
                    }
                    self.logger.info(&format!("created {} '{}' -> {}", step.kind, name, target_id));
                    return CreateOutcome::Created(CreatedEntity {
                        source_id: step.source_id.clone(),
                        target_id,
                        kind: step.kind,
                        name,
                    });
                }
                Err(err) if err.kind == ErrorKind::RateLimit => {
                    if attempt >= self.config.max_retries {
                        return CreateOutcome::RateLimitExhausted(err);
                    }
                    let backoff_ms = (self.config.rate_limit_backoff_base_ms * (1u64 << attempt))
                        .min(self.config.rate_limit_backoff_cap_ms);
                    self.logger
                        .warn(&format!("rate limited, retrying in {backoff_ms}ms (attempt {attempt})"));
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(err) if err.kind == ErrorKind::DuplicateName => {
                    return CreateOutcome::DuplicateSkipped(err);
                }
                Err(err) => return CreateOutcome::Failed(err),
            }
        }
    }

    async fn duplicate_exists(&self, kind: EntityKind, name: &str) -> bool {
        let found = match kind {
            EntityKind::Tag => self.backend.find_tag_by_name(name).await.ok().flatten().is_some(),
            EntityKind::Trigger => self.backend.find_trigger_by_name(name).await.ok().flatten().is_some(),
            EntityKind::Variable => self.backend.find_variable_by_name(name).await.ok().flatten().is_some(),
            EntityKind::Template => self.backend.find_template_by_name(name).await.ok().flatten().is_some(),
        };
        found
    }

    async fn create_via_backend(&self, payload: Entity) -> Result<(String, String), ReplicationError> {
        match payload {
            Entity::Tag(tag) => self.backend.create_tag(tag).await.map(|t| (t.tag_id, t.name)),
            Entity::Trigger(trigger) => self
                .backend
                .create_trigger(trigger)
                .await
                .map(|t| (t.trigger_id, t.name)),
            Entity::Variable(variable) => self
                .backend
                .create_variable(variable)
                .await
                .map(|v| (v.variable_id, v.name)),
            Entity::Template(template) => self
                .backend
                .create_template(template)
                .await
                .map(|t| (t.template_id, t.name)),
        }
    }

    /// Delete created entities in reverse order of creation, per spec
    /// §4.8. Removes successfully-rolled-back entries from `created`.
    async fn rollback(&self, created: &mut Vec<CreatedEntity>) -> RollbackResult {
        let mut result = RollbackResult::default();
        while let Some(entity) = created.pop() {
            result.attempted += 1;
            let delete_result = match entity.kind {
                EntityKind::Tag => self.backend.delete_tag(&entity.target_id).await,
                EntityKind::Trigger => self.backend.delete_trigger(&entity.target_id).await,
                EntityKind::Variable => self.backend.delete_variable(&entity.target_id).await,
                EntityKind::Template => self.backend.delete_template(&entity.target_id).await,
            };
            match delete_result {
                Ok(()) => result.succeeded += 1,
                Err(err) => result.failed.push(RollbackFailure {
                    entity_id: entity.target_id.clone(),
                    kind: entity.kind,
                    error: err.message,
                }),
            }
        }
        result.is_partial = !result.failed.is_empty();
        result
    }

    /// Build a single entity outside of a full plan run: used for recovery
    /// or incremental insertion. Performs the same duplicate check and
    /// transformation as a plan CREATE step, but never rolls back peers.
    pub async fn build_single(&self, step: &PlanStep) -> Result<CreatedEntity, ReplicationError> {
        match self.create_one(step).await {
            CreateOutcome::Created(created) => Ok(created),
            CreateOutcome::DuplicateSkipped(err) => Err(err),
            CreateOutcome::RateLimitExhausted(err) | CreateOutcome::Failed(err) => Err(err),
        }
    }
}

enum CreateOutcome {
    Created(CreatedEntity),
    DuplicateSkipped(ReplicationError),
    RateLimitExhausted(ReplicationError),
    Failed(ReplicationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::InMemoryBackend;
    use crate::types::{Entity, PlanAction, Trigger};

    fn trigger_step(ordinal: usize, source_id: &str, name: &str) -> PlanStep {
        PlanStep {
            ordinal,
            action: PlanAction::Create,
            kind: EntityKind::Trigger,
            source_id: source_id.to_string(),
            source_name: name.to_string(),
            new_name: name.to_string(),
            dependencies: vec![],
            payload: Entity::Trigger(Trigger {
                trigger_id: source_id.to_string(),
                name: name.to_string(),
                trigger_type: "customEvent".to_string(),
                parameter: vec![],
                filter: vec![],
                custom_event_filter: None,
                auto_event_filter: None,
                account_id: None,
                container_id: None,
                workspace_id: None,
            }),
            target_id: None,
        }
    }

    #[tokio::test]
    async fn empty_plan_is_a_no_op() {
        let backend = Arc::new(InMemoryBackend::default());
        let builder = Builder::new(backend, IdMapper::new(), BuilderConfig::default());
        let result = builder.execute(&vec![], None).await;
        assert!(result.success);
        assert!(result.created_entities.is_empty());
    }

    #[tokio::test]
    async fn happy_path_creates_in_order() {
        let backend = Arc::new(InMemoryBackend::default());
        let builder = Builder::new(backend, IdMapper::new(), BuilderConfig {
            inter_request_delay_ms: 0,
            ..Default::default()
        });
        let plan = vec![trigger_step(0, "src-t1", "Click")];
        let result = builder.execute(&plan, None).await;
        assert!(result.success);
        assert_eq!(result.created_entities.len(), 1);
        assert!(builder.mapper().lookup_id("src-t1").is_some());
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_aborts_without_rollback() {
        let backend = Arc::new(InMemoryBackend::default());
        backend.fail_next_creates_with_rate_limit(10);
        let builder = Builder::new(
            backend,
            IdMapper::new(),
            BuilderConfig {
                inter_request_delay_ms: 0,
                max_retries: 2,
                rate_limit_backoff_base_ms: 1,
                rate_limit_backoff_cap_ms: 5,
                ..Default::default()
            },
        );
        let plan = vec![trigger_step(0, "src-t1", "Click")];
        let result = builder.execute(&plan, None).await;
        assert!(!result.success);
        assert!(result.created_entities.is_empty());
        assert!(result.rollback_result.is_none());
        assert_eq!(result.errors[0].kind, ErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn duplicate_name_is_recorded_but_does_not_abort_the_run() {
        let backend = Arc::new(InMemoryBackend::default());
        backend.create_trigger(Trigger {
            trigger_id: String::new(),
            name: "Click".to_string(),
            trigger_type: "customEvent".to_string(),
            parameter: vec![],
            filter: vec![],
            custom_event_filter: None,
            auto_event_filter: None,
            account_id: None,
            container_id: None,
            workspace_id: None,
        }).await.unwrap();

        let builder = Builder::new(
            backend,
            IdMapper::new(),
            BuilderConfig {
                inter_request_delay_ms: 0,
                ..Default::default()
            },
        );
        let plan = vec![trigger_step(0, "src-t1", "Click"), trigger_step(1, "src-t2", "Scroll")];
        let result = builder.execute(&plan, None).await;
        assert!(result.success);
        assert!(result.partial_success);
        assert_eq!(result.created_entities.len(), 1);
        assert_eq!(result.created_entities[0].source_id, "src-t2");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].kind, ErrorKind::DuplicateName);
        assert!(result.errors[0].recoverable);
        assert_eq!(result.failed_entities.len(), 1);
        assert_eq!(result.failed_entities[0].source_id, "src-t1");
    }

    #[tokio::test]
    async fn rollback_runs_in_reverse_order_on_creation_failure() {
        let backend = Arc::new(InMemoryBackend::default());
        backend.fail_creates_named("Scroll");
        let builder = Builder::new(
            backend.clone(),
            IdMapper::new(),
            BuilderConfig {
                inter_request_delay_ms: 0,
                ..Default::default()
            },
        );
        let plan = vec![
            trigger_step(0, "src-t1", "Click"),
            trigger_step(1, "src-t2", "Scroll"),
        ];
        let result = builder.execute(&plan, None).await;
        assert!(!result.success);
        assert!(result.created_entities.is_empty());

        let rollback = result.rollback_result.unwrap();
        assert_eq!(rollback.attempted, 1);
        assert_eq!(rollback.succeeded, 1);
        assert!(!rollback.is_partial);

        let remaining_click = backend.find_trigger_by_name("Click").await.unwrap();
        assert!(remaining_click.is_none());
    }

    #[tokio::test]
    async fn rollback_is_partial_when_a_delete_itself_fails() {
        let backend = Arc::new(InMemoryBackend::default());
        backend.fail_creates_named("Scroll");
        let builder = Builder::new(
            backend.clone(),
            IdMapper::new(),
            BuilderConfig {
                inter_request_delay_ms: 0,
                ..Default::default()
            },
        );
        let plan = vec![
            trigger_step(0, "src-t1", "Click"),
            trigger_step(1, "src-t2", "Scroll"),
        ];
        backend.fail_next_deletes_with_error(1);
        let result = builder.execute(&plan, None).await;
        assert!(!result.success);

        let rollback = result.rollback_result.unwrap();
        assert_eq!(rollback.attempted, 1);
        assert_eq!(rollback.succeeded, 0);
        assert_eq!(rollback.failed.len(), 1);
        assert!(rollback.is_partial);

        let remaining_click = backend.find_trigger_by_name("Click").await.unwrap();
        assert!(remaining_click.is_some());
    }
}
