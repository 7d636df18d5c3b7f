//! Planner: consume the analysis result, the target snapshot, and the
//! optional naming map, and emit a creation plan, per spec §4.7.

use crate::transform::resolve_name;
use crate::types::{CreationPlan, DependencyEdge, Entity, EntityKind, PlanAction, PlanStep, WorkspaceSnapshot};
use std::collections::HashMap;

/// Planner inputs that aren't carried on the `Entity` itself.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Whether an exact-name match in the target means SKIP rather than CREATE.
    pub skip_existing: bool,
    /// Per-source-id name overrides (from the Naming Parser or an explicit
    /// override), taking precedence per spec §4.3.
    pub name_overrides: HashMap<String, String>,
    pub name_prefix: String,
    pub name_suffix: String,
}

/// Non-fatal notes collected while planning (every SKIP, every missing
/// dependency note).
#[derive(Debug, Clone, Default)]
pub struct PlanWarnings {
    pub messages: Vec<String>,
}

/// Build the creation plan for a topologically-ordered entity list.
///
/// `edges` is the final dependency edge set from [`crate::graph::analyze`]
/// (after cycle-breaking), used to populate each step's `dependencies`.
pub fn build_plan(
    ordered_source: &[Entity],
    edges: &[DependencyEdge],
    target: &WorkspaceSnapshot,
    options: &PlanOptions,
) -> (CreationPlan, PlanWarnings) {
    let mut plan = Vec::with_capacity(ordered_source.len());
    let mut warnings = PlanWarnings::default();

    let mut dependencies_by_id: HashMap<&str, Vec<String>> = HashMap::new();
    for edge in edges {
        let deps = dependencies_by_id.entry(edge.from.as_str()).or_default();
        if !deps.contains(&edge.to) {
            deps.push(edge.to.clone());
        }
    }

    for (ordinal, entity) in ordered_source.iter().enumerate() {
        let source_name = entity.name().to_string();
        let new_name = resolve_name(
            &source_name,
            options.name_overrides.get(entity.id()).map(String::as_str),
            &options.name_prefix,
            &options.name_suffix,
        );

        let existing_match = if options.skip_existing {
            find_by_name_and_kind(target, entity.kind(), &new_name)
        } else {
            None
        };

        let (action, target_id) = match existing_match {
            Some(id) => (PlanAction::Skip, Some(id)),
            None => (PlanAction::Create, None),
        };

        if action == PlanAction::Skip {
            warnings.messages.push(format!(
                "{} '{}' matched an existing target entity by name, skipping creation",
                entity.kind(),
                new_name
            ));
        }
        if action == PlanAction::Skip && target_id.is_none() {
            warnings.messages.push(format!(
                "{} '{}' skipped with no matched target id",
                entity.kind(),
                new_name
            ));
        }

        let dependencies = dependencies_by_id.get(entity.id()).cloned().unwrap_or_default();

        plan.push(PlanStep {
            ordinal,
            action,
            kind: entity.kind(),
            source_id: entity.id().to_string(),
            source_name,
            new_name,
            dependencies,
            payload: entity.clone(),
            target_id,
        });
    }

    (plan, warnings)
}

fn find_by_name_and_kind(target: &WorkspaceSnapshot, kind: EntityKind, name: &str) -> Option<String> {
    match kind {
        EntityKind::Tag => target.find_tag_by_name(name).map(|t| t.tag_id.clone()),
        EntityKind::Trigger => target.find_trigger_by_name(name).map(|t| t.trigger_id.clone()),
        EntityKind::Variable => target.find_variable_by_name(name).map(|v| v.variable_id.clone()),
        EntityKind::Template => target.find_template_by_name(name).map(|t| t.template_id.clone()),
    }
}
