//! Validation Checker: pre-creation conflict checks, post-creation
//! completeness/reference-integrity reports, and a standalone integrity
//! walk over a target snapshot, per spec §4.6.

use crate::mapper::IdMapper;
use crate::types::{EntityKind, WorkspaceSnapshot};
use chrono::Utc;

/// A name collision detected before creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub kind: EntityKind,
    pub name: String,
    pub reason: String,
}

/// Result of the pre-creation conflict check.
#[derive(Debug, Clone)]
pub struct PreValidateResult {
    pub can_create: bool,
    pub conflicts: Vec<Conflict>,
}

/// Check intended `(kind, name)` pairs against a target snapshot for
/// same-kind name collisions.
pub fn pre_validate(intended: &[(EntityKind, String)], target: &WorkspaceSnapshot) -> PreValidateResult {
    let mut conflicts = Vec::new();
    for (kind, name) in intended {
        let collides = match kind {
            EntityKind::Tag => target.find_tag_by_name(name).is_some(),
            EntityKind::Trigger => target.find_trigger_by_name(name).is_some(),
            EntityKind::Variable => target.find_variable_by_name(name).is_some(),
            EntityKind::Template => target.find_template_by_name(name).is_some(),
        };
        if collides {
            conflicts.push(Conflict {
                kind: *kind,
                name: name.clone(),
                reason: format!("a {kind} named '{name}' already exists in the target"),
            });
        }
    }
    PreValidateResult {
        can_create: conflicts.is_empty(),
        conflicts,
    }
}

/// A source entity whose mapped target id never showed up in a fresh
/// target snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingEntity {
    pub kind: EntityKind,
    pub source_id: String,
    pub target_id: String,
    pub name: String,
}

/// A target entity referring to an id absent from the target.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokenReference {
    pub kind: EntityKind,
    pub name: String,
    pub referenced_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct PostValidateSummary {
    pub expected_count: usize,
    pub actual_count: usize,
    pub missing_count: usize,
    pub broken_ref_count: usize,
}

#[derive(Debug, Clone)]
pub struct PostValidateReport {
    pub success: bool,
    pub summary: PostValidateSummary,
    pub missing: Vec<MissingEntity>,
    pub broken_references: Vec<BrokenReference>,
    pub warnings: Vec<String>,
    pub timestamp: i64,
}

/// Produce the post-creation completeness and reference-integrity report.
pub fn post_validate(
    source: &WorkspaceSnapshot,
    target: &WorkspaceSnapshot,
    mapper: &IdMapper,
) -> PostValidateReport {
    let target_ids: std::collections::HashSet<String> =
        target.entities().map(|e| e.id().to_string()).collect();

    let mut missing = Vec::new();
    let expected_count = source.len();

    for entity in source.entities() {
        let Some(binding) = mapper.lookup_id(entity.id()) else {
            continue;
        };
        if !target_ids.contains(binding.target_id.as_str()) {
            missing.push(MissingEntity {
                kind: binding.kind,
                source_id: entity.id().to_string(),
                target_id: binding.target_id,
                name: binding.name,
            });
        }
    }

    let integrity_issues = integrity_check(target);
    let broken_references: Vec<BrokenReference> = integrity_issues
        .iter()
        .map(|issue| BrokenReference {
            kind: issue.kind,
            name: issue.name.clone(),
            referenced_id: issue.details.clone(),
        })
        .collect();

    let summary = PostValidateSummary {
        expected_count,
        actual_count: target.len(),
        missing_count: missing.len(),
        broken_ref_count: broken_references.len(),
    };

    PostValidateReport {
        success: missing.is_empty() && broken_references.is_empty(),
        summary,
        missing,
        broken_references,
        warnings: Vec::new(),
        timestamp: Utc::now().timestamp(),
    }
}

/// Kind of issue found by the standalone integrity walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueType {
    MissingTrigger,
    MissingVariable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityIssue {
    pub kind: EntityKind,
    pub name: String,
    pub issue_type: IssueType,
    pub details: String,
}

/// Walk a target snapshot: every tag's firing triggers must exist, and
/// every `{{name}}` reference in tag/trigger/variable parameters must
/// resolve to an existing target variable.
pub fn integrity_check(target: &WorkspaceSnapshot) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();
    let trigger_ids: std::collections::HashSet<&str> =
        target.triggers.iter().map(|t| t.trigger_id.as_str()).collect();

    for tag in &target.tags {
        for trigger_id in &tag.firing_trigger_id {
            if !trigger_ids.contains(trigger_id.as_str()) {
                issues.push(IntegrityIssue {
                    kind: EntityKind::Tag,
                    name: tag.name.clone(),
                    issue_type: IssueType::MissingTrigger,
                    details: trigger_id.clone(),
                });
            }
        }
        for var_name in referenced_variable_names(&tag.parameter) {
            if target.find_variable_by_name(&var_name).is_none() {
                issues.push(IntegrityIssue {
                    kind: EntityKind::Tag,
                    name: tag.name.clone(),
                    issue_type: IssueType::MissingVariable,
                    details: var_name,
                });
            }
        }
    }

    for trigger in &target.triggers {
        for var_name in referenced_variable_names(&trigger.parameter)
            .into_iter()
            .chain(referenced_variable_names(&trigger.filter))
        {
            if target.find_variable_by_name(&var_name).is_none() {
                issues.push(IntegrityIssue {
                    kind: EntityKind::Trigger,
                    name: trigger.name.clone(),
                    issue_type: IssueType::MissingVariable,
                    details: var_name,
                });
            }
        }
    }

    for variable in &target.variables {
        for var_name in referenced_variable_names(&variable.parameter) {
            if var_name != variable.name && target.find_variable_by_name(&var_name).is_none() {
                issues.push(IntegrityIssue {
                    kind: EntityKind::Variable,
                    name: variable.name.clone(),
                    issue_type: IssueType::MissingVariable,
                    details: var_name,
                });
            }
        }
    }

    issues
}

fn referenced_variable_names(nodes: &[crate::types::ParamNode]) -> Vec<String> {
    use regex_lite::Regex;
    use std::sync::LazyLock;
    static VARIABLE_REF: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("static regex is valid"));

    let mut names = Vec::new();
    for node in nodes {
        node.walk_values(&mut |value| {
            for caps in VARIABLE_REF.captures_iter(value) {
                if let Some(m) = caps.get(1) {
                    names.push(m.as_str().to_string());
                }
            }
        });
    }
    names
}

/// Render a [`PostValidateReport`] as the stable multi-line human-readable
/// format from spec §6: a PASSED/FAILED banner, per-section counts, and
/// bulleted missing/broken/warnings.
pub fn format_validation_report(report: &PostValidateReport) -> String {
    let mut out = String::new();
    if report.success {
        out.push_str("=== VALIDATION PASSED ===\n");
    } else {
        out.push_str("=== VALIDATION FAILED ===\n");
    }

    out.push_str(&format!(
        "expected: {}  actual: {}  missing: {}  broken_references: {}\n",
        report.summary.expected_count,
        report.summary.actual_count,
        report.summary.missing_count,
        report.summary.broken_ref_count,
    ));

    if !report.missing.is_empty() {
        out.push_str("\nMissing entities:\n");
        for entry in &report.missing {
            out.push_str(&format!(
                "  - [{}] '{}' (source {} -> target {})\n",
                entry.kind, entry.name, entry.source_id, entry.target_id
            ));
        }
    }

    if !report.broken_references.is_empty() {
        out.push_str("\nBroken references:\n");
        for entry in &report.broken_references {
            out.push_str(&format!(
                "  - [{}] '{}' references missing '{}'\n",
                entry.kind, entry.name, entry.referenced_id
            ));
        }
    }

    if !report.warnings.is_empty() {
        out.push_str("\nWarnings:\n");
        for warning in &report.warnings {
            out.push_str(&format!("  - {warning}\n"));
        }
    }

    out
}
