//! Formatted diff between two [`WorkspaceSnapshot`]s, grounded on the
//! teacher's `export/diff.rs` added/removed/modified shape but keyed by
//! [`EntityKind`] instead of a SQL table name.

use crate::types::{Entity, EntityKind, WorkspaceSnapshot};
use std::collections::HashMap;
use std::fmt;

/// Per-kind diff results.
#[derive(Debug, Clone, Default)]
pub struct EntityDiff {
    /// Present in target but not in source.
    pub added: Vec<Entity>,
    /// Present in source but not in target.
    pub removed: Vec<Entity>,
    /// Present in both (same id) but with different contents: (source, target).
    pub changed: Vec<(Entity, Entity)>,
}

impl EntityDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

/// Complete diff between two workspace snapshots, one [`EntityDiff`] per kind.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiff {
    pub by_kind: HashMap<EntityKind, EntityDiff>,
}

const KIND_ORDER: [EntityKind; 4] = [
    EntityKind::Template,
    EntityKind::Variable,
    EntityKind::Trigger,
    EntityKind::Tag,
];

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.by_kind.values().all(EntityDiff::is_empty)
    }

    pub fn total_changes(&self) -> usize {
        self.by_kind.values().map(EntityDiff::change_count).sum()
    }
}

impl fmt::Display for SnapshotDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No differences found.");
        }
        for kind in KIND_ORDER {
            let Some(diff) = self.by_kind.get(&kind) else { continue };
            if diff.is_empty() {
                continue;
            }
            writeln!(f, "{kind}s:")?;
            for entity in &diff.added {
                writeln!(f, "  + {} ({})", entity.name(), entity.id())?;
            }
            for entity in &diff.removed {
                writeln!(f, "  - {} ({})", entity.name(), entity.id())?;
            }
            for (_, new) in &diff.changed {
                writeln!(f, "  ~ {} ({})", new.name(), new.id())?;
            }
        }
        writeln!(f, "Summary: {} total changes", self.total_changes())
    }
}

/// Compare two workspace snapshots by entity id within each kind.
///
/// "added" = present in `target` but not `source`; "removed" = the reverse;
/// "changed" = present in both with differing contents (compared via their
/// JSON serialization, since the payload types don't derive `PartialEq`
/// uniformly).
pub fn diff_snapshots(source: &WorkspaceSnapshot, target: &WorkspaceSnapshot) -> SnapshotDiff {
    let mut result = SnapshotDiff::default();

    let source_by_id: HashMap<&str, Entity> = index_by_id(source);
    let target_by_id: HashMap<&str, Entity> = index_by_id(target);

    for kind in KIND_ORDER {
        let mut diff = EntityDiff::default();

        for (id, entity) in &target_by_id {
            if entity.kind() != kind {
                continue;
            }
            match source_by_id.get(id) {
                None => diff.added.push(entity.clone()),
                Some(source_entity) => {
                    if !entities_equal(source_entity, entity) {
                        diff.changed.push((source_entity.clone(), entity.clone()));
                    }
                }
            }
        }
        for (id, entity) in &source_by_id {
            if entity.kind() == kind && !target_by_id.contains_key(id) {
                diff.removed.push(entity.clone());
            }
        }

        if !diff.is_empty() {
            result.by_kind.insert(kind, diff);
        }
    }

    result
}

fn index_by_id(snapshot: &WorkspaceSnapshot) -> HashMap<&str, Entity> {
    let mut map = HashMap::new();
    for tag in &snapshot.tags {
        map.insert(tag.tag_id.as_str(), Entity::Tag(tag.clone()));
    }
    for trigger in &snapshot.triggers {
        map.insert(trigger.trigger_id.as_str(), Entity::Trigger(trigger.clone()));
    }
    for variable in &snapshot.variables {
        map.insert(variable.variable_id.as_str(), Entity::Variable(variable.clone()));
    }
    for template in &snapshot.templates {
        map.insert(template.template_id.as_str(), Entity::Template(template.clone()));
    }
    map
}

fn entities_equal(a: &Entity, b: &Entity) -> bool {
    match (serde_json::to_value(a), serde_json::to_value(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Trigger;

    fn trigger(id: &str, name: &str) -> Trigger {
        Trigger {
            trigger_id: id.to_string(),
            name: name.to_string(),
            trigger_type: "customEvent".to_string(),
            parameter: vec![],
            filter: vec![],
            custom_event_filter: None,
            auto_event_filter: None,
            account_id: None,
            container_id: None,
            workspace_id: None,
        }
    }

    #[test]
    fn detects_added_removed_and_changed() {
        let mut source = WorkspaceSnapshot::default();
        source.triggers.push(trigger("1", "Keep"));
        source.triggers.push(trigger("2", "Remove"));
        source.triggers.push(trigger("3", "Old Name"));

        let mut target = WorkspaceSnapshot::default();
        target.triggers.push(trigger("1", "Keep"));
        target.triggers.push(trigger("3", "New Name"));
        target.triggers.push(trigger("4", "Added"));

        let diff = diff_snapshots(&source, &target);
        let trigger_diff = diff.by_kind.get(&EntityKind::Trigger).unwrap();
        assert_eq!(trigger_diff.added.len(), 1);
        assert_eq!(trigger_diff.removed.len(), 1);
        assert_eq!(trigger_diff.changed.len(), 1);
        assert_eq!(diff.total_changes(), 3);
    }

    #[test]
    fn identical_snapshots_diff_to_empty() {
        let mut snapshot = WorkspaceSnapshot::default();
        snapshot.triggers.push(trigger("1", "Click"));
        let diff = diff_snapshots(&snapshot, &snapshot.clone());
        assert!(diff.is_empty());
        assert_eq!(format!("{diff}"), "No differences found.\n");
    }
}
