//! Core data model for the replication engine.
//!
//! A configuration consists of four heterogeneous entity kinds — Tags,
//! Triggers, Variables, Templates — that refer to each other by opaque
//! identifiers and by name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The closed set of entity kinds a configuration is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Tag,
    Trigger,
    Variable,
    Template,
}

impl EntityKind {
    /// Priority used to break ties among nodes with equal in-degree during
    /// topological ordering: `Template < Variable < Trigger < Tag`.
    pub fn rank_priority(self) -> u8 {
        match self {
            EntityKind::Template => 0,
            EntityKind::Variable => 1,
            EntityKind::Trigger => 2,
            EntityKind::Tag => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Tag => "tag",
            EntityKind::Trigger => "trigger",
            EntityKind::Variable => "variable",
            EntityKind::Template => "template",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node kind within a parameter tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Template,
    Boolean,
    List,
    Map,
    Integer,
    TagReference,
    TriggerReference,
}

/// Maximum allowed nesting depth of a parameter tree. Depth 3 is accepted,
/// depth 4 is rejected.
pub const MAX_PARAM_DEPTH: usize = 3;

/// A recursive parameter-tree node.
///
/// The `value` field may contain `{{variable-name}}` substitutions; these
/// are name-based and left intact on replication (never rewritten).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamNode {
    pub kind: ParamKind,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub list: Vec<ParamNode>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub map: HashMap<String, ParamNode>,
}

impl ParamNode {
    pub fn leaf(kind: ParamKind, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            value: Some(value.into()),
            list: Vec::new(),
            map: HashMap::new(),
        }
    }

    /// Depth of this subtree; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        let child_depth = self
            .list
            .iter()
            .map(ParamNode::depth)
            .chain(self.map.values().map(ParamNode::depth))
            .max()
            .unwrap_or(0);
        1 + child_depth
    }

    /// Walk the subtree, invoking `f` on every literal `value` string found
    /// (including this node's own value, if present).
    pub fn walk_values<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        if let Some(v) = &self.value {
            f(v);
        }
        for child in &self.list {
            child.walk_values(f);
        }
        for child in self.map.values() {
            child.walk_values(f);
        }
    }
}

/// How a tag references its setup/teardown tag: by id, or by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagRef {
    Id(String),
    Name(String),
}

/// A firing unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub tag_id: String,
    pub name: String,
    /// Either a built-in type discriminator (e.g. `"gaawe"`) or a
    /// container-scoped template type string `cvt_<containerId>_<templateId>`.
    #[serde(rename = "type")]
    pub tag_type: String,
    pub parameter: Vec<ParamNode>,
    #[serde(default)]
    pub firing_trigger_id: Vec<String>,
    #[serde(default)]
    pub blocking_trigger_id: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_tag: Option<TagRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown_tag: Option<TagRef>,
    /// Server-assigned metadata, dropped by the Config Transformer on replication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_manager_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_folder_id: Option<String>,
}

impl Tag {
    /// The `configTagId` parameter value, if present.
    pub fn config_tag_id(&self) -> Option<&str> {
        self.parameter
            .iter()
            .find(|p| p.key == "configTagId")
            .and_then(|p| p.value.as_deref())
    }

    /// The `eventName` parameter value, if present (a tag pushing a custom event).
    pub fn event_name(&self) -> Option<&str> {
        self.parameter
            .iter()
            .find(|p| p.key == "eventName")
            .and_then(|p| p.value.as_deref())
    }
}

/// A firing condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default)]
    pub parameter: Vec<ParamNode>,
    /// Filter predicates; each entry's `value` fields may embed `{{name}}`
    /// variable references as literal strings.
    #[serde(default)]
    pub filter: Vec<ParamNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_event_filter: Option<Vec<ParamNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_event_filter: Option<Vec<ParamNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl Trigger {
    /// The event name this custom-event trigger listens for, if any.
    pub fn custom_event_name(&self) -> Option<&str> {
        self.custom_event_filter
            .as_ref()
            .into_iter()
            .flatten()
            .find(|p| p.key == "arg0")
            .and_then(|p| p.value.as_deref())
    }
}

/// A value producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub variable_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub variable_type: String,
    #[serde(default)]
    pub parameter: Vec<ParamNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

/// A reusable tag/variable type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub template_id: String,
    pub name: String,
    /// Opaque blob; may embed a `cvt_<gallery-id>` reference to itself.
    pub template_data: String,
    pub container_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    /// Gallery-reference block, dropped on replication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gallery_reference: Option<serde_json::Value>,
}

impl Template {
    /// The derived container-scoped type string for this template.
    pub fn type_string(&self) -> String {
        format!("cvt_{}_{}", self.container_id, self.template_id)
    }
}

/// Sentinel gallery id that must never be remapped (a template stub, not a
/// real reference into `templateData`).
pub const GALLERY_TEMP_PUBLIC_ID: &str = "cvt_temp_public_id";

/// One of the four entity kinds, carrying its own payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Tag(Tag),
    Trigger(Trigger),
    Variable(Variable),
    Template(Template),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Tag(_) => EntityKind::Tag,
            Entity::Trigger(_) => EntityKind::Trigger,
            Entity::Variable(_) => EntityKind::Variable,
            Entity::Template(_) => EntityKind::Template,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::Tag(t) => &t.tag_id,
            Entity::Trigger(t) => &t.trigger_id,
            Entity::Variable(v) => &v.variable_id,
            Entity::Template(t) => &t.template_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Tag(t) => &t.name,
            Entity::Trigger(t) => &t.name,
            Entity::Variable(v) => &v.name,
            Entity::Template(t) => &t.name,
        }
    }

    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            Entity::Tag(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_trigger(&self) -> Option<&Trigger> {
        match self {
            Entity::Trigger(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Entity::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_template(&self) -> Option<&Template> {
        match self {
            Entity::Template(t) => Some(t),
            _ => None,
        }
    }

    /// The top-level `parameter` list shared by Tag/Trigger/Variable (empty for Template).
    pub fn parameters(&self) -> &[ParamNode] {
        match self {
            Entity::Tag(t) => &t.parameter,
            Entity::Trigger(t) => &t.parameter,
            Entity::Variable(v) => &v.parameter,
            Entity::Template(_) => &[],
        }
    }
}

/// A complete snapshot of one workspace's configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub tags: Vec<Tag>,
    pub triggers: Vec<Trigger>,
    pub variables: Vec<Variable>,
    pub templates: Vec<Template>,
}

impl WorkspaceSnapshot {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
            && self.triggers.is_empty()
            && self.variables.is_empty()
            && self.templates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len() + self.triggers.len() + self.variables.len() + self.templates.len()
    }

    /// Iterate all entities as the tagged `Entity` variant, in a stable
    /// kind-then-declared order (templates, variables, triggers, tags).
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.templates
            .iter()
            .cloned()
            .map(Entity::Template)
            .chain(self.variables.iter().cloned().map(Entity::Variable))
            .chain(self.triggers.iter().cloned().map(Entity::Trigger))
            .chain(self.tags.iter().cloned().map(Entity::Tag))
    }

    pub fn find_tag_by_name(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name == name)
    }

    pub fn find_trigger_by_name(&self, name: &str) -> Option<&Trigger> {
        self.triggers.iter().find(|t| t.name == name)
    }

    pub fn find_variable_by_name(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn find_template_by_name(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }
}

/// Kind of a dependency edge. A hint used for diagnostics; creation order is
/// derived from the edge set, not from the kind itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    TagTrigger,
    TagSetupTag,
    TagTeardownTag,
    TagConfigTag,
    TagVariable,
    TagTemplate,
    TriggerVariable,
    TriggerCustomEvent,
    VariableVariable,
    VariableTemplate,
}

/// A dependency edge: `from` depends on `to` (must be created after `to`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// One `{sourceId, targetId, kind, finalName}` binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdMapping {
    pub source_id: String,
    pub target_id: String,
    pub kind: EntityKind,
    pub final_name: String,
}

/// Action a plan step takes for a given source entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    Create,
    Skip,
}

/// One step of a creation plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub ordinal: usize,
    pub action: PlanAction,
    pub kind: EntityKind,
    pub source_id: String,
    pub source_name: String,
    pub new_name: String,
    pub dependencies: Vec<String>,
    pub payload: Entity,
    /// Present only for SKIP steps matched against an existing target entity
    /// (absent `target_id` on a SKIP step is a warning).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
}

/// An ordered list of creation-plan steps.
pub type CreationPlan = Vec<PlanStep>;

/// The replication workflow's phase. Advances monotonically except `Error`,
/// which is absorbing within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Analyzing,
    Naming,
    Planning,
    Building,
    Validating,
    Completed,
    Error,
}

impl Phase {
    /// Fixed weighting of each phase for progress percentage computation.
    pub fn weight(self) -> f64 {
        match self {
            Phase::Idle => 0.0,
            Phase::Analyzing => 0.15,
            Phase::Naming => 0.10,
            Phase::Planning => 0.15,
            Phase::Building => 0.45,
            Phase::Validating => 0.15,
            Phase::Completed => 0.0,
            Phase::Error => 0.0,
        }
    }
}

/// A progress view computed from a fixed weighting of the phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressView {
    pub phase: Phase,
    pub current_step: usize,
    pub total_steps: usize,
    pub description: String,
    pub percentage: f64,
}

/// An identifier for one end-to-end replication session.
pub type SessionId = String;

/// A single entry in the append-only created-entities list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedEntity {
    pub source_id: String,
    pub target_id: String,
    pub kind: EntityKind,
    pub name: String,
}

/// Summary counters for a workflow result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub expected_count: usize,
    pub created_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
}

/// The engine-level event stream emitted by the Orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplicationEvent {
    WorkflowStarted {
        session_id: SessionId,
        timestamp: i64,
    },
    WorkflowCompleted {
        session_id: SessionId,
        timestamp: i64,
    },
    WorkflowFailed {
        session_id: SessionId,
        timestamp: i64,
        message: String,
    },
    PhaseChanged {
        session_id: SessionId,
        timestamp: i64,
        phase: Phase,
    },
    EntityCreated {
        session_id: SessionId,
        timestamp: i64,
        kind: EntityKind,
        source_id: String,
        target_id: String,
    },
    EntitySkipped {
        session_id: SessionId,
        timestamp: i64,
        kind: EntityKind,
        source_id: String,
        target_id: Option<String>,
    },
    EntityFailed {
        session_id: SessionId,
        timestamp: i64,
        kind: EntityKind,
        source_id: String,
        message: String,
    },
    ProgressUpdated {
        session_id: SessionId,
        timestamp: i64,
        progress: ProgressView,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_depth_three_accepted_four_rejected() {
        let depth3 = ParamNode {
            kind: ParamKind::Map,
            key: "root".into(),
            value: None,
            list: vec![],
            map: HashMap::from([(
                "a".to_string(),
                ParamNode {
                    kind: ParamKind::Map,
                    key: "a".into(),
                    value: None,
                    list: vec![],
                    map: HashMap::from([(
                        "b".to_string(),
                        ParamNode::leaf(ParamKind::Boolean, "b", "true"),
                    )]),
                },
            )]),
        };
        assert_eq!(depth3.depth(), 3);

        let depth4 = ParamNode {
            kind: ParamKind::Map,
            key: "root".into(),
            value: None,
            list: vec![depth3.clone()],
            map: HashMap::new(),
        };
        assert_eq!(depth4.depth(), 4);
    }

    #[test]
    fn entity_kind_rank_priority_orders_templates_first() {
        assert!(EntityKind::Template.rank_priority() < EntityKind::Variable.rank_priority());
        assert!(EntityKind::Variable.rank_priority() < EntityKind::Trigger.rank_priority());
        assert!(EntityKind::Trigger.rank_priority() < EntityKind::Tag.rank_priority());
    }

    #[test]
    fn template_type_string_is_container_scoped() {
        let tpl = Template {
            template_id: "195".into(),
            name: "My Template".into(),
            template_data: "{}".into(),
            container_id: "172990757".into(),
            account_id: None,
            workspace_id: None,
            gallery_reference: None,
        };
        assert_eq!(tpl.type_string(), "cvt_172990757_195");
    }
}
