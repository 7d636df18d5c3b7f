//! Dependency Resolver: edge extraction, topological ordering, and cycle
//! detection over a source workspace snapshot, per spec §4.1.

use crate::config::known_event_for_tag_type;
use crate::error::ReplicationError;
use crate::transform::find_gallery_ids;
use crate::types::{DependencyEdge, EdgeKind, Entity, EntityKind, ParamNode, TagRef, WorkspaceSnapshot};
use regex_lite::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static VARIABLE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("static regex is valid"));

/// Result of analyzing a source snapshot: a topological creation order plus
/// the edge set that produced it and any non-fatal warnings.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub order: Vec<Entity>,
    pub edges: Vec<DependencyEdge>,
    pub warnings: Vec<String>,
}

/// Whether `template` is the template a `cvt_*`-typed tag/variable refers
/// to: an exact match on the container-scoped type string first, falling
/// back to any shorter `cvt_*` id embedded in `templateData` (spec §4.1).
fn template_matches_type(template: &crate::types::Template, candidate_type: &str) -> bool {
    template.type_string() == candidate_type
        || find_gallery_ids(&template.template_data)
            .iter()
            .any(|gallery_id| gallery_id == candidate_type)
}

/// Extract every `{{name}}`-shaped reference out of a value string.
fn extract_variable_refs(value: &str) -> impl Iterator<Item = &str> {
    VARIABLE_REF
        .captures_iter(value)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn walk_param_variable_refs(nodes: &[ParamNode], mut on_ref: impl FnMut(&str)) {
    for node in nodes {
        node.walk_values(&mut |value| {
            for name in extract_variable_refs(value) {
                on_ref(name);
            }
        });
    }
}

/// Extract the dependency edge set from a source snapshot, per spec §4.1.
/// Returns the edges plus warnings for unresolved name references.
pub fn extract_edges(snapshot: &WorkspaceSnapshot) -> (Vec<DependencyEdge>, Vec<String>) {
    let mut edges = Vec::new();
    let mut warnings = Vec::new();

    for tag in &snapshot.tags {
        for trigger_id in tag.firing_trigger_id.iter().chain(tag.blocking_trigger_id.iter()) {
            edges.push(DependencyEdge {
                from: tag.tag_id.clone(),
                to: trigger_id.clone(),
                kind: EdgeKind::TagTrigger,
            });
        }

        if let Some(TagRef::Id(id)) = &tag.setup_tag {
            edges.push(DependencyEdge {
                from: tag.tag_id.clone(),
                to: id.clone(),
                kind: EdgeKind::TagSetupTag,
            });
        }
        if let Some(TagRef::Id(id)) = &tag.teardown_tag {
            edges.push(DependencyEdge {
                from: tag.tag_id.clone(),
                to: id.clone(),
                kind: EdgeKind::TagTeardownTag,
            });
        }

        if let Some(config_tag_id) = tag.config_tag_id() {
            edges.push(DependencyEdge {
                from: tag.tag_id.clone(),
                to: config_tag_id.to_string(),
                kind: EdgeKind::TagConfigTag,
            });
        }

        for template in &snapshot.templates {
            if template_matches_type(template, &tag.tag_type) {
                edges.push(DependencyEdge {
                    from: tag.tag_id.clone(),
                    to: template.template_id.clone(),
                    kind: EdgeKind::TagTemplate,
                });
            }
        }

        let mut seen_vars = HashSet::new();
        walk_param_variable_refs(&tag.parameter, |name| {
            if !seen_vars.insert(name.to_string()) {
                return;
            }
            match snapshot.find_variable_by_name(name) {
                Some(var) => edges.push(DependencyEdge {
                    from: tag.tag_id.clone(),
                    to: var.variable_id.clone(),
                    kind: EdgeKind::TagVariable,
                }),
                None => warnings.push(format!(
                    "tag '{}': unresolved variable reference '{{{{{}}}}}'",
                    tag.name, name
                )),
            }
        });
    }

    for trigger in &snapshot.triggers {
        let mut seen_vars = HashSet::new();
        let param_sources = [&trigger.parameter, &trigger.filter];
        for source in param_sources {
            walk_param_variable_refs(source, |name| {
                if !seen_vars.insert(name.to_string()) {
                    return;
                }
                match snapshot.find_variable_by_name(name) {
                    Some(var) => edges.push(DependencyEdge {
                        from: trigger.trigger_id.clone(),
                        to: var.variable_id.clone(),
                        kind: EdgeKind::TriggerVariable,
                    }),
                    None => warnings.push(format!(
                        "trigger '{}': unresolved variable reference '{{{{{}}}}}'",
                        trigger.name, name
                    )),
                }
            });
        }

        if let Some(event) = trigger.custom_event_name() {
            let mut matched_any = false;
            for tag in &snapshot.tags {
                let pushes_event = tag.event_name() == Some(event)
                    || known_event_for_tag_type(&tag.tag_type).as_deref() == Some(event);
                if pushes_event {
                    matched_any = true;
                    edges.push(DependencyEdge {
                        from: trigger.trigger_id.clone(),
                        to: tag.tag_id.clone(),
                        kind: EdgeKind::TriggerCustomEvent,
                    });
                }
            }
            if !matched_any {
                warnings.push(format!(
                    "trigger '{}': no known tag pushes custom event '{}'",
                    trigger.name, event
                ));
            }
        }
    }

    for variable in &snapshot.variables {
        let mut seen_vars = HashSet::new();
        walk_param_variable_refs(&variable.parameter, |name| {
            if name == variable.name || !seen_vars.insert(name.to_string()) {
                return;
            }
            match snapshot.find_variable_by_name(name) {
                Some(other) => edges.push(DependencyEdge {
                    from: variable.variable_id.clone(),
                    to: other.variable_id.clone(),
                    kind: EdgeKind::VariableVariable,
                }),
                None => warnings.push(format!(
                    "variable '{}': unresolved variable reference '{{{{{}}}}}'",
                    variable.name, name
                )),
            }
        });

        for template in &snapshot.templates {
            if template_matches_type(template, &variable.variable_type) {
                edges.push(DependencyEdge {
                    from: variable.variable_id.clone(),
                    to: template.template_id.clone(),
                    kind: EdgeKind::VariableTemplate,
                });
            }
        }
    }

    (edges, warnings)
}

struct NodeInfo {
    kind: EntityKind,
    name: String,
}

/// Find a cycle in `depends_on` reachable from any node, via DFS. Returns
/// the cycle (node ids, first id repeated at the end) and the back edge
/// `(from, to)` that closed it.
fn find_cycle(
    nodes: &HashMap<String, NodeInfo>,
    depends_on: &HashMap<String, HashSet<String>>,
) -> Option<(Vec<String>, (String, String))> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut order_ids: Vec<&String> = nodes.keys().collect();
    order_ids.sort();

    for start in order_ids {
        if visited.contains(start) {
            continue;
        }
        let mut stack_set: HashSet<String> = HashSet::new();
        let mut path: Vec<String> = Vec::new();
        if let Some(result) = dfs_find_cycle(start, depends_on, &mut visited, &mut stack_set, &mut path) {
            return Some(result);
        }
    }
    None
}

fn dfs_find_cycle(
    node: &str,
    depends_on: &HashMap<String, HashSet<String>>,
    visited: &mut HashSet<String>,
    stack_set: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<(Vec<String>, (String, String))> {
    visited.insert(node.to_string());
    stack_set.insert(node.to_string());
    path.push(node.to_string());

    if let Some(deps) = depends_on.get(node) {
        let mut sorted_deps: Vec<&String> = deps.iter().collect();
        sorted_deps.sort();
        for dep in sorted_deps {
            if stack_set.contains(dep) {
                let start_idx = path.iter().position(|n| n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start_idx..].to_vec();
                cycle.push(dep.clone());
                return Some((cycle, (node.to_string(), dep.clone())));
            }
            if !visited.contains(dep) {
                if let Some(result) = dfs_find_cycle(dep, depends_on, visited, stack_set, path) {
                    return Some(result);
                }
            }
        }
    }

    path.pop();
    stack_set.remove(node);
    None
}

/// Run Kahn's algorithm with `(kind priority, source-name)` tie-breaking.
/// Returns the ordered node ids, or `None` if a cycle remains (caller is
/// expected to have already broken/rejected cycles via [`analyze`]).
fn kahn_order(nodes: &HashMap<String, NodeInfo>, depends_on: &HashMap<String, HashSet<String>>) -> Option<Vec<String>> {
    let mut remaining: HashMap<String, HashSet<String>> = depends_on.clone();
    for id in nodes.keys() {
        remaining.entry(id.clone()).or_default();
    }

    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    for (from, deps) in &remaining {
        for to in deps {
            dependents.entry(to.clone()).or_default().push(from.clone());
        }
    }

    let mut order = Vec::with_capacity(nodes.len());
    let mut ready: Vec<String> = remaining
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(id, _)| id.clone())
        .collect();

    let mut processed: HashSet<String> = HashSet::new();

    loop {
        ready.sort_by(|a, b| {
            let na = &nodes[a];
            let nb = &nodes[b];
            na.kind
                .rank_priority()
                .cmp(&nb.kind.rank_priority())
                .then_with(|| na.name.cmp(&nb.name))
                .then_with(|| a.cmp(b))
        });
        ready.dedup();
        ready.retain(|id| !processed.contains(id));

        let Some(next) = ready.first().cloned() else {
            break;
        };
        ready.remove(0);
        processed.insert(next.clone());
        order.push(next.clone());

        if let Some(deps) = dependents.get(&next) {
            for dependent in deps {
                if processed.contains(dependent) {
                    continue;
                }
                if let Some(set) = remaining.get_mut(dependent) {
                    set.remove(&next);
                    if set.is_empty() && !ready.contains(dependent) {
                        ready.push(dependent.clone());
                    }
                }
            }
        }
    }

    if order.len() == nodes.len() {
        Some(order)
    } else {
        None
    }
}

/// Analyze a source snapshot: extract edges, detect and (where possible)
/// break cycles, and produce a topologically ordered entity list.
pub fn analyze(snapshot: &WorkspaceSnapshot) -> Result<AnalysisResult, ReplicationError> {
    let (mut edges, mut warnings) = extract_edges(snapshot);

    let mut nodes: HashMap<String, NodeInfo> = HashMap::new();
    for entity in snapshot.entities() {
        nodes.insert(
            entity.id().to_string(),
            NodeInfo {
                kind: entity.kind(),
                name: entity.name().to_string(),
            },
        );
    }

    loop {
        let mut depends_on: HashMap<String, HashSet<String>> = HashMap::new();
        for edge in &edges {
            if nodes.contains_key(&edge.from) && nodes.contains_key(&edge.to) && edge.from != edge.to {
                depends_on.entry(edge.from.clone()).or_default().insert(edge.to.clone());
            }
        }

        if kahn_order(&nodes, &depends_on).is_some() {
            break;
        }

        let Some((cycle, back_edge)) = find_cycle(&nodes, &depends_on) else {
            // Shouldn't happen (Kahn failed but DFS found nothing): treat as
            // a generic analysis failure rather than looping forever.
            return Err(ReplicationError::analysis_failed(
                "graph",
                "topological sort failed but no cycle could be isolated",
            ));
        };

        let same_kind = cycle
            .windows(2)
            .all(|pair| nodes.get(&pair[0]).map(|n| n.kind) == nodes.get(&pair[1]).map(|n| n.kind));

        if same_kind {
            return Err(ReplicationError::circular_dependency("graph", &cycle));
        }

        warnings.push(format!(
            "broke cross-kind dependency cycle by removing edge {} -> {}",
            back_edge.0, back_edge.1
        ));
        edges.retain(|e| !(e.from == back_edge.0 && e.to == back_edge.1));
    }

    let mut depends_on: HashMap<String, HashSet<String>> = HashMap::new();
    for edge in &edges {
        if nodes.contains_key(&edge.from) && nodes.contains_key(&edge.to) && edge.from != edge.to {
            depends_on.entry(edge.from.clone()).or_default().insert(edge.to.clone());
        }
    }
    let order_ids = kahn_order(&nodes, &depends_on).ok_or_else(|| {
        ReplicationError::analysis_failed("graph", "topological sort failed after cycle breaking")
    })?;

    let by_id: HashMap<String, Entity> = snapshot
        .entities()
        .map(|e| (e.id().to_string(), e))
        .collect();
    let order = order_ids
        .iter()
        .filter_map(|id| by_id.get(id).cloned())
        .collect();

    Ok(AnalysisResult { order, edges, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParamKind, ParamNode, Tag, Trigger};

    fn tag(id: &str, name: &str, tag_type: &str, firing: Vec<&str>) -> Tag {
        Tag {
            tag_id: id.to_string(),
            name: name.to_string(),
            tag_type: tag_type.to_string(),
            parameter: vec![],
            firing_trigger_id: firing.into_iter().map(String::from).collect(),
            blocking_trigger_id: vec![],
            setup_tag: None,
            teardown_tag: None,
            account_id: None,
            container_id: None,
            workspace_id: None,
            fingerprint: None,
            path: None,
            tag_manager_url: None,
            parent_folder_id: None,
        }
    }

    fn trigger(id: &str, name: &str, trigger_type: &str) -> Trigger {
        Trigger {
            trigger_id: id.to_string(),
            name: name.to_string(),
            trigger_type: trigger_type.to_string(),
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
    fn two_entity_chain_orders_trigger_before_tag() {
        let mut snapshot = WorkspaceSnapshot::default();
        snapshot.triggers.push(trigger("src-t1", "Click", "customEvent"));
        snapshot.tags.push(tag("src-a", "GA4 - Click", "gaawe", vec!["src-t1"]));

        let result = analyze(&snapshot).unwrap();
        let ids: Vec<&str> = result.order.iter().map(Entity::id).collect();
        assert_eq!(ids, vec!["src-t1", "src-a"]);
    }

    #[test]
    fn same_kind_cycle_from_setup_tag_self_reference_is_fatal() {
        let mut a = tag("a", "A", "html", vec![]);
        a.setup_tag = Some(TagRef::Id("b".to_string()));
        let mut b = tag("b", "B", "html", vec![]);
        b.setup_tag = Some(TagRef::Id("a".to_string()));

        let mut snapshot = WorkspaceSnapshot::default();
        snapshot.tags.push(a);
        snapshot.tags.push(b);

        let err = analyze(&snapshot).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::CircularDependency);
    }

    #[test]
    fn tag_template_edge_falls_back_to_gallery_id_embedded_in_payload() {
        let mut snapshot = WorkspaceSnapshot::default();
        snapshot.tags.push(tag("src-a", "Uses Template", "cvt_KDDGR", vec![]));
        snapshot.templates.push(crate::types::Template {
            template_id: "195".to_string(),
            name: "My Template".to_string(),
            template_data: r#"{"id": "cvt_KDDGR"}"#.to_string(),
            container_id: "172990757".to_string(),
            account_id: None,
            workspace_id: None,
            gallery_reference: None,
        });

        let (edges, _) = extract_edges(&snapshot);
        assert!(edges
            .iter()
            .any(|e| e.from == "src-a" && e.to == "195" && e.kind == EdgeKind::TagTemplate));
    }

    #[test]
    fn unresolved_variable_reference_is_a_warning_not_fatal() {
        let mut t = tag("a", "A", "html", vec![]);
        t.parameter.push(ParamNode::leaf(ParamKind::Template, "html", "{{missing_var}}"));

        let mut snapshot = WorkspaceSnapshot::default();
        snapshot.tags.push(t);

        let result = analyze(&snapshot).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("missing_var")));
    }
}
