//! Reference Matcher: queries over an in-memory target snapshot, per
//! spec §4.4.
//!
//! Name-based identity is authoritative for SKIP decisions; similarity
//! search here is advisory only and never auto-binds.

use crate::types::{ParamNode, Tag, Template, Trigger, Variable, WorkspaceSnapshot};
use std::collections::HashSet;

/// A candidate match with its similarity score in `[0, 100]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch<'a, T> {
    pub entity: &'a T,
    pub score: u32,
}

pub fn find_tag_by_exact_name<'a>(snapshot: &'a WorkspaceSnapshot, name: &str) -> Option<&'a Tag> {
    snapshot.find_tag_by_name(name)
}

pub fn find_trigger_by_exact_name<'a>(snapshot: &'a WorkspaceSnapshot, name: &str) -> Option<&'a Trigger> {
    snapshot.find_trigger_by_name(name)
}

pub fn find_variable_by_exact_name<'a>(snapshot: &'a WorkspaceSnapshot, name: &str) -> Option<&'a Variable> {
    snapshot.find_variable_by_name(name)
}

pub fn find_template_by_exact_name<'a>(snapshot: &'a WorkspaceSnapshot, name: &str) -> Option<&'a Template> {
    snapshot.find_template_by_name(name)
}

/// Tokenize on space/hyphen separators for the Jaccard similarity component.
fn tokenize(name: &str) -> HashSet<String> {
    name.split(|c: char| c == ' ' || c == '-' || c == '_')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Token-Jaccard similarity plus an exact-prefix bonus, scaled to `[0, 100]`.
pub fn name_similarity_score(query: &str, candidate: &str) -> u32 {
    let query_tokens = tokenize(query);
    let candidate_tokens = tokenize(candidate);

    let jaccard = if query_tokens.is_empty() && candidate_tokens.is_empty() {
        1.0
    } else {
        let intersection = query_tokens.intersection(&candidate_tokens).count() as f64;
        let union = query_tokens.union(&candidate_tokens).count() as f64;
        if union == 0.0 { 0.0 } else { intersection / union }
    };

    let prefix_bonus = if candidate.to_lowercase().starts_with(&query.to_lowercase()) && !query.is_empty() {
        0.15
    } else {
        0.0
    };

    ((jaccard + prefix_bonus).min(1.0) * 100.0).round() as u32
}

/// Rank tags by name similarity to `query`, returning at most `top_k`
/// matches at or above `threshold` (0-100), best first.
pub fn search_tags_by_name<'a>(
    snapshot: &'a WorkspaceSnapshot,
    query: &str,
    top_k: usize,
    threshold: u32,
) -> Vec<ScoredMatch<'a, Tag>> {
    let mut scored: Vec<ScoredMatch<'a, Tag>> = snapshot
        .tags
        .iter()
        .map(|tag| ScoredMatch {
            entity: tag,
            score: name_similarity_score(query, &tag.name),
        })
        .filter(|m| m.score >= threshold)
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.entity.name.cmp(&b.entity.name)));
    scored.truncate(top_k);
    scored
}

/// Tags in the target whose `eventName` parameter equals `event`.
pub fn find_ga4_tags_by_event_name<'a>(snapshot: &'a WorkspaceSnapshot, event: &str) -> Vec<&'a Tag> {
    snapshot
        .tags
        .iter()
        .filter(|tag| tag.event_name() == Some(event))
        .collect()
}

/// Jaccard similarity between two top-level parameter lists, treating each
/// node as the pair `(key, value)` -- a coarse but cheap parameter-subset
/// similarity measure.
fn parameter_similarity(a: &[ParamNode], b: &[ParamNode]) -> f64 {
    let to_set = |nodes: &[ParamNode]| -> HashSet<(String, Option<String>)> {
        nodes.iter().map(|n| (n.key.clone(), n.value.clone())).collect()
    };
    let set_a = to_set(a);
    let set_b = to_set(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;
    if union == 0.0 { 0.0 } else { intersection / union }
}

/// Combined name/type/parameter similarity against a reference tag,
/// weighted per spec §4.4 (`findSimilarTags`): name 50%, type 20%,
/// parameters 30%.
pub fn find_similar_tags<'a>(
    snapshot: &'a WorkspaceSnapshot,
    reference: &Tag,
    threshold: u32,
) -> Vec<ScoredMatch<'a, Tag>> {
    const NAME_WEIGHT: f64 = 0.5;
    const TYPE_WEIGHT: f64 = 0.2;
    const PARAM_WEIGHT: f64 = 0.3;

    let mut scored: Vec<ScoredMatch<'a, Tag>> = snapshot
        .tags
        .iter()
        .filter(|tag| tag.tag_id != reference.tag_id)
        .map(|tag| {
            let name_score = name_similarity_score(&reference.name, &tag.name) as f64 / 100.0;
            let type_score = if tag.tag_type == reference.tag_type { 1.0 } else { 0.0 };
            let param_score = parameter_similarity(&reference.parameter, &tag.parameter);
            let combined = name_score * NAME_WEIGHT + type_score * TYPE_WEIGHT + param_score * PARAM_WEIGHT;
            ScoredMatch {
                entity: tag,
                score: (combined * 100.0).round() as u32,
            }
        })
        .filter(|m| m.score >= threshold)
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.entity.name.cmp(&b.entity.name)));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamKind;

    fn tag(id: &str, name: &str, tag_type: &str) -> Tag {
        Tag {
            tag_id: id.to_string(),
            name: name.to_string(),
            tag_type: tag_type.to_string(),
            parameter: vec![],
            firing_trigger_id: vec![],
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

    #[test]
    fn exact_prefix_boosts_similarity_score() {
        let prefixed = name_similarity_score("GA4", "GA4 - Click");
        let unrelated = name_similarity_score("GA4", "Unrelated Trigger");
        assert!(prefixed > unrelated);
    }

    #[test]
    fn search_tags_by_name_ranks_best_first_and_respects_threshold() {
        let mut snapshot = WorkspaceSnapshot::default();
        snapshot.tags.push(tag("a", "GA4 - Click", "gaawe"));
        snapshot.tags.push(tag("b", "GA4 - Submit", "gaawe"));
        snapshot.tags.push(tag("c", "Completely Different", "html"));

        let matches = search_tags_by_name(&snapshot, "GA4 - Click", 10, 30);
        assert!(!matches.is_empty());
        assert_eq!(matches[0].entity.tag_id, "a");
        assert!(matches.iter().all(|m| m.score >= 30));
    }

    #[test]
    fn find_similar_tags_excludes_self() {
        let mut snapshot = WorkspaceSnapshot::default();
        let reference = tag("a", "GA4 - Click", "gaawe");
        snapshot.tags.push(reference.clone());
        snapshot.tags.push(tag("b", "GA4 - Click Copy", "gaawe"));

        let matches = find_similar_tags(&snapshot, &reference, 0);
        assert!(matches.iter().all(|m| m.entity.tag_id != "a"));
    }

    #[test]
    fn parameter_similarity_is_used_in_combined_score() {
        let mut snapshot = WorkspaceSnapshot::default();
        let mut reference = tag("a", "GA4 - Click", "gaawe");
        reference.parameter.push(ParamNode::leaf(ParamKind::Template, "eventName", "click"));
        let mut sibling = tag("b", "GA4 - Click Variant", "gaawe");
        sibling.parameter.push(ParamNode::leaf(ParamKind::Template, "eventName", "click"));
        snapshot.tags.push(reference.clone());
        snapshot.tags.push(sibling);

        let matches = find_similar_tags(&snapshot, &reference, 0);
        assert!(!matches.is_empty());
    }
}
