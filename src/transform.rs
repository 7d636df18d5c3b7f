//! Config Transformer: rewrite a source entity payload into the form
//! submitted to the target backend, per spec §4.3.
//!
//! Purely a function of `(payload, id-mapping snapshot, naming options)` --
//! no hidden state (spec §8 invariant 5).

use crate::mapper::IdMapper;
use crate::types::{Entity, ParamNode, Tag, TagRef, Template, Trigger, Variable, GALLERY_TEMP_PUBLIC_ID};
use regex_lite::Regex;
use std::sync::LazyLock;

static GALLERY_ID_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"cvt_[A-Za-z0-9]+").expect("static regex is valid"));

/// Non-fatal issues surfaced while transforming a payload.
#[derive(Debug, Clone, Default)]
pub struct TransformWarnings {
    pub messages: Vec<String>,
}

impl TransformWarnings {
    fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }
}

/// Transform a source entity into the payload the Builder submits for
/// creation, given `new_name` (the resolved target name) and the
/// Identifier Mapper's current state.
pub fn transform_entity(
    entity: &Entity,
    new_name: &str,
    mapper: &IdMapper,
) -> (Entity, TransformWarnings) {
    let mut warnings = TransformWarnings::default();
    let transformed = match entity {
        Entity::Tag(tag) => Entity::Tag(transform_tag(tag, new_name, mapper, &mut warnings)),
        Entity::Trigger(trigger) => Entity::Trigger(transform_trigger(trigger, new_name)),
        Entity::Variable(variable) => Entity::Variable(transform_variable(variable, new_name)),
        Entity::Template(template) => Entity::Template(transform_template(template, new_name)),
    };
    (transformed, warnings)
}

fn transform_tag(tag: &Tag, new_name: &str, mapper: &IdMapper, warnings: &mut TransformWarnings) -> Tag {
    let (firing_trigger_id, unresolved_firing) = mapper.remap_id_list(&tag.firing_trigger_id);
    for id in unresolved_firing {
        warnings.push(format!("tag '{}': firing trigger '{}' has no target binding", new_name, id));
    }
    let (blocking_trigger_id, unresolved_blocking) = mapper.remap_id_list(&tag.blocking_trigger_id);
    for id in unresolved_blocking {
        warnings.push(format!("tag '{}': blocking trigger '{}' has no target binding", new_name, id));
    }

    let parameter = remap_config_tag_param(&tag.parameter, mapper, new_name, warnings);

    let setup_tag = tag.setup_tag.as_ref().map(|r| remap_tag_ref(r, mapper, warnings, new_name, "setup"));
    let teardown_tag = tag.teardown_tag.as_ref().map(|r| remap_tag_ref(r, mapper, warnings, new_name, "teardown"));

    let tag_type = if tag.tag_type.starts_with("cvt_") {
        match mapper.resolve_template_type(&tag.tag_type) {
            Some(target_type) => target_type,
            None => {
                warnings.push(format!(
                    "tag '{}': no target template type for '{}', preserving original",
                    new_name, tag.tag_type
                ));
                tag.tag_type.clone()
            }
        }
    } else {
        tag.tag_type.clone()
    };

    Tag {
        tag_id: String::new(),
        name: new_name.to_string(),
        tag_type,
        parameter,
        firing_trigger_id,
        blocking_trigger_id,
        setup_tag,
        teardown_tag,
        account_id: None,
        container_id: None,
        workspace_id: None,
        fingerprint: None,
        path: None,
        tag_manager_url: None,
        parent_folder_id: None,
    }
}

fn remap_tag_ref(
    reference: &TagRef,
    mapper: &IdMapper,
    warnings: &mut TransformWarnings,
    owner_name: &str,
    slot: &str,
) -> TagRef {
    match reference {
        TagRef::Name(name) => TagRef::Name(name.clone()),
        TagRef::Id(id) => match mapper.lookup_id(id) {
            Some(entry) => TagRef::Name(entry.name),
            None => {
                warnings.push(format!(
                    "tag '{}': {} tag id '{}' has no target binding, preserving id form",
                    owner_name, slot, id
                ));
                TagRef::Id(id.clone())
            }
        },
    }
}

/// Substitute the mapped target id into the `configTagId` parameter, if
/// present; deep-clone everything else.
fn remap_config_tag_param(
    nodes: &[ParamNode],
    mapper: &IdMapper,
    owner_name: &str,
    warnings: &mut TransformWarnings,
) -> Vec<ParamNode> {
    nodes
        .iter()
        .map(|node| {
            let mut cloned = node.clone();
            if cloned.key == "configTagId" {
                if let Some(value) = &cloned.value {
                    match mapper.lookup_id(value) {
                        Some(entry) => cloned.value = Some(entry.target_id),
                        None => warnings.push(format!(
                            "tag '{}': configTagId '{}' has no target binding",
                            owner_name, value
                        )),
                    }
                }
            }
            cloned.list = remap_config_tag_param(&cloned.list, mapper, owner_name, warnings);
            cloned.map = cloned
                .map
                .into_iter()
                .map(|(k, v)| {
                    let remapped = remap_config_tag_param(std::slice::from_ref(&v), mapper, owner_name, warnings)
                        .into_iter()
                        .next()
                        .unwrap_or(v);
                    (k, remapped)
                })
                .collect();
            cloned
        })
        .collect()
}

fn transform_trigger(trigger: &Trigger, new_name: &str) -> Trigger {
    Trigger {
        trigger_id: String::new(),
        name: new_name.to_string(),
        trigger_type: trigger.trigger_type.clone(),
        parameter: trigger.parameter.clone(),
        filter: trigger.filter.clone(),
        custom_event_filter: trigger.custom_event_filter.clone(),
        auto_event_filter: trigger.auto_event_filter.clone(),
        account_id: None,
        container_id: None,
        workspace_id: None,
    }
}

fn transform_variable(variable: &Variable, new_name: &str) -> Variable {
    Variable {
        variable_id: String::new(),
        name: new_name.to_string(),
        variable_type: variable.variable_type.clone(),
        parameter: variable.parameter.clone(),
        account_id: None,
        container_id: None,
        workspace_id: None,
    }
}

fn transform_template(template: &Template, new_name: &str) -> Template {
    Template {
        template_id: String::new(),
        name: new_name.to_string(),
        template_data: template.template_data.clone(),
        container_id: String::new(),
        account_id: None,
        workspace_id: None,
        gallery_reference: None,
    }
}

/// Find every `cvt_*` literal embedded in a template's `templateData` blob
/// that isn't the sentinel (`cvt_temp_public_id`), for the Builder to
/// register as additional template-type remappings (spec §4.8, S5).
pub fn find_gallery_ids(template_data: &str) -> Vec<String> {
    GALLERY_ID_REF
        .find_iter(template_data)
        .map(|m| m.as_str().to_string())
        .filter(|id| id != GALLERY_TEMP_PUBLIC_ID)
        .collect()
}

/// Resolve the target name for a source entity per the precedence in spec
/// §4.3: explicit override > `prefix + source-name + suffix` > unchanged.
pub fn resolve_name(source_name: &str, override_name: Option<&str>, prefix: &str, suffix: &str) -> String {
    if let Some(name) = override_name {
        return name.to_string();
    }
    if prefix.is_empty() && suffix.is_empty() {
        return source_name.to_string();
    }
    format!("{prefix}{source_name}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityKind;

    #[test]
    fn name_resolution_precedence_override_wins() {
        assert_eq!(resolve_name("Click", Some("Override"), "pre-", "-post"), "Override");
    }

    #[test]
    fn name_resolution_precedence_prefix_suffix_applied() {
        assert_eq!(resolve_name("Click", None, "pre-", "-post"), "pre-Click-post");
    }

    #[test]
    fn name_resolution_precedence_unchanged_when_no_options() {
        assert_eq!(resolve_name("Click", None, "", ""), "Click");
    }

    #[test]
    fn find_gallery_ids_excludes_sentinel() {
        let data = r#"{"id":"cvt_KDDGR","other":"cvt_temp_public_id"}"#;
        let ids = find_gallery_ids(data);
        assert_eq!(ids, vec!["cvt_KDDGR".to_string()]);
    }

    #[test]
    fn transform_tag_drops_server_metadata_and_remaps_triggers() {
        let mapper = IdMapper::new();
        mapper.bind("src-t1", "tgt-t1", EntityKind::Trigger, "Click").unwrap();

        let mut source = Tag {
            tag_id: "src-a".into(),
            name: "GA4 - Click".into(),
            tag_type: "gaawe".into(),
            parameter: vec![],
            firing_trigger_id: vec!["src-t1".to_string()],
            blocking_trigger_id: vec![],
            setup_tag: None,
            teardown_tag: None,
            account_id: Some("123".into()),
            container_id: Some("456".into()),
            workspace_id: Some("789".into()),
            fingerprint: Some("fp".into()),
            path: Some("accounts/1".into()),
            tag_manager_url: Some("https://example".into()),
            parent_folder_id: Some("folder-1".into()),
        };
        source.parameter = vec![];

        let transformed = transform_tag(&source, "GA4 - Click", &mapper, &mut TransformWarnings::default());
        assert_eq!(transformed.firing_trigger_id, vec!["tgt-t1".to_string()]);
        assert!(transformed.account_id.is_none());
        assert!(transformed.container_id.is_none());
    }
}
