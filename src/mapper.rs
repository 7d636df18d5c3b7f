//! Identifier Mapper: thread-safe `sourceId <-> targetId` bindings plus
//! template-type-string remappings, per spec §4.2.
//!
//! Mirrors the teacher's `Database` wrapping a connection in
//! `Arc<Mutex<..>>`: state lives behind a single mutex and every operation
//! is a short critical section.

use crate::error::ReplicationError;
use crate::types::EntityKind;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One bound `sourceId -> targetId` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub target_id: String,
    pub kind: EntityKind,
    pub name: String,
}

#[derive(Default)]
struct MapperState {
    by_source_id: HashMap<String, MappingEntry>,
    template_types: HashMap<String, String>,
}

/// Thread-safe identifier mapper. Cheap to clone: internal state is behind
/// an `Arc<Mutex<..>>`, so clones share the same bindings.
#[derive(Clone, Default)]
pub struct IdMapper {
    state: Arc<Mutex<MapperState>>,
}

impl IdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a source id to a target id. Idempotent only when the new tuple
    /// equals the existing one; a conflicting rebind is an error.
    pub fn bind(
        &self,
        source_id: &str,
        target_id: &str,
        kind: EntityKind,
        name: &str,
    ) -> Result<(), ReplicationError> {
        let mut state = self.state.lock().expect("id mapper lock poisoned");
        if let Some(existing) = state.by_source_id.get(source_id) {
            if existing.target_id == target_id && existing.kind == kind && existing.name == name {
                return Ok(());
            }
            return Err(ReplicationError::state_invalid(
                "mapper",
                format!(
                    "conflicting rebind of source id '{source_id}': existing target '{}' vs new '{target_id}'",
                    existing.target_id
                ),
            ));
        }
        state.by_source_id.insert(
            source_id.to_string(),
            MappingEntry {
                target_id: target_id.to_string(),
                kind,
                name: name.to_string(),
            },
        );
        Ok(())
    }

    pub fn lookup_id(&self, source_id: &str) -> Option<MappingEntry> {
        let state = self.state.lock().expect("id mapper lock poisoned");
        state.by_source_id.get(source_id).cloned()
    }

    /// Substitute mapped ids, preserve order, leave unknown ids unchanged
    /// and return the list of ids that had no binding (for the caller to
    /// turn into warnings).
    pub fn remap_id_list(&self, ids: &[String]) -> (Vec<String>, Vec<String>) {
        let state = self.state.lock().expect("id mapper lock poisoned");
        let mut remapped = Vec::with_capacity(ids.len());
        let mut unresolved = Vec::new();
        for id in ids {
            match state.by_source_id.get(id) {
                Some(entry) => remapped.push(entry.target_id.clone()),
                None => {
                    remapped.push(id.clone());
                    unresolved.push(id.clone());
                }
            }
        }
        (remapped, unresolved)
    }

    /// Bind a source template-type string to its target form. Same
    /// idempotent/conflict discipline as `bind`.
    pub fn bind_template_type(
        &self,
        source_type: &str,
        target_type: &str,
    ) -> Result<(), ReplicationError> {
        let mut state = self.state.lock().expect("id mapper lock poisoned");
        if let Some(existing) = state.template_types.get(source_type) {
            if existing == target_type {
                return Ok(());
            }
            return Err(ReplicationError::state_invalid(
                "mapper",
                format!(
                    "conflicting template type rebind of '{source_type}': existing '{existing}' vs new '{target_type}'"
                ),
            ));
        }
        state
            .template_types
            .insert(source_type.to_string(), target_type.to_string());
        Ok(())
    }

    pub fn resolve_template_type(&self, source_type: &str) -> Option<String> {
        let state = self.state.lock().expect("id mapper lock poisoned");
        state.template_types.get(source_type).cloned()
    }

    /// Number of ids currently bound. Used by tests and progress reporting.
    pub fn len(&self) -> usize {
        let state = self.state.lock().expect("id mapper lock poisoned");
        state.by_source_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot every `sourceId -> targetId` binding, for the workflow
    /// result's `idMapping` output surface (spec §6).
    pub fn entries(&self) -> Vec<(String, MappingEntry)> {
        let state = self.state.lock().expect("id mapper lock poisoned");
        state
            .by_source_id
            .iter()
            .map(|(source_id, entry)| (source_id.clone(), entry.clone()))
            .collect()
    }
}
