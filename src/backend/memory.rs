//! In-memory reference/test implementation of [`BackendAdapter`].
//!
//! Stands in for "the remote backend itself", which spec §1 places out of
//! scope. Implements the per-workspace response cache with TTL from spec
//! §5 and the duplicate-name and rate-limit-classification behaviors the
//! Builder depends on.

use crate::backend::adapter::{BackendAdapter, ListOptions};
use crate::backend::cache::ResponseCache;
use crate::error::ReplicationError;
use crate::types::{EntityKind, Tag, Template, Trigger, Variable, WorkspaceSnapshot};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Store {
    tags: HashMap<String, Tag>,
    triggers: HashMap<String, Trigger>,
    variables: HashMap<String, Variable>,
    templates: HashMap<String, Template>,
}

/// An in-memory backend double. Not thread-hostile: all mutable state is
/// behind a single mutex, mirroring the teacher's `Arc<Mutex<Connection>>`
/// pattern in `db::Database`.
pub struct InMemoryBackend {
    store: Mutex<Store>,
    cache: ResponseCache,
    next_id: AtomicU64,
    /// Ids that should return a rate-limit error on the next `create_*`
    /// call, for exercising the Builder's retry/backoff path in tests.
    fail_next_creates_with_rate_limit: AtomicU64,
    /// Count of upcoming `create_*` calls that should fail with a plain
    /// (non-rate-limit, non-duplicate) `creation_failed` error, for
    /// exercising the Builder's rollback path in tests.
    fail_next_creates_with_error: AtomicU64,
    /// Entity name that should fail with `creation_failed` regardless of
    /// creation order, for deterministic rollback tests over a full plan.
    fail_creates_named: Mutex<Option<String>>,
    /// Count of upcoming `delete_*` calls that should fail, for exercising
    /// a rollback's `isPartial` path.
    fail_next_deletes_with_error: AtomicU64,
}

impl InMemoryBackend {
    pub fn new(cache_ttl_seconds: u64) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            cache: ResponseCache::new(cache_ttl_seconds),
            next_id: AtomicU64::new(1),
            fail_next_creates_with_rate_limit: AtomicU64::new(0),
            fail_next_creates_with_error: AtomicU64::new(0),
            fail_creates_named: Mutex::new(None),
            fail_next_deletes_with_error: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Seed a fresh backend from a previously-exported [`WorkspaceSnapshot`],
    /// preserving its ids (unlike `create_*`, which assigns new ones). Used
    /// by the CLI to load a source or target workspace from a JSON file.
    pub fn from_snapshot(snapshot: WorkspaceSnapshot) -> Self {
        let backend = Self::default();
        {
            let mut store = backend.store.lock().expect("store lock poisoned");
            for tag in snapshot.tags {
                store.tags.insert(tag.tag_id.clone(), tag);
            }
            for trigger in snapshot.triggers {
                store.triggers.insert(trigger.trigger_id.clone(), trigger);
            }
            for variable in snapshot.variables {
                store.variables.insert(variable.variable_id.clone(), variable);
            }
            for template in snapshot.templates {
                store.templates.insert(template.template_id.clone(), template);
            }
        }
        backend
    }

    /// Snapshot this backend's current contents (bypassing the response cache).
    pub fn to_snapshot(&self) -> WorkspaceSnapshot {
        let store = self.store.lock().expect("store lock poisoned");
        WorkspaceSnapshot {
            tags: store.tags.values().cloned().collect(),
            triggers: store.triggers.values().cloned().collect(),
            variables: store.variables.values().cloned().collect(),
            templates: store.templates.values().cloned().collect(),
        }
    }

    /// Test hook: make the next `n` `create_*` calls fail as rate-limited.
    pub fn fail_next_creates_with_rate_limit(&self, n: u64) {
        self.fail_next_creates_with_rate_limit.store(n, Ordering::Relaxed);
    }

    /// Test hook: make the next `n` `create_*` calls fail with a plain
    /// `creation_failed` error, for exercising rollback.
    pub fn fail_next_creates_with_error(&self, n: u64) {
        self.fail_next_creates_with_error.store(n, Ordering::Relaxed);
    }

    /// Test hook: make the `create_*` call for entity `name` fail with a
    /// plain `creation_failed` error, regardless of when it runs in a plan.
    pub fn fail_creates_named(&self, name: impl Into<String>) {
        *self.fail_creates_named.lock().expect("fail_creates_named lock poisoned") = Some(name.into());
    }

    /// Test hook: make the next `n` `delete_*` calls fail, for exercising a
    /// rollback that itself fails partway through (spec's `isPartial` path).
    pub fn fail_next_deletes_with_error(&self, n: u64) {
        self.fail_next_deletes_with_error.store(n, Ordering::Relaxed);
    }

    fn maybe_fail_delete(&self) -> Result<(), ReplicationError> {
        let remaining = self.fail_next_deletes_with_error.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_next_deletes_with_error.store(remaining - 1, Ordering::Relaxed);
            return Err(ReplicationError::transport(
                "backend::memory",
                "simulated delete failure",
            ));
        }
        Ok(())
    }

    fn maybe_rate_limit(&self, name: &str) -> Result<(), ReplicationError> {
        let remaining = self.fail_next_creates_with_rate_limit.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_next_creates_with_rate_limit.store(remaining - 1, Ordering::Relaxed);
            return Err(ReplicationError::rate_limit(
                "backend::memory",
                "429 too many requests",
            ));
        }
        let remaining = self.fail_next_creates_with_error.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_next_creates_with_error.store(remaining - 1, Ordering::Relaxed);
            return Err(ReplicationError::creation_failed(
                "backend::memory",
                "simulated creation failure",
            ));
        }
        if self.fail_creates_named.lock().expect("fail_creates_named lock poisoned").as_deref() == Some(name) {
            return Err(ReplicationError::creation_failed(
                "backend::memory",
                format!("simulated creation failure for '{name}'"),
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(60)
    }
}

#[async_trait]
impl BackendAdapter for InMemoryBackend {
    async fn get_tag(&self, id: &str) -> Result<Option<Tag>, ReplicationError> {
        Ok(self.store.lock().expect("store lock poisoned").tags.get(id).cloned())
    }

    async fn get_trigger(&self, id: &str) -> Result<Option<Trigger>, ReplicationError> {
        Ok(self.store.lock().expect("store lock poisoned").triggers.get(id).cloned())
    }

    async fn get_variable(&self, id: &str) -> Result<Option<Variable>, ReplicationError> {
        Ok(self.store.lock().expect("store lock poisoned").variables.get(id).cloned())
    }

    async fn get_template(&self, id: &str) -> Result<Option<Template>, ReplicationError> {
        Ok(self.store.lock().expect("store lock poisoned").templates.get(id).cloned())
    }

    async fn list_tags(&self, options: ListOptions) -> Result<Vec<Tag>, ReplicationError> {
        if !options.refresh {
            if let Some(cached) = self.cache.get(EntityKind::Tag) {
                return Ok(cached
                    .into_iter()
                    .filter_map(|v| serde_json::from_value(v).ok())
                    .collect());
            }
        }
        let tags: Vec<Tag> = self
            .store
            .lock()
            .expect("store lock poisoned")
            .tags
            .values()
            .cloned()
            .collect();
        self.cache.put(
            EntityKind::Tag,
            tags.iter().filter_map(|t| serde_json::to_value(t).ok()).collect(),
        );
        Ok(tags)
    }

    async fn list_triggers(&self, options: ListOptions) -> Result<Vec<Trigger>, ReplicationError> {
        if !options.refresh {
            if let Some(cached) = self.cache.get(EntityKind::Trigger) {
                return Ok(cached
                    .into_iter()
                    .filter_map(|v| serde_json::from_value(v).ok())
                    .collect());
            }
        }
        let triggers: Vec<Trigger> = self
            .store
            .lock()
            .expect("store lock poisoned")
            .triggers
            .values()
            .cloned()
            .collect();
        self.cache.put(
            EntityKind::Trigger,
            triggers.iter().filter_map(|t| serde_json::to_value(t).ok()).collect(),
        );
        Ok(triggers)
    }

    async fn list_variables(&self, options: ListOptions) -> Result<Vec<Variable>, ReplicationError> {
        if !options.refresh {
            if let Some(cached) = self.cache.get(EntityKind::Variable) {
                return Ok(cached
                    .into_iter()
                    .filter_map(|v| serde_json::from_value(v).ok())
                    .collect());
            }
        }
        let variables: Vec<Variable> = self
            .store
            .lock()
            .expect("store lock poisoned")
            .variables
            .values()
            .cloned()
            .collect();
        self.cache.put(
            EntityKind::Variable,
            variables.iter().filter_map(|v| serde_json::to_value(v).ok()).collect(),
        );
        Ok(variables)
    }

    async fn list_templates(&self, options: ListOptions) -> Result<Vec<Template>, ReplicationError> {
        if !options.refresh {
            if let Some(cached) = self.cache.get(EntityKind::Template) {
                return Ok(cached
                    .into_iter()
                    .filter_map(|v| serde_json::from_value(v).ok())
                    .collect());
            }
        }
        let templates: Vec<Template> = self
            .store
            .lock()
            .expect("store lock poisoned")
            .templates
            .values()
            .cloned()
            .collect();
        self.cache.put(
            EntityKind::Template,
            templates.iter().filter_map(|t| serde_json::to_value(t).ok()).collect(),
        );
        Ok(templates)
    }

    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>, ReplicationError> {
        Ok(self
            .store
            .lock()
            .expect("store lock poisoned")
            .tags
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn find_trigger_by_name(&self, name: &str) -> Result<Option<Trigger>, ReplicationError> {
        Ok(self
            .store
            .lock()
            .expect("store lock poisoned")
            .triggers
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn find_variable_by_name(&self, name: &str) -> Result<Option<Variable>, ReplicationError> {
        Ok(self
            .store
            .lock()
            .expect("store lock poisoned")
            .variables
            .values()
            .find(|v| v.name == name)
            .cloned())
    }

    async fn find_template_by_name(&self, name: &str) -> Result<Option<Template>, ReplicationError> {
        Ok(self
            .store
            .lock()
            .expect("store lock poisoned")
            .templates
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn create_tag(&self, mut payload: Tag) -> Result<Tag, ReplicationError> {
        self.maybe_rate_limit(&payload.name)?;
        if self.find_tag_by_name(&payload.name).await?.is_some() {
            return Err(ReplicationError::duplicate_name(
                "backend::memory",
                format!("tag '{}' already exists", payload.name),
            ));
        }
        payload.tag_id = self.next_id();
        self.store
            .lock()
            .expect("store lock poisoned")
            .tags
            .insert(payload.tag_id.clone(), payload.clone());
        self.cache.invalidate(EntityKind::Tag);
        Ok(payload)
    }

    async fn create_trigger(&self, mut payload: Trigger) -> Result<Trigger, ReplicationError> {
        self.maybe_rate_limit(&payload.name)?;
        if self.find_trigger_by_name(&payload.name).await?.is_some() {
            return Err(ReplicationError::duplicate_name(
                "backend::memory",
                format!("trigger '{}' already exists", payload.name),
            ));
        }
        payload.trigger_id = self.next_id();
        self.store
            .lock()
            .expect("store lock poisoned")
            .triggers
            .insert(payload.trigger_id.clone(), payload.clone());
        self.cache.invalidate(EntityKind::Trigger);
        Ok(payload)
    }

    async fn create_variable(&self, mut payload: Variable) -> Result<Variable, ReplicationError> {
        self.maybe_rate_limit(&payload.name)?;
        if self.find_variable_by_name(&payload.name).await?.is_some() {
            return Err(ReplicationError::duplicate_name(
                "backend::memory",
                format!("variable '{}' already exists", payload.name),
            ));
        }
        payload.variable_id = self.next_id();
        self.store
            .lock()
            .expect("store lock poisoned")
            .variables
            .insert(payload.variable_id.clone(), payload.clone());
        self.cache.invalidate(EntityKind::Variable);
        Ok(payload)
    }

    async fn create_template(&self, mut payload: Template) -> Result<Template, ReplicationError> {
        self.maybe_rate_limit(&payload.name)?;
        if self.find_template_by_name(&payload.name).await?.is_some() {
            return Err(ReplicationError::duplicate_name(
                "backend::memory",
                format!("template '{}' already exists", payload.name),
            ));
        }
        payload.template_id = self.next_id();
        if payload.container_id.is_empty() {
            payload.container_id = "210926331".to_string();
        }
        self.store
            .lock()
            .expect("store lock poisoned")
            .templates
            .insert(payload.template_id.clone(), payload.clone());
        self.cache.invalidate(EntityKind::Template);
        Ok(payload)
    }

    async fn delete_tag(&self, id: &str) -> Result<(), ReplicationError> {
        self.maybe_fail_delete()?;
        self.store.lock().expect("store lock poisoned").tags.remove(id);
        self.cache.invalidate(EntityKind::Tag);
        Ok(())
    }

    async fn delete_trigger(&self, id: &str) -> Result<(), ReplicationError> {
        self.maybe_fail_delete()?;
        self.store.lock().expect("store lock poisoned").triggers.remove(id);
        self.cache.invalidate(EntityKind::Trigger);
        Ok(())
    }

    async fn delete_variable(&self, id: &str) -> Result<(), ReplicationError> {
        self.maybe_fail_delete()?;
        self.store.lock().expect("store lock poisoned").variables.remove(id);
        self.cache.invalidate(EntityKind::Variable);
        Ok(())
    }

    async fn delete_template(&self, id: &str) -> Result<(), ReplicationError> {
        self.maybe_fail_delete()?;
        self.store.lock().expect("store lock poisoned").templates.remove(id);
        self.cache.invalidate(EntityKind::Template);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(name: &str) -> Trigger {
        Trigger {
            trigger_id: String::new(),
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

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let backend = InMemoryBackend::default();
        let created = backend.create_trigger(trigger("Click")).await.unwrap();
        assert!(!created.trigger_id.is_empty());
        let fetched = backend.get_trigger(&created.trigger_id).await.unwrap();
        assert_eq!(fetched.unwrap().name, "Click");
    }

    #[tokio::test]
    async fn duplicate_name_create_is_rejected() {
        let backend = InMemoryBackend::default();
        backend.create_trigger(trigger("Click")).await.unwrap();
        let err = backend.create_trigger(trigger("Click")).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::DuplicateName);
    }

    #[tokio::test]
    async fn list_without_refresh_reflects_new_entity_per_cache_coherence_invariant() {
        let backend = InMemoryBackend::default();
        backend.create_trigger(trigger("Click")).await.unwrap();
        let listed = backend.list_triggers(ListOptions::default()).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_hook_surfaces_rate_limit_error() {
        let backend = InMemoryBackend::default();
        backend.fail_next_creates_with_rate_limit(1);
        let err = backend.create_trigger(trigger("Click")).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn from_snapshot_preserves_ids_and_round_trips_via_to_snapshot() {
        let mut snapshot = WorkspaceSnapshot::default();
        snapshot.triggers.push(trigger("Click"));
        snapshot.triggers[0].trigger_id = "preserved-id".to_string();

        let backend = InMemoryBackend::from_snapshot(snapshot);
        let fetched = backend.get_trigger("preserved-id").await.unwrap();
        assert_eq!(fetched.unwrap().name, "Click");

        let round_tripped = backend.to_snapshot();
        assert_eq!(round_tripped.triggers.len(), 1);
        assert_eq!(round_tripped.triggers[0].trigger_id, "preserved-id");
    }

    #[tokio::test]
    async fn delete_invalidates_cache_entry() {
        let backend = InMemoryBackend::default();
        let created = backend.create_trigger(trigger("Click")).await.unwrap();
        backend.list_triggers(ListOptions::default()).await.unwrap();
        backend.delete_trigger(&created.trigger_id).await.unwrap();
        let listed = backend.list_triggers(ListOptions::default()).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn fail_next_deletes_hook_surfaces_transport_error_then_recovers() {
        let backend = InMemoryBackend::default();
        let created = backend.create_trigger(trigger("Click")).await.unwrap();
        backend.fail_next_deletes_with_error(1);
        let err = backend.delete_trigger(&created.trigger_id).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Transport);
        backend.delete_trigger(&created.trigger_id).await.unwrap();
        let listed = backend.list_triggers(ListOptions::default()).await.unwrap();
        assert!(listed.is_empty());
    }
}
