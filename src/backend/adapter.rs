//! Backend Adapter trait: abstract CRUD over remote entities, per spec §6.
//!
//! The remote backend itself is out of scope (spec §1); this trait is the
//! "interface" the core pipeline consumes. [`crate::backend::memory`]
//! ships the one concrete implementation: an in-memory reference/test
//! double.

use crate::error::ReplicationError;
use crate::types::{EntityKind, Tag, Template, Trigger, Variable};
use async_trait::async_trait;

/// Options for a listing call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Bypass the response cache and fetch fresh data.
    pub refresh: bool,
}

/// Abstract CRUD surface the pipeline drives. Any concrete implementation
/// (remote API, in-memory fake) must provide these operations; adapters own
/// their own pagination and per-workspace response cache (spec §5).
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    async fn get_tag(&self, id: &str) -> Result<Option<Tag>, ReplicationError>;
    async fn get_trigger(&self, id: &str) -> Result<Option<Trigger>, ReplicationError>;
    async fn get_variable(&self, id: &str) -> Result<Option<Variable>, ReplicationError>;
    async fn get_template(&self, id: &str) -> Result<Option<Template>, ReplicationError>;

    async fn list_tags(&self, options: ListOptions) -> Result<Vec<Tag>, ReplicationError>;
    async fn list_triggers(&self, options: ListOptions) -> Result<Vec<Trigger>, ReplicationError>;
    async fn list_variables(&self, options: ListOptions) -> Result<Vec<Variable>, ReplicationError>;
    async fn list_templates(&self, options: ListOptions) -> Result<Vec<Template>, ReplicationError>;

    async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>, ReplicationError>;
    async fn find_trigger_by_name(&self, name: &str) -> Result<Option<Trigger>, ReplicationError>;
    async fn find_variable_by_name(&self, name: &str) -> Result<Option<Variable>, ReplicationError>;
    async fn find_template_by_name(&self, name: &str) -> Result<Option<Template>, ReplicationError>;

    async fn create_tag(&self, payload: Tag) -> Result<Tag, ReplicationError>;
    async fn create_trigger(&self, payload: Trigger) -> Result<Trigger, ReplicationError>;
    async fn create_variable(&self, payload: Variable) -> Result<Variable, ReplicationError>;
    async fn create_template(&self, payload: Template) -> Result<Template, ReplicationError>;

    async fn delete_tag(&self, id: &str) -> Result<(), ReplicationError>;
    async fn delete_trigger(&self, id: &str) -> Result<(), ReplicationError>;
    async fn delete_variable(&self, id: &str) -> Result<(), ReplicationError>;
    async fn delete_template(&self, id: &str) -> Result<(), ReplicationError>;

    /// Whether this adapter can create templates. An adapter that cannot
    /// must expose that here rather than throwing at call time (spec §6).
    fn can_create_templates(&self) -> bool {
        true
    }

    /// The entity kind's plural name, used for diagnostics.
    fn kind_label(&self, kind: EntityKind) -> &'static str {
        kind.as_str()
    }
}
