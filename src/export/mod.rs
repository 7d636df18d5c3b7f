//! Snapshot export: a versioned, diffable JSON rendering of a
//! [`WorkspaceSnapshot`], per SPEC_FULL §4.11.
//!
//! Gives operators an offline artifact to inspect a plan's inputs and gives
//! the `validate` CLI subcommand something to diff against. Not used for
//! replay or persistence of workflow results.

pub mod diff;

use crate::types::WorkspaceSnapshot;
use serde::{Deserialize, Serialize};

/// Schema version of the [`WorkspaceSnapshot`] data model this snapshot
/// format carries. Bump when a breaking change lands in `types.rs`.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Export format version (semver).
pub const EXPORT_VERSION: &str = "1.0.0";

/// A versioned export of one workspace's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: i32,
    pub export_version: String,
    /// ISO 8601 timestamp of export.
    pub exported_at: String,
    /// Tool name and version that created this export.
    pub exported_by: String,
    pub workspace: WorkspaceSnapshot,
}

impl Snapshot {
    pub fn new(workspace: WorkspaceSnapshot) -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            export_version: EXPORT_VERSION.to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            exported_by: format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            workspace,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn is_schema_compatible(&self) -> bool {
        self.schema_version == CURRENT_SCHEMA_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Trigger;

    #[test]
    fn snapshot_json_roundtrip() {
        let mut workspace = WorkspaceSnapshot::default();
        workspace.triggers.push(Trigger {
            trigger_id: "1".into(),
            name: "Click".into(),
            trigger_type: "customEvent".into(),
            parameter: vec![],
            filter: vec![],
            custom_event_filter: None,
            auto_event_filter: None,
            account_id: None,
            container_id: None,
            workspace_id: None,
        });

        let snapshot = Snapshot::new(workspace);
        let json = snapshot.to_json_pretty().unwrap();
        let loaded = Snapshot::from_json(&json).unwrap();

        assert_eq!(loaded.schema_version, snapshot.schema_version);
        assert_eq!(loaded.workspace.triggers.len(), 1);
        assert!(loaded.is_schema_compatible());
    }
}
