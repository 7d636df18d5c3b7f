//! End-to-end scenarios S1-S6, driven through the crate's public API
//! against `InMemoryBackend` rather than any internal module's unit tests.

use std::sync::Arc;
use tagconf_replicate::backend::adapter::BackendAdapter;
use tagconf_replicate::backend::memory::InMemoryBackend;
use tagconf_replicate::config::{BuilderConfig, ReplicationConfig};
use tagconf_replicate::error::ErrorKind;
use tagconf_replicate::graph;
use tagconf_replicate::orchestrator::{Orchestrator, ReplicationOptions};
use tagconf_replicate::types::{ParamKind, ParamNode, Tag, TagRef, Template, Trigger, WorkspaceSnapshot};

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

#[tokio::test]
async fn s1_happy_path_two_entity_chain() {
    let source = InMemoryBackend::from_snapshot(WorkspaceSnapshot {
        tags: vec![tag("src-a", "GA4 - Click", "gaawe", vec!["src-t1"])],
        triggers: vec![trigger("src-t1", "Click")],
        variables: vec![],
        templates: vec![],
    });

    let target = Arc::new(InMemoryBackend::default());
    let orchestrator = Orchestrator::new(Arc::new(source), target.clone(), ReplicationConfig::default());
    let result = orchestrator.run("s1".to_string(), ReplicationOptions::default()).await;

    assert!(result.success);
    assert_eq!(result.summary.created_count, 2);
    assert_eq!(result.summary.skipped_count, 0);

    let created_trigger = target.find_trigger_by_name("Click").await.unwrap().unwrap();
    let created_tag = target.find_tag_by_name("GA4 - Click").await.unwrap().unwrap();
    assert_eq!(created_tag.firing_trigger_id, vec![created_trigger.trigger_id]);
}

#[tokio::test]
async fn s2_idempotent_skip_rewrites_firing_trigger_to_existing_target_id() {
    let source = InMemoryBackend::from_snapshot(WorkspaceSnapshot {
        tags: vec![tag("src-a", "GA4 - Click", "gaawe", vec!["src-t1"])],
        triggers: vec![trigger("src-t1", "Click")],
        variables: vec![],
        templates: vec![],
    });

    let target = InMemoryBackend::default();
    target
        .create_trigger(Trigger {
            trigger_id: "tgt-t1-pre".to_string(),
            ..trigger("ignored", "Click")
        })
        .await
        .unwrap();
    let target = Arc::new(target);

    let orchestrator = Orchestrator::new(Arc::new(source), target.clone(), ReplicationConfig::default());
    let options = ReplicationOptions {
        skip_existing: true,
        ..Default::default()
    };
    let result = orchestrator.run("s2".to_string(), options).await;

    assert!(result.success);
    assert_eq!(result.summary.skipped_count, 1);
    assert_eq!(result.summary.created_count, 1);

    let created_tag = target.find_tag_by_name("GA4 - Click").await.unwrap().unwrap();
    assert_eq!(created_tag.firing_trigger_id, vec!["tgt-t1-pre".to_string()]);
}

#[tokio::test]
async fn s3_rate_limit_abort_after_exhausted_retries() {
    let source = InMemoryBackend::from_snapshot(WorkspaceSnapshot {
        triggers: vec![trigger("src-t1", "Click")],
        ..Default::default()
    });

    let target = InMemoryBackend::default();
    target.fail_next_creates_with_rate_limit(10);
    let target = Arc::new(target);

    let config = ReplicationConfig {
        builder: BuilderConfig {
            inter_request_delay_ms: 0,
            max_retries: 2,
            rate_limit_backoff_base_ms: 1,
            rate_limit_backoff_cap_ms: 5,
            ..Default::default()
        },
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(Arc::new(source), target, config);
    let result = orchestrator.run("s3".to_string(), ReplicationOptions::default()).await;

    assert!(!result.success);
    assert!(result.created_entities.is_empty());
    assert_eq!(result.summary.created_count, 0);
    assert!(result.errors.iter().any(|e| e.kind == ErrorKind::RateLimit));
}

#[tokio::test]
async fn s4_rollback_on_failure_deletes_in_reverse_order() {
    let source = InMemoryBackend::from_snapshot(WorkspaceSnapshot {
        tags: vec![
            tag("src-a", "Tag A", "html", vec![]),
            tag("src-b", "Tag B", "html", vec![]),
            tag("src-c", "Tag C", "html", vec![]),
        ],
        ..Default::default()
    });

    let target = InMemoryBackend::default();
    target.fail_creates_named("Tag C");
    let target = Arc::new(target);

    let config = ReplicationConfig {
        builder: BuilderConfig {
            inter_request_delay_ms: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(Arc::new(source), target.clone(), config);
    let result = orchestrator.run("s4".to_string(), ReplicationOptions::default()).await;

    assert!(!result.success);
    assert!(result.created_entities.is_empty());
    assert!(target.find_tag_by_name("Tag A").await.unwrap().is_none());
    assert!(target.find_tag_by_name("Tag B").await.unwrap().is_none());
}

#[tokio::test]
async fn rollback_is_partial_when_target_rejects_a_delete() {
    let source = InMemoryBackend::from_snapshot(WorkspaceSnapshot {
        tags: vec![
            tag("src-a", "Tag A", "html", vec![]),
            tag("src-b", "Tag B", "html", vec![]),
        ],
        ..Default::default()
    });

    let target = InMemoryBackend::default();
    target.fail_creates_named("Tag B");
    target.fail_next_deletes_with_error(1);
    let target = Arc::new(target);

    let config = ReplicationConfig {
        builder: BuilderConfig {
            inter_request_delay_ms: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(Arc::new(source), target.clone(), config);
    let result = orchestrator.run("rollback-partial".to_string(), ReplicationOptions::default()).await;

    assert!(!result.success);
    let rollback = result.rollback_result.unwrap();
    assert!(rollback.is_partial);
    assert_eq!(rollback.failed.len(), 1);
    assert!(target.find_tag_by_name("Tag A").await.unwrap().is_some());
}

#[tokio::test]
async fn s5_template_type_remap_rewrites_dependent_tag_type() {
    let source = InMemoryBackend::from_snapshot(WorkspaceSnapshot {
        tags: vec![tag("src-a", "Uses Template", "cvt_172990757_195", vec![])],
        templates: vec![Template {
            template_id: "195".to_string(),
            name: "My Template".to_string(),
            template_data: r#"{"id": "cvt_KDDGR"}"#.to_string(),
            container_id: "172990757".to_string(),
            account_id: None,
            workspace_id: None,
            gallery_reference: None,
        }],
        ..Default::default()
    });

    let target = Arc::new(InMemoryBackend::default());
    let orchestrator = Orchestrator::new(Arc::new(source), target.clone(), ReplicationConfig::default());
    let result = orchestrator.run("s5".to_string(), ReplicationOptions::default()).await;

    assert!(result.success);
    let created_tag = target.find_tag_by_name("Uses Template").await.unwrap().unwrap();
    let created_template = target.find_template_by_name("My Template").await.unwrap().unwrap();
    assert_eq!(created_tag.tag_type, created_template.type_string());
}

#[tokio::test]
async fn s6_same_kind_cycle_detection_blocks_analysis_before_any_plan() {
    let mut a = tag("a", "A", "html", vec![]);
    a.setup_tag = Some(TagRef::Id("b".to_string()));
    let mut b = tag("b", "B", "html", vec![]);
    b.setup_tag = Some(TagRef::Id("a".to_string()));

    let snapshot = WorkspaceSnapshot {
        tags: vec![a, b],
        ..Default::default()
    };

    let err = graph::analyze(&snapshot).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CircularDependency);

    let source = InMemoryBackend::from_snapshot(snapshot);
    let target = Arc::new(InMemoryBackend::default());
    let orchestrator = Orchestrator::new(Arc::new(source), target, ReplicationConfig::default());
    let result = orchestrator.run("s6".to_string(), ReplicationOptions::default()).await;
    assert!(!result.success);
    assert_eq!(result.errors[0].kind, ErrorKind::CircularDependency);
}

#[tokio::test]
async fn unresolved_variable_reference_is_a_warning_not_a_blocker() {
    let mut with_missing_var = tag("src-a", "A", "html", vec![]);
    with_missing_var
        .parameter
        .push(ParamNode::leaf(ParamKind::Template, "html", "{{missing}}"));

    let source = InMemoryBackend::from_snapshot(WorkspaceSnapshot {
        tags: vec![with_missing_var],
        ..Default::default()
    });
    let target = Arc::new(InMemoryBackend::default());
    let orchestrator = Orchestrator::new(Arc::new(source), target, ReplicationConfig::default());
    let result = orchestrator.run("boundary-1".to_string(), ReplicationOptions::default()).await;

    assert!(result.success);
    assert_eq!(result.summary.created_count, 1);
}
