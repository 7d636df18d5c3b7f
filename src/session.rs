//! Process-wide session registry, per spec §5.
//!
//! Mirrors the teacher's single `Arc<Mutex<Connection>>` pattern in
//! `db::Database`, but keyed by session id and scoped to a process-wide
//! static so progress queries can reach a running session from outside the
//! call that started it.

use crate::types::{Phase, ProgressView, SessionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Shared, externally-observable state for one in-flight replication
/// session.
pub struct SessionHandle {
    pub session_id: SessionId,
    progress: Mutex<ProgressView>,
    cancelled: AtomicBool,
}

impl SessionHandle {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            progress: Mutex::new(ProgressView {
                phase: Phase::Idle,
                current_step: 0,
                total_steps: 0,
                description: "idle".to_string(),
                percentage: 0.0,
            }),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn update_progress(&self, progress: ProgressView) {
        *self.progress.lock().expect("session progress lock poisoned") = progress;
    }

    pub fn progress(&self) -> ProgressView {
        self.progress.lock().expect("session progress lock poisoned").clone()
    }

    /// Request cancellation. Checked by the Orchestrator at phase
    /// boundaries and by the Builder before each CREATE (spec §5).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

fn registry() -> &'static Mutex<HashMap<SessionId, Arc<SessionHandle>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<SessionId, Arc<SessionHandle>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register a new session, returning its shared handle.
pub fn register(session_id: SessionId) -> Arc<SessionHandle> {
    let handle = Arc::new(SessionHandle::new(session_id.clone()));
    registry()
        .lock()
        .expect("session registry lock poisoned")
        .insert(session_id, handle.clone());
    handle
}

/// Look up a running session's handle by id.
pub fn lookup(session_id: &str) -> Option<Arc<SessionHandle>> {
    registry()
        .lock()
        .expect("session registry lock poisoned")
        .get(session_id)
        .cloned()
}

/// Remove a session's handle from the registry. Called on teardown once a
/// workflow reaches `completed` or `error`.
pub fn unregister(session_id: &str) {
    registry().lock().expect("session registry lock poisoned").remove(session_id);
}
