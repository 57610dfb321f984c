//! Operator session registry
//!
//! Each operator session owns its own scan context and checklist form gate.
//! The registry lock only guards the map lookup; the scan context has its own
//! async lock so one session's scans run in arrival order while other
//! sessions proceed independently.
//!
//! Sessions end either when the client closes them or when they sit idle
//! past the configured timeout. Idle sessions are swept whenever a new
//! session is opened; a session with a checklist in flight is never swept.

use chrono::{DateTime, Duration, Utc};
use linetrace_common::checklist::{FormGate, FormPhase};
use linetrace_common::intake::{Advisory, IntakeState, ScanSession};
use linetrace_common::{Code, ProductType};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

/// One operator's station session
#[derive(Clone)]
pub struct StationSession {
    pub scan: Arc<tokio::sync::Mutex<ScanSession>>,
    pub gate: FormGate,
}

impl StationSession {
    fn new(operator: String, product_type: ProductType) -> Self {
        Self {
            scan: Arc::new(tokio::sync::Mutex::new(ScanSession::new(operator, product_type))),
            gate: FormGate::new(),
        }
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub operator: String,
    pub product_type: ProductType,
    #[serde(flatten)]
    pub state: IntakeState,
    pub pending_order: Option<Code>,
    pub input: String,
    pub advisory: Option<Advisory>,
    pub form: FormPhase,
}

impl SessionSnapshot {
    pub fn capture(id: Uuid, scan: &ScanSession, gate: &FormGate) -> Self {
        Self {
            id,
            operator: scan.operator().to_string(),
            product_type: scan.product_type(),
            state: scan.state().clone(),
            pending_order: scan.pending_order().cloned(),
            input: scan.input().to_string(),
            advisory: scan.advisory().cloned(),
            form: gate.phase(),
        }
    }
}

struct Entry {
    session: StationSession,
    last_seen: DateTime<Utc>,
}

/// Open operator sessions, keyed by id
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, Entry>>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
        }
    }

    /// Register a new session and return its id
    ///
    /// Sweeps sessions idle for longer than the timeout first.
    pub fn open(
        &self,
        operator: impl Into<String>,
        product_type: ProductType,
        now: DateTime<Utc>,
    ) -> (Uuid, StationSession) {
        let id = Uuid::new_v4();
        let session = StationSession::new(operator.into(), product_type);

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, entry| {
            now - entry.last_seen <= self.idle_timeout || entry.session.gate.phase() == FormPhase::Busy
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!("Evicted {} idle session(s)", evicted);
        }

        sessions.insert(
            id,
            Entry {
                session: session.clone(),
                last_seen: now,
            },
        );
        (id, session)
    }

    /// Look up a session and mark it active
    pub fn get(&self, id: &Uuid, now: DateTime<Utc>) -> Option<StationSession> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let entry = sessions.get_mut(id)?;
        entry.last_seen = now;
        Some(entry.session.clone())
    }

    /// Drop a session; returns false when the id is unknown
    pub fn close(&self, id: &Uuid) -> bool {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
