//! linetrace-station library - shop-floor traceability station
//!
//! Serves the scan intake, pending-checklist queue, checklist form and
//! dashboard over HTTP. One process serves every operator session on the
//! station; sessions never share intake or form state.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use linetrace_common::checklist::ChecklistService;
use linetrace_common::config::StationConfig;
use linetrace_common::evidence::EvidenceUploader;
use linetrace_common::intake::ScanIntake;
use linetrace_common::pending::PendingResolver;
use linetrace_common::storage::ObjectStorage;
use linetrace_common::store::{RecordStore, TraceabilityStore};
use linetrace_common::time::Clock;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod sessions;

use sessions::SessionRegistry;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<StationConfig>,
    pub sessions: SessionRegistry,
    pub records: TraceabilityStore,
    pub intake: ScanIntake,
    pub pending: PendingResolver,
    pub checklist: ChecklistService,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire the services from configuration
    ///
    /// Evidence photos are accepted only when an object storage is given.
    pub fn new(
        config: StationConfig,
        backend: Arc<dyn RecordStore>,
        storage: Option<Arc<dyn ObjectStorage>>,
        clock: Arc<dyn Clock>,
    ) -> linetrace_common::Result<Self> {
        let policies = config.policies;
        let tz = config.tz()?;
        let sessions = SessionRegistry::new(config.session_idle_timeout());

        let records = TraceabilityStore::new(Arc::clone(&backend), policies.dedup_key);
        let intake = ScanIntake::new(records.clone(), policies.on_duplicate);
        let pending = PendingResolver::new(records.clone(), policies.completion_marker, tz);

        let mut checklist = ChecklistService::new(Arc::clone(&backend), policies);
        if let Some(storage) = storage {
            checklist = checklist.with_evidence(EvidenceUploader::new(storage, backend));
        }

        Ok(Self {
            config: Arc::new(config),
            sessions,
            records,
            intake,
            pending,
            checklist,
            clock,
        })
    }
}

/// Build application router
///
/// Checklist submissions carry base64 photos, so their route takes the
/// configured body cap instead of axum's 2 MB default.
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post, put};

    let evidence = ServeDir::new(&state.config.evidence_root);
    let submission_limit = DefaultBodyLimit::max(state.config.max_submission_bytes);

    Router::new()
        .route("/api/sessions", post(api::open_session))
        .route("/api/sessions/:id", get(api::get_session).delete(api::close_session))
        .route("/api/sessions/:id/product-type", put(api::set_product_type))
        .route("/api/sessions/:id/scan", post(api::scan))
        .route(
            "/api/sessions/:id/checklist",
            post(api::submit_checklist).layer(submission_limit),
        )
        .route("/api/records/recent", get(api::recent_records))
        .route("/api/checklist/pending", get(api::pending_checklists))
        .route("/api/checklist/template/:product_type", get(api::checklist_template))
        .merge(api::health_routes())
        .nest_service("/evidence", evidence)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
