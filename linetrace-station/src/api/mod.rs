//! HTTP API handlers for linetrace-station

pub mod checklist;
pub mod error;
pub mod health;
pub mod records;
pub mod sessions;

pub use checklist::{checklist_template, pending_checklists, submit_checklist};
pub use error::ApiError;
pub use health::health_routes;
pub use records::recent_records;
pub use sessions::{close_session, get_session, open_session, scan, set_product_type};
