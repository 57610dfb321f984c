//! # LineTrace Common Library
//!
//! Shared code for the LineTrace station including:
//! - Code normalization and path sanitization
//! - Scan intake state machine
//! - Record store adapter with duplicate detection
//! - Pending-checklist resolution
//! - Checklist form protocol (questions, validation, encoding)
//! - Evidence photo naming and upload
//! - Configuration loading

pub mod checklist;
pub mod codes;
pub mod config;
pub mod error;
pub mod evidence;
pub mod intake;
pub mod model;
pub mod pending;
pub mod storage;
pub mod store;
pub mod time;

pub use codes::{normalize_code, sanitize_for_path, Code};
pub use error::{Error, Result};
pub use model::{ChecklistStatus, ProductType};
