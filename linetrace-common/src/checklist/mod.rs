//! Checklist form protocol
//!
//! - Question set per product type with stable item keys
//! - Complement requirements per item key
//! - Whole-form validation and answer encoding
//! - Guarded submission with best-effort evidence photos

pub mod form;
pub mod submit;
pub mod template;

pub use form::{encode_answers, validate, ChecklistSubmission, ItemResponse, ValidatedItem, ValidationError};
pub use submit::{
    ChecklistService, FormGate, FormPhase, PhotoUpload, RowFailure, SubmitError, SubmitPermit, SubmitReceipt,
};
pub use template::{ChecklistTemplate, ComplementKind, Question};
