//! Checklist submission
//!
//! A submission is bound to its traceability record, validated as a whole,
//! then written one answer row at a time. There is no cross-row transaction:
//! rows that made it stay written when a later row fails, and the failures
//! are reported together.

use super::form::{encode_answers, validate, ChecklistSubmission, ValidationError};
use super::template::ChecklistTemplate;
use crate::codes::Code;
use crate::config::{CompletionMarker, Policies};
use crate::evidence::{EvidenceContext, EvidenceUploader};
use crate::model::{ChecklistHeader, EvidencePhoto, PhotoOrigin, ProductType, UnitKey};
use crate::store::RecordStore;
use crate::time::Clock;
use crate::Error;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};

/// Phase of a checklist form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormPhase {
    Ready,
    Busy,
}

/// Re-entrancy gate for one operator's checklist form
///
/// A submit moves the form to `Busy` for as long as its [`SubmitPermit`]
/// lives. Dropping the permit returns the form to `Ready` on every exit path.
#[derive(Debug, Clone)]
pub struct FormGate {
    phase: Arc<Mutex<FormPhase>>,
}

impl Default for FormGate {
    fn default() -> Self {
        Self {
            phase: Arc::new(Mutex::new(FormPhase::Ready)),
        }
    }
}

impl FormGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> FormPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enter `Busy`, or refuse if a submit is already in flight
    pub fn try_begin(&self) -> Result<SubmitPermit, SubmitError> {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if *phase == FormPhase::Busy {
            return Err(SubmitError::InFlight);
        }
        *phase = FormPhase::Busy;
        Ok(SubmitPermit {
            phase: Arc::clone(&self.phase),
        })
    }
}

/// Proof that a submit holds the form; releases it on drop
#[derive(Debug)]
pub struct SubmitPermit {
    phase: Arc<Mutex<FormPhase>>,
}

impl Drop for SubmitPermit {
    fn drop(&mut self) {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        *phase = FormPhase::Ready;
    }
}

/// One failed answer row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub item_key: String,
    pub message: String,
}

/// Submission rejected or only partly persisted
#[derive(Error, Debug)]
pub enum SubmitError {
    /// Another submit of the same form is still running
    #[error("Checklist já está sendo salvo, aguarde")]
    InFlight,

    /// Nothing was persisted
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No traceability record exists for the unit
    #[error("Série {serial} não apontada para {product_type}")]
    UnknownUnit { serial: Code, product_type: ProductType },

    /// The unit already has a saved checklist
    #[error("Checklist da série {serial} ({product_type}) já foi salvo")]
    AlreadyCompleted { serial: Code, product_type: ProductType },

    /// The traceability record could not be read; nothing was persisted
    #[error("Falha ao consultar o apontamento: {0}")]
    Lookup(Error),

    /// Some or all answer rows failed; successful rows were kept
    #[error("Falha ao salvar {} de {} itens: {}", .failures.len(), .total, format_failures(.failures))]
    Batch {
        saved: usize,
        total: usize,
        failures: Vec<RowFailure>,
    },

    /// Answers are stored but the completion header could not be written
    #[error("Respostas salvas, mas o cabeçalho do checklist falhou: {0}")]
    Header(Error),
}

fn format_failures(failures: &[RowFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.item_key, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Photo accompanying a submission
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub origin: PhotoOrigin,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Result of a persisted checklist
#[derive(Debug, Clone, Serialize)]
pub struct SubmitReceipt {
    pub answers_saved: usize,
    pub header_written: bool,
    pub photos: Vec<EvidencePhoto>,
    /// Photo failures, reported apart from the checklist itself
    pub photo_errors: Vec<String>,
}

/// Validates, persists and attaches evidence for checklist submissions
#[derive(Clone)]
pub struct ChecklistService {
    store: Arc<dyn RecordStore>,
    evidence: Option<EvidenceUploader>,
    policies: Policies,
}

impl ChecklistService {
    pub fn new(store: Arc<dyn RecordStore>, policies: Policies) -> Self {
        Self {
            store,
            evidence: None,
            policies,
        }
    }

    /// Enable evidence photos
    pub fn with_evidence(mut self, uploader: EvidenceUploader) -> Self {
        self.evidence = Some(uploader);
        self
    }

    /// Submit a checklist form
    ///
    /// Holds the form gate for the whole call. The unit must have a
    /// traceability record for `(serial, product_type)` and must not be
    /// complete under the configured marker; answers carry the record's
    /// order, not the one the client sent. Photos are best effort: they are
    /// attempted only after every answer row is stored, and their failures
    /// never turn a saved checklist into an error.
    pub async fn submit(
        &self,
        gate: &FormGate,
        submission: &ChecklistSubmission,
        operator: &str,
        photos: Vec<PhotoUpload>,
        clock: &dyn Clock,
    ) -> Result<SubmitReceipt, SubmitError> {
        let _permit = gate.try_begin()?;

        let record = self
            .store
            .find_record(&submission.serial, Some(submission.product_type))
            .await
            .map_err(SubmitError::Lookup)?
            .ok_or_else(|| SubmitError::UnknownUnit {
                serial: submission.serial.clone(),
                product_type: submission.product_type,
            })?;

        if !submission.order.is_empty() && submission.order != record.order {
            warn!(
                "Checklist for serial {} sent order {}, using recorded order {}",
                record.serial, submission.order, record.order
            );
        }

        let unit = record.unit_key();
        if self.is_completed(&unit).await {
            return Err(SubmitError::AlreadyCompleted {
                serial: unit.serial,
                product_type: unit.product_type,
            });
        }

        let submission = ChecklistSubmission {
            order: record.order,
            ..submission.clone()
        };

        let template = ChecklistTemplate::for_product(submission.product_type);
        let items = validate(&template, &submission)?;

        let timestamp = clock.now();
        let answers = encode_answers(
            &submission,
            &items,
            operator,
            timestamp,
            self.policies.complement_encoding,
        );

        let total = answers.len();
        let mut failures = Vec::new();
        for (answer, item) in answers.iter().zip(&items) {
            if let Err(e) = self.store.insert_answer(answer).await {
                failures.push(RowFailure {
                    item_key: item.item_key.clone(),
                    message: e.to_string(),
                });
            }
        }

        if !failures.is_empty() {
            warn!(
                "Checklist for serial {} partly saved: {} of {} rows failed",
                submission.serial,
                failures.len(),
                total
            );
            return Err(SubmitError::Batch {
                saved: total - failures.len(),
                total,
                failures,
            });
        }

        let header = ChecklistHeader {
            serial: submission.serial.clone(),
            product_type: submission.product_type,
            order: submission.order.clone(),
            operator: operator.to_string(),
            timestamp,
        };
        let header_written = match self.store.insert_header(&header).await {
            Ok(()) => true,
            Err(e) if self.policies.completion_marker == CompletionMarker::Header => {
                warn!("Checklist header for serial {} failed: {}", submission.serial, e);
                return Err(SubmitError::Header(e));
            }
            Err(e) => {
                warn!("Checklist header for serial {} not written: {}", submission.serial, e);
                false
            }
        };

        info!(
            "Checklist saved for serial {} ({}): {} answers by {}",
            submission.serial, submission.product_type, total, operator
        );

        let mut receipt = SubmitReceipt {
            answers_saved: total,
            header_written,
            photos: Vec::new(),
            photo_errors: Vec::new(),
        };

        if photos.is_empty() {
            return Ok(receipt);
        }

        let Some(uploader) = &self.evidence else {
            warn!("Evidence storage not configured; {} photo(s) dropped", photos.len());
            receipt
                .photo_errors
                .push("Armazenamento de fotos não configurado".to_string());
            return Ok(receipt);
        };

        for photo in photos {
            let ctx = EvidenceContext {
                serial: &submission.serial,
                product_type: submission.product_type,
                order: &submission.order,
                operator,
                origin: photo.origin,
                timestamp,
            };
            match uploader.attach(&ctx, &photo.mime_type, &photo.bytes).await {
                Ok(stored) => receipt.photos.push(stored),
                Err(e) => receipt.photo_errors.push(e.to_string()),
            }
        }

        Ok(receipt)
    }

    /// Whether the unit already carries the configured completion marker
    ///
    /// A failed lookup counts as not completed, matching the pending queue.
    async fn is_completed(&self, unit: &UnitKey) -> bool {
        let lookup = match self.policies.completion_marker {
            CompletionMarker::AnyAnswer => self.store.has_answers(unit).await,
            CompletionMarker::Header => self.store.has_header(unit).await,
        };
        lookup.unwrap_or_else(|e| {
            warn!("Completion lookup for serial {} failed: {}", unit.serial, e);
            false
        })
    }
}
