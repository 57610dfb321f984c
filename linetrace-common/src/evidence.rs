//! Evidence photo naming and upload
//!
//! Every dynamic segment is sanitized before it is embedded in a path.
//! Filenames start with the serial so a unit's evidence can be found by
//! listing the storage prefix alone.

use crate::codes::{sanitize_for_path, Code};
use crate::model::{EvidencePhoto, PhotoOrigin, ProductType, UnitKey};
use crate::storage::ObjectStorage;
use crate::store::RecordStore;
use crate::time::compact_stamp;
use crate::Error;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Extension used for unrecognized MIME types
pub const FALLBACK_EXTENSION: &str = "jpg";

/// Name attempts before giving up on a taken filename
const MAX_NAME_ATTEMPTS: i64 = 60;

/// Storage location of one evidence file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvidencePath {
    /// Full object path: `{product}/{serial}/{filename}`
    pub path: String,
    pub filename: String,
}

/// Unit and capture details that name an evidence file
#[derive(Debug, Clone)]
pub struct EvidenceContext<'a> {
    pub serial: &'a Code,
    pub product_type: ProductType,
    pub order: &'a Code,
    pub operator: &'a str,
    pub origin: PhotoOrigin,
    pub timestamp: DateTime<Utc>,
}

/// File extension for an image MIME type
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/heif" => "heif",
        "image/gif" => "gif",
        _ => FALLBACK_EXTENSION,
    }
}

/// Build the deterministic storage path for an evidence file
pub fn build_path(ctx: &EvidenceContext<'_>, mime_type: &str) -> EvidencePath {
    let serial = sanitize_for_path(ctx.serial.as_str());
    let filename = format!(
        "{}__OP{}__{}__{}__{}.{}",
        serial,
        sanitize_for_path(ctx.order.as_str()),
        sanitize_for_path(ctx.operator),
        ctx.origin.as_str(),
        compact_stamp(ctx.timestamp),
        extension_for_mime(mime_type),
    );
    let path = format!(
        "{}/{}/{}",
        sanitize_for_path(ctx.product_type.as_str()),
        serial,
        filename
    );
    EvidencePath { path, filename }
}

/// Storage prefix holding every evidence file of a unit
pub fn unit_prefix(unit: &UnitKey) -> String {
    format!(
        "{}/{}",
        sanitize_for_path(unit.product_type.as_str()),
        sanitize_for_path(unit.serial.as_str())
    )
}

/// Evidence attach failure
#[derive(Error, Debug)]
pub enum EvidenceError {
    /// The binary never reached storage
    #[error("Falha no upload da foto: {0}")]
    Upload(Error),

    /// The binary is stored but its metadata row is missing; the blob is kept
    #[error("Foto enviada ({path}), mas o registro falhou: {source}")]
    Metadata { path: String, source: Error },
}

/// Uploads evidence files and records their metadata
#[derive(Clone)]
pub struct EvidenceUploader {
    storage: Arc<dyn ObjectStorage>,
    store: Arc<dyn RecordStore>,
}

impl EvidenceUploader {
    pub fn new(storage: Arc<dyn ObjectStorage>, store: Arc<dyn RecordStore>) -> Self {
        Self { storage, store }
    }

    /// Upload one photo and write its metadata row
    ///
    /// Never overwrites: when the name is taken (two photos in the same
    /// second) the stamp moves forward one second and the upload is retried.
    /// If the metadata write fails after a successful upload, the blob stays
    /// in storage: an orphaned file is preferred over a lost photo.
    pub async fn attach(
        &self,
        ctx: &EvidenceContext<'_>,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<EvidencePhoto, EvidenceError> {
        let mut stamped = ctx.clone();
        let mut attempt = 0;
        let location = loop {
            let location = build_path(&stamped, mime_type);
            match self
                .storage
                .upload(&location.path, bytes, mime_type, false)
                .await
            {
                Ok(()) => break location,
                Err(Error::AlreadyExists(_)) if attempt + 1 < MAX_NAME_ATTEMPTS => {
                    attempt += 1;
                    stamped.timestamp = ctx.timestamp + Duration::seconds(attempt);
                }
                Err(e) => return Err(EvidenceError::Upload(e)),
            }
        };

        let photo = EvidencePhoto {
            serial: ctx.serial.clone(),
            product_type: ctx.product_type,
            order: ctx.order.clone(),
            operator: ctx.operator.to_string(),
            public_url: self.storage.public_url(&location.path),
            storage_path: location.path,
            origin: ctx.origin,
            timestamp: stamped.timestamp,
        };

        if let Err(e) = self.store.insert_evidence(&photo).await {
            warn!(
                "Evidence {} uploaded but metadata write failed: {}",
                photo.storage_path, e
            );
            return Err(EvidenceError::Metadata {
                path: photo.storage_path,
                source: e,
            });
        }

        info!("Attached evidence {} for serial {}", photo.storage_path, photo.serial);
        Ok(photo)
    }

    /// Stored evidence paths for a unit, by prefix listing
    pub async fn list_for_unit(&self, unit: &UnitKey) -> crate::Result<Vec<String>> {
        self.storage.list(&unit_prefix(unit)).await
    }
}
