//! Record types
//!
//! Every record is append-only: created once, never mutated or deleted.
//! Answers, headers and photos reference a traceability record informally
//! through `(serial, product_type)`.

use crate::codes::Code;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Manufacturing category selected by the operator before scanning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProductType {
    #[serde(rename = "MANGA")]
    Manga,
    #[serde(rename = "PNM")]
    Pnm,
}

impl ProductType {
    pub const ALL: [ProductType; 2] = [ProductType::Manga, ProductType::Pnm];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Manga => "MANGA",
            ProductType::Pnm => "PNM",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MANGA" => Ok(ProductType::Manga),
            "PNM" => Ok(ProductType::Pnm),
            other => Err(Error::InvalidInput(format!("Unknown product type: {}", other))),
        }
    }
}

/// Answer vocabulary for a checklist question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecklistStatus {
    #[serde(rename = "Conforme")]
    Conforme,
    #[serde(rename = "NaoConforme", alias = "Não Conforme")]
    NaoConforme,
    #[serde(rename = "NA", alias = "N/A")]
    Na,
}

impl ChecklistStatus {
    /// Text persisted in the `status` column
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecklistStatus::Conforme => "Conforme",
            ChecklistStatus::NaoConforme => "Não Conforme",
            ChecklistStatus::Na => "N/A",
        }
    }

    /// Parse the symbols shown on the inspection form
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            "✅" => Some(ChecklistStatus::Conforme),
            "❌" => Some(ChecklistStatus::NaoConforme),
            "🟡" => Some(ChecklistStatus::Na),
            _ => None,
        }
    }
}

impl fmt::Display for ChecklistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecklistStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(status) = ChecklistStatus::from_symbol(s) {
            return Ok(status);
        }
        match s.trim() {
            "Conforme" => Ok(ChecklistStatus::Conforme),
            "NaoConforme" | "Não Conforme" | "Nao Conforme" => Ok(ChecklistStatus::NaoConforme),
            "NA" | "N/A" => Ok(ChecklistStatus::Na),
            other => Err(Error::InvalidInput(format!("Unknown checklist status: {}", other))),
        }
    }
}

/// How an evidence photo was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoOrigin {
    Camera,
    Upload,
}

impl PhotoOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoOrigin::Camera => "camera",
            PhotoOrigin::Upload => "upload",
        }
    }
}

impl FromStr for PhotoOrigin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "camera" => Ok(PhotoOrigin::Camera),
            "upload" => Ok(PhotoOrigin::Upload),
            other => Err(Error::InvalidInput(format!("Unknown photo origin: {}", other))),
        }
    }
}

/// Key under which a unit is inspected once
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UnitKey {
    pub serial: Code,
    pub product_type: ProductType,
}

impl UnitKey {
    pub fn new(serial: Code, product_type: ProductType) -> Self {
        Self { serial, product_type }
    }
}

/// One scanned unit: serial paired with its production order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceabilityRecord {
    pub serial: Code,
    pub order: Code,
    pub product_type: ProductType,
    pub operator: String,
    pub timestamp: DateTime<Utc>,
}

impl TraceabilityRecord {
    pub fn unit_key(&self) -> UnitKey {
        UnitKey::new(self.serial.clone(), self.product_type)
    }
}

/// One answered checklist question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistAnswer {
    pub serial: Code,
    pub product_type: ProductType,
    pub order: Code,
    /// Stable item key, optionally suffixed with the complement when the
    /// inline encoding is configured
    pub item_key: String,
    pub status: ChecklistStatus,
    pub complement: Option<String>,
    pub operator: String,
    pub timestamp: DateTime<Utc>,
}

/// Parent row written once per fully persisted checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistHeader {
    pub serial: Code,
    pub product_type: ProductType,
    pub order: Code,
    pub operator: String,
    pub timestamp: DateTime<Utc>,
}

/// Metadata for an uploaded evidence photo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePhoto {
    pub serial: Code,
    pub product_type: ProductType,
    pub order: Code,
    pub operator: String,
    pub storage_path: String,
    pub public_url: String,
    pub origin: PhotoOrigin,
    pub timestamp: DateTime<Utc>,
}
