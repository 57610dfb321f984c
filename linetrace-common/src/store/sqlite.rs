//! SQLite record store
//!
//! Tables are created idempotently on open. Timestamps are stored as
//! fixed-width RFC 3339 UTC text so lexical order matches time order.

use super::RecordStore;
use crate::codes::Code;
use crate::model::{
    ChecklistAnswer, ChecklistHeader, ChecklistStatus, EvidencePhoto, PhotoOrigin, ProductType,
    TraceabilityRecord, UnitKey,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::info;

/// Record store backed by a SQLite database
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database file and its tables
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        // Create parent directory if it doesn't exist
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new database: {}", db_path.display());
        } else {
            info!("Opened existing database: {}", db_path.display());
        }

        // WAL lets dashboard reads proceed while an operator writes
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
        sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    /// Private in-memory database (single connection so every query sees it)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create all tables and indexes (idempotent)
    pub async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS traceability_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                serial TEXT NOT NULL,
                order_code TEXT NOT NULL,
                product_type TEXT NOT NULL,
                operator TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_traceability_serial ON traceability_records(serial, product_type)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_traceability_recorded_at ON traceability_records(recorded_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checklist_answers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                serial TEXT NOT NULL,
                product_type TEXT NOT NULL,
                order_code TEXT NOT NULL,
                item_key TEXT NOT NULL,
                status TEXT NOT NULL,
                complement TEXT,
                operator TEXT NOT NULL,
                answered_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_checklist_answers_unit ON checklist_answers(serial, product_type)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checklist_headers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                serial TEXT NOT NULL,
                product_type TEXT NOT NULL,
                order_code TEXT NOT NULL,
                operator TEXT NOT NULL,
                submitted_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS evidence_photos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                serial TEXT NOT NULL,
                product_type TEXT NOT NULL,
                order_code TEXT NOT NULL,
                operator TEXT NOT NULL,
                storage_path TEXT NOT NULL,
                public_url TEXT NOT NULL,
                origin TEXT NOT NULL,
                taken_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn encode_ts(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid stored timestamp {:?}: {}", value, e)))
}

fn decode_product(value: &str) -> Result<ProductType> {
    value
        .parse::<ProductType>()
        .map_err(|e| Error::Internal(format!("Invalid stored product type: {}", e)))
}

fn record_from_row(row: &SqliteRow) -> Result<TraceabilityRecord> {
    Ok(TraceabilityRecord {
        serial: Code::new(row.get::<String, _>("serial")),
        order: Code::new(row.get::<String, _>("order_code")),
        product_type: decode_product(&row.get::<String, _>("product_type"))?,
        operator: row.get("operator"),
        timestamp: decode_ts(&row.get::<String, _>("recorded_at"))?,
    })
}

fn answer_from_row(row: &SqliteRow) -> Result<ChecklistAnswer> {
    let status = row
        .get::<String, _>("status")
        .parse::<ChecklistStatus>()
        .map_err(|e| Error::Internal(format!("Invalid stored status: {}", e)))?;

    Ok(ChecklistAnswer {
        serial: Code::new(row.get::<String, _>("serial")),
        product_type: decode_product(&row.get::<String, _>("product_type"))?,
        order: Code::new(row.get::<String, _>("order_code")),
        item_key: row.get("item_key"),
        status,
        complement: row.get("complement"),
        operator: row.get("operator"),
        timestamp: decode_ts(&row.get::<String, _>("answered_at"))?,
    })
}

fn evidence_from_row(row: &SqliteRow) -> Result<EvidencePhoto> {
    let origin = row
        .get::<String, _>("origin")
        .parse::<PhotoOrigin>()
        .map_err(|e| Error::Internal(format!("Invalid stored origin: {}", e)))?;

    Ok(EvidencePhoto {
        serial: Code::new(row.get::<String, _>("serial")),
        product_type: decode_product(&row.get::<String, _>("product_type"))?,
        order: Code::new(row.get::<String, _>("order_code")),
        operator: row.get("operator"),
        storage_path: row.get("storage_path"),
        public_url: row.get("public_url"),
        origin,
        timestamp: decode_ts(&row.get::<String, _>("taken_at"))?,
    })
}

fn unit_from_row(row: &SqliteRow) -> Result<UnitKey> {
    Ok(UnitKey::new(
        Code::new(row.get::<String, _>("serial")),
        decode_product(&row.get::<String, _>("product_type"))?,
    ))
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn find_record(
        &self,
        serial: &Code,
        product_type: Option<ProductType>,
    ) -> Result<Option<TraceabilityRecord>> {
        let row = match product_type {
            None => {
                sqlx::query(
                    "SELECT serial, order_code, product_type, operator, recorded_at
                     FROM traceability_records
                     WHERE serial = ?
                     LIMIT 1",
                )
                .bind(serial.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
            Some(product_type) => {
                sqlx::query(
                    "SELECT serial, order_code, product_type, operator, recorded_at
                     FROM traceability_records
                     WHERE serial = ? AND product_type = ?
                     LIMIT 1",
                )
                .bind(serial.as_str())
                .bind(product_type.as_str())
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert_record(&self, record: &TraceabilityRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO traceability_records (serial, order_code, product_type, operator, recorded_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(record.serial.as_str())
        .bind(record.order.as_str())
        .bind(record.product_type.as_str())
        .bind(&record.operator)
        .bind(encode_ts(record.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<TraceabilityRecord>> {
        let rows = sqlx::query(
            "SELECT serial, order_code, product_type, operator, recorded_at
             FROM traceability_records
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn list_records_page(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<TraceabilityRecord>> {
        let rows = sqlx::query(
            "SELECT serial, order_code, product_type, operator, recorded_at
             FROM traceability_records
             WHERE recorded_at >= ? AND recorded_at < ?
             ORDER BY recorded_at DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(encode_ts(start))
        .bind(encode_ts(end))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn insert_answer(&self, answer: &ChecklistAnswer) -> Result<()> {
        sqlx::query(
            "INSERT INTO checklist_answers
                (serial, product_type, order_code, item_key, status, complement, operator, answered_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(answer.serial.as_str())
        .bind(answer.product_type.as_str())
        .bind(answer.order.as_str())
        .bind(&answer.item_key)
        .bind(answer.status.as_str())
        .bind(answer.complement.as_deref())
        .bind(&answer.operator)
        .bind(encode_ts(answer.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_header(&self, header: &ChecklistHeader) -> Result<()> {
        sqlx::query(
            "INSERT INTO checklist_headers (serial, product_type, order_code, operator, submitted_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(header.serial.as_str())
        .bind(header.product_type.as_str())
        .bind(header.order.as_str())
        .bind(&header.operator)
        .bind(encode_ts(header.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn answered_units(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<UnitKey>> {
        let rows = sqlx::query(
            "SELECT DISTINCT serial, product_type
             FROM checklist_answers
             WHERE answered_at >= ? AND answered_at < ?",
        )
        .bind(encode_ts(start))
        .bind(encode_ts(end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(unit_from_row).collect()
    }

    async fn header_units(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<UnitKey>> {
        let rows = sqlx::query(
            "SELECT DISTINCT serial, product_type
             FROM checklist_headers
             WHERE submitted_at >= ? AND submitted_at < ?",
        )
        .bind(encode_ts(start))
        .bind(encode_ts(end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(unit_from_row).collect()
    }

    async fn list_answers(&self, unit: &UnitKey) -> Result<Vec<ChecklistAnswer>> {
        let rows = sqlx::query(
            "SELECT serial, product_type, order_code, item_key, status, complement, operator, answered_at
             FROM checklist_answers
             WHERE serial = ? AND product_type = ?
             ORDER BY id ASC",
        )
        .bind(unit.serial.as_str())
        .bind(unit.product_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(answer_from_row).collect()
    }

    async fn has_answers(&self, unit: &UnitKey) -> Result<bool> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM checklist_answers WHERE serial = ? AND product_type = ?)",
        )
        .bind(unit.serial.as_str())
        .bind(unit.product_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(found != 0)
    }

    async fn has_header(&self, unit: &UnitKey) -> Result<bool> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM checklist_headers WHERE serial = ? AND product_type = ?)",
        )
        .bind(unit.serial.as_str())
        .bind(unit.product_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(found != 0)
    }

    async fn insert_evidence(&self, photo: &EvidencePhoto) -> Result<()> {
        sqlx::query(
            "INSERT INTO evidence_photos
                (serial, product_type, order_code, operator, storage_path, public_url, origin, taken_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(photo.serial.as_str())
        .bind(photo.product_type.as_str())
        .bind(photo.order.as_str())
        .bind(&photo.operator)
        .bind(&photo.storage_path)
        .bind(&photo.public_url)
        .bind(photo.origin.as_str())
        .bind(encode_ts(photo.timestamp))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_evidence(&self, unit: &UnitKey) -> Result<Vec<EvidencePhoto>> {
        let rows = sqlx::query(
            "SELECT serial, product_type, order_code, operator, storage_path, public_url, origin, taken_at
             FROM evidence_photos
             WHERE serial = ? AND product_type = ?
             ORDER BY id ASC",
        )
        .bind(unit.serial.as_str())
        .bind(unit.product_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(evidence_from_row).collect()
    }
}
