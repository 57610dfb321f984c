//! Record store access
//!
//! The record store is a keyed collection of append-only rows. [`RecordStore`]
//! is the backend seam; [`TraceabilityStore`] is the adapter the intake
//! machine and pending resolver use, enforcing at most one record per dedup key.

use crate::codes::Code;
use crate::config::DedupKey;
use crate::model::{
    ChecklistAnswer, ChecklistHeader, EvidencePhoto, ProductType, TraceabilityRecord, UnitKey,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

mod sqlite;
pub use sqlite::SqliteRecordStore;

/// Page size for unbounded range reads
pub const LIST_PAGE_SIZE: i64 = 1000;

/// Backend for the record collections
///
/// Every method is a single call against the backend; no method spans a
/// transaction. Range arguments are half-open `[start, end)` UTC intervals.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Find a traceability record by serial, optionally scoped to a product type
    async fn find_record(
        &self,
        serial: &Code,
        product_type: Option<ProductType>,
    ) -> Result<Option<TraceabilityRecord>>;

    async fn insert_record(&self, record: &TraceabilityRecord) -> Result<()>;

    /// Newest-first records, capped at `limit`
    async fn list_recent(&self, limit: i64) -> Result<Vec<TraceabilityRecord>>;

    /// One newest-first page of records within `[start, end)`
    async fn list_records_page(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<TraceabilityRecord>>;

    async fn insert_answer(&self, answer: &ChecklistAnswer) -> Result<()>;

    async fn insert_header(&self, header: &ChecklistHeader) -> Result<()>;

    /// Distinct units with at least one answer row within `[start, end)`
    async fn answered_units(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<UnitKey>>;

    /// Distinct units with a header row within `[start, end)`
    async fn header_units(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<UnitKey>>;

    async fn list_answers(&self, unit: &UnitKey) -> Result<Vec<ChecklistAnswer>>;

    /// Whether any answer row exists for the unit, at any time
    async fn has_answers(&self, unit: &UnitKey) -> Result<bool>;

    /// Whether a checklist header exists for the unit, at any time
    async fn has_header(&self, unit: &UnitKey) -> Result<bool>;

    async fn insert_evidence(&self, photo: &EvidencePhoto) -> Result<()>;

    async fn list_evidence(&self, unit: &UnitKey) -> Result<Vec<EvidencePhoto>>;
}

/// Outcome of a rejected traceability insert
#[derive(Error, Debug)]
pub enum InsertError {
    /// A record already exists for the dedup key; carries the operator message
    #[error("{0}")]
    Duplicate(String),

    #[error(transparent)]
    Store(#[from] Error),
}

/// Traceability record adapter with duplicate detection
#[derive(Clone)]
pub struct TraceabilityStore {
    backend: Arc<dyn RecordStore>,
    dedup_key: DedupKey,
}

impl TraceabilityStore {
    pub fn new(backend: Arc<dyn RecordStore>, dedup_key: DedupKey) -> Self {
        Self { backend, dedup_key }
    }

    pub fn dedup_key(&self) -> DedupKey {
        self.dedup_key
    }

    pub fn backend(&self) -> &Arc<dyn RecordStore> {
        &self.backend
    }

    /// Insert a record unless one already exists for its dedup key
    ///
    /// Read-check-then-write. Two sessions racing on the same serial inside
    /// the check window can both succeed; no compensation is attempted.
    pub async fn try_insert(&self, record: &TraceabilityRecord) -> std::result::Result<(), InsertError> {
        let scope = match self.dedup_key {
            DedupKey::Serial => None,
            DedupKey::SerialAndProduct => Some(record.product_type),
        };

        if let Some(existing) = self.backend.find_record(&record.serial, scope).await? {
            debug!(
                "Duplicate traceability record for serial {} (existing order {})",
                existing.serial, existing.order
            );
            return Err(InsertError::Duplicate(duplicate_message(&record.serial, scope)));
        }

        self.backend.insert_record(record).await?;
        info!(
            "Recorded serial {} with order {} ({}) by {}",
            record.serial, record.order, record.product_type, record.operator
        );
        Ok(())
    }

    /// Newest-first records capped at `limit` (dashboard only)
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<TraceabilityRecord>> {
        if limit <= 0 {
            return Err(Error::InvalidInput(format!("limit must be positive, got {}", limit)));
        }
        self.backend.list_recent(limit).await
    }

    /// Every record within `[start, end)`, newest first
    ///
    /// Reads page by page until a short page comes back, so no record in the
    /// range is ever hidden by a row cap.
    pub async fn list_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<TraceabilityRecord>> {
        let mut records = Vec::new();
        let mut offset = 0;

        loop {
            let page = self
                .backend
                .list_records_page(start, end, offset, LIST_PAGE_SIZE)
                .await?;
            let fetched = page.len() as i64;
            records.extend(page);

            if fetched < LIST_PAGE_SIZE {
                break;
            }
            offset += fetched;
        }

        Ok(records)
    }
}

fn duplicate_message(serial: &Code, scope: Option<ProductType>) -> String {
    match scope {
        None => format!("Série {} já apontada.", serial),
        Some(product_type) => format!("Série {} já apontada para {}.", serial, product_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(serial: &str, order: &str, product_type: ProductType) -> TraceabilityRecord {
        TraceabilityRecord {
            serial: Code::from(serial),
            order: Code::from(order),
            product_type,
            operator: "op".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap(),
        }
    }

    async fn adapter(dedup_key: DedupKey) -> TraceabilityStore {
        let backend = SqliteRecordStore::in_memory().await.unwrap();
        TraceabilityStore::new(Arc::new(backend), dedup_key)
    }

    #[tokio::test]
    async fn test_second_insert_is_duplicate() {
        let store = adapter(DedupKey::Serial).await;
        let first = record("123456789", "98765432109", ProductType::Manga);

        store.try_insert(&first).await.unwrap();
        let second = store.try_insert(&first).await;

        match second {
            Err(InsertError::Duplicate(message)) => assert!(message.contains("123456789")),
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert_eq!(store.list_recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_serial_key_ignores_product_type() {
        let store = adapter(DedupKey::Serial).await;
        store
            .try_insert(&record("123456789", "98765432109", ProductType::Manga))
            .await
            .unwrap();

        let other_product = store
            .try_insert(&record("123456789", "11111111111", ProductType::Pnm))
            .await;
        assert!(matches!(other_product, Err(InsertError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_serial_and_product_key_allows_other_product() {
        let store = adapter(DedupKey::SerialAndProduct).await;
        store
            .try_insert(&record("123456789", "98765432109", ProductType::Manga))
            .await
            .unwrap();
        store
            .try_insert(&record("123456789", "11111111111", ProductType::Pnm))
            .await
            .unwrap();

        let repeat = store
            .try_insert(&record("123456789", "22222222222", ProductType::Pnm))
            .await;
        match repeat {
            Err(InsertError::Duplicate(message)) => assert!(message.contains("PNM")),
            other => panic!("expected duplicate, got {:?}", other),
        }
        assert_eq!(store.list_recent(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_recent_rejects_non_positive_limit() {
        let store = adapter(DedupKey::Serial).await;
        assert!(matches!(store.list_recent(0).await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_list_between_reads_past_one_page() {
        let store = adapter(DedupKey::Serial).await;
        let base = Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap();
        let total = LIST_PAGE_SIZE + 5;

        for i in 0..total {
            let mut r = record(&format!("{:09}", i), "98765432109", ProductType::Pnm);
            r.timestamp = base + chrono::Duration::milliseconds(i);
            store.backend().insert_record(&r).await.unwrap();
        }

        let all = store
            .list_between(base, base + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(all.len() as i64, total);
        // Newest first
        assert_eq!(all[0].serial.as_str(), format!("{:09}", total - 1));
    }
}
