//! Pending-checklist resolution
//!
//! A unit is pending when it was recorded today (operating timezone) and no
//! completion marker exists for its `(serial, product_type)` today. The
//! result is a set difference: duplicate raw rows collapse to one entry.

use crate::codes::Code;
use crate::config::CompletionMarker;
use crate::model::{ProductType, UnitKey};
use crate::store::TraceabilityStore;
use crate::time::{local_date, local_day_bounds, Clock};
use crate::Result;
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Unit awaiting its checklist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingUnit {
    pub serial: Code,
    pub product_type: ProductType,
    pub order: Code,
}

/// Computes the day's checklist queue
#[derive(Clone)]
pub struct PendingResolver {
    store: TraceabilityStore,
    marker: CompletionMarker,
    tz: Tz,
}

impl PendingResolver {
    pub fn new(store: TraceabilityStore, marker: CompletionMarker, tz: Tz) -> Self {
        Self { store, marker, tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Pending units for the local date of `clock.now()`
    pub async fn pending_for_today(
        &self,
        clock: &dyn Clock,
        product_filter: Option<ProductType>,
    ) -> Result<Vec<PendingUnit>> {
        let today = local_date(clock.now(), self.tz);
        self.pending(today, product_filter).await
    }

    /// Units recorded on `today` without a completion marker, newest first
    ///
    /// A failed completion lookup degrades to "nothing completed" so every
    /// recorded unit stays visible; a failed record lookup is returned.
    pub async fn pending(
        &self,
        today: NaiveDate,
        product_filter: Option<ProductType>,
    ) -> Result<Vec<PendingUnit>> {
        let (start, end) = local_day_bounds(today, self.tz);
        let records = self.store.list_between(start, end).await?;

        let backend = self.store.backend();
        let completed = match self.marker {
            CompletionMarker::AnyAnswer => backend.answered_units(start, end).await,
            CompletionMarker::Header => backend.header_units(start, end).await,
        };
        let completed: HashSet<UnitKey> = match completed {
            Ok(units) => units.into_iter().collect(),
            Err(e) => {
                warn!("Completion lookup failed, showing every unit as pending: {}", e);
                HashSet::new()
            }
        };

        let mut seen = HashSet::new();
        let pending: Vec<PendingUnit> = records
            .into_iter()
            .filter(|r| product_filter.map_or(true, |p| r.product_type == p))
            .filter_map(|r| {
                let key = r.unit_key();
                if completed.contains(&key) || !seen.insert(key) {
                    return None;
                }
                Some(PendingUnit {
                    serial: r.serial,
                    product_type: r.product_type,
                    order: r.order,
                })
            })
            .collect();

        debug!(
            "{} pending unit(s) on {} ({} completed)",
            pending.len(),
            today,
            completed.len()
        );
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupKey;
    use crate::model::{ChecklistAnswer, ChecklistHeader, ChecklistStatus, TraceabilityRecord};
    use crate::store::{RecordStore, SqliteRecordStore};
    use crate::time::{FixedClock, DEFAULT_TIMEZONE};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn noon() -> DateTime<Utc> {
        // 12:00 in Sao Paulo
        Utc.with_ymd_and_hms(2026, 10, 15, 15, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    fn record(serial: &str, product_type: ProductType, at: DateTime<Utc>) -> TraceabilityRecord {
        TraceabilityRecord {
            serial: Code::from(serial),
            order: Code::from("98765432109"),
            product_type,
            operator: "op".to_string(),
            timestamp: at,
        }
    }

    fn answer(serial: &str, product_type: ProductType, at: DateTime<Utc>) -> ChecklistAnswer {
        ChecklistAnswer {
            serial: Code::from(serial),
            product_type,
            order: Code::from("98765432109"),
            item_key: "ITEM_1".to_string(),
            status: ChecklistStatus::Conforme,
            complement: None,
            operator: "op".to_string(),
            timestamp: at,
        }
    }

    async fn setup(marker: CompletionMarker) -> (Arc<SqliteRecordStore>, PendingResolver) {
        let backend = Arc::new(SqliteRecordStore::in_memory().await.unwrap());
        let store = TraceabilityStore::new(backend.clone(), DedupKey::SerialAndProduct);
        (backend, PendingResolver::new(store, marker, DEFAULT_TIMEZONE))
    }

    fn serials(units: &[PendingUnit]) -> Vec<&str> {
        units.iter().map(|u| u.serial.as_str()).collect()
    }

    #[tokio::test]
    async fn test_set_difference_by_unit_key() {
        let (backend, resolver) = setup(CompletionMarker::AnyAnswer).await;
        backend.insert_record(&record("111111111", ProductType::Manga, noon())).await.unwrap();
        backend
            .insert_record(&record("222222222", ProductType::Manga, noon() + Duration::minutes(1)))
            .await
            .unwrap();
        backend
            .insert_record(&record("333333333", ProductType::Pnm, noon() + Duration::minutes(2)))
            .await
            .unwrap();
        // Same serial answered under the other product type does not count
        backend
            .insert_answer(&answer("222222222", ProductType::Pnm, noon() + Duration::hours(1)))
            .await
            .unwrap();
        backend
            .insert_answer(&answer("111111111", ProductType::Manga, noon() + Duration::hours(1)))
            .await
            .unwrap();

        let pending = resolver.pending(today(), None).await.unwrap();
        assert_eq!(serials(&pending), vec!["333333333", "222222222"]);
    }

    #[tokio::test]
    async fn test_duplicate_rows_collapse() {
        let (backend, resolver) = setup(CompletionMarker::AnyAnswer).await;
        for minutes in 0..3 {
            backend
                .insert_record(&record("111111111", ProductType::Pnm, noon() + Duration::minutes(minutes)))
                .await
                .unwrap();
        }

        let pending = resolver.pending(today(), None).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_only_local_today_counts() {
        let (backend, resolver) = setup(CompletionMarker::AnyAnswer).await;
        // 23:30 local on the 14th is 02:30 UTC on the 15th
        backend
            .insert_record(&record("111111111", ProductType::Pnm, Utc.with_ymd_and_hms(2026, 10, 15, 2, 30, 0).unwrap()))
            .await
            .unwrap();
        // 23:30 local on the 15th is 02:30 UTC on the 16th
        backend
            .insert_record(&record("222222222", ProductType::Pnm, Utc.with_ymd_and_hms(2026, 10, 16, 2, 30, 0).unwrap()))
            .await
            .unwrap();

        let pending = resolver.pending(today(), None).await.unwrap();
        assert_eq!(serials(&pending), vec!["222222222"]);
    }

    #[tokio::test]
    async fn test_product_filter() {
        let (backend, resolver) = setup(CompletionMarker::AnyAnswer).await;
        backend.insert_record(&record("111111111", ProductType::Manga, noon())).await.unwrap();
        backend.insert_record(&record("222222222", ProductType::Pnm, noon())).await.unwrap();

        let pending = resolver.pending(today(), Some(ProductType::Pnm)).await.unwrap();
        assert_eq!(serials(&pending), vec!["222222222"]);
    }

    #[tokio::test]
    async fn test_header_marker_ignores_bare_answers() {
        let (backend, resolver) = setup(CompletionMarker::Header).await;
        backend.insert_record(&record("111111111", ProductType::Manga, noon())).await.unwrap();
        backend.insert_record(&record("222222222", ProductType::Manga, noon())).await.unwrap();
        backend
            .insert_answer(&answer("111111111", ProductType::Manga, noon()))
            .await
            .unwrap();
        backend
            .insert_header(&ChecklistHeader {
                serial: Code::from("222222222"),
                product_type: ProductType::Manga,
                order: Code::from("98765432109"),
                operator: "op".to_string(),
                timestamp: noon(),
            })
            .await
            .unwrap();

        let pending = resolver.pending(today(), None).await.unwrap();
        assert_eq!(serials(&pending), vec!["111111111"]);
    }

    #[tokio::test]
    async fn test_completion_failure_fails_open() {
        let (backend, resolver) = setup(CompletionMarker::AnyAnswer).await;
        backend.insert_record(&record("111111111", ProductType::Manga, noon())).await.unwrap();
        backend
            .insert_answer(&answer("111111111", ProductType::Manga, noon()))
            .await
            .unwrap();
        sqlx::query("DROP TABLE checklist_answers")
            .execute(backend.pool())
            .await
            .unwrap();

        let pending = resolver.pending(today(), None).await.unwrap();
        assert_eq!(serials(&pending), vec!["111111111"]);
    }

    #[tokio::test]
    async fn test_record_failure_is_returned() {
        let (backend, resolver) = setup(CompletionMarker::AnyAnswer).await;
        sqlx::query("DROP TABLE traceability_records")
            .execute(backend.pool())
            .await
            .unwrap();

        assert!(resolver.pending(today(), None).await.is_err());
    }

    #[tokio::test]
    async fn test_pending_for_today_uses_clock() {
        let (backend, resolver) = setup(CompletionMarker::AnyAnswer).await;
        backend.insert_record(&record("111111111", ProductType::Manga, noon())).await.unwrap();

        let same_day = FixedClock::new(noon() + Duration::hours(5));
        assert_eq!(resolver.pending_for_today(&same_day, None).await.unwrap().len(), 1);

        let next_day = FixedClock::new(noon() + Duration::days(1));
        assert!(resolver.pending_for_today(&next_day, None).await.unwrap().is_empty());
    }
}
