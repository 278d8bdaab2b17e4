//! Audit Query Service
//!
//! Resolves normalized filters against the storage collaborator, computes
//! windowed statistics and prepares exports. Holds no mutable state; every
//! call is independent.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use aq_config::QueryConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::entity::AuditEvent;
use crate::export::{Export, ExportFormat};
use crate::filter::{FilterParams, QueryFilter, StatsParams, TimeRange};
use crate::shared::error::{AuditError, Result};
use crate::stats::AuditStats;
use crate::store::{AuditEventStore, StoreError, StoreResult};

/// One page of resolved events, echoing the effective pagination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditEventPage {
    pub events: Vec<AuditEvent>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Clone)]
pub struct AuditQueryService {
    store: Arc<dyn AuditEventStore>,
    config: QueryConfig,
}

impl AuditQueryService {
    pub fn new(store: Arc<dyn AuditEventStore>, config: QueryConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Normalize raw parameters for `tenant_id` using the configured policy
    pub fn normalize(&self, tenant_id: &str, params: FilterParams) -> QueryFilter {
        params.into_filter(tenant_id, &self.config)
    }

    /// Fetch one page of events plus the total match count
    pub async fn resolve(&self, filter: &QueryFilter) -> Result<AuditEventPage> {
        let page = self
            .call("query_events", self.store.query_events(filter))
            .await?;

        debug!(
            tenant_id = %filter.tenant_id,
            returned = page.events.len(),
            total = page.total,
            "Resolved audit query"
        );

        Ok(AuditEventPage {
            events: page.events,
            total: page.total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    pub async fn get_event(&self, tenant_id: &str, event_id: &str) -> Result<AuditEvent> {
        self.call("get_event", self.store.get_event(tenant_id, event_id))
            .await
    }

    /// Statistics window for a request, defaulting missing bounds to the
    /// trailing `stats_window_hours` ending at `now`
    pub fn stats_window(&self, params: &StatsParams, now: DateTime<Utc>) -> TimeRange {
        params.resolve(now, self.config.stats_window_hours)
    }

    /// Aggregate over the tenant's events inside a fully bounded window
    pub async fn aggregate(&self, tenant_id: &str, range: &TimeRange) -> Result<AuditStats> {
        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start > end {
                return Err(AuditError::validation(format!(
                    "start_date {} is after end_date {}",
                    start.to_rfc3339(),
                    end.to_rfc3339()
                )));
            }
        }

        let stats = self
            .call("get_stats", self.store.get_stats(tenant_id, range))
            .await?;

        debug!(tenant_id = %tenant_id, total = stats.total_events, "Computed audit stats");
        Ok(stats)
    }

    /// Resolve the export's events and wrap them for rendering.
    ///
    /// The format is checked before storage is touched. The page size is
    /// always the export ceiling; the caller's offset is kept.
    pub async fn export(
        &self,
        tenant_id: &str,
        format: &str,
        params: FilterParams,
    ) -> Result<Export> {
        let format: ExportFormat = format.parse()?;

        let mut filter = self.normalize(tenant_id, params);
        filter.limit = self.config.export_limit;

        let page = self.resolve(&filter).await?;
        debug!(
            tenant_id = %tenant_id,
            format = format.extension(),
            events = page.events.len(),
            "Prepared audit export"
        );

        Ok(Export::new(format, page.events))
    }

    /// Run one storage call under the configured timeout. Dropping the
    /// future on timeout cancels the call.
    async fn call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> Result<T> {
        let timeout = Duration::from_millis(self.config.store_timeout_ms);

        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(StoreError::NotFound { id })) => Err(AuditError::not_found("AuditEvent", id)),
            Ok(Err(e)) => {
                error!(
                    store = self.store.name(),
                    operation,
                    error = %e,
                    "Audit store call failed"
                );
                Err(AuditError::query_failed(format!("{} failed", operation)))
            }
            Err(_) => {
                error!(
                    store = self.store.name(),
                    operation,
                    timeout_ms = self.config.store_timeout_ms,
                    "Audit store call timed out"
                );
                Err(AuditError::query_failed(format!("{} timed out", operation)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{AuditCategory, AuditSeverity, AuditStatus};
    use crate::store::{EventPage, MemoryAuditStore};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store double that records calls and can fail or stall on demand
    #[derive(Default)]
    struct ScriptedStore {
        calls: AtomicUsize,
        fail: bool,
        stall: bool,
        last_limit: parking_lot::Mutex<Option<i64>>,
    }

    #[async_trait]
    impl AuditEventStore for ScriptedStore {
        async fn query_events(&self, filter: &QueryFilter) -> StoreResult<EventPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_limit.lock() = Some(filter.limit);
            if self.stall {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.fail {
                return Err(StoreError::Unavailable {
                    message: "connection refused".to_string(),
                });
            }
            Ok(EventPage::default())
        }

        async fn get_event(&self, _tenant_id: &str, event_id: &str) -> StoreResult<AuditEvent> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotFound {
                id: event_id.to_string(),
            })
        }

        async fn get_stats(&self, _tenant_id: &str, _range: &TimeRange) -> StoreResult<AuditStats> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AuditStats::default())
        }

        async fn ping(&self) -> StoreResult<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn service_with(store: Arc<dyn AuditEventStore>) -> AuditQueryService {
        AuditQueryService::new(store, QueryConfig::default())
    }

    #[tokio::test]
    async fn test_resolve_single_event() {
        let event = AuditEvent::new("acme", AuditCategory::Security, "login", "user login");
        let service = service_with(Arc::new(MemoryAuditStore::with_events(vec![event.clone()])));

        let filter = service.normalize("acme", FilterParams::default());
        let page = service.resolve(&filter).await.unwrap();

        assert_eq!(
            page,
            AuditEventPage {
                events: vec![event],
                total: 1,
                limit: 50,
                offset: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_query_failed() {
        let store = Arc::new(ScriptedStore {
            fail: true,
            ..Default::default()
        });
        let service = service_with(store);

        let filter = service.normalize("", FilterParams::default());
        let err = service.resolve(&filter).await.unwrap_err();
        assert!(matches!(err, AuditError::QueryFailed { .. }));
        assert!(!err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_not_found_is_distinguished() {
        let service = service_with(Arc::new(ScriptedStore::default()));
        let err = service.get_event("acme", "missing").await.unwrap_err();
        assert!(matches!(err, AuditError::NotFound { ref id, .. } if id == "missing"));
    }

    #[tokio::test]
    async fn test_invalid_sort_hint_is_query_failed() {
        let service = service_with(Arc::new(MemoryAuditStore::new()));
        let params = FilterParams {
            sort_by: Some("password".to_string()),
            ..Default::default()
        };
        let filter = service.normalize("acme", params);
        let err = service.resolve(&filter).await.unwrap_err();
        assert!(matches!(err, AuditError::QueryFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout() {
        let store = Arc::new(ScriptedStore {
            stall: true,
            ..Default::default()
        });
        let service = AuditQueryService::new(
            store,
            QueryConfig {
                store_timeout_ms: 100,
                ..QueryConfig::default()
            },
        );

        let filter = service.normalize("acme", FilterParams::default());
        let err = service.resolve(&filter).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_aggregate_rollups() {
        let now = Utc::now();
        let mut events = Vec::new();
        for i in 0..100 {
            let mut event =
                AuditEvent::new("acme", AuditCategory::DataAccess, "read", "read record")
                    .with_created_at(now - ChronoDuration::minutes(i + 1));
            if i < 2 {
                event = event.with_severity(AuditSeverity::Critical);
            }
            if (10..15).contains(&i) {
                event = event.with_status(AuditStatus::Failure);
            }
            events.push(event);
        }
        // Outside the default window and outside the tenant
        events.push(
            AuditEvent::new("acme", AuditCategory::System, "boot", "startup")
                .with_created_at(now - ChronoDuration::hours(30)),
        );
        events.push(
            AuditEvent::new("other", AuditCategory::System, "boot", "startup")
                .with_created_at(now - ChronoDuration::minutes(5)),
        );

        let service = service_with(Arc::new(MemoryAuditStore::with_events(events)));
        let range = service.stats_window(&StatsParams::default(), now);
        assert_eq!(range.start, Some(now - ChronoDuration::hours(24)));
        assert_eq!(range.end, Some(now));

        let stats = service.aggregate("acme", &range).await.unwrap();
        assert_eq!(stats.total_events, 100);
        assert_eq!(stats.critical_events, 2);
        assert_eq!(stats.failed_events, 5);
        assert!(stats.is_consistent());
    }

    #[tokio::test]
    async fn test_inverted_window_rejected() {
        let store = Arc::new(ScriptedStore::default());
        let service = service_with(store.clone());

        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = service
            .aggregate("acme", &TimeRange::between(start, end))
            .await
            .unwrap_err();

        assert!(matches!(err, AuditError::Validation { .. }));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_export_rejects_format_before_store() {
        let store = Arc::new(ScriptedStore::default());
        let service = service_with(store.clone());

        let result = service.export("acme", "xml", FilterParams::default()).await;
        assert!(matches!(result, Err(AuditError::Validation { .. })));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_export_uses_export_limit() {
        let store = Arc::new(ScriptedStore::default());
        let service = service_with(store.clone());

        let params = FilterParams {
            limit: Some("5".to_string()),
            offset: Some("20".to_string()),
            ..Default::default()
        };
        let export = service.export("acme", "CSV", params).await.unwrap();

        assert_eq!(export.format(), ExportFormat::Csv);
        assert_eq!(*store.last_limit.lock(), Some(10_000));
    }
}
