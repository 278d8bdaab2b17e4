//! In-memory audit event store
//!
//! Full implementation of the store contract over a vector of events.
//! Backs the test suites and the `memory` storage backend.

use std::cmp::Ordering;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{
    check_pagination, AuditEventStore, EventPage, SortDirection, SortField, SortKey, StoreError,
    StoreResult,
};
use crate::entity::AuditEvent;
use crate::filter::{QueryFilter, TimeRange};
use crate::stats::AuditStats;

#[derive(Default)]
pub struct MemoryAuditStore {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<AuditEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    /// Append events (ingestion stand-in for seeding and tests)
    pub fn insert_many(&self, events: impl IntoIterator<Item = AuditEvent>) {
        self.events.write().extend(events);
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

fn compare(a: &AuditEvent, b: &AuditEvent, field: SortField) -> Ordering {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::TenantId => a.tenant_id.cmp(&b.tenant_id),
        SortField::UserId => opt(&a.user_id).cmp(&opt(&b.user_id)),
        SortField::UserEmail => opt(&a.user_email).cmp(&opt(&b.user_email)),
        SortField::Category => a.category.as_str().cmp(b.category.as_str()),
        SortField::EventType => a.event_type.cmp(&b.event_type),
        SortField::Action => a.action.cmp(&b.action),
        SortField::Severity => a.severity.as_str().cmp(b.severity.as_str()),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        SortField::IpAddress => a.ip_address.cmp(&b.ip_address),
    }
}

#[async_trait]
impl AuditEventStore for MemoryAuditStore {
    async fn query_events(&self, filter: &QueryFilter) -> StoreResult<EventPage> {
        let sort = SortKey::parse(&filter.sort)?;
        let (offset, limit) = check_pagination(filter)?;

        let mut matched: Vec<AuditEvent> = self
            .events
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let ord = compare(a, b, sort.field);
            let ord = match sort.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            ord.then_with(|| a.id.cmp(&b.id))
        });

        let total = matched.len() as i64;
        let events = matched
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();

        Ok(EventPage { events, total })
    }

    async fn get_event(&self, tenant_id: &str, event_id: &str) -> StoreResult<AuditEvent> {
        self.events
            .read()
            .iter()
            .find(|e| e.id == event_id && (tenant_id.is_empty() || e.tenant_id == tenant_id))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                id: event_id.to_string(),
            })
    }

    async fn get_stats(&self, tenant_id: &str, range: &TimeRange) -> StoreResult<AuditStats> {
        let events = self.events.read();
        Ok(events
            .iter()
            .filter(|e| tenant_id.is_empty() || e.tenant_id == tenant_id)
            .filter(|e| range.contains(e.created_at))
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
