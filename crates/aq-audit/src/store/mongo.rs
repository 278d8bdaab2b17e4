//! MongoDB audit event store

use std::collections::BTreeMap;

use async_trait::async_trait;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::{FindOptions, IndexOptions},
    Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{
    check_pagination, AuditEventStore, EventPage, SortDirection, SortField, SortKey, StoreError,
    StoreResult,
};
use crate::entity::{AuditCategory, AuditEvent, AuditSeverity, AuditStatus};
use crate::filter::{QueryFilter, TimeRange};
use crate::stats::AuditStats;

/// Stored shape of an audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEventDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub category: AuditCategory,
    #[serde(default)]
    pub event_type: String,
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub severity: AuditSeverity,
    pub status: AuditStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<AuditEvent> for AuditEventDocument {
    fn from(e: AuditEvent) -> Self {
        Self {
            id: e.id,
            tenant_id: e.tenant_id,
            user_id: e.user_id,
            user_email: e.user_email,
            category: e.category,
            event_type: e.event_type,
            action: e.action,
            resource_type: e.resource_type,
            resource_id: e.resource_id,
            resource_name: e.resource_name,
            ip_address: e.ip_address,
            user_agent: e.user_agent,
            severity: e.severity,
            status: e.status,
            error_message: e.error_message,
            details: e.details,
            created_at: e.created_at,
        }
    }
}

impl From<AuditEventDocument> for AuditEvent {
    fn from(d: AuditEventDocument) -> Self {
        Self {
            id: d.id,
            tenant_id: d.tenant_id,
            user_id: d.user_id,
            user_email: d.user_email,
            category: d.category,
            event_type: d.event_type,
            action: d.action,
            resource_type: d.resource_type,
            resource_id: d.resource_id,
            resource_name: d.resource_name,
            ip_address: d.ip_address,
            user_agent: d.user_agent,
            severity: d.severity,
            status: d.status,
            error_message: d.error_message,
            details: d.details,
            created_at: d.created_at,
        }
    }
}

fn document_field(field: SortField) -> &'static str {
    match field {
        SortField::CreatedAt => "createdAt",
        SortField::TenantId => "tenantId",
        SortField::UserId => "userId",
        SortField::UserEmail => "userEmail",
        SortField::Category => "category",
        SortField::EventType => "eventType",
        SortField::Action => "action",
        SortField::Severity => "severity",
        SortField::Status => "status",
        SortField::IpAddress => "ipAddress",
    }
}

fn sort_document(key: SortKey) -> Document {
    let direction = match key.direction {
        SortDirection::Asc => 1,
        SortDirection::Desc => -1,
    };
    let mut sort = Document::new();
    sort.insert(document_field(key.field), direction);
    sort.insert("_id", 1);
    sort
}

fn window_document(range: &TimeRange) -> Option<Document> {
    let mut window = Document::new();
    if let Some(start) = range.start {
        window.insert("$gte", bson::DateTime::from_chrono(start));
    }
    if let Some(end) = range.end {
        window.insert("$lt", bson::DateTime::from_chrono(end));
    }
    (!window.is_empty()).then_some(window)
}

/// Translate a normalized filter into a MongoDB query document
pub fn filter_document(filter: &QueryFilter) -> Document {
    let mut query = Document::new();

    let exact = [
        ("tenantId", &filter.tenant_id),
        ("userId", &filter.user_id),
        ("userEmail", &filter.user_email),
    ];
    for (field, value) in exact {
        if !value.is_empty() {
            query.insert(field, value.as_str());
        }
    }

    let sets = [
        ("category", &filter.categories),
        ("eventType", &filter.event_types),
        ("severity", &filter.severities),
        ("status", &filter.statuses),
    ];
    for (field, values) in sets {
        if !values.is_empty() {
            query.insert(field, doc! { "$in": values.clone() });
        }
    }

    if let Some(window) = window_document(&filter.time_range) {
        query.insert("createdAt", window);
    }

    query
}

fn stats_pipeline(tenant_id: &str, range: &TimeRange) -> Vec<Document> {
    let mut matcher = Document::new();
    if !tenant_id.is_empty() {
        matcher.insert("tenantId", tenant_id);
    }
    if let Some(window) = window_document(range) {
        matcher.insert("createdAt", window);
    }

    let group_by = |field: &str| {
        vec![doc! {
            "$group": { "_id": format!("${}", field), "count": { "$sum": 1 } }
        }]
    };

    vec![
        doc! { "$match": matcher },
        doc! {
            "$facet": {
                "total": [ { "$count": "count" } ],
                "byCategory": group_by("category"),
                "bySeverity": group_by("severity"),
                "byStatus": group_by("status"),
            }
        },
    ]
}

fn bson_count(value: Option<&Bson>) -> i64 {
    match value {
        Some(Bson::Int32(n)) => *n as i64,
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) => *n as i64,
        _ => 0,
    }
}

fn group_counts(facets: &Document, name: &str) -> BTreeMap<String, i64> {
    let mut counts = BTreeMap::new();
    if let Ok(groups) = facets.get_array(name) {
        for group in groups.iter().filter_map(Bson::as_document) {
            let key = group.get_str("_id").unwrap_or_default().to_string();
            *counts.entry(key).or_insert(0) += bson_count(group.get("count"));
        }
    }
    counts
}

/// Assemble stats from the `$facet` output document
pub fn stats_from_facets(facets: &Document) -> AuditStats {
    let total_events = facets
        .get_array("total")
        .ok()
        .and_then(|rows| rows.first())
        .and_then(Bson::as_document)
        .map(|row| bson_count(row.get("count")))
        .unwrap_or(0);

    let events_by_category = group_counts(facets, "byCategory");
    let events_by_severity = group_counts(facets, "bySeverity");
    let events_by_status = group_counts(facets, "byStatus");

    let critical_events = events_by_severity
        .get(AuditSeverity::Critical.as_str())
        .copied()
        .unwrap_or(0);
    let failed_events = events_by_status
        .get(AuditStatus::Failure.as_str())
        .copied()
        .unwrap_or(0);

    AuditStats {
        total_events,
        events_by_category,
        events_by_severity,
        events_by_status,
        critical_events,
        failed_events,
    }
}

pub struct MongoAuditStore {
    db: Database,
    collection: Collection<AuditEventDocument>,
}

impl MongoAuditStore {
    pub fn new(db: &Database, collection_name: &str) -> Self {
        Self {
            db: db.clone(),
            collection: db.collection(collection_name),
        }
    }

    /// Indexes backing tenant-scoped, time-ordered queries
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        info!(collection = %self.collection.name(), "Ensuring audit event indexes");

        let models = [
            doc! { "tenantId": 1, "createdAt": -1 },
            doc! { "tenantId": 1, "category": 1, "createdAt": -1 },
            doc! { "tenantId": 1, "userId": 1, "createdAt": -1 },
            doc! { "createdAt": -1 },
        ];
        for keys in models {
            self.collection
                .create_index(
                    IndexModel::builder()
                        .keys(keys)
                        .options(IndexOptions::builder().background(true).build())
                        .build(),
                )
                .await?;
        }
        Ok(())
    }

    /// Ingestion helper for seeding and tooling
    pub async fn insert_many(&self, events: Vec<AuditEvent>) -> StoreResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let docs: Vec<AuditEventDocument> = events.into_iter().map(Into::into).collect();
        let result = self.collection.insert_many(docs).await?;
        Ok(result.inserted_ids.len())
    }
}

#[async_trait]
impl AuditEventStore for MongoAuditStore {
    async fn query_events(&self, filter: &QueryFilter) -> StoreResult<EventPage> {
        let sort = SortKey::parse(&filter.sort)?;
        let (skip, limit) = check_pagination(filter)?;
        let query = filter_document(filter);

        let count = async {
            let total = self.collection.count_documents(query.clone()).await?;
            Ok::<i64, StoreError>(total as i64)
        };

        // A zero limit means "no limit" to MongoDB, so skip the find entirely.
        let find = async {
            if limit == 0 {
                return Ok::<Vec<AuditEventDocument>, StoreError>(Vec::new());
            }
            let options = FindOptions::builder()
                .sort(sort_document(sort))
                .skip(skip)
                .limit(limit)
                .build();
            let cursor = self.collection.find(query.clone()).with_options(options).await?;
            let docs: Vec<AuditEventDocument> = cursor.try_collect().await?;
            Ok(docs)
        };

        let (docs, total) = tokio::try_join!(find, count)?;

        Ok(EventPage {
            events: docs.into_iter().map(Into::into).collect(),
            total,
        })
    }

    async fn get_event(&self, tenant_id: &str, event_id: &str) -> StoreResult<AuditEvent> {
        let mut query = doc! { "_id": event_id };
        if !tenant_id.is_empty() {
            query.insert("tenantId", tenant_id);
        }

        self.collection
            .find_one(query)
            .await?
            .map(Into::into)
            .ok_or_else(|| StoreError::NotFound {
                id: event_id.to_string(),
            })
    }

    async fn get_stats(&self, tenant_id: &str, range: &TimeRange) -> StoreResult<AuditStats> {
        let mut cursor = self
            .collection
            .aggregate(stats_pipeline(tenant_id, range))
            .await?;

        match cursor.try_next().await? {
            Some(facets) => Ok(stats_from_facets(&facets)),
            None => Ok(AuditStats::default()),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mongodb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_empty_filter_document() {
        let filter = QueryFilter::for_tenant("", 50, 0);
        assert!(filter_document(&filter).is_empty());
    }

    #[test]
    fn test_filter_document_fields() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut filter = QueryFilter::for_tenant("acme", 50, 0);
        filter.user_email = "ana@example.com".into();
        filter.severities = vec!["critical".into(), "error".into()];
        filter.time_range = TimeRange {
            start: Some(start),
            end: None,
        };

        let query = filter_document(&filter);
        assert_eq!(query.get_str("tenantId").unwrap(), "acme");
        assert_eq!(query.get_str("userEmail").unwrap(), "ana@example.com");
        assert!(query.get("userId").is_none());
        assert!(query.get("category").is_none());

        let severity = query.get_document("severity").unwrap();
        assert_eq!(severity.get_array("$in").unwrap().len(), 2);

        let created = query.get_document("createdAt").unwrap();
        assert_eq!(
            created.get_datetime("$gte").unwrap(),
            &bson::DateTime::from_chrono(start)
        );
        assert!(created.get("$lt").is_none());
    }

    #[test]
    fn test_sort_document_has_tiebreaker() {
        let sort = sort_document(SortKey {
            field: SortField::Severity,
            direction: SortDirection::Asc,
        });
        let keys: Vec<&String> = sort.keys().collect();
        assert_eq!(keys, vec!["severity", "_id"]);
        assert_eq!(sort.get_i32("severity").unwrap(), 1);
    }

    #[test]
    fn test_stats_from_facets() {
        let facets = doc! {
            "total": [ { "count": 7 } ],
            "byCategory": [
                { "_id": "security", "count": 4 },
                { "_id": "system", "count": 3_i64 },
            ],
            "bySeverity": [
                { "_id": "critical", "count": 2 },
                { "_id": "info", "count": 5 },
            ],
            "byStatus": [
                { "_id": "failure", "count": 3 },
                { "_id": "success", "count": 4 },
            ],
        };

        let stats = stats_from_facets(&facets);
        assert_eq!(stats.total_events, 7);
        assert_eq!(stats.critical_events, 2);
        assert_eq!(stats.failed_events, 3);
        assert_eq!(stats.events_by_category["system"], 3);
        assert!(stats.is_consistent());
    }

    #[test]
    fn test_stats_from_empty_facets() {
        let facets = doc! { "total": [], "byCategory": [], "bySeverity": [], "byStatus": [] };
        assert_eq!(stats_from_facets(&facets), AuditStats::default());
    }

    #[test]
    fn test_document_round_trip() {
        let event =
            AuditEvent::new("acme", AuditCategory::Configuration, "update", "changed setting")
                .with_id("evt-1")
                .with_created_at(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        let document = bson::to_document(&AuditEventDocument::from(event.clone())).unwrap();
        assert_eq!(document.get_str("_id").unwrap(), "evt-1");
        assert_eq!(document.get_str("category").unwrap(), "configuration");

        let decoded: AuditEventDocument = bson::from_document(document).unwrap();
        assert_eq!(AuditEvent::from(decoded), event);
    }
}
