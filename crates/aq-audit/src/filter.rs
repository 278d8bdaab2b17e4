//! Audit Query Filter
//!
//! The request-scoped description of which audit events a caller wants, and
//! the normalization that turns loosely-typed request parameters into it.
//!
//! Normalization is deliberately two-tier: structural input (the request
//! body itself) must parse, while optional sub-fields such as dates and
//! pagination fall back to defaults when they cannot be parsed.

use aq_config::QueryConfig;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::entity::AuditEvent;

mod loose {
    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer};

    /// Keeps a number or a string as raw text and treats any other value
    /// as absent; parsing happens later so that garbage degrades to a
    /// default instead of a rejection.
    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Loose {
            Num(i64),
            Str(String),
            Other(IgnoredAny),
        }

        Ok(match Option::<Loose>::deserialize(deserializer)? {
            Some(Loose::Num(n)) => Some(n.to_string()),
            Some(Loose::Str(s)) => Some(s),
            Some(Loose::Other(_)) | None => None,
        })
    }
}

/// Half-open time window `[start, end)`. A missing bound is unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| ts >= start) && self.end.map_or(true, |end| ts < end)
    }
}

/// Sort request carried opaquely to the storage collaborator, which decides
/// which fields and directions are legal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SortHint {
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
}

/// Normalized audit query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFilter {
    /// Empty means cross-tenant (privileged caller)
    pub tenant_id: String,
    /// Exact match; empty means unconstrained
    pub user_id: String,
    /// Exact match; empty means unconstrained
    pub user_email: String,
    pub categories: Vec<String>,
    pub event_types: Vec<String>,
    pub severities: Vec<String>,
    pub statuses: Vec<String>,
    pub time_range: TimeRange,
    pub limit: i64,
    pub offset: i64,
    pub sort: SortHint,
}

impl QueryFilter {
    /// Unconstrained filter for one tenant with the given page bounds
    pub fn for_tenant(tenant_id: impl Into<String>, limit: i64, offset: i64) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: String::new(),
            user_email: String::new(),
            categories: Vec::new(),
            event_types: Vec::new(),
            severities: Vec::new(),
            statuses: Vec::new(),
            time_range: TimeRange::unbounded(),
            limit,
            offset,
            sort: SortHint::default(),
        }
    }

    /// Whether an event satisfies every dimension of this filter, ignoring
    /// pagination and sort. Empty sets and empty strings do not constrain.
    pub fn matches(&self, event: &AuditEvent) -> bool {
        exact(&self.tenant_id, &event.tenant_id)
            && exact(&self.user_id, event.user_id.as_deref().unwrap_or_default())
            && exact(&self.user_email, event.user_email.as_deref().unwrap_or_default())
            && member(&self.categories, event.category.as_str())
            && member(&self.event_types, &event.event_type)
            && member(&self.severities, event.severity.as_str())
            && member(&self.statuses, event.status.as_str())
            && self.time_range.contains(event.created_at)
    }
}

fn exact(wanted: &str, actual: &str) -> bool {
    wanted.is_empty() || wanted == actual
}

fn member(set: &[String], value: &str) -> bool {
    set.is_empty() || set.iter().any(|v| v == value)
}

/// Raw filter parameters as they arrive on the wire.
///
/// Used both as query string (`category=a&category=b`) and as the `filter`
/// object of an export body (`"category": ["a", "b"]`).
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FilterParams {
    pub user_id: Option<String>,
    pub user_email: Option<String>,

    /// Repeatable; any listed category matches
    #[serde(default, alias = "categories")]
    pub category: Vec<String>,

    /// Repeatable; any listed event type matches
    #[serde(default, alias = "event_types")]
    pub event_type: Vec<String>,

    /// Repeatable; any listed severity matches
    #[serde(default, alias = "severities")]
    pub severity: Vec<String>,

    /// Repeatable; any listed status matches
    #[serde(default, alias = "statuses")]
    pub status: Vec<String>,

    /// RFC 3339 timestamp, inclusive
    pub start_date: Option<String>,

    /// RFC 3339 timestamp, exclusive
    pub end_date: Option<String>,

    #[serde(default, deserialize_with = "loose::deserialize_opt")]
    #[param(value_type = Option<i64>)]
    #[schema(value_type = Option<i64>)]
    pub limit: Option<String>,

    #[serde(default, deserialize_with = "loose::deserialize_opt")]
    #[param(value_type = Option<i64>)]
    #[schema(value_type = Option<i64>)]
    pub offset: Option<String>,

    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
}

impl FilterParams {
    /// Normalize into a [`QueryFilter`] scoped to `tenant_id`.
    ///
    /// Limit defaults when missing or unparsable and is clamped to the
    /// configured maximum; negative values pass through for the store to
    /// judge. Unparsable dates leave that side of the window open.
    pub fn into_filter(self, tenant_id: impl Into<String>, config: &QueryConfig) -> QueryFilter {
        let limit = parse_or(self.limit.as_deref(), config.default_limit).min(config.max_limit);
        let offset = parse_or(self.offset.as_deref(), 0);

        QueryFilter {
            tenant_id: tenant_id.into(),
            user_id: non_blank(self.user_id).unwrap_or_default(),
            user_email: non_blank(self.user_email).unwrap_or_default(),
            categories: collect_set(self.category),
            event_types: collect_set(self.event_type),
            severities: collect_set(self.severity),
            statuses: collect_set(self.status),
            time_range: TimeRange {
                start: self.start_date.as_deref().and_then(parse_timestamp),
                end: self.end_date.as_deref().and_then(parse_timestamp),
            },
            limit,
            offset,
            sort: SortHint {
                sort_by: non_blank(self.sort_by),
                sort_direction: non_blank(self.sort_direction),
            },
        }
    }
}

/// Raw statistics window parameters
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsParams {
    /// RFC 3339 timestamp; defaults to `now - stats_window_hours`
    pub start_date: Option<String>,
    /// RFC 3339 timestamp; defaults to now
    pub end_date: Option<String>,
}

impl StatsParams {
    /// Resolve into a fully bounded window. Statistics always need both
    /// bounds, so missing or unparsable values take the policy defaults.
    pub fn resolve(&self, now: DateTime<Utc>, window_hours: i64) -> TimeRange {
        let start = self
            .start_date
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(|| window_start(now, window_hours));
        let end = self
            .end_date
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now);
        TimeRange::between(start, end)
    }
}

/// `now - window_hours`, saturating at the earliest representable instant
fn window_start(now: DateTime<Utc>, window_hours: i64) -> DateTime<Utc> {
    TimeDelta::try_hours(window_hours)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Parse the single accepted timestamp format (RFC 3339)
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_or(value: Option<&str>, default: i64) -> i64 {
    value
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn collect_set(values: Vec<String>) -> Vec<String> {
    let mut set: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim();
        if !value.is_empty() && !set.iter().any(|v| v == value) {
            set.push(value.to_string());
        }
    }
    set
}
