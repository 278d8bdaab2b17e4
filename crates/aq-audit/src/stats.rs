//! Audit Statistics
//!
//! Windowed aggregate over a tenant's audit events: one grouping per
//! classification axis plus the critical and failed rollups.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entity::AuditEvent;

/// Aggregate statistics for a window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuditStats {
    pub total_events: i64,
    pub events_by_category: BTreeMap<String, i64>,
    pub events_by_severity: BTreeMap<String, i64>,
    pub events_by_status: BTreeMap<String, i64>,
    /// Events with severity `critical`
    pub critical_events: i64,
    /// Events with status `failure`
    pub failed_events: i64,
}

impl AuditStats {
    /// Every event carries exactly one value per axis, so each grouping
    /// must add up to the total.
    pub fn is_consistent(&self) -> bool {
        let sum = |m: &BTreeMap<String, i64>| m.values().sum::<i64>();
        sum(&self.events_by_category) == self.total_events
            && sum(&self.events_by_severity) == self.total_events
            && sum(&self.events_by_status) == self.total_events
            && self.critical_events <= self.total_events
            && self.failed_events <= self.total_events
    }
}

/// Single-pass fold of events into [`AuditStats`]
#[derive(Debug, Default)]
pub struct StatsAccumulator {
    stats: AuditStats,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: &AuditEvent) {
        let stats = &mut self.stats;
        stats.total_events += 1;
        *stats
            .events_by_category
            .entry(event.category.as_str().to_string())
            .or_insert(0) += 1;
        *stats
            .events_by_severity
            .entry(event.severity.as_str().to_string())
            .or_insert(0) += 1;
        *stats
            .events_by_status
            .entry(event.status.as_str().to_string())
            .or_insert(0) += 1;
        if event.severity.is_critical() {
            stats.critical_events += 1;
        }
        if event.status.is_failure() {
            stats.failed_events += 1;
        }
    }

    pub fn finish(self) -> AuditStats {
        self.stats
    }
}

impl<'a> FromIterator<&'a AuditEvent> for AuditStats {
    fn from_iter<I: IntoIterator<Item = &'a AuditEvent>>(iter: I) -> Self {
        let mut acc = StatsAccumulator::new();
        for event in iter {
            acc.add(event);
        }
        acc.finish()
    }
}
