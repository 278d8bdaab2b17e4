//! Development Data Seeder
//!
//! Fills the in-memory store with a deterministic spread of audit events
//! for two tenants so the API can be explored without a database.
//!
//!   acme:   alice@acme.com, bob@acme.com
//!   globex: hank@globex.com

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::info;

use crate::entity::{AuditCategory, AuditEvent, AuditSeverity, AuditStatus};
use crate::store::MemoryAuditStore;

/// Events generated per tenant, one per hour going back from `now`
const EVENTS_PER_TENANT: usize = 48;

struct SeedUser {
    tenant: &'static str,
    id: &'static str,
    email: &'static str,
    ip: &'static str,
}

const USERS: [SeedUser; 3] = [
    SeedUser { tenant: "acme", id: "usr-alice", email: "alice@acme.com", ip: "10.0.0.11" },
    SeedUser { tenant: "acme", id: "usr-bob", email: "bob@acme.com", ip: "10.0.0.12" },
    SeedUser { tenant: "globex", id: "usr-hank", email: "hank@globex.com", ip: "192.168.4.20" },
];

const ACTIONS: [(AuditCategory, &str, &str, &str); 8] = [
    (AuditCategory::Authentication, "login", "User signed in", "session"),
    (AuditCategory::Authorization, "access_denied", "Permission check failed", "role"),
    (AuditCategory::DataAccess, "read", "Viewed customer record", "customer"),
    (AuditCategory::DataModification, "update", "Updated invoice, status changed", "invoice"),
    (AuditCategory::Configuration, "settings_change", "Changed retention policy", "setting"),
    (AuditCategory::UserManagement, "invite", "Invited a new member", "user"),
    (AuditCategory::System, "job_run", "Nightly export job ran", "job"),
    (AuditCategory::Security, "mfa_reset", "Reset MFA for account", "account"),
];

pub struct DevDataSeeder<'a> {
    store: &'a MemoryAuditStore,
}

impl<'a> DevDataSeeder<'a> {
    pub fn new(store: &'a MemoryAuditStore) -> Self {
        Self { store }
    }

    /// Seed sample events ending at `now`; returns how many were inserted
    pub fn seed(&self, now: DateTime<Utc>) -> usize {
        info!("=== DEV DATA SEEDER ===");

        let events = sample_events(now);
        let count = events.len();
        self.store.insert_many(events);

        info!(events = count, tenants = "acme, globex", "Seeded development audit events");
        info!("=======================");
        count
    }
}

/// Deterministic sample events: every category, severity and status appear
/// for each tenant, spaced one hour apart.
pub fn sample_events(now: DateTime<Utc>) -> Vec<AuditEvent> {
    let mut events = Vec::new();

    for tenant in ["acme", "globex"] {
        let users: Vec<&SeedUser> = USERS.iter().filter(|u| u.tenant == tenant).collect();

        for i in 0..EVENTS_PER_TENANT {
            let user = users[i % users.len()];
            let (category, event_type, action, resource_type) = ACTIONS[i % ACTIONS.len()];

            let severity = match i % 12 {
                0 => AuditSeverity::Critical,
                1 | 7 => AuditSeverity::Error,
                2 | 5 | 9 => AuditSeverity::Warning,
                _ => AuditSeverity::Info,
            };

            let mut event = AuditEvent::new(tenant, category, event_type, action)
                .with_id(format!("{}-evt-{:03}", tenant, i))
                .with_user(user.id, user.email)
                .with_resource(
                    resource_type,
                    format!("{}-{}", resource_type, i),
                    Some(format!("{} #{}", resource_type, i)),
                )
                .with_ip_address(user.ip)
                .with_user_agent("Mozilla/5.0 (seed)")
                .with_severity(severity)
                .with_details(json!({ "seed": true, "sequence": i }))
                .with_created_at(now - Duration::hours(i as i64) - Duration::minutes(5));

            event = match i % 10 {
                3 => event.with_error("upstream timeout, retry scheduled"),
                8 => event.with_status(AuditStatus::Pending),
                _ => event,
            };

            events.push(event);
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{QueryFilter, TimeRange};
    use crate::store::AuditEventStore;

    #[test]
    fn test_sample_events_are_deterministic() {
        let now = Utc::now();
        let first = sample_events(now);
        let second = sample_events(now);
        assert_eq!(first, second);
        assert_eq!(first.len(), EVENTS_PER_TENANT * 2);
    }

    #[test]
    fn test_sample_events_cover_vocabularies() {
        let events = sample_events(Utc::now());
        for category in AuditCategory::ALL {
            assert!(events.iter().any(|e| e.category == category));
        }
        for severity in AuditSeverity::ALL {
            assert!(events.iter().any(|e| e.severity == severity));
        }
        for status in AuditStatus::ALL {
            assert!(events.iter().any(|e| e.status == status));
        }
    }

    #[tokio::test]
    async fn test_seed_memory_store() {
        let now = Utc::now();
        let store = MemoryAuditStore::new();
        let inserted = DevDataSeeder::new(&store).seed(now);
        assert_eq!(inserted, store.len());

        let page = store
            .query_events(&QueryFilter::for_tenant("globex", 1000, 0))
            .await
            .unwrap();
        assert_eq!(page.total, EVENTS_PER_TENANT as i64);

        let day = TimeRange::between(now - Duration::hours(24), now);
        let stats = store.get_stats("acme", &day).await.unwrap();
        assert_eq!(stats.total_events, 24);
        assert!(stats.is_consistent());
    }
}
