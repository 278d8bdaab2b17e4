//! AuditQ Common
//!
//! Runtime utilities shared by the AuditQ crates and binaries.

pub mod logging;
