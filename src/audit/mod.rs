//! Audit trail and request threat scanning
//!
//! Two halves: an append-only, tamper-evident audit log that must never
//! fail the operation being audited, and a pattern-battery threat scanner
//! with a sliding-window rate counter that fails open.

pub mod log;
pub mod threat;
pub mod types;

pub use log::AuditLog;
pub use threat::{ActivityKind, ThreatScanner};
pub use types::{
    AuditEvent, AuditOutcome, ResourceKind, ScanRequest, ThreatFinding, ThreatKind,
    ThreatScanResult, ThreatSeverity,
};
