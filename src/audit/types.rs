//! Audit and threat event types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of resource an audit event touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Protected health information (encrypted memory content)
    Phi,
    /// Chat transcript data
    Chat,
    /// Risk assessments produced by the orchestrator
    Assessment,
    /// Aggregate analytics with no per-user content
    Analytics,
    /// Everything else
    System,
}

/// Outcome of the audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

/// One append-only audit record.
///
/// The integrity hash covers the canonical serialization of everything above
/// it plus the record timestamp, keyed by the server secret. Records are
/// never updated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Record id
    pub id: Uuid,

    /// User the action was performed by or on behalf of
    pub user_id: String,

    /// Action name, e.g. "memory_stored", "memory_revealed", "session_start"
    pub action: String,

    /// Kind of resource touched
    pub resource: ResourceKind,

    /// Identifier of the specific resource, when one exists
    pub resource_id: Option<String>,

    /// Outcome of the action
    pub outcome: AuditOutcome,

    /// Free-form detail. Must never contain plaintext memory content.
    pub detail: Option<String>,

    /// Creation time, Unix milliseconds
    pub timestamp: i64,

    /// Tamper-evidence hash over the fields above
    pub integrity_hash: String,
}

impl AuditEvent {
    /// Canonical string the integrity hash is computed over.
    ///
    /// Field order is fixed; changing it invalidates every stored hash.
    pub fn canonical(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}",
            self.id,
            self.user_id,
            self.action,
            serde_json::to_string(&self.resource).unwrap_or_default(),
            self.resource_id.as_deref().unwrap_or(""),
            serde_json::to_string(&self.outcome).unwrap_or_default(),
            self.detail.as_deref().unwrap_or(""),
        )
    }
}

/// Severity of a threat finding, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Category of a threat finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    SqlInjection,
    CrossSiteScripting,
    CrossSiteRequestForgery,
    MaliciousPayload,
    RateLimitExceeded,
    SuspiciousActivity,
}

/// One finding produced by the threat scanner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatFinding {
    pub kind: ThreatKind,
    pub severity: ThreatSeverity,
    /// Which pattern or rule fired. Pattern names only, never the matched text.
    pub rule: String,
    pub timestamp: i64,
}

impl ThreatFinding {
    pub fn new(kind: ThreatKind, severity: ThreatSeverity, rule: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            rule: rule.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Result of scanning one inbound request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatScanResult {
    /// Findings in the order their rules fired
    pub findings: Vec<ThreatFinding>,
    /// Highest severity across the findings, if any
    pub max_severity: Option<ThreatSeverity>,
    /// Whether the request should be blocked outright
    pub blocked: bool,
}

impl ThreatScanResult {
    pub fn clean() -> Self {
        Self {
            findings: Vec::new(),
            max_severity: None,
            blocked: false,
        }
    }

    pub fn from_findings(findings: Vec<ThreatFinding>) -> Self {
        let max_severity = findings.iter().map(|f| f.severity).max();
        let blocked = matches!(
            max_severity,
            Some(ThreatSeverity::Critical | ThreatSeverity::High)
        );
        Self {
            findings,
            max_severity,
            blocked,
        }
    }
}

/// A request as the scanner sees it. The transport layer maps its native
/// request type into this before calling the scanner.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: String,
    /// Lowercased header name to value
    pub headers: std::collections::HashMap<String, String>,
    pub user_id: Option<String>,
    pub source_ip: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(ThreatSeverity::Critical > ThreatSeverity::High);
        assert!(ThreatSeverity::High > ThreatSeverity::Medium);
        assert!(ThreatSeverity::Medium > ThreatSeverity::Low);
    }

    #[test]
    fn test_scan_result_blocks_on_critical() {
        let result = ThreatScanResult::from_findings(vec![
            ThreatFinding::new(ThreatKind::CrossSiteScripting, ThreatSeverity::High, "xss_script_tag"),
            ThreatFinding::new(ThreatKind::SqlInjection, ThreatSeverity::Critical, "sql_keywords"),
        ]);
        assert!(result.blocked);
        assert_eq!(result.max_severity, Some(ThreatSeverity::Critical));
    }

    #[test]
    fn test_scan_result_blocks_on_high() {
        let result = ThreatScanResult::from_findings(vec![ThreatFinding::new(
            ThreatKind::CrossSiteScripting,
            ThreatSeverity::High,
            "xss_script_tag",
        )]);
        assert!(result.blocked);
        assert_eq!(result.max_severity, Some(ThreatSeverity::High));
    }

    #[test]
    fn test_scan_result_medium_not_blocking() {
        let result = ThreatScanResult::from_findings(vec![ThreatFinding::new(
            ThreatKind::CrossSiteRequestForgery,
            ThreatSeverity::Medium,
            "csrf_missing_origin_headers",
        )]);
        assert!(!result.blocked);
    }

    #[test]
    fn test_scan_result_clean() {
        let result = ThreatScanResult::clean();
        assert!(!result.blocked);
        assert!(result.findings.is_empty());
    }

    #[test]
    fn test_canonical_field_order_stable() {
        let event = AuditEvent {
            id: Uuid::nil(),
            user_id: "user-1".to_string(),
            action: "memory_stored".to_string(),
            resource: ResourceKind::Phi,
            resource_id: Some("mem-1".to_string()),
            outcome: AuditOutcome::Success,
            detail: None,
            timestamp: 0,
            integrity_hash: String::new(),
        };
        assert_eq!(
            event.canonical(),
            "00000000-0000-0000-0000-000000000000|user-1|memory_stored|\"phi\"|mem-1|\"success\"|"
        );
    }
}
