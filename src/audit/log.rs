//! Append-only audit log
//!
//! Recording an event must never fail the operation being audited. A
//! persistence failure is logged loudly and swallowed; the returned event is
//! still fully formed so callers can surface it.

use std::sync::Arc;
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::crypto;
use crate::error::Result;
use crate::persistence::StorageBackend;

use super::types::{AuditEvent, AuditOutcome, ResourceKind};

/// Retention windows in days per resource kind. PHI retention comes from
/// configuration; the rest are fixed policy.
const RETENTION_CHAT_DAYS: u32 = 730;
const RETENTION_ASSESSMENT_DAYS: u32 = 1825;
const RETENTION_ANALYTICS_DAYS: u32 = 365;
const RETENTION_SYSTEM_DAYS: u32 = 365;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Tamper-evident audit log over a storage backend
pub struct AuditLog {
    config: AuditConfig,
    backend: Arc<dyn StorageBackend>,
}

impl AuditLog {
    pub fn new(config: AuditConfig, backend: Arc<dyn StorageBackend>) -> Self {
        Self { config, backend }
    }

    /// Record one audit event. Infallible by contract: persistence failures
    /// are alerted through the log stream and swallowed.
    pub async fn record_event(
        &self,
        user_id: &str,
        action: &str,
        resource: ResourceKind,
        resource_id: Option<String>,
        outcome: AuditOutcome,
        detail: Option<String>,
    ) -> AuditEvent {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let mut event = AuditEvent {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            action: action.to_string(),
            resource,
            resource_id,
            outcome,
            detail,
            timestamp,
            integrity_hash: String::new(),
        };
        event.integrity_hash =
            crypto::hash_audit(&event.canonical(), timestamp, &self.config.server_secret);

        if let Err(e) = self.backend.append_audit(&event).await {
            // An unrecorded audit event is an operational incident, not a
            // reason to fail the user's request.
            tracing::error!(
                user_id = %user_id,
                action = %action,
                error = %e,
                "AUDIT PERSISTENCE FAILURE"
            );
        }

        event
    }

    /// Verify an event's integrity hash against the server secret
    pub fn verify_event(&self, event: &AuditEvent) -> bool {
        crypto::verify_audit_hash(
            &event.canonical(),
            event.timestamp,
            &self.config.server_secret,
            &event.integrity_hash,
        )
    }

    /// Audit trail for one user
    pub async fn events_for(&self, user_id: &str) -> Result<Vec<AuditEvent>> {
        self.backend.list_audit(user_id).await
    }

    /// Purge events past their retention window. Returns the total removed.
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp_millis();
        let windows = [
            (ResourceKind::Phi, self.config.retention_days),
            (ResourceKind::Chat, RETENTION_CHAT_DAYS),
            (ResourceKind::Assessment, RETENTION_ASSESSMENT_DAYS),
            (ResourceKind::Analytics, RETENTION_ANALYTICS_DAYS),
            (ResourceKind::System, RETENTION_SYSTEM_DAYS),
        ];

        let results = futures::future::join_all(windows.iter().map(|(resource, days)| {
            let cutoff = now - *days as i64 * MS_PER_DAY;
            self.backend.purge_audit_before(*resource, cutoff)
        }))
        .await;

        let mut purged = 0;
        for result in results {
            purged += result?;
        }
        if purged > 0 {
            tracing::info!(purged, "Purged expired audit events");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryBackend;

    fn test_log() -> (AuditLog, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let config = AuditConfig {
            server_secret: "test-secret".to_string(),
            ..Default::default()
        };
        (AuditLog::new(config, backend.clone()), backend)
    }

    #[tokio::test]
    async fn test_record_and_verify() {
        let (log, _) = test_log();
        let event = log
            .record_event(
                "user-1",
                "memory_stored",
                ResourceKind::Phi,
                Some("mem-1".to_string()),
                AuditOutcome::Success,
                None,
            )
            .await;

        assert!(log.verify_event(&event));
        assert_eq!(log.events_for("user-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_verify_rejects_tampered_event() {
        let (log, _) = test_log();
        let mut event = log
            .record_event(
                "user-1",
                "memory_stored",
                ResourceKind::Phi,
                None,
                AuditOutcome::Success,
                None,
            )
            .await;

        event.user_id = "user-2".to_string();
        assert!(!log.verify_event(&event));
    }

    #[tokio::test]
    async fn test_verify_rejects_wrong_secret() {
        let backend = Arc::new(InMemoryBackend::new());
        let log_a = AuditLog::new(
            AuditConfig {
                server_secret: "secret-a".to_string(),
                ..Default::default()
            },
            backend.clone(),
        );
        let log_b = AuditLog::new(
            AuditConfig {
                server_secret: "secret-b".to_string(),
                ..Default::default()
            },
            backend,
        );

        let event = log_a
            .record_event(
                "user-1",
                "session_start",
                ResourceKind::System,
                None,
                AuditOutcome::Success,
                None,
            )
            .await;

        assert!(log_a.verify_event(&event));
        assert!(!log_b.verify_event(&event));
    }

    #[tokio::test]
    async fn test_purge_keeps_recent_events() {
        let (log, _) = test_log();
        log.record_event(
            "user-1",
            "memory_revealed",
            ResourceKind::Phi,
            None,
            AuditOutcome::Success,
            None,
        )
        .await;

        assert_eq!(log.purge_expired().await.unwrap(), 0);
        assert_eq!(log.events_for("user-1").await.unwrap().len(), 1);
    }
}
