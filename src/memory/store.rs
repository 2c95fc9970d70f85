//! Consent-gated encrypted memory store
//!
//! Proposal lifecycle: proposed, then either auto-approved or held pending
//! explicit consent, then stored, updated in place, and eventually archived
//! by soft delete. Ciphertext is written only after the consent gate passes.
//! Every operation that stores or reveals content produces one audit event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::{AuditLog, AuditOutcome, ResourceKind};
use crate::config::MemoryConfig;
use crate::crypto::{self, UserKey};
use crate::error::{Error, Result};
use crate::persistence::StorageBackend;

use super::types::{
    ConsentLevel, MemoryEntry, MemoryProposal, MemoryQuery, MemorySource, RetentionPolicy,
    RevealedMemory, SessionContinuity,
};

/// Consent predicate: the proposal's consent level or type demands an
/// explicit user decision.
fn consent_for_level(proposal: &MemoryProposal) -> bool {
    proposal.consent_level == ConsentLevel::Explicit || proposal.memory_type.is_sensitive()
}

/// Consent predicate: high-importance content needs consent unless it is
/// standard therapeutic bookkeeping.
fn consent_for_importance(proposal: &MemoryProposal, threshold: u8) -> bool {
    proposal.importance >= threshold && proposal.source != MemorySource::TherapeuticStandard
}

/// Consent predicate: permanent retention needs consent unless the user
/// asked for it themselves.
fn consent_for_retention(proposal: &MemoryProposal) -> bool {
    proposal.retention == RetentionPolicy::Permanent
        && proposal.source != MemorySource::UserRequest
}

/// Whether storing this proposal requires explicit consent. The three
/// predicates are independent; each exception applies only to its own
/// predicate, so a user-requested permanent memory with importance 9 still
/// needs consent through the importance rule.
pub fn consent_required(proposal: &MemoryProposal, config: &MemoryConfig) -> bool {
    consent_for_level(proposal)
        || consent_for_importance(proposal, config.consent_importance_threshold)
        || consent_for_retention(proposal)
}

/// Encrypted memory store gated by consent rules
pub struct SecureMemoryStore {
    config: MemoryConfig,
    backend: Arc<dyn StorageBackend>,
    audit: Arc<AuditLog>,
    pending: RwLock<HashMap<Uuid, MemoryProposal>>,
}

impl SecureMemoryStore {
    pub fn new(
        config: MemoryConfig,
        backend: Arc<dyn StorageBackend>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            config,
            backend,
            audit,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Propose a memory for storage. Auto-approved proposals are encrypted
    /// and persisted immediately and their entry id returned; proposals
    /// needing consent are parked and signalled via
    /// [`Error::ConsentRequired`] carrying the proposal id.
    pub async fn propose_memory(&self, proposal: MemoryProposal, key: &UserKey) -> Result<Uuid> {
        if consent_required(&proposal, &self.config) {
            let proposal_id = proposal.id;
            self.pending.write().await.insert(proposal_id, proposal);
            return Err(Error::ConsentRequired(proposal_id.to_string()));
        }
        self.store_entry(proposal, key).await
    }

    /// Store a pending proposal after the user consented.
    pub async fn approve_proposal(
        &self,
        user_id: &str,
        proposal_id: Uuid,
        key: &UserKey,
    ) -> Result<Uuid> {
        let proposal = {
            let mut pending = self.pending.write().await;
            match pending.get(&proposal_id) {
                Some(p) if p.user_id == user_id => pending.remove(&proposal_id),
                _ => None,
            }
        }
        .ok_or_else(|| Error::Memory(format!("No pending proposal {}", proposal_id)))?;

        let mut proposal = proposal;
        proposal.consent_level = ConsentLevel::Explicit;
        self.store_entry(proposal, key).await
    }

    /// Discard a pending proposal. Returns whether one existed.
    pub async fn reject_proposal(&self, user_id: &str, proposal_id: Uuid) -> Result<bool> {
        let mut pending = self.pending.write().await;
        let owned = matches!(pending.get(&proposal_id), Some(p) if p.user_id == user_id);
        if owned {
            pending.remove(&proposal_id);
        }
        Ok(owned)
    }

    /// Pending proposal ids for a user, oldest first
    pub async fn pending_proposals(&self, user_id: &str) -> Vec<Uuid> {
        let pending = self.pending.read().await;
        let mut proposals: Vec<&MemoryProposal> =
            pending.values().filter(|p| p.user_id == user_id).collect();
        proposals.sort_by_key(|p| p.created_at);
        proposals.iter().map(|p| p.id).collect()
    }

    async fn store_entry(&self, proposal: MemoryProposal, key: &UserKey) -> Result<Uuid> {
        let tags_json = serde_json::to_vec(&proposal.tags)?;
        let metadata_json = serde_json::to_vec(&proposal.metadata)?;

        let now = chrono::Utc::now().timestamp_millis();
        let entry = MemoryEntry {
            id: proposal.id,
            user_id: proposal.user_id.clone(),
            memory_type: proposal.memory_type,
            category: proposal.category,
            content: crypto::encrypt(key, proposal.content.as_bytes(), &[])?,
            tags: crypto::encrypt(key, &tags_json, &[])?,
            metadata: crypto::encrypt(key, &metadata_json, &[])?,
            importance: proposal.importance,
            consent_level: proposal.consent_level,
            retention: proposal.retention,
            source: proposal.source,
            confidence: proposal.confidence,
            valence: proposal.valence,
            reference_count: 0,
            created_at: now,
            updated_at: now,
            last_referenced: now,
            active: true,
        };

        let result = self
            .with_timeout(self.backend.put_entry(&entry))
            .await;

        self.audit
            .record_event(
                &entry.user_id,
                "memory_stored",
                ResourceKind::Phi,
                Some(entry.id.to_string()),
                if result.is_ok() {
                    AuditOutcome::Success
                } else {
                    AuditOutcome::Failure
                },
                Some(format!("type={:?}", entry.memory_type)),
            )
            .await;

        result?;
        Ok(entry.id)
    }

    /// Retrieve and decrypt memories matching a query. Rows that fail to
    /// decrypt are skipped with a logged reason; one bad envelope never
    /// fails the batch.
    pub async fn retrieve_memories(
        &self,
        user_id: &str,
        query: &MemoryQuery,
        key: &UserKey,
    ) -> Result<Vec<RevealedMemory>> {
        let mut entries = self
            .with_timeout(self.backend.list_entries(user_id))
            .await?;

        entries.retain(|e| {
            e.active
                && query.memory_type.map_or(true, |t| e.memory_type == t)
                && query.category.map_or(true, |c| e.category == c)
                && query.min_importance.map_or(true, |m| e.importance >= m)
        });
        entries.sort_by(|a, b| {
            b.importance
                .cmp(&a.importance)
                .then(b.last_referenced.cmp(&a.last_referenced))
        });
        entries.truncate(query.limit.unwrap_or(self.config.default_retrieve_limit));

        let mut revealed = Vec::with_capacity(entries.len());
        for entry in &entries {
            match self.reveal(entry, key) {
                Ok(memory) => revealed.push(memory),
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        entry_id = %entry.id,
                        error = %e,
                        "Skipping memory that failed to decrypt"
                    );
                }
            }
        }

        self.audit
            .record_event(
                user_id,
                "memory_revealed",
                ResourceKind::Phi,
                None,
                AuditOutcome::Success,
                Some(format!("revealed={} of {}", revealed.len(), entries.len())),
            )
            .await;

        self.touch_entries(&entries).await;
        Ok(revealed)
    }

    fn reveal(&self, entry: &MemoryEntry, key: &UserKey) -> Result<RevealedMemory> {
        let content = crypto::decrypt(key, &entry.content)?;
        let content = String::from_utf8(content)
            .map_err(|_| Error::Decryption("Content is not valid UTF-8".to_string()))?;

        // Tags and metadata are independent envelopes; losing one does not
        // lose the memory.
        let tags = crypto::decrypt(key, &entry.tags)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        let metadata = crypto::decrypt(key, &entry.metadata)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();

        Ok(RevealedMemory {
            id: entry.id,
            memory_type: entry.memory_type,
            category: entry.category,
            content,
            tags,
            metadata,
            importance: entry.importance,
            consent_level: entry.consent_level,
            retention: entry.retention,
            valence: entry.valence,
            created_at: entry.created_at,
            last_referenced: entry.last_referenced,
        })
    }

    /// Bump reference counters for revealed entries. Awaited so the updates
    /// are durable by the time the retrieval returns, but still best effort;
    /// a failed counter update is not worth failing a retrieval over.
    async fn touch_entries(&self, entries: &[MemoryEntry]) {
        let now = chrono::Utc::now().timestamp_millis();
        let updates = entries.iter().map(|entry| {
            let mut touched = entry.clone();
            touched.reference_count += 1;
            touched.last_referenced = now;
            async move {
                if let Err(e) = self.backend.update_entry(&touched).await {
                    tracing::warn!(entry_id = %touched.id, error = %e, "Failed to bump reference count");
                }
            }
        });
        futures::future::join_all(updates).await;
    }

    /// Replace a memory's content, re-encrypting under the supplied key.
    pub async fn update_memory(
        &self,
        user_id: &str,
        entry_id: Uuid,
        new_content: &str,
        key: &UserKey,
    ) -> Result<()> {
        let mut entry = self
            .with_timeout(self.backend.get_entry(user_id, entry_id))
            .await?
            .ok_or_else(|| Error::Memory(format!("Memory {} not found", entry_id)))?;

        entry.content = crypto::encrypt(key, new_content.as_bytes(), &[])?;
        entry.updated_at = chrono::Utc::now().timestamp_millis();
        let result = self.with_timeout(self.backend.update_entry(&entry)).await;

        self.audit
            .record_event(
                user_id,
                "memory_updated",
                ResourceKind::Phi,
                Some(entry_id.to_string()),
                if result.is_ok() {
                    AuditOutcome::Success
                } else {
                    AuditOutcome::Failure
                },
                None,
            )
            .await;
        result
    }

    /// Soft-delete a memory. Idempotent: archiving an archived entry is a
    /// no-op, not an error.
    pub async fn archive_memory(&self, user_id: &str, entry_id: Uuid) -> Result<()> {
        let mut entry = self
            .with_timeout(self.backend.get_entry(user_id, entry_id))
            .await?
            .ok_or_else(|| Error::Memory(format!("Memory {} not found", entry_id)))?;

        if !entry.active {
            return Ok(());
        }

        entry.active = false;
        entry.updated_at = chrono::Utc::now().timestamp_millis();
        self.with_timeout(self.backend.update_entry(&entry)).await?;

        self.audit
            .record_event(
                user_id,
                "memory_archived",
                ResourceKind::Phi,
                Some(entry_id.to_string()),
                AuditOutcome::Success,
                None,
            )
            .await;
        Ok(())
    }

    /// Hard-delete a memory. Crisis records are refused until their
    /// retention window has elapsed. Returns whether a row existed.
    pub async fn delete_memory(&self, user_id: &str, entry_id: Uuid) -> Result<bool> {
        let entry = self
            .with_timeout(self.backend.get_entry(user_id, entry_id))
            .await?;
        let Some(entry) = entry else {
            return Ok(false);
        };

        if entry.retention == RetentionPolicy::Crisis {
            if let Some(days) = entry.retention.days() {
                let expires_at = entry.created_at + days as i64 * 24 * 60 * 60 * 1000;
                if chrono::Utc::now().timestamp_millis() < expires_at {
                    return Err(Error::Memory(
                        "Crisis records are retained for their full window".to_string(),
                    ));
                }
            }
        }

        let deleted = self
            .with_timeout(self.backend.delete_entry(user_id, entry_id))
            .await?;
        self.audit
            .record_event(
                user_id,
                "memory_deleted",
                ResourceKind::Phi,
                Some(entry_id.to_string()),
                AuditOutcome::Success,
                None,
            )
            .await;
        Ok(deleted)
    }

    /// Hard-delete entries whose retention window has elapsed. Returns the
    /// number removed.
    pub async fn purge_expired(&self, user_id: &str) -> Result<usize> {
        let entries = self
            .with_timeout(self.backend.list_entries(user_id))
            .await?;
        let now = chrono::Utc::now().timestamp_millis();

        let mut purged = 0;
        for entry in entries {
            let Some(days) = entry.retention.days() else {
                continue;
            };
            let expires_at = entry.created_at + days as i64 * 24 * 60 * 60 * 1000;
            if now >= expires_at
                && self
                    .with_timeout(self.backend.delete_entry(user_id, entry.id))
                    .await?
            {
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::info!(user_id = %user_id, purged, "Purged expired memories");
        }
        Ok(purged)
    }

    /// Assemble the cross-session continuity summary from already-stored
    /// memories. Pure filtering and truncation, no new classification.
    pub async fn get_session_continuity(
        &self,
        user_id: &str,
        key: &UserKey,
    ) -> Result<SessionContinuity> {
        let memories = self
            .retrieve_memories(user_id, &MemoryQuery::default(), key)
            .await?;

        let mut by_recency = memories.clone();
        by_recency.sort_by(|a, b| b.last_referenced.cmp(&a.last_referenced));

        let metadata_flag = |m: &RevealedMemory, flag: &str| {
            m.metadata.get(flag).and_then(|v| v.as_bool()).unwrap_or(false)
        };

        Ok(SessionContinuity {
            last_topics: by_recency
                .iter()
                .filter_map(|m| m.metadata.get("topic").and_then(|v| v.as_str()).map(String::from))
                .take(3)
                .collect(),
            current_goals: memories
                .iter()
                .filter(|m| {
                    m.memory_type == super::types::MemoryType::TherapeuticTheme
                        && metadata_flag(m, "is_goal")
                })
                .map(|m| m.content.clone())
                .take(3)
                .collect(),
            recent_progress: by_recency
                .iter()
                .filter(|m| m.memory_type == super::types::MemoryType::ProgressNote)
                .map(|m| m.content.clone())
                .take(2)
                .collect(),
            active_triggers: memories
                .iter()
                .filter(|m| {
                    m.memory_type == super::types::MemoryType::TherapeuticTheme
                        && metadata_flag(m, "is_trigger")
                })
                .map(|m| m.content.clone())
                .take(3)
                .collect(),
        })
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let timeout = Duration::from_millis(self.config.backend_timeout_ms);
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Persistence("Backing store timed out".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::memory::types::{MemoryCategory, MemoryType};
    use crate::persistence::InMemoryBackend;

    fn store() -> (SecureMemoryStore, UserKey) {
        let backend = Arc::new(InMemoryBackend::new());
        let audit = Arc::new(AuditLog::new(
            AuditConfig {
                server_secret: "test-secret".to_string(),
                ..Default::default()
            },
            backend.clone(),
        ));
        (
            SecureMemoryStore::new(MemoryConfig::default(), backend, audit),
            crypto::generate_key(),
        )
    }

    fn proposal(importance: u8) -> MemoryProposal {
        let mut p = MemoryProposal::new(
            "user-1",
            MemoryType::TherapeuticTheme,
            MemoryCategory::Therapy,
            "anxiety around deadlines",
            importance,
        );
        p.consent_level = ConsentLevel::Therapeutic;
        p
    }

    #[tokio::test]
    async fn test_therapeutic_low_importance_auto_approved() {
        let (store, key) = store();
        let entry_id = store.propose_memory(proposal(6), &key).await.unwrap();

        let memories = store
            .retrieve_memories("user-1", &MemoryQuery::default(), &key)
            .await
            .unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].id, entry_id);
        assert_eq!(memories[0].content, "anxiety around deadlines");
    }

    #[tokio::test]
    async fn test_high_importance_needs_consent() {
        let (store, key) = store();
        let result = store.propose_memory(proposal(8), &key).await;
        assert!(matches!(result, Err(Error::ConsentRequired(_))));

        // Nothing stored until approval
        let memories = store
            .retrieve_memories("user-1", &MemoryQuery::default(), &key)
            .await
            .unwrap();
        assert!(memories.is_empty());
    }

    #[tokio::test]
    async fn test_therapeutic_standard_exempt_from_importance_rule() {
        let (store, key) = store();
        let mut p = proposal(9);
        p.source = MemorySource::TherapeuticStandard;
        assert!(store.propose_memory(p, &key).await.is_ok());
    }

    #[tokio::test]
    async fn consent_required_for_high_importance_user_request() {
        // The user-request exception applies only to the retention rule;
        // importance still forces consent.
        let config = MemoryConfig::default();
        let mut p = proposal(9);
        p.source = MemorySource::UserRequest;
        p.retention = RetentionPolicy::Permanent;
        assert!(consent_required(&p, &config));
    }

    #[tokio::test]
    async fn test_permanent_retention_needs_consent_unless_user_request() {
        let config = MemoryConfig::default();

        let mut p = proposal(5);
        p.retention = RetentionPolicy::Permanent;
        assert!(consent_required(&p, &config));

        p.source = MemorySource::UserRequest;
        assert!(!consent_required(&p, &config));
    }

    #[tokio::test]
    async fn test_sensitive_types_always_need_consent() {
        let config = MemoryConfig::default();
        let mut p = proposal(3);
        p.memory_type = MemoryType::CrisisHistory;
        p.source = MemorySource::TherapeuticStandard;
        assert!(consent_required(&p, &config));
    }

    #[tokio::test]
    async fn test_approve_pending_proposal() {
        let (store, key) = store();
        let Err(Error::ConsentRequired(proposal_id)) =
            store.propose_memory(proposal(9), &key).await
        else {
            panic!("expected pending consent");
        };
        let proposal_id: Uuid = proposal_id.parse().unwrap();

        let entry_id = store
            .approve_proposal("user-1", proposal_id, &key)
            .await
            .unwrap();
        let memories = store
            .retrieve_memories("user-1", &MemoryQuery::default(), &key)
            .await
            .unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].id, entry_id);
        assert_eq!(memories[0].consent_level, ConsentLevel::Explicit);
    }

    #[tokio::test]
    async fn test_approve_wrong_user_fails() {
        let (store, key) = store();
        let Err(Error::ConsentRequired(proposal_id)) =
            store.propose_memory(proposal(9), &key).await
        else {
            panic!("expected pending consent");
        };
        let proposal_id: Uuid = proposal_id.parse().unwrap();

        assert!(store
            .approve_proposal("someone-else", proposal_id, &key)
            .await
            .is_err());
        // Still pending for the owner
        assert_eq!(store.pending_proposals("user-1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_reject_discards_proposal() {
        let (store, key) = store();
        let Err(Error::ConsentRequired(proposal_id)) =
            store.propose_memory(proposal(9), &key).await
        else {
            panic!("expected pending consent");
        };
        let proposal_id: Uuid = proposal_id.parse().unwrap();

        assert!(store.reject_proposal("user-1", proposal_id).await.unwrap());
        assert!(store.pending_proposals("user-1").await.is_empty());
        assert!(store
            .approve_proposal("user-1", proposal_id, &key)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_wrong_key_rows_skipped_not_failed() {
        let (store, key1) = store();
        store.propose_memory(proposal(6), &key1).await.unwrap();

        let key2 = crypto::generate_key();
        let memories = store
            .retrieve_memories("user-1", &MemoryQuery::default(), &key2)
            .await
            .unwrap();
        assert!(memories.is_empty());
    }

    #[tokio::test]
    async fn test_retrieval_ordering_and_limit() {
        let (store, key) = store();
        for (content, importance) in [("low", 3u8), ("high", 7), ("mid", 5)] {
            let mut p = proposal(importance);
            p.content = content.to_string();
            p.id = Uuid::new_v4();
            store.propose_memory(p, &key).await.unwrap();
        }

        let memories = store
            .retrieve_memories(
                "user-1",
                &MemoryQuery {
                    limit: Some(2),
                    ..Default::default()
                },
                &key,
            )
            .await
            .unwrap();
        assert_eq!(memories.len(), 2);
        assert_eq!(memories[0].content, "high");
        assert_eq!(memories[1].content, "mid");
    }

    #[tokio::test]
    async fn test_retrieval_bumps_reference_count_before_returning() {
        let backend = Arc::new(InMemoryBackend::new());
        let audit = Arc::new(AuditLog::new(
            AuditConfig {
                server_secret: "test-secret".to_string(),
                ..Default::default()
            },
            backend.clone(),
        ));
        let store = SecureMemoryStore::new(MemoryConfig::default(), backend.clone(), audit);
        let key = crypto::generate_key();

        let entry_id = store.propose_memory(proposal(6), &key).await.unwrap();
        for _ in 0..2 {
            store
                .retrieve_memories("user-1", &MemoryQuery::default(), &key)
                .await
                .unwrap();
        }

        // Bumps are durable by the time retrieval returns, no settling wait
        let entry = backend.get_entry("user-1", entry_id).await.unwrap().unwrap();
        assert_eq!(entry.reference_count, 2);
    }

    #[tokio::test]
    async fn test_archive_is_idempotent() {
        let (store, key) = store();
        let entry_id = store.propose_memory(proposal(6), &key).await.unwrap();

        store.archive_memory("user-1", entry_id).await.unwrap();
        store.archive_memory("user-1", entry_id).await.unwrap();

        let memories = store
            .retrieve_memories("user-1", &MemoryQuery::default(), &key)
            .await
            .unwrap();
        assert!(memories.is_empty());
    }

    #[tokio::test]
    async fn test_update_reencrypts_content() {
        let (store, key) = store();
        let entry_id = store.propose_memory(proposal(6), &key).await.unwrap();

        store
            .update_memory("user-1", entry_id, "worry eased after new routine", &key)
            .await
            .unwrap();

        let memories = store
            .retrieve_memories("user-1", &MemoryQuery::default(), &key)
            .await
            .unwrap();
        assert_eq!(memories[0].content, "worry eased after new routine");
    }

    #[tokio::test]
    async fn test_crisis_record_delete_refused_inside_window() {
        let (store, key) = store();
        let mut p = proposal(5);
        p.memory_type = MemoryType::CrisisHistory;
        p.retention = RetentionPolicy::Crisis;
        let Err(Error::ConsentRequired(proposal_id)) = store.propose_memory(p, &key).await else {
            panic!("crisis history needs consent");
        };
        let entry_id = store
            .approve_proposal("user-1", proposal_id.parse().unwrap(), &key)
            .await
            .unwrap();

        assert!(store.delete_memory("user-1", entry_id).await.is_err());
    }

    #[tokio::test]
    async fn test_session_continuity_summary() {
        let (store, key) = store();

        let mut goal = proposal(6);
        goal.content = "practice saying no at work".to_string();
        goal.metadata
            .insert("is_goal".to_string(), serde_json::Value::Bool(true));
        goal.metadata.insert(
            "topic".to_string(),
            serde_json::Value::String("work".to_string()),
        );
        store.propose_memory(goal, &key).await.unwrap();

        let mut note = proposal(5);
        note.memory_type = MemoryType::ProgressNote;
        note.category = MemoryCategory::Progress;
        note.content = "slept through the night twice this week".to_string();
        store.propose_memory(note, &key).await.unwrap();

        let continuity = store.get_session_continuity("user-1", &key).await.unwrap();
        assert_eq!(continuity.current_goals, vec!["practice saying no at work"]);
        assert_eq!(
            continuity.recent_progress,
            vec!["slept through the night twice this week"]
        );
        assert_eq!(continuity.last_topics, vec!["work"]);
        assert!(continuity.active_triggers.is_empty());
    }
}
