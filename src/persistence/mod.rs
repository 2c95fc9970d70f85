//! Storage backend abstraction
//!
//! The row store is an external collaborator. Everything crossing this trait
//! is already encrypted or content-free; a backend never sees plaintext
//! memory content. Pending consent proposals deliberately have no backend
//! surface, they live in process memory only until the consent gate passes.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::types::{AuditEvent, ResourceKind};
use crate::error::{Error, Result};
use crate::memory::types::MemoryEntry;
use crate::session::SessionRecord;

/// Backend for encrypted memory rows, audit events and session records
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn put_entry(&self, entry: &MemoryEntry) -> Result<()>;

    async fn get_entry(&self, user_id: &str, id: Uuid) -> Result<Option<MemoryEntry>>;

    /// All entries for a user, archived included
    async fn list_entries(&self, user_id: &str) -> Result<Vec<MemoryEntry>>;

    async fn update_entry(&self, entry: &MemoryEntry) -> Result<()>;

    /// Hard delete. Returns whether a row existed.
    async fn delete_entry(&self, user_id: &str, id: Uuid) -> Result<bool>;

    async fn append_audit(&self, event: &AuditEvent) -> Result<()>;

    async fn list_audit(&self, user_id: &str) -> Result<Vec<AuditEvent>>;

    /// Remove audit events for a resource kind older than `cutoff`
    /// (Unix milliseconds). Returns the number removed.
    async fn purge_audit_before(&self, resource: ResourceKind, cutoff: i64) -> Result<usize>;

    async fn put_session(&self, record: &SessionRecord) -> Result<()>;

    /// Session records for a user started at or after `since` (Unix ms)
    async fn list_sessions(&self, user_id: &str, since: i64) -> Result<Vec<SessionRecord>>;
}

/// In-memory backend for tests and single-process deployments
#[derive(Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, Vec<MemoryEntry>>>,
    audit: RwLock<Vec<AuditEvent>>,
    sessions: RwLock<HashMap<String, Vec<SessionRecord>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn put_entry(&self, entry: &MemoryEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries
            .entry(entry.user_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn get_entry(&self, user_id: &str, id: Uuid) -> Result<Option<MemoryEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(user_id)
            .and_then(|rows| rows.iter().find(|e| e.id == id).cloned()))
    }

    async fn list_entries(&self, user_id: &str) -> Result<Vec<MemoryEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.get(user_id).cloned().unwrap_or_default())
    }

    async fn update_entry(&self, entry: &MemoryEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        let rows = entries
            .get_mut(&entry.user_id)
            .ok_or_else(|| Error::Persistence(format!("No rows for user {}", entry.user_id)))?;
        let row = rows
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or_else(|| Error::Persistence(format!("Entry {} not found", entry.id)))?;
        *row = entry.clone();
        Ok(())
    }

    async fn delete_entry(&self, user_id: &str, id: Uuid) -> Result<bool> {
        let mut entries = self.entries.write().await;
        if let Some(rows) = entries.get_mut(user_id) {
            let before = rows.len();
            rows.retain(|e| e.id != id);
            return Ok(rows.len() < before);
        }
        Ok(false)
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        self.audit.write().await.push(event.clone());
        Ok(())
    }

    async fn list_audit(&self, user_id: &str) -> Result<Vec<AuditEvent>> {
        let audit = self.audit.read().await;
        Ok(audit.iter().filter(|e| e.user_id == user_id).cloned().collect())
    }

    async fn purge_audit_before(&self, resource: ResourceKind, cutoff: i64) -> Result<usize> {
        let mut audit = self.audit.write().await;
        let before = audit.len();
        audit.retain(|e| e.resource != resource || e.timestamp >= cutoff);
        Ok(before - audit.len())
    }

    async fn put_session(&self, record: &SessionRecord) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let rows = sessions.entry(record.user_id.clone()).or_default();
        if let Some(row) = rows.iter_mut().find(|r| r.id == record.id) {
            *row = record.clone();
        } else {
            rows.push(record.clone());
        }
        Ok(())
    }

    async fn list_sessions(&self, user_id: &str, since: i64) -> Result<Vec<SessionRecord>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(user_id)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.started_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
