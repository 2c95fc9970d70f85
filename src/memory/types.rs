//! Memory record types and consent vocabulary

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::crypto::EncryptedEnvelope;

/// What kind of thing a memory records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    StableIdentity,
    TherapeuticTheme,
    SessionContinuity,
    MetaPreference,
    CopingStrategy,
    CrisisHistory,
    ProgressNote,
    RelationshipContext,
    WorkStress,
    HealthConcern,
    LifeEvent,
    EmotionalState,
    UserPreference,
}

impl MemoryType {
    /// Types that always require explicit consent before storage,
    /// regardless of how the proposal was produced.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, MemoryType::CrisisHistory | MemoryType::HealthConcern)
    }
}

/// Topical category for retrieval filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    General,
    Work,
    Family,
    Health,
    Relationships,
    Therapy,
    Crisis,
    Progress,
    Preferences,
}

/// How storage of this memory was (or must be) consented to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentLevel {
    /// The user explicitly asked for or approved storage
    Explicit,
    /// Inferred from conversation without an explicit request
    Inferred,
    /// Standard therapeutic practice (e.g. tracking coping strategies)
    Therapeutic,
    /// Crisis safety information
    Crisis,
    /// Low-stakes preference
    Preference,
}

/// How long a memory is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Discarded when the session ends
    Session,
    /// 30 days
    Temporary,
    /// 2 years
    Therapeutic,
    /// Kept until the user deletes it
    Permanent,
    /// 7 years, crisis safety records
    Crisis,
}

impl RetentionPolicy {
    /// Retention window in days. None means no automatic expiry.
    pub fn days(&self) -> Option<u32> {
        match self {
            RetentionPolicy::Session => Some(0),
            RetentionPolicy::Temporary => Some(30),
            RetentionPolicy::Therapeutic => Some(730),
            RetentionPolicy::Permanent => None,
            RetentionPolicy::Crisis => Some(2555),
        }
    }
}

/// Where a memory proposal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// The user asked for it to be remembered
    UserRequest,
    /// Extracted by analysis of the conversation
    AiAnalysis,
    /// Standard therapeutic bookkeeping
    TherapeuticStandard,
}

/// A not-yet-stored memory candidate.
///
/// Proposals carry plaintext and exist only in memory until the consent
/// gate passes; only then is the content encrypted and persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryProposal {
    pub id: Uuid,
    pub user_id: String,
    pub memory_type: MemoryType,
    pub category: MemoryCategory,
    /// Plaintext content. Never persisted in this form.
    pub content: String,
    /// 1 (trivial) to 10 (safety-critical)
    pub importance: u8,
    pub consent_level: ConsentLevel,
    pub retention: RetentionPolicy,
    pub source: MemorySource,
    /// Extraction confidence, 0.0 to 1.0
    pub confidence: f64,
    /// Emotional valence of the content, -5 (distressing) to +5 (positive)
    pub valence: i8,
    pub tags: Vec<String>,
    /// Structured extras (topic, is_goal, is_trigger, emotion, ...)
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: i64,
}

impl MemoryProposal {
    pub fn new(
        user_id: impl Into<String>,
        memory_type: MemoryType,
        category: MemoryCategory,
        content: impl Into<String>,
        importance: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            memory_type,
            category,
            content: content.into(),
            importance: importance.min(10),
            consent_level: ConsentLevel::Inferred,
            retention: RetentionPolicy::Temporary,
            source: MemorySource::AiAnalysis,
            confidence: 0.5,
            valence: 0,
            tags: Vec::new(),
            metadata: HashMap::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Dedup key: records of the same type with the same content prefix are
    /// considered the same memory.
    pub fn dedup_key(&self) -> String {
        let prefix: String = self.content.chars().take(50).collect();
        format!("{:?}|{}", self.memory_type, prefix)
    }
}

/// A stored memory record. Content, tags and metadata are each encrypted
/// independently under the user's key, so a corrupt envelope loses one
/// field, not the record. The plaintext columns exist only for filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub user_id: String,
    pub memory_type: MemoryType,
    pub category: MemoryCategory,
    pub content: EncryptedEnvelope,
    pub tags: EncryptedEnvelope,
    pub metadata: EncryptedEnvelope,
    pub importance: u8,
    pub consent_level: ConsentLevel,
    pub retention: RetentionPolicy,
    pub source: MemorySource,
    pub confidence: f64,
    pub valence: i8,
    /// Times this memory has been surfaced to the response layer
    pub reference_count: u64,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_referenced: i64,
    /// Soft-delete flag. Inactive entries are invisible to retrieval but
    /// retained for the remainder of their retention window.
    pub active: bool,
}

/// A decrypted memory as returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevealedMemory {
    pub id: Uuid,
    pub memory_type: MemoryType,
    pub category: MemoryCategory,
    pub content: String,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub importance: u8,
    pub consent_level: ConsentLevel,
    pub retention: RetentionPolicy,
    pub valence: i8,
    pub created_at: i64,
    pub last_referenced: i64,
}

/// Retrieval filter
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    pub memory_type: Option<MemoryType>,
    pub category: Option<MemoryCategory>,
    pub min_importance: Option<u8>,
    /// Row cap; the store's configured default applies when unset
    pub limit: Option<usize>,
}

/// Cross-session continuity summary assembled from stored memories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContinuity {
    /// Most recent conversation topics (up to 3)
    pub last_topics: Vec<String>,
    /// Active therapeutic goals (up to 3)
    pub current_goals: Vec<String>,
    /// Recent progress notes (up to 2)
    pub recent_progress: Vec<String>,
    /// Known triggers to handle carefully (up to 3)
    pub active_triggers: Vec<String>,
}
