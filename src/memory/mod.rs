//! Consent-gated encrypted memory
//!
//! Proposals carry plaintext and stay in process memory until the consent
//! gate passes; stored entries are encrypted per field under a caller
//! supplied per-user key. The store never holds a usable key.

pub mod extraction;
pub mod store;
pub mod types;

pub use extraction::{ConversationMessage, ExtractionResult, MemoryExtractor, MessageRole};
pub use store::{consent_required, SecureMemoryStore};
pub use types::{
    ConsentLevel, MemoryCategory, MemoryEntry, MemoryProposal, MemoryQuery, MemorySource,
    MemoryType, RetentionPolicy, RevealedMemory, SessionContinuity,
};
