//! Harbor error types

use thiserror::Error;

/// Harbor error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cryptographic error (key derivation, envelope construction)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Authentication-tag mismatch or corrupted envelope. Fatal for the
    /// record it occurred on, non-fatal for batch operations.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// A risk classifier could not run. Callers downgrade to the
    /// classifier's conservative default instead of propagating.
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// Not a failure: the memory proposal needs explicit user consent
    /// before it can be stored. Carries the pending proposal id.
    #[error("Explicit consent required for proposal {0}")]
    ConsentRequired(String),

    /// Too many requests inside the current rate window. Retryable.
    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),

    /// Backing store unavailable or timed out
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Memory store error
    #[error("Memory error: {0}")]
    Memory(String),

    /// Session tracking error
    #[error("Session error: {0}")]
    Session(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Harbor operations
pub type Result<T> = std::result::Result<T, Error>;
