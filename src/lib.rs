//! Harbor - Safety & Secure Memory core for a conversational
//! mental-health support assistant
//!
//! Harbor is the safety-critical subsystem sitting between an inbound user
//! message and the (external) response generator. It classifies every message
//! for crisis, psychosis, dependency and age risk, decides which interventions
//! must be injected into the conversation, and persists anything worth
//! remembering about the user only as consent-gated, per-user-encrypted
//! records.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                        Harbor Core                                 │
//! │                                                                    │
//! │  inbound message                                                   │
//! │        │                                                           │
//! │  ┌─────▼──────────────┐      ┌──────────────────────────────┐      │
//! │  │  Risk Classifiers  │      │      Memory Extraction       │      │
//! │  │  crisis/psychosis/ │      │  rule-driven proposals from  │      │
//! │  │  dependency/age    │      │  conversation text           │      │
//! │  └─────┬──────────────┘      └──────────────┬───────────────┘      │
//! │        │                                    │                      │
//! │  ┌─────▼──────────────┐      ┌──────────────▼───────────────┐      │
//! │  │ Safety Orchestrator│      │  Consent-Gated Memory Store  │      │
//! │  │ fixed intervention │      │  per-user AES-256-GCM,       │      │
//! │  │ precedence         │      │  consent before ciphertext   │      │
//! │  └─────┬──────────────┘      └──────────────┬───────────────┘      │
//! │        │                                    │                      │
//! │  ┌─────▼────────────────────────────────────▼───────────────┐      │
//! │  │              Audit & Threat Log (append-only)            │      │
//! │  └──────────────────────────────────────────────────────────┘      │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The HTTP layer, UI, billing, analytics and the LLM call itself are
//! external collaborators reached through the traits in [`persistence`] and
//! [`safety::respond`].
//!
//! ## Modules
//!
//! - [`crypto`]: per-user authenticated encryption and key derivation
//! - [`audit`]: tamper-evident audit log and request threat scanning
//! - [`classifiers`]: the four pure risk classifiers
//! - [`safety`]: the orchestrator combining classifier outputs
//! - [`session`]: session event tracking and dependency metrics
//! - [`memory`]: consent-gated encrypted memory store and extraction
//! - [`persistence`]: backend trait for the external row store
//! - [`config`]: configuration management
//! - [`logging`]: tracing subscriber setup for embedding binaries

pub mod audit;
pub mod classifiers;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod memory;
pub mod persistence;
pub mod safety;
pub mod session;

pub use config::HarborConfig;
pub use error::{Error, Result};
pub use logging::init_logging;
