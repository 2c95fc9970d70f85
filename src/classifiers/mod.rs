//! Risk classifiers
//!
//! Four independent scorers over an inbound message and the user's usage
//! history. Each is pure given its inputs; the orchestrator owns failure
//! handling and conservative defaults.

pub mod age;
pub mod crisis;
pub mod dependency;
pub mod psychosis;

pub use age::{AgeAssessment, AgeClassifier, AgeRestrictions};
pub use crisis::classify_crisis;
pub use dependency::{classify_dependency, DependencyAssessment};
pub use psychosis::{screen_psychosis, PsychosisScreen};
