//! Safety orchestration
//!
//! Combines the four risk classifiers into one assessment with a fixed
//! intervention precedence, and renders the safety-relevant response
//! envelope handed to the external response generator.

pub mod orchestrator;
pub mod respond;
pub mod types;

pub use orchestrator::{AssessmentContext, SafetyOrchestrator, SessionStartCheck};
pub use respond::{generate_safety_response, ResponseGenerator, SafetyResponse};
pub use types::{
    AgeGroup, CrisisLevel, DependencyRisk, InterventionKind, InterventionPriority,
    SafetyAssessment, SafetyIntervention, SafetyStatus,
};
