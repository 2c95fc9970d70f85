//! Safety assessment types shared by the classifiers and the orchestrator

use serde::{Deserialize, Serialize};

/// Crisis severity, ordered from none to emergency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisLevel {
    None,
    Low,
    Medium,
    High,
    Crisis,
    Emergency,
}

/// Dependency risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyRisk {
    Low,
    Medium,
    High,
}

/// Age cohort for protection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Child,
    Teen,
    YoungAdult,
    Adult,
    /// No age signal in the conversation; treated as adult for policy but
    /// kept distinct so downstream consumers can tell the cases apart
    Unknown,
}

impl AgeGroup {
    /// Whether youth-protection interventions apply
    pub fn is_minor(&self) -> bool {
        matches!(self, AgeGroup::Child | AgeGroup::Teen)
    }
}

/// Overall safety status for a message, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyStatus {
    Safe,
    Warning,
    Critical,
}

/// Intervention priority, ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionPriority {
    Medium,
    High,
    Critical,
}

/// Kind of intervention the orchestrator can require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    CrisisResponse,
    PsychosisProtocol,
    DependencyPrevention,
    YouthProtection,
    PrivacyNotice,
}

/// One intervention the response layer must apply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyIntervention {
    pub kind: InterventionKind,
    pub priority: InterventionPriority,
    /// Required interventions must be reflected in the response; the
    /// conversation cannot proceed normally without them.
    pub required: bool,
    pub message: String,
    /// Minimum time before this intervention fires again, when limited
    pub cooldown_secs: Option<u64>,
}

/// Combined safety assessment for one inbound message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub status: SafetyStatus,
    pub crisis_level: CrisisLevel,
    /// Psychosis screen flagged the message
    pub psychosis_detected: bool,
    /// Response must use a calm, low-affect register
    pub requires_low_affect: bool,
    pub dependency_risk: DependencyRisk,
    pub age_group: AgeGroup,
    /// Caller-supplied privacy compliance state, passed through for the
    /// privacy-notice intervention
    pub privacy_compliant: bool,
    /// Interventions in fixed precedence order
    pub interventions: Vec<SafetyIntervention>,
    /// Whether the conversation may continue normally
    pub safe_to_continue: bool,
    /// Free-text guidance for the response layer
    pub recommendations: Vec<String>,
    /// Classifiers that failed and were replaced by conservative defaults
    pub degraded_classifiers: Vec<String>,
    pub timestamp: i64,
}
