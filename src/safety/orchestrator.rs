//! Safety orchestrator
//!
//! Runs all four classifiers over an inbound message and derives the
//! intervention list under a fixed precedence: crisis, then psychosis, then
//! dependency, then youth protection, then privacy notice. A lower-priority
//! signal never suppresses a higher-priority one.
//!
//! Failure semantics are per classifier: a signal that cannot be computed is
//! replaced by its neutral default, recorded on the assessment, and the
//! overall status is pinned to at least warning. A failing classifier must
//! never present as a clean "safe".

use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditLog, AuditOutcome, ResourceKind};
use crate::classifiers::{
    classify_crisis, classify_dependency, screen_psychosis, AgeClassifier, DependencyAssessment,
};
use crate::config::HarborConfig;
use crate::error::Result;
use crate::session::{DependencyMetrics, SessionTracker};

use super::types::{
    AgeGroup, CrisisLevel, DependencyRisk, InterventionKind, InterventionPriority,
    SafetyAssessment, SafetyIntervention, SafetyStatus,
};

const DEPENDENCY_COOLDOWN_SECS: u64 = 24 * 60 * 60;

/// Per-message context supplied by the caller
#[derive(Debug, Clone)]
pub struct AssessmentContext {
    /// Whether the user's privacy acknowledgements are current
    pub privacy_compliant: bool,
}

impl Default for AssessmentContext {
    fn default() -> Self {
        Self {
            privacy_compliant: true,
        }
    }
}

/// Outcome of a session-start check
#[derive(Debug, Clone)]
pub struct SessionStartCheck {
    pub allowed: bool,
    pub reason: Option<String>,
    pub interventions: Vec<SafetyIntervention>,
}

/// Combines classifier outputs into safety assessments
pub struct SafetyOrchestrator {
    config: HarborConfig,
    age_classifier: AgeClassifier,
    tracker: Arc<SessionTracker>,
    audit: Arc<AuditLog>,
}

impl SafetyOrchestrator {
    pub fn new(
        config: HarborConfig,
        tracker: Arc<SessionTracker>,
        audit: Arc<AuditLog>,
    ) -> Result<Self> {
        Ok(Self {
            age_classifier: AgeClassifier::new()?,
            config,
            tracker,
            audit,
        })
    }

    /// Assess one inbound message.
    pub async fn assess_safety(
        &self,
        user_id: &str,
        session_id: &str,
        input: &str,
        context: &AssessmentContext,
    ) -> SafetyAssessment {
        let mut degraded: Vec<String> = Vec::new();

        let crisis_level = classify_crisis(input);
        let psychosis = screen_psychosis(input);
        let age = self.age_classifier.classify(input, &self.config.youth);

        // The only suspension point; a slow backing store must not hang a
        // safety check.
        let dependency = match self.metrics_with_timeout(user_id).await {
            Ok(metrics) => classify_dependency(&metrics, &self.config.dependency),
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Dependency metrics unavailable, degrading to neutral default"
                );
                degraded.push("dependency".to_string());
                classify_dependency(&DependencyMetrics::default(), &self.config.dependency)
            }
        };

        let interventions = self.build_interventions(
            crisis_level,
            psychosis.detected,
            &dependency,
            age.age_group,
            context.privacy_compliant,
        );

        let mut status = determine_status(crisis_level, psychosis.detected, dependency.risk);
        if !degraded.is_empty() && status < SafetyStatus::Warning {
            status = SafetyStatus::Warning;
        }

        let safe_to_continue = status != SafetyStatus::Critical
            && dependency.risk != DependencyRisk::High
            && crisis_level < CrisisLevel::Crisis;

        let assessment = SafetyAssessment {
            status,
            crisis_level,
            psychosis_detected: psychosis.detected,
            requires_low_affect: psychosis.requires_low_affect,
            dependency_risk: dependency.risk,
            age_group: age.age_group,
            privacy_compliant: context.privacy_compliant,
            interventions,
            safe_to_continue,
            recommendations: build_recommendations(
                crisis_level,
                psychosis.detected,
                dependency.risk,
                age.age_group,
                context.privacy_compliant,
            ),
            degraded_classifiers: degraded,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        self.audit
            .record_event(
                user_id,
                "safety_assessment",
                ResourceKind::Assessment,
                Some(session_id.to_string()),
                AuditOutcome::Success,
                Some(format!(
                    "status={:?} crisis={:?} dependency={:?}",
                    assessment.status, assessment.crisis_level, assessment.dependency_risk
                )),
            )
            .await;

        assessment
    }

    /// Whether the conversation may continue given an assessment. Critical
    /// status, crisis-level intent and high dependency risk each force a
    /// stop independently.
    pub fn is_safe_to_continue(&self, assessment: &SafetyAssessment) -> bool {
        assessment.status != SafetyStatus::Critical
            && assessment.dependency_risk != DependencyRisk::High
            && assessment.crisis_level < CrisisLevel::Crisis
    }

    /// Enforce dependency caps before a session begins. The session is only
    /// recorded when allowed.
    pub async fn check_session_start(&self, user_id: &str, session_id: &str) -> SessionStartCheck {
        let metrics = match self.metrics_with_timeout(user_id).await {
            Ok(metrics) => metrics,
            Err(e) => {
                // Usage history being unavailable is not grounds to lock a
                // user out of support.
                tracing::warn!(user_id = %user_id, error = %e, "Session-start check degraded");
                DependencyMetrics::default()
            }
        };

        let limits = &self.config.dependency;
        let refusal = if metrics.daily_sessions >= limits.daily_session_limit {
            Some("Daily session limit reached")
        } else if metrics.daily_time_secs >= limits.daily_time_limit_secs {
            Some("Daily usage time limit reached")
        } else if metrics.consecutive_days >= limits.consecutive_days_limit {
            Some("Consecutive-day usage limit reached")
        } else {
            None
        };

        if let Some(reason) = refusal {
            self.audit
                .record_event(
                    user_id,
                    "session_start_refused",
                    ResourceKind::System,
                    Some(session_id.to_string()),
                    AuditOutcome::Denied,
                    Some(reason.to_string()),
                )
                .await;
            return SessionStartCheck {
                allowed: false,
                reason: Some(reason.to_string()),
                interventions: vec![SafetyIntervention {
                    kind: InterventionKind::DependencyPrevention,
                    priority: InterventionPriority::High,
                    required: true,
                    message: "It's important to take breaks and connect with other people \
                              in your life. Consider reaching out to friends, family, or a \
                              therapist, and come back later."
                        .to_string(),
                    cooldown_secs: Some(DEPENDENCY_COOLDOWN_SECS),
                }],
            };
        }

        if let Err(e) = self.tracker.start_session(user_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to record session start");
        }

        let dependency = classify_dependency(&metrics, limits);
        let mut interventions = Vec::new();
        if dependency.step_back_due {
            interventions.push(SafetyIntervention {
                kind: InterventionKind::DependencyPrevention,
                priority: InterventionPriority::Medium,
                required: false,
                message: "I'm here to support you, but I'm not a replacement for human \
                          connection. Consider how you can build your support network with \
                          friends, family, or professionals."
                    .to_string(),
                cooldown_secs: None,
            });
        }

        SessionStartCheck {
            allowed: true,
            reason: None,
            interventions,
        }
    }

    async fn metrics_with_timeout(&self, user_id: &str) -> Result<DependencyMetrics> {
        let timeout = Duration::from_millis(self.config.memory.backend_timeout_ms);
        match tokio::time::timeout(timeout, self.tracker.metrics(user_id)).await {
            Ok(result) => result,
            Err(_) => Err(crate::error::Error::Persistence(
                "Dependency metrics lookup timed out".to_string(),
            )),
        }
    }

    fn build_interventions(
        &self,
        crisis_level: CrisisLevel,
        psychosis_detected: bool,
        dependency: &DependencyAssessment,
        age_group: AgeGroup,
        privacy_compliant: bool,
    ) -> Vec<SafetyIntervention> {
        let mut interventions = Vec::new();

        if crisis_level >= CrisisLevel::High {
            interventions.push(SafetyIntervention {
                kind: InterventionKind::CrisisResponse,
                priority: InterventionPriority::Critical,
                required: true,
                message: "Immediate crisis intervention required: provide crisis resources \
                          and professional referral"
                    .to_string(),
                cooldown_secs: None,
            });
        }

        if psychosis_detected {
            interventions.push(SafetyIntervention {
                kind: InterventionKind::PsychosisProtocol,
                priority: InterventionPriority::Critical,
                required: true,
                message: "Activate low-affect mode: neutral language, focus on safety, \
                          refer to professional care"
                    .to_string(),
                cooldown_secs: None,
            });
        }

        // Once a crisis or psychosis signal already forces the session to
        // stop, dependency and youth interventions add nothing but noise.
        let session_terminating = crisis_level >= CrisisLevel::Crisis || psychosis_detected;
        if !session_terminating {
            match dependency.risk {
                DependencyRisk::High => interventions.push(SafetyIntervention {
                    kind: InterventionKind::DependencyPrevention,
                    priority: InterventionPriority::High,
                    required: true,
                    message: "High dependency risk: apply step-back protocol and encourage \
                              professional help"
                        .to_string(),
                    cooldown_secs: Some(DEPENDENCY_COOLDOWN_SECS),
                }),
                DependencyRisk::Medium => interventions.push(SafetyIntervention {
                    kind: InterventionKind::DependencyPrevention,
                    priority: InterventionPriority::Medium,
                    required: false,
                    message: "Consider taking a break to process what we discussed and \
                              practice any techniques we covered"
                        .to_string(),
                    cooldown_secs: None,
                }),
                DependencyRisk::Low => {}
            }

            if age_group.is_minor() {
                interventions.push(SafetyIntervention {
                    kind: InterventionKind::YouthProtection,
                    priority: InterventionPriority::High,
                    required: true,
                    message: "Apply age-appropriate restrictions and involve trusted adults \
                              for serious concerns"
                        .to_string(),
                    cooldown_secs: None,
                });
            }
        }

        // Privacy notices come last and never block the conversation
        if !privacy_compliant {
            interventions.push(SafetyIntervention {
                kind: InterventionKind::PrivacyNotice,
                priority: InterventionPriority::Medium,
                required: false,
                message: "Please review and acknowledge the current privacy notice".to_string(),
                cooldown_secs: None,
            });
        }

        interventions
    }
}

fn determine_status(
    crisis_level: CrisisLevel,
    psychosis_detected: bool,
    dependency_risk: DependencyRisk,
) -> SafetyStatus {
    if crisis_level >= CrisisLevel::Emergency || psychosis_detected {
        SafetyStatus::Critical
    } else if crisis_level >= CrisisLevel::High || dependency_risk == DependencyRisk::High {
        SafetyStatus::Warning
    } else {
        SafetyStatus::Safe
    }
}

fn build_recommendations(
    crisis_level: CrisisLevel,
    psychosis_detected: bool,
    dependency_risk: DependencyRisk,
    age_group: AgeGroup,
    privacy_compliant: bool,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if crisis_level >= CrisisLevel::Crisis {
        recommendations.push("Immediate professional intervention required".to_string());
        recommendations.push("Provide crisis resources and safety planning".to_string());
    }
    if psychosis_detected {
        recommendations.push("Maintain low-affect mode throughout interaction".to_string());
        recommendations.push("Avoid validating the reported content either way".to_string());
    }
    if dependency_risk == DependencyRisk::High {
        recommendations.push("Implement mandatory step-back period".to_string());
        recommendations.push("Encourage professional help and human connection".to_string());
    }
    if age_group.is_minor() {
        recommendations.push("Apply age-appropriate content restrictions".to_string());
        recommendations.push("Use youth-specific crisis resources".to_string());
    }
    if !privacy_compliant {
        recommendations.push("Complete required privacy notices".to_string());
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::persistence::InMemoryBackend;

    fn orchestrator() -> SafetyOrchestrator {
        orchestrator_with_config(HarborConfig::default())
    }

    fn orchestrator_with_config(config: HarborConfig) -> SafetyOrchestrator {
        let backend = Arc::new(InMemoryBackend::new());
        let tracker = Arc::new(SessionTracker::new(backend.clone()));
        let audit = Arc::new(AuditLog::new(
            AuditConfig {
                server_secret: "test-secret".to_string(),
                ..Default::default()
            },
            backend,
        ));
        SafetyOrchestrator::new(config, tracker, audit).unwrap()
    }

    #[tokio::test]
    async fn test_imminent_crisis_blocks_conversation() {
        let orch = orchestrator();
        let assessment = orch
            .assess_safety(
                "user-1",
                "session-1",
                "I want to kill myself tonight",
                &AssessmentContext::default(),
            )
            .await;

        assert!(assessment.crisis_level >= CrisisLevel::High);
        assert_eq!(assessment.status, SafetyStatus::Critical);
        assert!(assessment
            .interventions
            .iter()
            .any(|i| i.kind == InterventionKind::CrisisResponse && i.required));
        assert!(!assessment.safe_to_continue);
        assert!(!orch.is_safe_to_continue(&assessment));
    }

    #[tokio::test]
    async fn test_sadness_is_safe() {
        let orch = orchestrator();
        let assessment = orch
            .assess_safety(
                "user-1",
                "session-1",
                "I'm feeling really sad today",
                &AssessmentContext::default(),
            )
            .await;

        assert!(assessment.crisis_level <= CrisisLevel::Low);
        assert_eq!(assessment.status, SafetyStatus::Safe);
        assert!(assessment.safe_to_continue);
    }

    #[tokio::test]
    async fn test_psychosis_is_critical_with_low_affect() {
        let orch = orchestrator();
        let assessment = orch
            .assess_safety(
                "user-1",
                "session-1",
                "I keep hearing voices and they are watching me",
                &AssessmentContext::default(),
            )
            .await;

        assert_eq!(assessment.status, SafetyStatus::Critical);
        assert!(assessment.requires_low_affect);
        assert!(assessment
            .interventions
            .iter()
            .any(|i| i.kind == InterventionKind::PsychosisProtocol && i.required));
        assert!(!assessment.safe_to_continue);
    }

    #[tokio::test]
    async fn test_minor_gets_youth_protection() {
        let orch = orchestrator();
        let assessment = orch
            .assess_safety(
                "user-1",
                "session-1",
                "i'm 13 and school is stressing me out",
                &AssessmentContext::default(),
            )
            .await;

        assert_eq!(assessment.age_group, AgeGroup::Teen);
        assert!(assessment
            .interventions
            .iter()
            .any(|i| i.kind == InterventionKind::YouthProtection));
        assert!(assessment.safe_to_continue);
    }

    #[tokio::test]
    async fn test_privacy_notice_appended_last_and_not_blocking() {
        let orch = orchestrator();
        let context = AssessmentContext {
            privacy_compliant: false,
        };
        let assessment = orch
            .assess_safety(
                "user-1",
                "session-1",
                "i'm 13 and I just want to die",
                &context,
            )
            .await;

        let last = assessment.interventions.last().unwrap();
        assert_eq!(last.kind, InterventionKind::PrivacyNotice);
        assert!(!last.required);
        // Higher-priority interventions are still present before it
        assert!(assessment.interventions.len() >= 3);
    }

    #[tokio::test]
    async fn test_daily_session_limit_refuses_fourth_start() {
        let orch = orchestrator();

        for _ in 0..3 {
            let check = orch.check_session_start("user-1", "session-1").await;
            assert!(check.allowed);
        }
        for _ in 0..2 {
            let check = orch.check_session_start("user-1", "session-4").await;
            assert!(!check.allowed);
            assert!(check.reason.is_some());
            assert!(check
                .interventions
                .iter()
                .any(|i| i.kind == InterventionKind::DependencyPrevention && i.required));
        }

        let events = orch.audit.events_for("user-1").await.unwrap();
        let refusal = events
            .iter()
            .find(|e| e.action == "session_start_refused")
            .unwrap();
        assert_eq!(refusal.resource_id.as_deref(), Some("session-4"));
    }

    #[tokio::test]
    async fn test_termination_suppresses_dependency_and_youth() {
        let orch = orchestrator();
        let dependency = DependencyAssessment {
            score: 12,
            risk: DependencyRisk::High,
            step_back_due: false,
        };

        // Emergency already forces a stop; only the crisis response remains
        let interventions =
            orch.build_interventions(CrisisLevel::Emergency, false, &dependency, AgeGroup::Teen, true);
        assert_eq!(interventions.len(), 1);
        assert_eq!(interventions[0].kind, InterventionKind::CrisisResponse);

        // Below the termination line both signals still surface
        let interventions =
            orch.build_interventions(CrisisLevel::High, false, &dependency, AgeGroup::Teen, true);
        assert!(interventions
            .iter()
            .any(|i| i.kind == InterventionKind::DependencyPrevention));
        assert!(interventions
            .iter()
            .any(|i| i.kind == InterventionKind::YouthProtection));
    }

    #[tokio::test]
    async fn test_assessment_is_audited() {
        let orch = orchestrator();
        orch.assess_safety(
            "user-1",
            "session-1",
            "hello there",
            &AssessmentContext::default(),
        )
        .await;

        let events = orch.audit.events_for("user-1").await.unwrap();
        assert!(events.iter().any(|e| e.action == "safety_assessment"));
    }
}
