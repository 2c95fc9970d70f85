//! Safety response envelope
//!
//! Renders the safety-relevant parts of a reply: headline message, crisis
//! resources, disclaimers and next steps. The actual assistant text comes
//! from an external generator behind [`ResponseGenerator`], which must
//! always yield something; on failure a fixed fallback string is used.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::types::{CrisisLevel, DependencyRisk, SafetyAssessment, SafetyIntervention, SafetyStatus};

/// Fallback assistant text when the external generator fails
pub const FALLBACK_RESPONSE: &str =
    "I'm having trouble responding right now. If you need support urgently, \
     you can call or text 988 to reach the Suicide & Crisis Lifeline at any time.";

/// Low-affect reply skeleton used when psychosis indicators are present
pub const LOW_AFFECT_RESPONSE: &str =
    "I understand you're experiencing something that feels very real to you. \
     I want to help you stay safe and connected to professional support. \
     A mental health professional can help you understand and manage these \
     experiences. Let's focus on keeping you safe right now.";

/// The safety envelope handed to the response layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyResponse {
    pub safe_to_continue: bool,
    pub message: String,
    pub interventions: Vec<SafetyIntervention>,
    pub crisis_resources: Vec<String>,
    pub disclaimers: Vec<String>,
    pub next_steps: Vec<String>,
}

/// External text generator. Opaque and possibly failing; callers go through
/// [`generate_with_fallback`].
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Call the external generator, falling back to a fixed string on failure.
pub async fn generate_with_fallback(generator: &dyn ResponseGenerator, prompt: &str) -> String {
    match generator.generate(prompt).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "Response generation failed, using fallback");
            FALLBACK_RESPONSE.to_string()
        }
    }
}

/// Render the safety envelope for an assessment.
pub fn generate_safety_response(assessment: &SafetyAssessment) -> SafetyResponse {
    SafetyResponse {
        safe_to_continue: assessment.safe_to_continue,
        message: headline(assessment),
        interventions: assessment.interventions.clone(),
        crisis_resources: crisis_resources(assessment),
        disclaimers: disclaimers(assessment),
        next_steps: next_steps(assessment),
    }
}

fn headline(assessment: &SafetyAssessment) -> String {
    match assessment.status {
        SafetyStatus::Critical => {
            let mut message =
                String::from("Critical safety alert: your safety is the top priority. ");
            if assessment.psychosis_detected {
                message.push_str("I've noticed signs that need professional attention. ");
            }
            if assessment.crisis_level >= CrisisLevel::Emergency {
                message.push_str("This is an emergency situation requiring immediate help. ");
            }
            message.push_str("Please contact emergency services or crisis resources right away.");
            message
        }
        SafetyStatus::Warning => {
            let mut message = String::from("Safety notice: I've noticed some concerning signs. ");
            if assessment.psychosis_detected {
                message.push_str("I'll be using a more neutral approach to keep you safe. ");
            }
            if assessment.dependency_risk == DependencyRisk::High {
                message.push_str("I'm also concerned about how often we've been talking. ");
            }
            message.push_str("Let's focus on your safety and getting appropriate support.");
            message
        }
        SafetyStatus::Safe => {
            "I'm here to support you within appropriate boundaries.".to_string()
        }
    }
}

fn crisis_resources(assessment: &SafetyAssessment) -> Vec<String> {
    let mut resources = Vec::new();

    if assessment.crisis_level >= CrisisLevel::Crisis {
        resources.push("988 Suicide & Crisis Lifeline".to_string());
        resources.push("Crisis Text Line: Text HOME to 741741".to_string());
        resources.push("911 for immediate emergencies".to_string());
    }
    if assessment.psychosis_detected {
        resources.push("Mental health crisis services: 988 or local crisis center".to_string());
        resources.push("Professional psychiatric evaluation".to_string());
    }
    if assessment.age_group.is_minor() {
        resources.push("Teen Line: 310-855-4673 or text TEEN to 839863".to_string());
        resources.push("The Trevor Project: 1-866-488-7386".to_string());
        resources.push("A school counselor or trusted adult".to_string());
    }

    resources
}

fn disclaimers(assessment: &SafetyAssessment) -> Vec<String> {
    let mut disclaimers = vec![
        "I'm an AI companion, not a licensed therapist".to_string(),
        "For serious mental health concerns, please consult a professional".to_string(),
    ];

    if assessment.crisis_level >= CrisisLevel::Crisis {
        disclaimers.push(
            "In emergencies, contact 911 or go to your nearest emergency room".to_string(),
        );
    }
    if assessment.age_group.is_minor() {
        disclaimers
            .push("For serious concerns, please talk to a trusted adult or professional".to_string());
    }
    disclaimers.push(
        "This chat isn't therapy-confidential. See the privacy policy for data practices"
            .to_string(),
    );

    disclaimers
}

fn next_steps(assessment: &SafetyAssessment) -> Vec<String> {
    let mut steps = Vec::new();

    if assessment.crisis_level >= CrisisLevel::Crisis {
        steps.push("Contact crisis resources immediately".to_string());
        steps.push("Develop a safety plan with trusted people".to_string());
    }
    if assessment.psychosis_detected {
        steps.push("Schedule an appointment with a mental health professional".to_string());
        steps.push("Focus on safety and grounding techniques".to_string());
    }
    if assessment.dependency_risk == DependencyRisk::High {
        steps.push("Take a break from these conversations".to_string());
        steps.push("Connect with your human support network".to_string());
    }
    if assessment.age_group.is_minor() {
        steps.push("Involve a trusted adult in decision-making".to_string());
    }
    if !assessment.privacy_compliant {
        steps.push("Review and acknowledge the current privacy notice".to_string());
    }

    steps
}
