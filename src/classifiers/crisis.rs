//! Crisis level classifier
//!
//! Tiered keyword matching walked in severity order; the first tier with a
//! match wins, so a high-risk phrase always dominates co-occurring lower
//! tier language in the same message. An imminence marker alongside a
//! crisis-tier phrase escalates to emergency.

use crate::safety::types::CrisisLevel;

/// Phrases indicating an attempt in progress or immediately planned
const EMERGENCY_PHRASES: &[&str] = &[
    "i am going to kill myself",
    "i'm going to kill myself",
    "pills in my hand",
    "gun in my hand",
    "standing on the ledge",
    "wrote my goodbye note",
    "this is goodbye",
];

/// Explicit self-harm intent
const CRISIS_PHRASES: &[&str] = &[
    "kill myself",
    "end my life",
    "take my own life",
    "suicide plan",
    "end it all",
    "don't want to be alive",
    "better off dead",
];

/// Active ideation or self-harm without explicit intent
const HIGH_PHRASES: &[&str] = &[
    "want to die",
    "wish i was dead",
    "wish i were dead",
    "suicidal",
    "suicide",
    "hurt myself",
    "self-harm",
    "self harm",
    "cutting myself",
    "no reason to live",
];

/// Acute distress without self-harm language
const MEDIUM_PHRASES: &[&str] = &[
    "hopeless",
    "can't go on",
    "no way out",
    "worthless",
    "everyone would be better off without me",
    "can't take it anymore",
];

/// General low mood
const LOW_PHRASES: &[&str] = &[
    "really sad",
    "feeling down",
    "depressed",
    "overwhelmed",
    "so lonely",
    "struggling",
];

/// Markers that a stated intent is imminent
const IMMINENCE_MARKERS: &[&str] = &[
    "tonight",
    "right now",
    "about to",
    "as soon as",
    "in a few hours",
];

fn matches_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

/// Classify the crisis level of one message.
pub fn classify_crisis(message: &str) -> CrisisLevel {
    let text = message.to_lowercase();

    if matches_any(&text, EMERGENCY_PHRASES) {
        return CrisisLevel::Emergency;
    }
    if matches_any(&text, CRISIS_PHRASES) {
        // Stated intent plus a timeframe is treated as an attempt in progress
        if matches_any(&text, IMMINENCE_MARKERS) {
            return CrisisLevel::Emergency;
        }
        return CrisisLevel::Crisis;
    }
    if matches_any(&text, HIGH_PHRASES) {
        return CrisisLevel::High;
    }
    if matches_any(&text, MEDIUM_PHRASES) {
        return CrisisLevel::Medium;
    }
    if matches_any(&text, LOW_PHRASES) {
        return CrisisLevel::Low;
    }
    CrisisLevel::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imminent_intent_is_emergency() {
        assert_eq!(
            classify_crisis("I want to kill myself tonight"),
            CrisisLevel::Emergency
        );
        assert_eq!(
            classify_crisis("I'm going to kill myself"),
            CrisisLevel::Emergency
        );
    }

    #[test]
    fn test_stated_intent_is_crisis() {
        assert_eq!(classify_crisis("I want to kill myself"), CrisisLevel::Crisis);
        assert_eq!(
            classify_crisis("sometimes I think everyone would like me to end my life"),
            CrisisLevel::Crisis
        );
    }

    #[test]
    fn test_ideation_is_high() {
        assert_eq!(classify_crisis("I just want to die"), CrisisLevel::High);
        assert_eq!(
            classify_crisis("I've been having suicidal thoughts"),
            CrisisLevel::High
        );
        assert_eq!(
            classify_crisis("I've been cutting myself again"),
            CrisisLevel::High
        );
    }

    #[test]
    fn test_high_risk_dominates_lower_tiers() {
        // Low and medium phrases in the same text never pull the level down
        let level = classify_crisis(
            "I'm feeling down and worthless and I want to kill myself",
        );
        assert!(level >= CrisisLevel::Crisis);
    }

    #[test]
    fn test_distress_is_medium() {
        assert_eq!(
            classify_crisis("everything feels hopeless lately"),
            CrisisLevel::Medium
        );
    }

    #[test]
    fn test_sadness_is_low() {
        assert_eq!(
            classify_crisis("I'm feeling really sad today"),
            CrisisLevel::Low
        );
    }

    #[test]
    fn test_neutral_is_none() {
        assert_eq!(
            classify_crisis("work was busy but I got through my list"),
            CrisisLevel::None
        );
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify_crisis("I WANT TO KILL MYSELF"), CrisisLevel::Crisis);
    }
}
