//! Age group classifier
//!
//! Infers an age cohort from explicit age statements, grade-level phrasing
//! or school-level phrasing, then derives the protection bundle for that
//! cohort. No signal yields the unknown cohort, which carries adult policy;
//! defaulting to a younger group would over-restrict legitimate adult users
//! on ambiguous input.

use regex::Regex;

use crate::config::YouthConfig;
use crate::error::{Error, Result};
use crate::safety::types::AgeGroup;

/// Plausible self-reported age range; numbers outside it are noise
const MIN_PLAUSIBLE_AGE: u32 = 8;
const MAX_PLAUSIBLE_AGE: u32 = 120;

/// Grade 1 through 12 mapped to typical ages 6 through 17
const GRADE_BASE_AGE: u32 = 5;

/// (phrase, typical age) school-level and class-year indicators
const SCHOOL_INDICATORS: &[(&str, u32)] = &[
    ("freshman", 14),
    ("sophomore", 15),
    ("junior year", 16),
    ("senior year", 17),
    ("elementary school", 10),
    ("primary school", 10),
    ("middle school", 13),
    ("junior high", 13),
    ("high school", 16),
    ("college", 20),
    ("university", 20),
];

/// (phrase, typical age) self-description indicators. Bare words like
/// "teen" or "kid" are too noisy; only whole descriptors count.
const DESCRIPTOR_INDICATORS: &[(&str, u32)] = &[
    ("i'm a teenager", 15),
    ("i am a teenager", 15),
    ("i'm an adolescent", 14),
    ("i'm a child", 10),
    ("i am a child", 10),
    ("i'm a kid", 10),
    ("i am a kid", 10),
    ("i'm an adult", 25),
    ("i am an adult", 25),
];

/// Protection bundle applied to a cohort
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgeRestrictions {
    pub no_advanced_therapy: bool,
    pub no_trauma_processing: bool,
    pub no_substance_discussion: bool,
    pub no_romantic_advice: bool,
    pub require_guardian_involvement: bool,
    pub limited_session_time: bool,
    pub basic_coping_only: bool,
}

/// Outcome of the age classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeAssessment {
    pub age_group: AgeGroup,
    /// Inferred age when a signal was found
    pub estimated_age: Option<u32>,
    pub restrictions: AgeRestrictions,
    /// Session duration cap in seconds, for minors
    pub session_cap_secs: Option<u64>,
}

/// Age classifier with precompiled extraction patterns
pub struct AgeClassifier {
    explicit_age: Vec<Regex>,
    grade: Regex,
}

impl AgeClassifier {
    pub fn new() -> Result<Self> {
        let compile = |p: &str| {
            Regex::new(p).map_err(|e| Error::Classifier(format!("Invalid age pattern: {}", e)))
        };
        Ok(Self {
            explicit_age: vec![
                compile(r"i'm (\d{1,2})\b")?,
                compile(r"i am (\d{1,2})\b")?,
                compile(r"\bage (\d{1,2})\b")?,
                compile(r"\b(\d{1,2}) years old\b")?,
            ],
            grade: compile(r"\b(?:grade (\d{1,2})|(\d{1,2})(?:st|nd|rd|th) grade)\b")?,
        })
    }

    /// Classify one message into an age cohort with its protection bundle.
    pub fn classify(&self, message: &str, config: &YouthConfig) -> AgeAssessment {
        let text = message.to_lowercase();
        let estimated_age = self.estimate_age(&text);
        let Some(age) = estimated_age else {
            return AgeAssessment {
                age_group: AgeGroup::Unknown,
                estimated_age: None,
                restrictions: AgeRestrictions::default(),
                session_cap_secs: None,
            };
        };

        let (age_group, restrictions, session_cap_secs) = if age <= config.child_max_age {
            (
                AgeGroup::Child,
                AgeRestrictions {
                    no_advanced_therapy: true,
                    no_trauma_processing: true,
                    no_substance_discussion: true,
                    no_romantic_advice: true,
                    require_guardian_involvement: true,
                    limited_session_time: true,
                    basic_coping_only: true,
                },
                Some(config.child_session_cap_secs),
            )
        } else if age <= config.teen_max_age {
            (
                AgeGroup::Teen,
                AgeRestrictions {
                    no_advanced_therapy: true,
                    no_trauma_processing: true,
                    no_substance_discussion: false,
                    no_romantic_advice: false,
                    require_guardian_involvement: age < 16,
                    limited_session_time: true,
                    basic_coping_only: true,
                },
                Some(config.teen_session_cap_secs),
            )
        } else if age <= config.young_adult_max_age {
            (AgeGroup::YoungAdult, AgeRestrictions::default(), None)
        } else {
            (AgeGroup::Adult, AgeRestrictions::default(), None)
        };

        AgeAssessment {
            age_group,
            estimated_age,
            restrictions,
            session_cap_secs,
        }
    }

    /// Signal precedence: explicit age, then grade, then school level,
    /// then self-description. The first signal found wins.
    fn estimate_age(&self, text: &str) -> Option<u32> {
        for pattern in &self.explicit_age {
            if let Some(captures) = pattern.captures(text) {
                if let Some(age) = captures.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
                    if (MIN_PLAUSIBLE_AGE..=MAX_PLAUSIBLE_AGE).contains(&age) {
                        return Some(age);
                    }
                }
            }
        }

        if let Some(captures) = self.grade.captures(text) {
            let grade = captures
                .get(1)
                .or_else(|| captures.get(2))
                .and_then(|m| m.as_str().parse::<u32>().ok());
            if let Some(grade) = grade {
                if (1..=12).contains(&grade) {
                    return Some(grade + GRADE_BASE_AGE);
                }
            }
        }

        for (phrase, age) in SCHOOL_INDICATORS {
            if text.contains(phrase) {
                return Some(*age);
            }
        }
        for (phrase, age) in DESCRIPTOR_INDICATORS {
            if text.contains(phrase) {
                return Some(*age);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(message: &str) -> AgeAssessment {
        AgeClassifier::new()
            .unwrap()
            .classify(message, &YouthConfig::default())
    }

    #[test]
    fn test_explicit_age_child() {
        let assessment = classify("i'm 11 and school is hard");
        assert_eq!(assessment.age_group, AgeGroup::Child);
        assert_eq!(assessment.estimated_age, Some(11));
        assert!(assessment.restrictions.basic_coping_only);
        assert!(assessment.restrictions.require_guardian_involvement);
        assert_eq!(assessment.session_cap_secs, Some(20 * 60));
    }

    #[test]
    fn test_explicit_age_teen() {
        let assessment = classify("I am 16 years old");
        assert_eq!(assessment.age_group, AgeGroup::Teen);
        assert!(assessment.restrictions.no_advanced_therapy);
        // Guardian involvement only below 16
        assert!(!assessment.restrictions.require_guardian_involvement);
        assert_eq!(assessment.session_cap_secs, Some(30 * 60));
    }

    #[test]
    fn test_young_teen_needs_guardian() {
        let assessment = classify("i'm 14 and stressed about exams");
        assert_eq!(assessment.age_group, AgeGroup::Teen);
        assert!(assessment.restrictions.require_guardian_involvement);
    }

    #[test]
    fn test_grade_phrasing() {
        let assessment = classify("my 7th grade teacher gave us too much homework");
        assert_eq!(assessment.estimated_age, Some(12));
        assert_eq!(assessment.age_group, AgeGroup::Child);

        let assessment = classify("I just started grade 10");
        assert_eq!(assessment.estimated_age, Some(15));
        assert_eq!(assessment.age_group, AgeGroup::Teen);
    }

    #[test]
    fn test_school_level_phrasing() {
        let assessment = classify("everyone at my middle school is mean");
        assert_eq!(assessment.age_group, AgeGroup::Teen);

        let assessment = classify("my college roommate is driving me crazy");
        assert_eq!(assessment.age_group, AgeGroup::YoungAdult);
        assert_eq!(assessment.restrictions, AgeRestrictions::default());
    }

    #[test]
    fn test_explicit_age_beats_school_level() {
        // "i'm 20" should win over the high-school mention
        let assessment = classify("i'm 20 but I still visit my old high school");
        assert_eq!(assessment.estimated_age, Some(20));
        assert_eq!(assessment.age_group, AgeGroup::YoungAdult);
    }

    #[test]
    fn test_no_signal_is_unknown_with_adult_policy() {
        let assessment = classify("work has been exhausting lately");
        assert_eq!(assessment.age_group, AgeGroup::Unknown);
        assert!(!assessment.age_group.is_minor());
        assert_eq!(assessment.estimated_age, None);
        assert_eq!(assessment.restrictions, AgeRestrictions::default());
        assert_eq!(assessment.session_cap_secs, None);
    }

    #[test]
    fn test_implausible_age_ignored() {
        let assessment = classify("i'm 5 minutes late");
        assert_eq!(assessment.estimated_age, None);
        assert_eq!(assessment.age_group, AgeGroup::Unknown);
    }

    #[test]
    fn test_descriptor_phrases() {
        assert_eq!(classify("i'm a teenager").age_group, AgeGroup::Teen);
        assert_eq!(classify("i'm an adult, thanks").age_group, AgeGroup::YoungAdult);
        // Bare "kid" does not trigger ("kidding", "my kid")
        assert_eq!(classify("just kidding around").age_group, AgeGroup::Unknown);
        assert_eq!(classify("my kid is sick").age_group, AgeGroup::Unknown);
    }
}
