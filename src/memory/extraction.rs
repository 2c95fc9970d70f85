//! Rule-driven memory extraction
//!
//! Scans conversation text and produces memory proposals for the store's
//! consent gate. Deliberately thin: explicit "remember that ..." requests,
//! a small battery of keyword rules per message, and cross-message theme
//! and emotion recurrence with a minimum repetition count so a single
//! mention never becomes a memory.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::error::{Error, Result};

use super::store::consent_required;
use super::types::{ConsentLevel, MemoryCategory, MemoryProposal, MemorySource, MemoryType, RetentionPolicy};

/// Minimum mentions before a theme or emotion becomes a proposal
const MIN_RECURRENCE: usize = 2;

/// Cap on extracted content length
const MAX_CONTENT_LEN: usize = 200;

const THEME_KEYWORDS: &[&str] = &[
    "anxiety", "depression", "stress", "work", "family", "relationship",
    "sleep", "exercise", "meditation", "therapy", "goal", "progress",
];

/// (emotion, valence, trigger words)
const EMOTION_KEYWORDS: &[(&str, i8, &[&str])] = &[
    ("anxiety", -3, &["deadline", "meeting", "presentation"]),
    ("frustration", -2, &["problem", "issue", "difficult"]),
    ("sadness", -4, &["miss", "loss", "alone"]),
    ("anger", -3, &["angry", "mad", "furious"]),
    ("joy", 3, &["happy", "excited", "great"]),
    ("relief", 2, &["better", "relieved", "calm"]),
];

const POSITIVE_WORDS: &[&str] = &[
    "happy", "excited", "great", "wonderful", "amazing", "love", "joy", "peace",
];
const NEGATIVE_WORDS: &[&str] = &[
    "sad", "angry", "frustrated", "anxious", "depressed", "terrible", "hate", "pain",
];

/// One per-message keyword rule
struct ExtractionRule {
    id: &'static str,
    keywords: &'static [&'static str],
    memory_type: MemoryType,
    category: MemoryCategory,
    importance: u8,
    consent_level: ConsentLevel,
    retention: RetentionPolicy,
    confidence: f64,
    is_trigger: bool,
}

const RULES: &[ExtractionRule] = &[
    ExtractionRule {
        id: "anxiety_patterns",
        keywords: &["anxiety", "anxious", "worry", "panic", "stress"],
        memory_type: MemoryType::TherapeuticTheme,
        category: MemoryCategory::Health,
        importance: 8,
        consent_level: ConsentLevel::Therapeutic,
        retention: RetentionPolicy::Therapeutic,
        confidence: 0.8,
        is_trigger: true,
    },
    ExtractionRule {
        id: "coping_strategies",
        keywords: &["helps me", "works for me", "feel better", "calms me", "relaxes me"],
        memory_type: MemoryType::CopingStrategy,
        category: MemoryCategory::Therapy,
        importance: 7,
        consent_level: ConsentLevel::Therapeutic,
        retention: RetentionPolicy::Therapeutic,
        confidence: 0.7,
        is_trigger: false,
    },
    ExtractionRule {
        id: "crisis_indicators",
        keywords: &["suicide", "kill myself", "end it all", "no reason to live"],
        memory_type: MemoryType::CrisisHistory,
        category: MemoryCategory::Crisis,
        importance: 10,
        consent_level: ConsentLevel::Crisis,
        retention: RetentionPolicy::Crisis,
        confidence: 0.95,
        is_trigger: false,
    },
];

/// Who said a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// One conversation turn as extraction sees it
#[derive(Debug, Clone)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Extraction outcome for one conversation window
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub proposals: Vec<MemoryProposal>,
    /// Ids of proposals the consent gate will park
    pub requires_consent: Vec<Uuid>,
    /// Mean confidence across proposals
    pub confidence: f64,
    pub reasoning: String,
}

/// Pattern-driven memory extractor
pub struct MemoryExtractor {
    config: MemoryConfig,
    explicit_requests: Vec<(Regex, bool)>,
    name_pattern: Regex,
}

impl MemoryExtractor {
    pub fn new(config: MemoryConfig) -> Result<Self> {
        let compile = |p: &str| {
            Regex::new(p).map_err(|e| Error::Config(format!("Invalid extraction pattern: {}", e)))
        };
        Ok(Self {
            config,
            // (pattern, marks the capture as high importance)
            explicit_requests: vec![
                (compile(r"(?i)remember (?:that )?(.+)")?, false),
                (compile(r"(?i)don't forget (?:that )?(.+)")?, false),
                (compile(r"(?i)keep in mind (?:that )?(.+)")?, false),
                (compile(r"(?i)save this: (.+)")?, true),
                (compile(r"(?i)note (?:that )?(.+)")?, false),
                (compile(r"(?i)write down (?:that )?(.+)")?, false),
            ],
            name_pattern: compile(r"(?i)(?:my name is|call me) (\w+)")?,
        })
    }

    /// Extract memory proposals from a conversation window.
    pub fn extract_memories(
        &self,
        user_id: &str,
        messages: &[ConversationMessage],
    ) -> ExtractionResult {
        let mut proposals = Vec::new();
        let mut reasoning = Vec::new();

        for message in messages.iter().filter(|m| m.role == MessageRole::User) {
            self.extract_explicit_requests(user_id, &message.content, &mut proposals, &mut reasoning);
            self.extract_identity(user_id, &message.content, &mut proposals, &mut reasoning);
            self.apply_rules(user_id, &message.content, &mut proposals, &mut reasoning);
        }

        self.extract_themes(user_id, messages, &mut proposals, &mut reasoning);
        self.extract_emotions(user_id, messages, &mut proposals, &mut reasoning);

        // Same type with the same content prefix is the same memory
        let mut seen = HashSet::new();
        proposals.retain(|p| seen.insert(p.dedup_key()));

        let confidence = if proposals.is_empty() {
            0.0
        } else {
            proposals.iter().map(|p| p.confidence).sum::<f64>() / proposals.len() as f64
        };
        let requires_consent = proposals
            .iter()
            .filter(|p| consent_required(p, &self.config))
            .map(|p| p.id)
            .collect();

        ExtractionResult {
            proposals,
            requires_consent,
            confidence,
            reasoning: reasoning.join("; "),
        }
    }

    fn extract_explicit_requests(
        &self,
        user_id: &str,
        content: &str,
        proposals: &mut Vec<MemoryProposal>,
        reasoning: &mut Vec<String>,
    ) {
        for (pattern, important) in &self.explicit_requests {
            let Some(captures) = pattern.captures(content) else {
                continue;
            };
            let Some(requested) = captures.get(1) else {
                continue;
            };

            let mut proposal = MemoryProposal::new(
                user_id,
                MemoryType::UserPreference,
                MemoryCategory::Preferences,
                truncate(requested.as_str().trim()),
                if *important { 9 } else { 7 },
            );
            proposal.consent_level = ConsentLevel::Explicit;
            proposal.retention = RetentionPolicy::Permanent;
            proposal.source = MemorySource::UserRequest;
            proposal.confidence = 0.95;
            proposal.tags = vec!["explicit-request".to_string()];
            proposals.push(proposal);
            reasoning.push("explicit memory request".to_string());
        }
    }

    fn extract_identity(
        &self,
        user_id: &str,
        content: &str,
        proposals: &mut Vec<MemoryProposal>,
        reasoning: &mut Vec<String>,
    ) {
        let Some(captures) = self.name_pattern.captures(content) else {
            return;
        };
        let Some(name) = captures.get(1) else {
            return;
        };

        let mut proposal = MemoryProposal::new(
            user_id,
            MemoryType::StableIdentity,
            MemoryCategory::General,
            format!("Prefers to be called {}", name.as_str()),
            9,
        );
        proposal.consent_level = ConsentLevel::Explicit;
        proposal.retention = RetentionPolicy::Permanent;
        proposal.source = MemorySource::UserRequest;
        proposal.confidence = 0.9;
        proposals.push(proposal);
        reasoning.push("identity_name".to_string());
    }

    fn apply_rules(
        &self,
        user_id: &str,
        content: &str,
        proposals: &mut Vec<MemoryProposal>,
        reasoning: &mut Vec<String>,
    ) {
        let lower = content.to_lowercase();
        for rule in RULES {
            let matched: Vec<&str> = rule
                .keywords
                .iter()
                .copied()
                .filter(|k| lower.contains(k))
                .collect();
            if matched.is_empty() {
                continue;
            }

            let mut proposal = MemoryProposal::new(
                user_id,
                rule.memory_type,
                rule.category,
                relevant_sentences(content, &matched),
                rule.importance,
            );
            proposal.consent_level = rule.consent_level;
            proposal.retention = rule.retention;
            proposal.confidence = rule.confidence;
            proposal.valence = assess_valence(&lower);
            proposal.tags = matched.iter().map(|k| k.to_string()).collect();
            if rule.is_trigger {
                proposal
                    .metadata
                    .insert("is_trigger".to_string(), serde_json::Value::Bool(true));
            }
            proposals.push(proposal);
            reasoning.push(rule.id.to_string());
        }
    }

    fn extract_themes(
        &self,
        user_id: &str,
        messages: &[ConversationMessage],
        proposals: &mut Vec<MemoryProposal>,
        reasoning: &mut Vec<String>,
    ) {
        let mut frequency: HashMap<&str, usize> = HashMap::new();
        let mut valence_sum: HashMap<&str, i32> = HashMap::new();

        for message in messages.iter().filter(|m| m.role == MessageRole::User) {
            let lower = message.content.to_lowercase();
            for keyword in THEME_KEYWORDS {
                if lower.contains(keyword) {
                    *frequency.entry(keyword).or_default() += 1;
                    *valence_sum.entry(keyword).or_default() += assess_valence(&lower) as i32;
                }
            }
        }

        for (keyword, count) in frequency {
            if count < MIN_RECURRENCE {
                continue;
            }
            let mut proposal = MemoryProposal::new(
                user_id,
                MemoryType::TherapeuticTheme,
                MemoryCategory::Therapy,
                format!("Recurring theme: {}", keyword),
                if count >= 3 { 8 } else { 6 },
            );
            proposal.consent_level = ConsentLevel::Therapeutic;
            proposal.retention = RetentionPolicy::Therapeutic;
            proposal.confidence = (count as f64 * 0.2).min(0.8);
            proposal.valence =
                (valence_sum[keyword] / count as i32).clamp(-5, 5) as i8;
            proposal.tags = vec![keyword.to_string()];
            proposal.metadata.insert(
                "topic".to_string(),
                serde_json::Value::String(keyword.to_string()),
            );
            proposal.metadata.insert(
                "frequency".to_string(),
                serde_json::Value::from(count as u64),
            );
            proposals.push(proposal);
            reasoning.push(format!("recurring theme {}", keyword));
        }
    }

    fn extract_emotions(
        &self,
        user_id: &str,
        messages: &[ConversationMessage],
        proposals: &mut Vec<MemoryProposal>,
        reasoning: &mut Vec<String>,
    ) {
        for (emotion, valence, trigger_words) in EMOTION_KEYWORDS {
            let mut count = 0;
            let mut triggers: Vec<&str> = Vec::new();

            for message in messages.iter().filter(|m| m.role == MessageRole::User) {
                let lower = message.content.to_lowercase();
                if lower.contains(emotion) {
                    count += 1;
                    triggers.extend(trigger_words.iter().copied().filter(|t| lower.contains(*t)));
                }
            }
            if count < MIN_RECURRENCE {
                continue;
            }
            triggers.dedup();

            let mut proposal = MemoryProposal::new(
                user_id,
                MemoryType::EmotionalState,
                MemoryCategory::Therapy,
                format!(
                    "Experiences {} {}",
                    emotion,
                    if count >= 3 { "frequently" } else { "occasionally" }
                ),
                7,
            );
            proposal.consent_level = ConsentLevel::Inferred;
            proposal.retention = RetentionPolicy::Temporary;
            proposal.confidence = 0.7;
            proposal.valence = *valence;
            proposal.tags = vec!["emotional-pattern".to_string(), emotion.to_string()];
            if !triggers.is_empty() {
                proposal.metadata.insert(
                    "triggers".to_string(),
                    serde_json::Value::from(
                        triggers.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
                    ),
                );
            }
            proposals.push(proposal);
            reasoning.push(format!("recurring emotion {}", emotion));
        }
    }
}

/// Sentences containing a matched keyword, capped in length
fn relevant_sentences(content: &str, matches: &[&str]) -> String {
    let relevant: Vec<&str> = content
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| {
            let lower = s.to_lowercase();
            matches.iter().any(|m| lower.contains(m))
        })
        .collect();

    if relevant.is_empty() {
        truncate(content)
    } else {
        truncate(&relevant.join(". "))
    }
}

fn truncate(content: &str) -> String {
    content.chars().take(MAX_CONTENT_LEN).collect()
}

/// Crude word-count valence in -5..=5
fn assess_valence(lower: &str) -> i8 {
    let mut valence: i32 = 0;
    for word in lower.split_whitespace() {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        if POSITIVE_WORDS.contains(&word) {
            valence += 1;
        }
        if NEGATIVE_WORDS.contains(&word) {
            valence -= 1;
        }
    }
    valence.clamp(-5, 5) as i8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> MemoryExtractor {
        MemoryExtractor::new(MemoryConfig::default()).unwrap()
    }

    fn extract(messages: &[&str]) -> ExtractionResult {
        let messages: Vec<ConversationMessage> =
            messages.iter().map(|m| ConversationMessage::user(*m)).collect();
        extractor().extract_memories("user-1", &messages)
    }

    #[test]
    fn test_explicit_request_is_user_request() {
        let result = extract(&["please remember that my sister's name is Ana"]);
        let proposal = result
            .proposals
            .iter()
            .find(|p| p.memory_type == MemoryType::UserPreference)
            .unwrap();
        assert_eq!(proposal.content, "my sister's name is Ana");
        assert_eq!(proposal.source, MemorySource::UserRequest);
        assert_eq!(proposal.consent_level, ConsentLevel::Explicit);
        assert_eq!(proposal.retention, RetentionPolicy::Permanent);
        assert_eq!(proposal.importance, 7);
        // Explicit consent level always routes through the consent gate
        assert!(result.requires_consent.contains(&proposal.id));
    }

    #[test]
    fn test_save_this_gets_high_importance() {
        let result = extract(&["save this: my therapist is Dr. Reyes"]);
        let proposal = &result.proposals[0];
        assert_eq!(proposal.importance, 9);
        assert_eq!(proposal.content, "my therapist is Dr. Reyes");
    }

    #[test]
    fn test_name_extraction() {
        let result = extract(&["hi, my name is Sam and work is rough"]);
        let identity = result
            .proposals
            .iter()
            .find(|p| p.memory_type == MemoryType::StableIdentity)
            .unwrap();
        assert_eq!(identity.content, "Prefers to be called Sam");
        assert_eq!(identity.importance, 9);
    }

    #[test]
    fn test_anxiety_rule_marks_trigger() {
        let result = extract(&["I get so anxious before every presentation"]);
        let proposal = result
            .proposals
            .iter()
            .find(|p| p.memory_type == MemoryType::TherapeuticTheme)
            .unwrap();
        assert_eq!(proposal.metadata.get("is_trigger"), Some(&serde_json::Value::Bool(true)));
        assert!(proposal.valence < 0);
    }

    #[test]
    fn test_crisis_indicator_highest_importance() {
        let result = extract(&["sometimes I think about suicide"]);
        let proposal = result
            .proposals
            .iter()
            .find(|p| p.memory_type == MemoryType::CrisisHistory)
            .unwrap();
        assert_eq!(proposal.importance, 10);
        assert_eq!(proposal.retention, RetentionPolicy::Crisis);
        assert!(result.requires_consent.contains(&proposal.id));
    }

    #[test]
    fn test_single_mention_is_not_a_theme() {
        let result = extract(&["work was fine", "the weather was nice"]);
        assert!(!result
            .proposals
            .iter()
            .any(|p| p.content.starts_with("Recurring theme")));
    }

    #[test]
    fn test_recurring_theme_proposed() {
        let result = extract(&[
            "sleep has been bad all week",
            "I barely got any sleep again",
            "no sleep last night either",
        ]);
        let theme = result
            .proposals
            .iter()
            .find(|p| p.content == "Recurring theme: sleep")
            .unwrap();
        assert_eq!(theme.importance, 8);
        assert_eq!(theme.metadata.get("topic").and_then(|v| v.as_str()), Some("sleep"));
    }

    #[test]
    fn test_recurring_emotion_with_triggers() {
        let result = extract(&[
            "so much anxiety about the deadline",
            "the anxiety is back before this meeting",
        ]);
        let emotion = result
            .proposals
            .iter()
            .find(|p| p.memory_type == MemoryType::EmotionalState)
            .unwrap();
        assert_eq!(emotion.valence, -3);
        let triggers = emotion.metadata.get("triggers").unwrap();
        assert!(triggers.as_array().unwrap().len() >= 2);
    }

    #[test]
    fn test_deduplication_by_type_and_prefix() {
        let result = extract(&[
            "remember that I prefer morning sessions",
            "remember that I prefer morning sessions",
        ]);
        let explicit: Vec<_> = result
            .proposals
            .iter()
            .filter(|p| p.memory_type == MemoryType::UserPreference)
            .collect();
        assert_eq!(explicit.len(), 1);
    }

    #[test]
    fn test_assistant_messages_ignored() {
        let messages = vec![ConversationMessage {
            role: MessageRole::Assistant,
            content: "remember that breathing exercises help with anxiety".to_string(),
        }];
        let result = extractor().extract_memories("user-1", &messages);
        assert!(result.proposals.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_valence_assessment() {
        assert!(assess_valence("i am happy and excited, life is great") > 0);
        assert!(assess_valence("sad and angry and frustrated") < 0);
        assert_eq!(assess_valence("the meeting is at noon"), 0);
    }
}
