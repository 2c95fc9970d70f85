//! Psychosis indicator screen
//!
//! Flags reality-distortion, hallucination and persecutory-ideation markers
//! so the response layer can switch to a low-affect register. The screen
//! only detects; it never judges whether the reported experience is real,
//! and downstream policy forbids validating the content either way.

const HALLUCINATION_MARKERS: &[&str] = &[
    "hearing voices",
    "the voices tell me",
    "voices are telling me",
    "voices in my head telling",
    "seeing things that aren't there",
    "seeing people who aren't there",
    "shadows are moving",
];

const DELUSION_MARKERS: &[&str] = &[
    "sending me secret messages",
    "messages meant only for me",
    "the tv is talking to me",
    "i have special powers",
    "i am the chosen one",
    "put a chip in me",
    "implanted a chip",
    "controlling my mind",
    "reading my thoughts",
    "broadcasting my thoughts",
];

const PERSECUTORY_MARKERS: &[&str] = &[
    "they are watching me",
    "they're watching me",
    "everyone is watching me",
    "following me everywhere",
    "out to get me",
    "they're after me",
    "poisoning my food",
    "the government is tracking me",
];

/// Outcome of the psychosis screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsychosisScreen {
    pub detected: bool,
    /// Response must avoid mirroring or affirming the reported content
    pub requires_low_affect: bool,
    /// Which marker groups fired, for audit detail. Group names only.
    pub marker_groups: Vec<&'static str>,
}

impl PsychosisScreen {
    pub fn clear() -> Self {
        Self {
            detected: false,
            requires_low_affect: false,
            marker_groups: Vec::new(),
        }
    }
}

/// Screen one message for psychosis indicators.
pub fn screen_psychosis(message: &str) -> PsychosisScreen {
    let text = message.to_lowercase();
    let mut marker_groups = Vec::new();

    for (group, markers) in [
        ("hallucination", HALLUCINATION_MARKERS),
        ("delusion", DELUSION_MARKERS),
        ("persecutory", PERSECUTORY_MARKERS),
    ] {
        if markers.iter().any(|m| text.contains(m)) {
            marker_groups.push(group);
        }
    }

    let detected = !marker_groups.is_empty();
    PsychosisScreen {
        detected,
        requires_low_affect: detected,
        marker_groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hallucination_detected() {
        let screen = screen_psychosis("I keep hearing voices at night");
        assert!(screen.detected);
        assert!(screen.requires_low_affect);
        assert_eq!(screen.marker_groups, vec!["hallucination"]);
    }

    #[test]
    fn test_persecutory_detected() {
        let screen = screen_psychosis("I know they are watching me through the walls");
        assert!(screen.detected);
        assert_eq!(screen.marker_groups, vec!["persecutory"]);
    }

    #[test]
    fn test_multiple_groups() {
        let screen =
            screen_psychosis("the tv is talking to me and they're after me");
        assert!(screen.detected);
        assert_eq!(screen.marker_groups.len(), 2);
    }

    #[test]
    fn test_ordinary_distress_not_flagged() {
        let screen = screen_psychosis("I feel like my boss is always criticizing me");
        assert!(!screen.detected);
        assert!(!screen.requires_low_affect);
    }

    #[test]
    fn test_clear_default() {
        assert_eq!(screen_psychosis("nice weather today"), PsychosisScreen::clear());
    }
}
