//! Lead-intent detection by case-insensitive substring match.
//!
//! No stemming or fuzzy matching: a message triggers when its lowercased
//! text contains any configured phrase anywhere, including inside longer
//! words ("costume" contains "cost").

#[derive(Debug, Clone)]
pub struct LeadIntentDetector {
    phrases: Vec<String>,
}

impl LeadIntentDetector {
    /// Phrases are lowercased once here; blank phrases are dropped so they
    /// can't match every message.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.trim().is_empty())
                .collect(),
        }
    }

    pub fn detect(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.phrases.iter().any(|p| lower.contains(p.as_str()))
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LeadConfig;

    fn detector() -> LeadIntentDetector {
        LeadIntentDetector::new(&LeadConfig::default().trigger_phrases)
    }

    #[test]
    fn test_detects_configured_phrases() {
        let d = detector();
        assert!(d.detect("what is your pricing?"));
        assert!(d.detect("Can I get a QUOTE"));
        assert!(d.detect("I'd like to Talk To someone"));
        assert!(d.detect("let's schedule a call"));
    }

    #[test]
    fn test_plain_questions_do_not_trigger() {
        let d = detector();
        assert!(!d.detect("how does your automation work?"));
        assert!(!d.detect("hello"));
        assert!(!d.detect(""));
    }

    #[test]
    fn test_substring_inside_word_triggers() {
        assert!(detector().detect("I need a costume"));
    }

    #[test]
    fn test_phrase_case_normalized_and_blanks_dropped() {
        let d = LeadIntentDetector::new(["Demo", "  "]);
        assert_eq!(d.phrases(), &["demo".to_string()]);
        assert!(d.detect("book a DEMO"));
        assert!(!d.detect("anything else"));
    }
}
