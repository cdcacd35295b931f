use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};

/// Characters stripped from the question before stop-word removal.
const PUNCTUATION: [char; 10] = [',', '!', '?', '.', '\'', '\u{2019}', '"', ':', '{', '}'];

/// Words carrying no disambiguation signal. Detected entity phrases equal to
/// one of these are dropped as well.
const DEFAULT_STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "can", "this", "that",
    "these", "those", "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us",
    "them", "my", "your", "his", "its", "our", "their", "what", "which", "who", "whom",
    "whose", "when", "where", "why", "how", "from", "as", "into", "about", "there", "here",
    "not", "no", "so", "if", "than", "then", "s",
];

/// Splits a question into ordered question words: detected entity phrases
/// first, then the residual tokens with punctuation and stop-words removed.
pub struct TextProcessor {
    stopwords: BTreeSet<String>,
}

impl Default for TextProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextProcessor {
    pub fn new() -> Self {
        Self {
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Read a stop-word list, one word per line.
    pub fn from_stopwords_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read stopwords {}", path.display()))?;
        let stopwords = raw
            .lines()
            .map(|line| line.trim().to_lowercase())
            .filter(|line| !line.is_empty())
            .collect();
        Ok(Self { stopwords })
    }

    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(&word.to_lowercase())
    }

    pub fn stopwords(&self) -> impl Iterator<Item = &str> {
        self.stopwords.iter().map(|s| s.as_str())
    }

    /// Extract the ordered question-word list.
    ///
    /// `entity_spans` are phrases found by the mention detector; spans equal
    /// to a stop-word are dropped, the rest are excised from the text and
    /// kept as multi-word question words. The residual text is lowercased,
    /// stripped of punctuation and stop-words, and contributes one question
    /// word per surviving token. Left-to-right order is preserved so word
    /// indexes are stable downstream.
    pub fn question_words(&self, question: &str, entity_spans: &[String]) -> Vec<String> {
        let mut words: Vec<String> = Vec::new();
        let mut residual = question.to_string();
        for span in entity_spans {
            if span.trim().is_empty() || self.is_stopword(span) {
                continue;
            }
            residual = residual.replace(span.as_str(), "");
            words.push(span.clone());
        }

        for ch in PUNCTUATION {
            residual = residual.replace(ch, "");
        }
        // pad with spaces so stop-words match on word boundaries
        let mut residual = format!(" {} ", residual.to_lowercase());
        for stopword in &self.stopwords {
            let needle = format!(" {stopword} ");
            while residual.contains(&needle) {
                residual = residual.replace(&needle, " ");
            }
        }
        // leftover possessive/plural markers after apostrophe stripping
        residual = residual.replace(" s ", " ");
        while residual.contains("  ") {
            residual = residual.replace("  ", " ");
        }

        words.extend(
            residual
                .split_whitespace()
                .filter(|token| !token.is_empty())
                .map(|token| token.to_string()),
        );
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residual_tokens_lose_stopwords_and_punctuation() {
        let processor = TextProcessor::new();
        let words = processor.question_words("Who is the coach of France?", &[]);
        assert_eq!(words, vec!["coach", "france"]);
    }

    #[test]
    fn entity_spans_come_first_and_keep_their_case() {
        let processor = TextProcessor::new();
        let words = processor.question_words(
            "who played in the Fifa World Cup final?",
            &["Fifa World Cup".to_string()],
        );
        assert_eq!(words, vec!["Fifa World Cup", "played", "final"]);
    }

    #[test]
    fn spans_equal_to_stopwords_are_dropped() {
        let processor = TextProcessor::new();
        let words = processor.question_words("when was the film released?", &["The".to_string()]);
        assert_eq!(words, vec!["film", "released"]);
    }

    #[test]
    fn apostrophes_are_stripped() {
        let processor = TextProcessor::new();
        let words = processor.question_words("Einstein's birthplace", &[]);
        assert_eq!(words, vec!["einsteins", "birthplace"]);
    }

    #[test]
    fn isolated_s_tokens_collapse() {
        let processor = TextProcessor::new();
        let words = processor.question_words("the dog s bone", &[]);
        assert_eq!(words, vec!["dog", "bone"]);
    }

    #[test]
    fn empty_question_yields_no_words() {
        let processor = TextProcessor::new();
        assert!(processor.question_words("", &[]).is_empty());
        assert!(processor.question_words("the of a", &[]).is_empty());
    }
}
