use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

use crate::kb::{is_entity_id, is_predicate_id, KbIndex};
use crate::storage::JsonCache;
use crate::text::TextProcessor;

/// Item/word -> vector norm, persisted as a JSON map.
pub type NormCache = JsonCache<f64>;

/// Source of word and entity vectors. Missing vectors are an expected
/// condition: every aggregate score treats them as contributing 0.
pub trait EmbeddingModel: Send + Sync {
    fn word_vector(&self, word: &str) -> Option<Vec<f32>>;
    fn entity_vector(&self, page_name: &str) -> Option<Vec<f32>>;
}

/// A model with no vectors; relevance and coherence scores become 0.
pub struct NullModel;

impl EmbeddingModel for NullModel {
    fn word_vector(&self, _word: &str) -> Option<Vec<f32>> {
        None
    }

    fn entity_vector(&self, _page_name: &str) -> Option<Vec<f32>> {
        None
    }
}

/// Precomputed vectors loaded from a word2vec-style text file: one
/// whitespace-separated `token v1 v2 …` row per line, an optional
/// `count dim` header, and entity rows prefixed `ENTITY/` with underscores
/// for spaces in the page name.
pub struct TextVectors {
    words: FxHashMap<String, Vec<f32>>,
    entities: FxHashMap<String, Vec<f32>>,
}

impl TextVectors {
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open vectors {}", path.display()))?;
        let mut words = FxHashMap::default();
        let mut entities = FxHashMap::default();
        for (line_number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(token) = fields.next() else {
                continue;
            };
            let vector: Vec<f32> = fields.filter_map(|v| v.parse().ok()).collect();
            if vector.is_empty() {
                // header row or junk
                if line_number > 0 {
                    tracing::debug!("skipping vector line {}", line_number + 1);
                }
                continue;
            }
            if let Some(page) = token.strip_prefix("ENTITY/") {
                entities.insert(page.replace('_', " "), vector);
            } else {
                words.insert(token.to_lowercase(), vector);
            }
        }
        Ok(Self { words, entities })
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

impl EmbeddingModel for TextVectors {
    fn word_vector(&self, word: &str) -> Option<Vec<f32>> {
        self.words.get(&word.to_lowercase()).cloned()
    }

    fn entity_vector(&self, page_name: &str) -> Option<Vec<f32>> {
        self.entities.get(page_name).cloned()
    }
}

/// Embedding-space scoring for KB items and question words: item embedding,
/// cosine similarity with a memoised norm cache, and per-question relevance.
pub struct Relevance {
    model: Arc<dyn EmbeddingModel>,
    kb: Arc<KbIndex>,
    /// Entity id -> encyclopedia page name.
    page_mappings: FxHashMap<String, String>,
    text: Arc<TextProcessor>,
    norm_cache: Arc<NormCache>,
}

impl Relevance {
    pub fn new(
        model: Arc<dyn EmbeddingModel>,
        kb: Arc<KbIndex>,
        text: Arc<TextProcessor>,
        norm_cache: Arc<NormCache>,
    ) -> Self {
        Self {
            model,
            kb,
            page_mappings: FxHashMap::default(),
            text,
            norm_cache,
        }
    }

    /// Load the entity -> page-name mapping (JSON object).
    pub fn with_page_mappings(mut self, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read mappings {}", path.display()))?;
        self.page_mappings = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse mappings {}", path.display()))?;
        Ok(self)
    }

    pub fn norm_cache(&self) -> &NormCache {
        &self.norm_cache
    }

    /// Embed a KB item. Entities prefer their mapped page's entity vector
    /// and fall back to the averaged label words; predicates average their
    /// label words; anything else is embedded as a plain phrase.
    pub fn embed_item(&self, item: &str) -> Option<Vec<f32>> {
        if is_entity_id(item) {
            if let Some(page) = self.page_name(item) {
                if let Some(vector) = self.model.entity_vector(&page) {
                    return Some(vector);
                }
            }
            return self.embed_phrase(&self.kb.label(item));
        }
        if is_predicate_id(item) {
            return self.embed_phrase(&self.kb.label(item));
        }
        self.embed_phrase(item)
    }

    /// Mean word vector of the phrase, with stop-words removed. `None` when
    /// no word has a vector.
    pub fn embed_phrase(&self, phrase: &str) -> Option<Vec<f32>> {
        let phrase = phrase.to_lowercase();
        let vectors: Vec<Vec<f32>> = phrase
            .unicode_words()
            .filter(|word| !self.text.is_stopword(word))
            .filter_map(|word| self.model.word_vector(word))
            .collect();
        if vectors.is_empty() {
            return None;
        }
        let dimensions = vectors[0].len();
        let mut mean = vec![0.0f32; dimensions];
        for vector in &vectors {
            for (slot, value) in mean.iter_mut().zip(vector.iter()) {
                *slot += value;
            }
        }
        for slot in mean.iter_mut() {
            *slot /= vectors.len() as f32;
        }
        Some(mean)
    }

    fn page_name(&self, entity: &str) -> Option<String> {
        let raw = self.page_mappings.get(entity)?;
        Some(raw.replace("%27", "'").replace('_', " "))
    }

    /// L2 norm, memoised by the item/word key.
    pub fn norm(&self, key: &str, vector: &[f32]) -> f64 {
        self.norm_cache.get_or_insert_with(key, || {
            vector.iter().map(|v| (*v as f64) * (*v as f64)).sum::<f64>().sqrt()
        })
    }

    /// Cosine similarity with cached norms; 0 for zero-norm vectors.
    pub fn cosine(&self, v1: &[f32], v2: &[f32], key1: &str, key2: &str) -> f64 {
        let norm1 = self.norm(key1, v1);
        let norm2 = self.norm(key2, v2);
        if norm1 == 0.0 || norm2 == 0.0 {
            return 0.0;
        }
        let dot: f64 = v1
            .iter()
            .zip(v2.iter())
            .map(|(a, b)| (*a as f64) * (*b as f64))
            .sum();
        dot / (norm1 * norm2)
    }

    /// Mean cosine between the item and the vectors of the *other* question
    /// words. An item with no embedding, or an empty vector list, scores 0.
    pub fn question_relevance(&self, item: &str, word_vectors: &[(String, Vec<f32>)]) -> f64 {
        let Some(item_vector) = self.embed_item(item) else {
            return 0.0;
        };
        if word_vectors.is_empty() {
            return 0.0;
        }
        let mut score = 0.0;
        for (word, word_vector) in word_vectors {
            score += self.cosine(&item_vector, word_vector, item, word);
        }
        score / word_vectors.len() as f64
    }

    /// Pair each word that has an embedding with its vector.
    pub fn word_vectors(&self, words: &[String]) -> Vec<(String, Vec<f32>)> {
        words
            .iter()
            .filter_map(|word| {
                self.embed_phrase(word)
                    .map(|vector| (word.clone(), vector))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel;

    impl EmbeddingModel for FixedModel {
        fn word_vector(&self, word: &str) -> Option<Vec<f32>> {
            match word {
                "left" => Some(vec![1.0, 0.0]),
                "up" => Some(vec![0.0, 1.0]),
                "diagonal" => Some(vec![1.0, 1.0]),
                _ => None,
            }
        }

        fn entity_vector(&self, _page_name: &str) -> Option<Vec<f32>> {
            None
        }
    }

    // an empty index is enough: these tests embed plain phrases
    fn relevance() -> Relevance {
        Relevance::new(
            Arc::new(FixedModel),
            Arc::new(empty_index()),
            Arc::new(TextProcessor::new()),
            Arc::new(NormCache::in_memory()),
        )
    }

    fn empty_index() -> KbIndex {
        let dir = tempfile::tempdir().unwrap();
        crate::kb::IndexBuilder::new(dir.path())
            .build(&write_empty_dump(dir.path()))
            .unwrap();
        crate::kb::load::IndexLoader::new(dir.path()).load().unwrap()
    }

    fn write_empty_dump(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("dump.csv");
        std::fs::write(&path, "").unwrap();
        path
    }

    #[test]
    fn phrase_embedding_averages_word_vectors() {
        let relevance = relevance();
        let vector = relevance.embed_phrase("left up").unwrap();
        assert_eq!(vector, vec![0.5, 0.5]);
    }

    #[test]
    fn phrase_with_no_vectors_is_none() {
        let relevance = relevance();
        assert!(relevance.embed_phrase("unknown words only").is_none());
    }

    #[test]
    fn cosine_of_identical_directions_is_one() {
        let relevance = relevance();
        let v1 = vec![1.0, 1.0];
        let v2 = vec![2.0, 2.0];
        let cosine = relevance.cosine(&v1, &v2, "a", "b");
        assert!((cosine - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let relevance = relevance();
        let cosine = relevance.cosine(&[1.0, 0.0], &[0.0, 1.0], "a", "b");
        assert!(cosine.abs() < 1e-9);
    }

    #[test]
    fn question_relevance_averages_over_other_words() {
        let relevance = relevance();
        let word_vectors = relevance.word_vectors(&[
            "left".to_string(),
            "up".to_string(),
            "novector".to_string(),
        ]);
        assert_eq!(word_vectors.len(), 2);
        // "diagonal" is cos 45° from both axes
        let score = relevance.question_relevance("diagonal", &word_vectors);
        assert!((score - (2.0f64.sqrt() / 2.0)).abs() < 1e-6);
    }
}
