use anyhow::Result;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::{KSetting, Params};
use crate::embedding::Relevance;
use crate::graph::ScoreGraph;
use crate::kb::KbIndex;
use crate::search::CandidateList;
use crate::Deadline;

/// Scores are rounded to four decimals before sorting so float noise can
/// never flip an ordering between runs.
pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// A fully-scored candidate: the aggregate plus its four components.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopkRecord {
    pub id: String,
    pub score: f64,
    #[serde(rename = "match")]
    pub match_score: f64,
    pub rel: f64,
    pub conn: f64,
    pub coh: f64,
}

/// Selects the top-k KB items for one question word. One processor exists
/// per word; it owns the word's candidate list and reads the shared graphs
/// only after they are fully populated.
pub struct TopkProcessor {
    word_index: usize,
    words: Arc<Vec<String>>,
    candidates: CandidateList,
    kb: Arc<KbIndex>,
    params: Params,
    k: usize,
    queues: [Vec<(String, f64)>; 4],
    /// Random-access map for the threshold algorithm: item -> score in each
    /// queue, filled during the sequential scan.
    scores_by_item: FxHashMap<String, [f64; 4]>,
    top_k: Vec<TopkRecord>,
}

impl TopkProcessor {
    pub fn new(
        word_index: usize,
        words: Arc<Vec<String>>,
        candidates: CandidateList,
        kb: Arc<KbIndex>,
        params: Params,
    ) -> Self {
        Self {
            word_index,
            words,
            candidates,
            kb,
            params,
            k: 0,
            queues: Default::default(),
            scores_by_item: FxHashMap::default(),
            top_k: Vec::new(),
        }
    }

    pub fn word(&self) -> &str {
        &self.words[self.word_index]
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Initialise the candidate list and resolve k.
    pub async fn initialize(&mut self, deadline: Deadline) -> Result<()> {
        self.candidates.initialize(deadline).await?;
        self.k = match &self.params.k {
            KSetting::Fixed(k) => *k,
            KSetting::Auto(_) => self.auto_k(),
        };
        Ok(())
    }

    /// Derive k from the ambiguity of the word: the base-2 entropy of the
    /// candidates' KB-frequency distribution, floored, plus one. A word
    /// whose candidates never occur in any fact gets k = 0 and contributes
    /// nothing to the context.
    fn auto_k(&self) -> usize {
        let frequencies: Vec<f64> = self
            .candidates
            .items()
            .iter()
            .map(|item| {
                let (subject, object) = self.kb.frequency(item);
                (subject + object) as f64
            })
            .collect();
        let total: f64 = frequencies.iter().sum();
        if total == 0.0 {
            return 0;
        }
        let entropy: f64 = frequencies
            .iter()
            .filter(|f| **f > 0.0)
            .map(|f| {
                let p = f / total;
                -p * p.log2()
            })
            .sum();
        entropy.floor() as usize + 1
    }

    /// Seed the shared graphs with this word's candidates.
    pub fn add_candidates_to_graphs(&self, connectivity: &ScoreGraph, coherence: &ScoreGraph) {
        for item in self.candidates.items() {
            connectivity.add_node(item, self.word_index);
            coherence.add_node(item, self.word_index);
        }
    }

    pub fn candidates(&self) -> &[String] {
        self.candidates.items()
    }

    /// Build the four ranked queues and run the threshold aggregation.
    /// Requires both graphs to be fully populated.
    pub fn compute_top_k(
        &mut self,
        relevance: &Relevance,
        connectivity: &ScoreGraph,
        coherence: &ScoreGraph,
    ) {
        if self.k == 0 {
            self.top_k = Vec::new();
            return;
        }
        let start = Instant::now();
        self.build_queues(relevance, connectivity, coherence);
        self.top_k = threshold_aggregate(
            &self.queues,
            &self.scores_by_item,
            self.params.weights(),
            self.k,
        );
        debug!(
            word = self.word(),
            k = self.k,
            candidates = self.queues[0].len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "top-k selected"
        );
    }

    /// One scan over the candidate list fills all four queues; the matching
    /// queue is already sorted by construction, the others get sorted after
    /// the scan.
    fn build_queues(
        &mut self,
        relevance: &Relevance,
        connectivity: &ScoreGraph,
        coherence: &ScoreGraph,
    ) {
        let word_count = self.words.len();
        let other_words: Vec<String> = self
            .words
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != self.word_index)
            .map(|(_, word)| word.clone())
            .collect();
        let word_vectors = relevance.word_vectors(&other_words);

        for _ in 0..self.params.d {
            let Some((item, matching_score)) = self.candidates.scan() else {
                break;
            };
            let matching_score = round4(matching_score);
            let relevance_score = round4(relevance.question_relevance(&item, &word_vectors));
            let (connectivity_score, _) =
                connectivity.item_score(&item, word_count, self.word_index);
            let connectivity_score = round4(connectivity_score);
            let (coherence_score, _) = coherence.item_score(&item, word_count, self.word_index);
            let coherence_score = round4(coherence_score);

            self.queues[0].push((item.clone(), matching_score));
            self.queues[1].push((item.clone(), relevance_score));
            self.queues[2].push((item.clone(), connectivity_score));
            self.queues[3].push((item.clone(), coherence_score));
            self.scores_by_item.insert(
                item,
                [
                    matching_score,
                    relevance_score,
                    connectivity_score,
                    coherence_score,
                ],
            );
        }
        for queue in self.queues.iter_mut().skip(1) {
            queue.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        }
    }

    /// The selected items, best first.
    pub fn top_k(&self) -> &[TopkRecord] {
        &self.top_k
    }
}

/// Fagin's Threshold Algorithm over four score-descending queues.
///
/// Queues are read in lock-step; the score at the current position of each
/// queue is that queue's ceiling. An item is fully scored on first sight via
/// the random-access map. Once the weighted sum of ceilings cannot beat the
/// current k-th best aggregate, no unseen item can either, and the walk
/// stops.
pub(crate) fn threshold_aggregate(
    queues: &[Vec<(String, f64)>; 4],
    scores_by_item: &FxHashMap<String, [f64; 4]>,
    weights: [f64; 4],
    k: usize,
) -> Vec<TopkRecord> {
    if k == 0 || queues[0].is_empty() {
        return Vec::new();
    }
    let length = queues[0].len();
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut ceilings = [1.0f64; 4];
    let mut top: Vec<TopkRecord> = Vec::new();
    let mut kth_score = 0.0f64;

    for position in 0..length {
        for (queue_index, queue) in queues.iter().enumerate() {
            let (item, single_score) = &queue[position];
            ceilings[queue_index] = *single_score;
            if !seen.insert(item.as_str()) {
                continue;
            }
            let Some(scores) = scores_by_item.get(item.as_str()) else {
                continue;
            };
            let aggregate: f64 = (0..4).map(|i| weights[i] * scores[i]).sum();
            if aggregate > kth_score {
                top.push(TopkRecord {
                    id: item.clone(),
                    score: aggregate,
                    match_score: scores[0],
                    rel: scores[1],
                    conn: scores[2],
                    coh: scores[3],
                });
                // stable sort: equal scores keep insertion order
                top.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
                top.truncate(k);
            }
        }
        let threshold: f64 = (0..4).map(|i| weights[i] * ceilings[i]).sum();
        kth_score = if top.len() >= k { top[k - 1].score } else { 0.0 };
        if threshold <= kth_score {
            break;
        }
    }
    top.truncate(k);
    top
}
