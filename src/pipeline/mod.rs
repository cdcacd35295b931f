pub mod topk;

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::Params;
use crate::embedding::Relevance;
use crate::graph::{CoherenceProcessor, ConnectivityProcessor, ScoreGraph};
use crate::kb::{Fact, KbIndex};
use crate::search::{bounded_retry, CandidateList, SearchBackend, SearchCache};
use crate::text::{DetectorCache, MentionDetector, TextProcessor};
use crate::Deadline;
use topk::TopkProcessor;

/// One entry of the context tuple: a question word and a KB item selected
/// for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TupleEntry {
    pub word: String,
    pub item: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// The question-specific context: the per-word item tuple and the facts in
/// its neighborhood. `partial` is set when a deadline cut the computation
/// short; the result is then the best one obtained so far.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionContext {
    pub kb_item_tuple: Vec<TupleEntry>,
    pub search_space: Vec<Fact>,
    pub partial: bool,
}

/// Drives the per-question disambiguation: mention extraction, per-word
/// candidate lists, graph population, per-word top-k selection, and context
/// assembly.
///
/// The per-word computations read only the shared graphs (complete before
/// any queue is built) and their own candidate list, so word order never
/// changes the output.
pub struct ContextPipeline {
    kb: Arc<KbIndex>,
    relevance: Arc<Relevance>,
    backend: Arc<dyn SearchBackend>,
    search_cache: Arc<SearchCache>,
    detector: Arc<dyn MentionDetector>,
    detector_cache: Arc<DetectorCache>,
    text: Arc<TextProcessor>,
}

impl ContextPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kb: Arc<KbIndex>,
        relevance: Arc<Relevance>,
        backend: Arc<dyn SearchBackend>,
        search_cache: Arc<SearchCache>,
        detector: Arc<dyn MentionDetector>,
        detector_cache: Arc<DetectorCache>,
        text: Arc<TextProcessor>,
    ) -> Self {
        Self {
            kb,
            relevance,
            backend,
            search_cache,
            detector,
            detector_cache,
            text,
        }
    }

    pub fn kb(&self) -> &Arc<KbIndex> {
        &self.kb
    }

    /// Extract the ordered question words, falling back to the token-only
    /// path when the mention detector stays unreachable.
    pub async fn question_words(&self, question: &str, deadline: Deadline) -> Vec<String> {
        let spans = bounded_retry(deadline, "mention detection", || {
            self.detector.detect(question)
        })
        .await
        .unwrap_or_default();
        self.text.question_words(question, &spans)
    }

    /// Compute the question-specific context.
    pub async fn search_space(
        &self,
        question: &str,
        params: &Params,
        include_labels: bool,
        include_type: bool,
        deadline: Deadline,
    ) -> Result<QuestionContext> {
        let start = Instant::now();
        let mut partial = false;

        // 1. question words
        let words = Arc::new(self.question_words(question, deadline).await);
        let word_count = words.len();
        if word_count == 0 {
            return Ok(QuestionContext {
                kb_item_tuple: Vec::new(),
                search_space: Vec::new(),
                partial: deadline.expired(),
            });
        }

        // 2. per-word processors with initialised candidate lists
        let mut processors: Vec<TopkProcessor> = Vec::with_capacity(word_count);
        for (word_index, word) in words.iter().enumerate() {
            let candidates = CandidateList::new(
                word.clone(),
                Arc::clone(&self.kb),
                Arc::clone(&self.backend),
                Arc::clone(&self.search_cache),
                params.d,
            );
            let mut processor = TopkProcessor::new(
                word_index,
                Arc::clone(&words),
                candidates,
                Arc::clone(&self.kb),
                params.clone(),
            );
            processor.initialize(deadline).await?;
            processors.push(processor);
        }
        debug!(
            words = word_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "candidate lists initialised"
        );

        // 3. seed the graphs with every candidate
        let connectivity_graph = ScoreGraph::new();
        let coherence_graph = ScoreGraph::new();
        for processor in &processors {
            processor.add_candidates_to_graphs(&connectivity_graph, &coherence_graph);
        }

        // 4. pairwise population over unordered word pairs
        let connectivity = ConnectivityProcessor::new(self.kb.as_ref(), &connectivity_graph);
        let coherence = CoherenceProcessor::new(self.relevance.as_ref(), &coherence_graph);
        'pairs: for i in 0..word_count {
            for j in (i + 1)..word_count {
                if deadline.expired() {
                    partial = true;
                    break 'pairs;
                }
                connectivity.process(processors[i].candidates(), processors[j].candidates());
                coherence.process(processors[i].candidates(), processors[j].candidates());
            }
        }
        debug!(
            nodes = connectivity_graph.node_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "graphs populated"
        );

        // 5. per-word top-k over the now-immutable graphs
        for processor in &mut processors {
            if deadline.expired() {
                partial = true;
                break;
            }
            processor.compute_top_k(&self.relevance, &connectivity_graph, &coherence_graph);
        }

        // 6. context tuple in question-word order
        let mut kb_item_tuple = Vec::new();
        for processor in &processors {
            for record in processor.top_k() {
                kb_item_tuple.push(TupleEntry {
                    word: processor.word().to_string(),
                    item: record.id.clone(),
                    label: include_labels.then(|| self.kb.label(&record.id)),
                });
            }
        }

        // 7. search space around the tuple
        let tuple_items: Vec<String> = kb_item_tuple
            .iter()
            .map(|entry| entry.item.clone())
            .collect();
        let search_space = self.kb.extract_search_space(
            &tuple_items,
            params.p_setting,
            include_labels,
            include_type,
        );
        debug!(
            tuple = kb_item_tuple.len(),
            facts = search_space.len(),
            partial,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "context assembled"
        );

        Ok(QuestionContext {
            kb_item_tuple,
            search_space,
            partial,
        })
    }

    /// Persist the search, norm and detector caches. Never called mid-query.
    pub fn store_caches(&self) -> Result<()> {
        self.search_cache.store()?;
        self.relevance.norm_cache().store()?;
        self.detector_cache.store()?;
        Ok(())
    }
}
