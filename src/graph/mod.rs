use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::embedding::Relevance;
use crate::kb::KbIndex;

/// Undirected weighted graph over candidate KB items.
///
/// Both the connectivity and the coherence graph are instances of this type;
/// they differ only in where their edge weights come from. Every node
/// carries the set of question-word positions it is a candidate for (the
/// same item may surface for several words). Zero-weight edges are not
/// stored; re-adding an edge overwrites its weight.
///
/// All mutation goes through one mutex, so concurrent population from
/// several word pairs stays consistent: node adds merge word-index sets and
/// edge adds are last-writer-wins.
pub struct ScoreGraph {
    inner: Mutex<GraphInner>,
}

#[derive(Default)]
struct GraphInner {
    nodes: FxHashMap<String, NodeData>,
}

#[derive(Default)]
struct NodeData {
    word_indexes: BTreeSet<usize>,
    /// Neighbor -> weight. Ordered so score walks are deterministic.
    edges: BTreeMap<String, f64>,
}

impl Default for ScoreGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreGraph {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GraphInner::default()),
        }
    }

    /// Insert the item, or extend its word-index set if already present.
    pub fn add_node(&self, item: &str, word_index: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .nodes
            .entry(item.to_string())
            .or_default()
            .word_indexes
            .insert(word_index);
    }

    /// Store an undirected edge. Weight 0 means "no edge" and is ignored.
    pub fn add_edge(&self, item1: &str, item2: &str, weight: f64) {
        if weight == 0.0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner
            .nodes
            .entry(item1.to_string())
            .or_default()
            .edges
            .insert(item2.to_string(), weight);
        inner
            .nodes
            .entry(item2.to_string())
            .or_default()
            .edges
            .insert(item1.to_string(), weight);
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().unwrap().nodes.len()
    }

    /// Stored weight between the items, 0 when the edge is absent.
    pub fn edge_weight(&self, item1: &str, item2: &str) -> f64 {
        let inner = self.inner.lock().unwrap();
        inner
            .nodes
            .get(item1)
            .and_then(|node| node.edges.get(item2))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn word_indexes(&self, item: &str) -> Vec<usize> {
        let inner = self.inner.lock().unwrap();
        inner
            .nodes
            .get(item)
            .map(|node| node.word_indexes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The best score the item could reach in any fully-assembled tuple with
    /// exactly one item per question word.
    ///
    /// Walks the item's edges in descending weight order and keeps, for each
    /// *other* word position, the first (hence highest) weight seen. One
    /// edge can serve several positions when its endpoints are candidates
    /// for several words. Returns the normalised sum together with the
    /// per-word maxima.
    pub fn item_score(
        &self,
        item: &str,
        word_count: usize,
        word_index: usize,
    ) -> (f64, Vec<f64>) {
        let mut max_weights = vec![0.0f64; word_count];
        let inner = self.inner.lock().unwrap();
        let Some(node) = inner.nodes.get(item) else {
            return (0.0, max_weights);
        };

        let mut edges: Vec<(&String, f64)> =
            node.edges.iter().map(|(neighbor, &w)| (neighbor, w)).collect();
        // descending by weight; BTreeMap order breaks ties by neighbor id
        edges.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        for (neighbor, weight) in edges {
            let neighbor_indexes = inner
                .nodes
                .get(neighbor)
                .map(|n| &n.word_indexes)
                .cloned()
                .unwrap_or_default();
            for &index in node.word_indexes.union(&neighbor_indexes) {
                if index == word_index || index >= word_count {
                    continue;
                }
                if max_weights[index] == 0.0 {
                    max_weights[index] = weight;
                }
            }
        }

        let sum: f64 = max_weights.iter().sum();
        if word_count <= 1 {
            return (sum, max_weights);
        }
        (sum / (word_count - 1) as f64, max_weights)
    }
}

/// Fills the connectivity graph for one pair of candidate lists: edge weight
/// = KB distance score (1-hop 1.0, 2-hop 0.5).
pub struct ConnectivityProcessor<'a> {
    kb: &'a KbIndex,
    graph: &'a ScoreGraph,
}

impl<'a> ConnectivityProcessor<'a> {
    pub fn new(kb: &'a KbIndex, graph: &'a ScoreGraph) -> Self {
        Self { kb, graph }
    }

    pub fn process(&self, candidates1: &[String], candidates2: &[String]) {
        for item1 in candidates1 {
            for item2 in candidates2 {
                let score = self.kb.connectivity(item1, item2);
                if score > 0.0 {
                    self.graph.add_edge(item1, item2, score);
                }
            }
        }
    }
}

/// Fills the coherence graph for one pair of candidate lists: edge weight =
/// cosine similarity of the item embeddings. Vectors are embedded once per
/// side before the pairwise loop.
pub struct CoherenceProcessor<'a> {
    relevance: &'a Relevance,
    graph: &'a ScoreGraph,
}

impl<'a> CoherenceProcessor<'a> {
    pub fn new(relevance: &'a Relevance, graph: &'a ScoreGraph) -> Self {
        Self { relevance, graph }
    }

    pub fn process(&self, candidates1: &[String], candidates2: &[String]) {
        let vectors1 = self.embed(candidates1);
        let vectors2 = self.embed(candidates2);
        for (item1, vector1) in &vectors1 {
            for (item2, vector2) in &vectors2 {
                let score = self.relevance.cosine(vector1, vector2, item1, item2);
                self.graph.add_edge(item1, item2, score);
            }
        }
    }

    fn embed<'b>(&self, candidates: &'b [String]) -> Vec<(&'b String, Vec<f32>)> {
        candidates
            .iter()
            .filter_map(|item| self.relevance.embed_item(item).map(|vector| (item, vector)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_node_merges_word_indexes() {
        let graph = ScoreGraph::new();
        graph.add_node("Q1", 0);
        graph.add_node("Q1", 2);
        graph.add_node("Q1", 0);
        assert_eq!(graph.word_indexes("Q1"), vec![0, 2]);
    }

    #[test]
    fn zero_weight_edges_are_absent() {
        let graph = ScoreGraph::new();
        graph.add_node("Q1", 0);
        graph.add_node("Q2", 1);
        graph.add_edge("Q1", "Q2", 0.0);
        assert_eq!(graph.edge_weight("Q1", "Q2"), 0.0);
        graph.add_edge("Q1", "Q2", 0.5);
        assert_eq!(graph.edge_weight("Q2", "Q1"), 0.5);
        graph.add_edge("Q1", "Q2", 1.0);
        assert_eq!(graph.edge_weight("Q1", "Q2"), 1.0);
    }

    #[test]
    fn item_score_keeps_best_weight_per_other_word() {
        let graph = ScoreGraph::new();
        graph.add_node("Q1", 0);
        graph.add_node("Q2", 1);
        graph.add_node("Q3", 1);
        graph.add_node("Q4", 2);
        graph.add_edge("Q1", "Q2", 0.5);
        graph.add_edge("Q1", "Q3", 1.0);
        graph.add_edge("Q1", "Q4", 0.5);

        // word 1 contributes its best edge (1.0), word 2 contributes 0.5
        let (score, max_weights) = graph.item_score("Q1", 3, 0);
        assert_eq!(max_weights, vec![0.0, 1.0, 0.5]);
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn one_edge_can_cover_several_words() {
        let graph = ScoreGraph::new();
        graph.add_node("Q1", 0);
        // the same candidate appears for words 1 and 2
        graph.add_node("Q2", 1);
        graph.add_node("Q2", 2);
        graph.add_edge("Q1", "Q2", 1.0);

        let (score, max_weights) = graph.item_score("Q1", 3, 0);
        assert_eq!(max_weights, vec![0.0, 1.0, 1.0]);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn single_word_question_scores_zero() {
        let graph = ScoreGraph::new();
        graph.add_node("Q1", 0);
        let (score, max_weights) = graph.item_score("Q1", 1, 0);
        assert_eq!(score, 0.0);
        assert_eq!(max_weights, vec![0.0]);
    }

    #[test]
    fn unknown_node_scores_zero() {
        let graph = ScoreGraph::new();
        let (score, _) = graph.item_score("Q9", 4, 0);
        assert_eq!(score, 0.0);
    }
}
