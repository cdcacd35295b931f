use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

pub mod cli;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod graph;
pub mod kb;
pub mod pipeline;
pub mod search;
pub mod storage;
pub mod text;

pub use config::{Config, KSetting, Params};
pub use kb::{is_entity_id, is_predicate_id, ConnectionPath, Fact, FactEntry, KbIndex, TypeRecord};
pub use pipeline::{ContextPipeline, QuestionContext, TupleEntry};

use embedding::{EmbeddingModel, NormCache, NullModel, Relevance, TextVectors};
use kb::load::IndexLoader;
use search::{LabelSearch, SearchBackend, SearchCache};
use text::{CachedDetector, DetectorCache, MentionDetector, NoDetector, TextProcessor};

/// A point in time after which query processing should wind down.
///
/// Deadlines are cooperative: retry loops and the pairwise graph-population
/// loop check them and stop early, and the pipeline marks the result as
/// partial. `Deadline::none()` never expires.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn within(budget: Duration) -> Self {
        Self(Some(Instant::now() + budget))
    }

    pub fn expired(&self) -> bool {
        self.0.is_some_and(|instant| Instant::now() >= instant)
    }
}

/// The loaded knowledge base plus the question pipeline, behind one handle.
///
/// Opening is the expensive step (the whole index is read into memory);
/// everything after borrows the read-only index.
pub struct KbContext {
    config: Config,
    kb: Arc<KbIndex>,
    pipeline: ContextPipeline,
}

impl KbContext {
    /// Open with the default collaborators: in-process label search and a
    /// cache-only mention detector.
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with(config, None, None)
    }

    /// Open with custom search backend and/or mention detector.
    pub fn open_with(
        config: Config,
        backend: Option<Arc<dyn SearchBackend>>,
        detector: Option<Arc<dyn MentionDetector>>,
    ) -> Result<Self> {
        let mut kb = IndexLoader::new(&config.index_dir).load()?;
        if config.connectivity_cache {
            kb = kb.with_connectivity_memo();
        }
        let kb = Arc::new(kb);
        info!(
            entities = kb.entity_count(),
            facts = kb.fact_count(),
            "knowledge base ready"
        );

        let text = Arc::new(match &config.stopwords_path {
            Some(path) => TextProcessor::from_stopwords_file(path)?,
            None => TextProcessor::new(),
        });

        let model: Arc<dyn EmbeddingModel> = match &config.vectors_path {
            Some(path) => {
                let vectors = TextVectors::from_file(path)?;
                info!(words = vectors.word_count(), "embedding vectors loaded");
                Arc::new(vectors)
            }
            None => Arc::new(NullModel),
        };
        let norm_cache = Arc::new(NormCache::open(config.norm_cache_path.as_deref()));
        let mut relevance = Relevance::new(
            Arc::clone(&model),
            Arc::clone(&kb),
            Arc::clone(&text),
            norm_cache,
        );
        if let Some(path) = &config.mappings_path {
            relevance = relevance.with_page_mappings(path)?;
        }

        let search_cache = Arc::new(SearchCache::open(config.search_cache_path.as_deref()));
        let detector_cache = Arc::new(DetectorCache::open(config.detector_cache_path.as_deref()));
        let backend: Arc<dyn SearchBackend> = match backend {
            Some(backend) => backend,
            None => Arc::new(LabelSearch::new(Arc::clone(&kb))),
        };
        let detector: Arc<dyn MentionDetector> = match detector {
            Some(detector) => detector,
            None => Arc::new(CachedDetector::new(
                Arc::new(NoDetector),
                Arc::clone(&detector_cache),
            )),
        };

        let pipeline = ContextPipeline::new(
            Arc::clone(&kb),
            Arc::new(relevance),
            backend,
            search_cache,
            detector,
            detector_cache,
            text,
        );
        Ok(Self {
            config,
            kb,
            pipeline,
        })
    }

    pub fn kb(&self) -> &KbIndex {
        &self.kb
    }

    pub fn pipeline(&self) -> &ContextPipeline {
        &self.pipeline
    }

    /// The display label for the item, e.g. "France national association
    /// football team" for `Q47774`.
    pub fn label(&self, item: &str) -> String {
        self.kb.label(item)
    }

    /// All labels stored for the item.
    pub fn labels(&self, item: &str) -> Vec<String> {
        self.kb.labels_of(item)
    }

    /// Alternative names ("also known as").
    pub fn aliases(&self, item: &str) -> Vec<String> {
        self.kb.aliases_of(item)
    }

    pub fn description(&self, item: &str) -> String {
        self.kb.description(item)
    }

    pub fn types(&self, item: &str) -> Vec<TypeRecord> {
        self.kb.types(item)
    }

    pub fn most_frequent_type(&self, item: &str) -> Option<TypeRecord> {
        self.kb.most_frequent_type(item)
    }

    /// `[frequency as subject, frequency as (qualifier-)object]`.
    pub fn frequency(&self, item: &str) -> (usize, usize) {
        self.kb.frequency(item)
    }

    /// The 1-hop neighborhood of the item.
    pub fn neighborhood(
        &self,
        item: &str,
        p: usize,
        include_labels: bool,
        include_type: bool,
    ) -> Vec<Fact> {
        self.kb.neighborhood(item, p, include_labels, include_type)
    }

    /// The 2-hop neighborhood of the item.
    pub fn two_hop_neighborhood(
        &self,
        item: &str,
        p: usize,
        include_labels: bool,
        include_type: bool,
    ) -> Vec<Fact> {
        self.kb
            .neighborhood_two_hop(item, p, include_labels, include_type)
    }

    /// All 1-hop or 2-hop paths between the items.
    pub fn connect(&self, item1: &str, item2: &str) -> Vec<ConnectionPath> {
        self.kb.connect(item1, item2, None)
    }

    /// 1 for 1-hop, 0.5 for 2-hop, 0 otherwise.
    pub fn connectivity_check(&self, item1: &str, item2: &str) -> f64 {
        self.kb.connectivity(item1, item2)
    }

    /// Exact graph distance (breadth-first; slow for far-apart items).
    pub fn distance(&self, item1: &str, item2: &str) -> Option<usize> {
        self.kb.distance(item1, item2)
    }

    /// The facts around an explicit item tuple; with `connected` only facts
    /// touching at least two tuple items survive.
    pub fn tuple_search_space(
        &self,
        kb_item_tuple: &[String],
        p: usize,
        include_labels: bool,
        include_type: bool,
        connected: bool,
    ) -> Vec<Fact> {
        if connected {
            self.kb
                .extract_connected_search_space(kb_item_tuple, p, include_labels, include_type)
        } else {
            self.kb
                .extract_search_space(kb_item_tuple, p, include_labels, include_type)
        }
    }

    /// Compute the question-specific context. `parameters` merges over the
    /// configured defaults; unknown keys are ignored.
    pub async fn search_space(
        &self,
        question: &str,
        parameters: Option<&serde_json::Map<String, serde_json::Value>>,
        include_labels: bool,
        include_type: bool,
        deadline: Deadline,
    ) -> Result<QuestionContext> {
        let params = match parameters {
            Some(overrides) if !overrides.is_empty() => {
                self.config.params.clone().merge(overrides)
            }
            _ => self.config.params.clone(),
        };
        self.pipeline
            .search_space(question, &params, include_labels, include_type, deadline)
            .await
    }

    /// Persist all caches to disk.
    pub fn store_caches(&self) -> Result<()> {
        self.pipeline.store_caches()
    }
}
