use anyhow::Result;
use async_trait::async_trait;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::kb::KbIndex;
use crate::storage::JsonCache;
use crate::Deadline;

/// Term -> ranked item ids, persisted as a JSON map.
pub type SearchCache = JsonCache<Vec<String>>;

pub(crate) const RETRY_ATTEMPTS: usize = 5;
pub(crate) const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Ranked lexical search over KB items. Implementations may be remote; the
/// pipeline treats failures as transient and retries with back-off.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Up to `limit` item ids for the term, best match first.
    async fn search_term(&self, term: &str, limit: usize) -> Result<Vec<String>>;
}

/// Run a fallible external call with bounded retries and fixed back-off.
/// Returns `None` on exhaustion or an expired deadline; callers continue
/// with an empty result.
pub(crate) async fn bounded_retry<T, F, Fut>(deadline: Deadline, what: &str, mut call: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=RETRY_ATTEMPTS {
        if deadline.expired() {
            return None;
        }
        match call().await {
            Ok(value) => return Some(value),
            Err(error) => {
                warn!("{what} failed (attempt {attempt}/{RETRY_ATTEMPTS}): {error:#}");
                if attempt < RETRY_ATTEMPTS {
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }
    None
}

/// In-process backend: fuzzy-matches the term against every label and alias
/// in the index. No network, deterministic, and good enough for offline use
/// and tests; large deployments point the pipeline at a remote backend
/// instead.
pub struct LabelSearch {
    kb: Arc<KbIndex>,
    matcher: SkimMatcherV2,
}

impl LabelSearch {
    pub fn new(kb: Arc<KbIndex>) -> Self {
        Self {
            kb,
            matcher: SkimMatcherV2::default(),
        }
    }

    fn best_score(&self, item: &str, term: &str) -> Option<i64> {
        let mut best = None;
        for label in self
            .kb
            .labels_of(item)
            .iter()
            .chain(self.kb.aliases_of(item).iter())
        {
            if label == item {
                continue;
            }
            if let Some(score) = self.matcher.fuzzy_match(label, term) {
                best = Some(best.map_or(score, |b: i64| b.max(score)));
            }
        }
        best
    }
}

#[async_trait]
impl SearchBackend for LabelSearch {
    async fn search_term(&self, term: &str, limit: usize) -> Result<Vec<String>> {
        let mut scored: Vec<(i64, &str)> = Vec::new();
        for item in self.kb.entity_ids().chain(self.kb.predicate_ids()) {
            if let Some(score) = self.best_score(item, term) {
                scored.push((score, item));
            }
        }
        // stable sort keeps code order for equal scores
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, item)| item.to_string()).collect())
    }
}

/// Remote lexical search speaking the MediaWiki search API.
#[cfg(feature = "remote-search")]
pub struct HttpSearch {
    url: String,
    client: reqwest::Client,
}

#[cfg(feature = "remote-search")]
impl HttpSearch {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "remote-search")]
#[async_trait]
impl SearchBackend for HttpSearch {
    async fn search_term(&self, term: &str, limit: usize) -> Result<Vec<String>> {
        #[derive(serde::Deserialize)]
        struct Hit {
            title: String,
        }
        #[derive(serde::Deserialize)]
        struct Query {
            #[serde(default)]
            search: Vec<Hit>,
        }
        #[derive(serde::Deserialize)]
        struct Response {
            query: Query,
        }
        let limit = limit.to_string();
        let response: Response = self
            .client
            .get(&self.url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("list", "search"),
                ("srnamespace", "0|120"),
                ("srlimit", limit.as_str()),
                ("srsearch", term),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response
            .query
            .search
            .into_iter()
            .map(|hit| hit.title.replace("Property:", ""))
            .collect())
    }
}

/// The candidate KB items for one question word, in backend rank order.
///
/// Acts as the matching-score priority queue: `scan` pops the head and
/// yields `1/(offset+1)`, so earlier candidates score higher.
pub struct CandidateList {
    term: String,
    depth: usize,
    kb: Arc<KbIndex>,
    backend: Arc<dyn SearchBackend>,
    cache: Arc<SearchCache>,
    items: Vec<String>,
    offset: usize,
    initialized: bool,
}

impl CandidateList {
    pub fn new(
        term: impl Into<String>,
        kb: Arc<KbIndex>,
        backend: Arc<dyn SearchBackend>,
        cache: Arc<SearchCache>,
        depth: usize,
    ) -> Self {
        Self {
            term: term.into(),
            depth,
            kb,
            backend,
            cache,
            items: Vec::new(),
            offset: 0,
            initialized: false,
        }
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    /// Fetch and filter the candidates. Calling this again is a no-op.
    pub async fn initialize(&mut self, deadline: Deadline) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let raw = match self.cache.get(&self.term) {
            Some(cached) => cached,
            None => {
                let fetched = bounded_retry(deadline, "lexical search", || {
                    self.backend.search_term(&self.term, 2 * self.depth)
                })
                .await;
                match fetched {
                    Some(items) => {
                        self.cache.put(self.term.as_str(), items.clone());
                        items
                    }
                    // exhausted retries: this word contributes no candidates
                    None => Vec::new(),
                }
            }
        };
        let mut items: Vec<String> = raw.into_iter().filter(|item| self.kb.is_known(item)).collect();
        items.truncate(self.depth);
        self.items = items;
        self.initialized = true;
        Ok(())
    }

    /// Pop the next candidate together with its matching score.
    pub fn scan(&mut self) -> Option<(String, f64)> {
        if self.items.is_empty() {
            return None;
        }
        let item = self.items.remove(0);
        self.offset += 1;
        let score = 1.0 / (self.offset as f64 + 1.0);
        Some((item, score))
    }

    /// The candidates still in the list.
    pub fn items(&self) -> &[String] {
        &self.items
    }
}
