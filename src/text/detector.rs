use anyhow::Result;
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::storage::JsonCache;

/// Question -> detected entity spans, persisted as a JSON map.
pub type DetectorCache = JsonCache<Vec<String>>;

/// Finds entity-phrase spans in a question. Implementations are external
/// services; a failing detector is transient and the pipeline falls back to
/// the token-only path after bounded retries.
#[async_trait]
pub trait MentionDetector: Send + Sync {
    async fn detect(&self, question: &str) -> Result<Vec<String>>;
}

/// Detects nothing: every question word is a single residual token.
pub struct NoDetector;

#[async_trait]
impl MentionDetector for NoDetector {
    async fn detect(&self, _question: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Serves spans from a fixed map. Used for reproducible runs and tests.
#[derive(Default)]
pub struct StaticDetector {
    spans: FxHashMap<String, Vec<String>>,
}

impl StaticDetector {
    pub fn new(spans: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        Self {
            spans: spans.into_iter().collect(),
        }
    }
}

#[async_trait]
impl MentionDetector for StaticDetector {
    async fn detect(&self, question: &str) -> Result<Vec<String>> {
        Ok(self.spans.get(question).cloned().unwrap_or_default())
    }
}

/// Wraps a detector with a persistent cache, so repeated questions never hit
/// the underlying service again.
pub struct CachedDetector {
    inner: Arc<dyn MentionDetector>,
    cache: Arc<DetectorCache>,
}

impl CachedDetector {
    pub fn new(inner: Arc<dyn MentionDetector>, cache: Arc<DetectorCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl MentionDetector for CachedDetector {
    async fn detect(&self, question: &str) -> Result<Vec<String>> {
        if let Some(spans) = self.cache.get(question) {
            return Ok(spans);
        }
        let spans = self.inner.detect(question).await?;
        self.cache.put(question, spans.clone());
        Ok(spans)
    }
}

/// Remote mention detection over HTTP. The endpoint receives the question as
/// the `text` query parameter and answers `{"spots": [{"spot": "..."}]}`.
#[cfg(feature = "remote-search")]
pub struct HttpDetector {
    url: String,
    token: String,
    client: reqwest::Client,
}

#[cfg(feature = "remote-search")]
impl HttpDetector {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "remote-search")]
#[async_trait]
impl MentionDetector for HttpDetector {
    async fn detect(&self, question: &str) -> Result<Vec<String>> {
        #[derive(serde::Deserialize)]
        struct Spot {
            spot: String,
        }
        #[derive(serde::Deserialize)]
        struct Response {
            #[serde(default)]
            spots: Vec<Spot>,
        }
        let response: Response = self
            .client
            .get(&self.url)
            .query(&[("lang", "en"), ("gcube-token", &self.token), ("text", question)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.spots.into_iter().map(|s| s.spot).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cached_detector_serves_from_cache() {
        let cache = Arc::new(DetectorCache::in_memory());
        cache.put("q", vec!["France".to_string()]);
        let detector = CachedDetector::new(Arc::new(NoDetector), cache);
        assert_eq!(detector.detect("q").await.unwrap(), vec!["France"]);
        assert!(detector.detect("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cached_detector_fills_cache() {
        let cache = Arc::new(DetectorCache::in_memory());
        let inner = Arc::new(StaticDetector::new([(
            "q".to_string(),
            vec!["World Cup".to_string()],
        )]));
        let detector = CachedDetector::new(inner, Arc::clone(&cache));
        detector.detect("q").await.unwrap();
        assert_eq!(cache.get("q"), Some(vec!["World Cup".to_string()]));
    }
}
