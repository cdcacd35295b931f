use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Number of items each word's top-k selection may keep.
///
/// `Auto` derives k per question word from the entropy of the candidate
/// frequency distribution; `Fixed` forces the same k for every word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KSetting {
    Fixed(usize),
    Auto(String),
}

impl Default for KSetting {
    fn default() -> Self {
        KSetting::Auto("AUTO".to_string())
    }
}

impl KSetting {
    pub fn auto() -> Self {
        Self::default()
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, KSetting::Auto(_))
    }
}

/// Pipeline hyperparameters.
///
/// The four `h_*` weights aggregate the matching, relevance, connectivity and
/// coherence scores; `d` bounds candidate-list depth; `p_setting` is the
/// neighborhood pruning threshold. `bm25_limit` is accepted for compatibility
/// but currently has no effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub h_match: f64,
    pub h_rel: f64,
    pub h_conn: f64,
    pub h_coh: f64,
    pub d: usize,
    pub k: KSetting,
    pub p_setting: usize,
    pub bm25_limit: bool,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            h_match: 0.4,
            h_rel: 0.3,
            h_conn: 0.2,
            h_coh: 0.1,
            d: 20,
            k: KSetting::auto(),
            p_setting: 1000,
            bm25_limit: false,
        }
    }
}

impl Params {
    /// Merge a caller-provided options map over the defaults.
    ///
    /// Unknown keys are ignored; values of the wrong type are coerced where
    /// safe and otherwise left at their default with a warning.
    pub fn merged(overrides: &serde_json::Map<String, Value>) -> Self {
        Params::default().merge(overrides)
    }

    /// Merge an options map over this parameter set.
    pub fn merge(self, overrides: &serde_json::Map<String, Value>) -> Self {
        let mut params = self;
        for (key, value) in overrides {
            match key.as_str() {
                "h_match" => merge_weight(&mut params.h_match, key, value),
                "h_rel" => merge_weight(&mut params.h_rel, key, value),
                "h_conn" => merge_weight(&mut params.h_conn, key, value),
                "h_coh" => merge_weight(&mut params.h_coh, key, value),
                "d" => merge_usize(&mut params.d, key, value),
                "p_setting" => merge_usize(&mut params.p_setting, key, value),
                "k" => match value {
                    Value::Number(n) if n.as_u64().is_some() => {
                        params.k = KSetting::Fixed(n.as_u64().unwrap() as usize);
                    }
                    Value::String(s) if s.eq_ignore_ascii_case("auto") => {
                        params.k = KSetting::auto();
                    }
                    Value::String(s) => match s.parse::<usize>() {
                        Ok(n) => params.k = KSetting::Fixed(n),
                        Err(_) => warn!("ignoring invalid value for parameter k: {s:?}"),
                    },
                    other => warn!("ignoring invalid value for parameter k: {other}"),
                },
                "bm25_limit" => {
                    if let Value::Bool(b) = value {
                        params.bm25_limit = *b;
                    }
                }
                _ => {} // unknown keys are ignored
            }
        }
        params
    }

    pub fn weights(&self) -> [f64; 4] {
        [self.h_match, self.h_rel, self.h_conn, self.h_coh]
    }
}

fn merge_weight(slot: &mut f64, key: &str, value: &Value) {
    match value {
        Value::Number(n) => {
            let v = n.as_f64().unwrap_or(*slot);
            if v >= 0.0 {
                *slot = v;
            } else {
                warn!("ignoring negative value for parameter {key}: {v}");
            }
        }
        Value::String(s) => match s.parse::<f64>() {
            Ok(v) if v >= 0.0 => *slot = v,
            _ => warn!("ignoring invalid value for parameter {key}: {s:?}"),
        },
        other => warn!("ignoring invalid value for parameter {key}: {other}"),
    }
}

fn merge_usize(slot: &mut usize, key: &str, value: &Value) {
    match value {
        Value::Number(n) if n.as_u64().is_some() => *slot = n.as_u64().unwrap() as usize,
        Value::String(s) => match s.parse::<usize>() {
            Ok(v) => *slot = v,
            Err(_) => warn!("ignoring invalid value for parameter {key}: {s:?}"),
        },
        other => warn!("ignoring invalid value for parameter {key}: {other}"),
    }
}

/// File locations for the index, the embedding inputs, and the caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the on-disk index file set.
    pub index_dir: PathBuf,
    /// Word/entity vectors in word2vec text format (optional; without it
    /// relevance and coherence scores are zero).
    pub vectors_path: Option<PathBuf>,
    /// JSON map from entity id to encyclopedia page name (optional).
    pub mappings_path: Option<PathBuf>,
    /// Stop-word list, one word per line (optional; a built-in list is used
    /// otherwise).
    pub stopwords_path: Option<PathBuf>,
    pub search_cache_path: Option<PathBuf>,
    pub norm_cache_path: Option<PathBuf>,
    pub detector_cache_path: Option<PathBuf>,
    /// Memoise connectivity checks for the lifetime of the process.
    pub connectivity_cache: bool,
    pub params: Params,
}

impl Default for Config {
    fn default() -> Self {
        let data_root = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kbcontext");

        Self {
            index_dir: data_root.join("index"),
            vectors_path: None,
            mappings_path: None,
            stopwords_path: None,
            search_cache_path: Some(data_root.join("cache").join("search_cache.json")),
            norm_cache_path: Some(data_root.join("cache").join("norm_cache.json")),
            detector_cache_path: Some(data_root.join("cache").join("detector_cache.json")),
            connectivity_cache: false,
            params: Params::default(),
        }
    }
}

impl Config {
    /// Load a configuration file (JSON), filling unset fields from defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn with_index_dir(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            ..Default::default()
        }
    }
}
