#![allow(dead_code)]

use std::path::{Path, PathBuf};

use kbcontext::config::Config;
use kbcontext::kb::load::IndexLoader;
use kbcontext::kb::{IndexBuilder, KbIndex};
use tempfile::TempDir;

/// A small football-flavored KB:
///
/// - the France national team (Q47774) plays for France (Q142) and is a
///   national association football team (Q6979593), like Croatia's (Q224)
/// - Paris (Q90) is the capital of France
/// - the 2018 final (Q170645) was won by Q47774 (with a date qualifier) and
///   took place in France
pub const FOOTBALL_DUMP: &str = "\
Q47774,P17,Q142
Q47774,P31,Q6979593
Q224,P31,Q6979593
Q142,P36,Q90
Q170645,P1346,Q47774,P585,\"2018-07-15T00:00:00Z\"
Q170645,P17,Q142
";

pub fn football_metadata() -> serde_json::Value {
    serde_json::json!({
        "Q47774": {
            "labels": ["Q47774", "France national association football team"],
            "aliases": ["Les Bleus", "France"],
            "description": "men's national association football team representing France"
        },
        "Q142": {"labels": ["France"]},
        "Q90": {"labels": ["Paris"]},
        "Q224": {"labels": ["Croatia national football team"]},
        "Q6979593": {"labels": ["national association football team"]},
        "Q170645": {"labels": ["2018 FIFA World Cup Final"]},
        "P17": {"labels": ["country"]},
        "P31": {"labels": ["instance of"]},
        "P36": {"labels": ["capital"]},
        "P585": {"labels": ["point in time"]},
        "P1346": {"labels": ["winner"]}
    })
}

/// Build an index directory from a dump string plus optional metadata.
pub fn build_index_dir(dir: &Path, dump: &str, metadata: Option<&serde_json::Value>) {
    let dump_path = dir.join("dump.csv");
    std::fs::write(&dump_path, dump).unwrap();
    let mut builder = IndexBuilder::new(dir.join("index"));
    if let Some(metadata) = metadata {
        let metadata_path = dir.join("metadata.json");
        std::fs::write(&metadata_path, serde_json::to_string(metadata).unwrap()).unwrap();
        builder = builder.metadata(metadata_path);
    }
    builder.build(&dump_path).unwrap();
}

pub fn football_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    build_index_dir(dir.path(), FOOTBALL_DUMP, Some(&football_metadata()));
    dir
}

pub fn load_index(dir: &TempDir) -> KbIndex {
    IndexLoader::new(dir.path().join("index")).load().unwrap()
}

pub fn football_index() -> (TempDir, KbIndex) {
    let dir = football_dir();
    let index = load_index(&dir);
    (dir, index)
}

/// Tiny word2vec-style vectors for the football questions, including an
/// entity row for the 2018 final.
pub fn write_vectors(dir: &Path) -> PathBuf {
    let path = dir.join("vectors.txt");
    std::fs::write(
        &path,
        "6 3\n\
         winner 1.0 0.0 0.0\n\
         final 0.8 0.2 0.0\n\
         cup 0.5 0.5 0.0\n\
         france 0.0 1.0 0.0\n\
         capital 0.0 0.8 0.2\n\
         ENTITY/2018_FIFA_World_Cup_Final 0.9 0.1 0.0\n",
    )
    .unwrap();
    path
}

pub fn write_mappings(dir: &Path) -> PathBuf {
    let path = dir.join("mappings.json");
    std::fs::write(
        &path,
        serde_json::to_string(&serde_json::json!({
            "Q170645": "2018_FIFA_World_Cup_Final"
        }))
        .unwrap(),
    )
    .unwrap();
    path
}

/// An in-memory config over the fixture directory: file-backed index, no
/// persisted caches.
pub fn football_config(dir: &TempDir) -> Config {
    Config {
        index_dir: dir.path().join("index"),
        vectors_path: Some(write_vectors(dir.path())),
        mappings_path: Some(write_mappings(dir.path())),
        stopwords_path: None,
        search_cache_path: None,
        norm_cache_path: None,
        detector_cache_path: None,
        connectivity_cache: false,
        params: kbcontext::Params::default(),
    }
}
