use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use super::index::{FactRefs, KbIndex};
use super::{code_is_entity, code_is_literal, Code};
use crate::errors::IndexError;

/// A `labels.json`/`aliases.json`/`descriptions.json` entry: the dump stores
/// either a single string or a list of strings per item.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_list(self) -> Vec<String> {
        match self {
            StringOrList::One(s) if s.is_empty() => Vec::new(),
            StringOrList::One(s) => vec![s],
            StringOrList::Many(list) => list,
        }
    }

    fn into_single(self) -> String {
        match self {
            StringOrList::One(s) => s,
            StringOrList::Many(list) => list.into_iter().next().unwrap_or_default(),
        }
    }
}

/// Loads the on-disk index file set into a `KbIndex`.
///
/// Any missing or malformed file is fatal; there is no partially-loaded
/// index.
pub struct IndexLoader {
    dir: PathBuf,
    max_facts: Option<usize>,
}

impl IndexLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_facts: None,
        }
    }

    /// Cap the number of facts read from `KB_list.txt` (development loads).
    pub fn max_facts(mut self, max_facts: usize) -> Self {
        self.max_facts = Some(max_facts);
        self
    }

    pub fn load(self) -> Result<KbIndex, IndexError> {
        let start = Instant::now();
        let highest_id = self.read_highest_id()?;

        let entities: FxHashMap<String, Code> = self.read_json("entity_nodes.json")?;
        let predicates: FxHashMap<String, Code> = self.read_json("pred_nodes.json")?;
        let literals: FxHashMap<String, i64> = self.read_json("literals.json")?;
        let inverse_entities: Vec<String> = self.read_json("inverse_entity_nodes.json")?;
        let inverse_predicates: Vec<String> = self.read_json("inverse_pred_nodes.json")?;
        let inverse_literals: Vec<String> = self.read_json("inverse_literals.json")?;

        let labels = self.read_string_table("labels.json", highest_id)?;
        let aliases = self.read_string_table("aliases.json", highest_id)?;
        let descriptions: Vec<String> = {
            let raw: Vec<StringOrList> = self.read_json("descriptions.json")?;
            self.check_table_len("descriptions.json", raw.len(), highest_id)?;
            raw.into_iter().map(StringOrList::into_single).collect()
        };

        let mut index = KbIndex {
            entities,
            predicates,
            literals,
            inverse_entities,
            inverse_predicates,
            inverse_literals,
            labels,
            aliases,
            descriptions,
            facts: Vec::new(),
            fact_refs: vec![None; highest_id],
            neighbors: vec![None; highest_id],
            highest_id,
            connectivity_memo: None,
        };

        let (fact_count, qualifier_count) = self.read_kb_list(&mut index)?;
        info!(
            facts = fact_count,
            with_qualifiers = qualifier_count,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "KB index loaded"
        );
        Ok(index)
    }

    fn read_highest_id(&self) -> Result<usize, IndexError> {
        let path = self.dir.join("HIGHEST_ID.txt");
        let raw = std::fs::read_to_string(&path).map_err(|e| missing_or_io(&path, e))?;
        raw.trim()
            .parse::<usize>()
            .map_err(|e| IndexError::malformed(&path, e.to_string()))
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, IndexError> {
        let path = self.dir.join(name);
        let file = File::open(&path).map_err(|e| missing_or_io(&path, e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| IndexError::malformed(&path, e.to_string()))
    }

    fn read_string_table(
        &self,
        name: &str,
        highest_id: usize,
    ) -> Result<Vec<Vec<String>>, IndexError> {
        let raw: Vec<StringOrList> = self.read_json(name)?;
        self.check_table_len(name, raw.len(), highest_id)?;
        Ok(raw.into_iter().map(StringOrList::into_list).collect())
    }

    fn check_table_len(
        &self,
        name: &str,
        actual: usize,
        expected: usize,
    ) -> Result<(), IndexError> {
        if actual != expected {
            return Err(IndexError::Inconsistent(format!(
                "{name} has {actual} entries, HIGHEST_ID says {expected}"
            )));
        }
        Ok(())
    }

    /// Stream `KB_list.txt` and populate the fact arena, the per-item fact
    /// references, and the neighbor sets. Fact boundaries are implicit: a
    /// new fact starts when an entity code follows a complete fact prefix
    /// (odd length >= 3).
    fn read_kb_list(&self, index: &mut KbIndex) -> Result<(usize, usize), IndexError> {
        let path = self.dir.join("KB_list.txt");
        let file = File::open(&path).map_err(|e| missing_or_io(&path, e))?;
        let reader = BufReader::new(file);

        let mut fact_count = 0usize;
        let mut qualifier_count = 0usize;
        let mut fact_items: Vec<Code> = Vec::new();

        for line in reader.lines() {
            let line = line.map_err(|e| IndexError::io(&path, e))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let code: Code = trimmed
                .parse()
                .map_err(|e: std::num::ParseIntError| IndexError::malformed(&path, e.to_string()))?;

            let complete = fact_items.len() >= 3 && fact_items.len() % 2 == 1;
            if complete && code_is_entity(code) {
                // two successive entities after a full fact: boundary
                register_fact(index, &fact_items, &path)?;
                fact_count += 1;
                if fact_items.len() > 3 {
                    qualifier_count += 1;
                }
                fact_items = vec![code];
                if self.max_facts.is_some_and(|max| fact_count >= max) {
                    return Ok((fact_count, qualifier_count));
                }
            } else {
                fact_items.push(code);
            }
        }

        // the file ends without a boundary marker for its last fact
        if fact_items.len() >= 3 && fact_items.len() % 2 == 1 {
            register_fact(index, &fact_items, &path)?;
            fact_count += 1;
            if fact_items.len() > 3 {
                qualifier_count += 1;
            }
        }
        Ok((fact_count, qualifier_count))
    }
}

fn register_fact(index: &mut KbIndex, fact_items: &[Code], path: &Path) -> Result<(), IndexError> {
    let fact_index = index.facts.len() as u32;
    for (position, &item) in fact_items.iter().enumerate() {
        if code_is_literal(item) {
            continue;
        }
        let slot = item as usize;
        if slot >= index.highest_id {
            return Err(IndexError::malformed(
                path,
                format!("code {item} exceeds HIGHEST_ID {}", index.highest_id),
            ));
        }
        let refs = index.fact_refs[slot].get_or_insert_with(FactRefs::default);
        if position == 0 {
            refs.subject.push(fact_index);
        } else {
            refs.object.push(fact_index);
        }
        let neighbors = index.neighbors[slot].get_or_insert_with(FxHashSet::default);
        for (other_position, &other) in fact_items.iter().enumerate() {
            if other_position != position && code_is_entity(other) {
                neighbors.insert(other);
            }
        }
    }
    index.facts.push(fact_items.to_vec());
    Ok(())
}

fn missing_or_io(path: &Path, error: std::io::Error) -> IndexError {
    if error.kind() == std::io::ErrorKind::NotFound {
        IndexError::MissingFile(path.to_path_buf())
    } else {
        IndexError::io(path, error)
    }
}
