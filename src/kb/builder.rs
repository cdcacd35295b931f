use anyhow::{bail, Context, Result};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use super::{Code, ENTITY_CODE_START, ENTITY_PATTERN, MAX_LITERAL_LEN, PREDICATE_PATTERN};

/// Labels, aliases and description for one item, as given in the optional
/// metadata sidecar.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ItemMetadata {
    labels: Vec<String>,
    aliases: Vec<String>,
    description: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BuildStats {
    pub facts: usize,
    pub entities: usize,
    pub predicates: usize,
    pub literals: usize,
    pub skipped_lines: usize,
}

/// Offline encoder: raw dump CSV -> the on-disk index file set.
///
/// Dump lines are `subject,predicate,object[,qualifier-predicate,
/// qualifier-object]*`. Subjects must be entities; `Q…-…`/`P…-…` statement
/// suffixes are stripped; literals must not contain commas and are dropped
/// at 40 characters and beyond (whole fact for a main object, single pair
/// for a qualifier object).
pub struct IndexBuilder {
    out_dir: PathBuf,
    metadata_path: Option<PathBuf>,
    entities: FxHashMap<String, Code>,
    predicates: FxHashMap<String, Code>,
    literals: FxHashMap<String, i64>,
    inverse_entities: Vec<String>,
    inverse_predicates: Vec<String>,
    inverse_literals: Vec<String>,
}

enum Token {
    Entity(String),
    Predicate(String),
    Literal(String),
    TooLong,
}

impl IndexBuilder {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            metadata_path: None,
            entities: FxHashMap::default(),
            predicates: FxHashMap::default(),
            literals: FxHashMap::default(),
            inverse_entities: Vec::new(),
            // row 0 unused: predicate codes and literal magnitudes start at 1
            inverse_predicates: vec![String::new()],
            inverse_literals: vec![String::new()],
        }
    }

    /// Attach a JSON sidecar `{id: {labels, aliases, description}}`.
    pub fn metadata(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata_path = Some(path.into());
        self
    }

    pub fn build(mut self, dump_path: &Path) -> Result<BuildStats> {
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {}", self.out_dir.display()))?;

        let dump = File::open(dump_path)
            .with_context(|| format!("failed to open dump {}", dump_path.display()))?;
        let kb_list = File::create(self.out_dir.join("KB_list.txt"))?;
        let mut kb_list = BufWriter::new(kb_list);

        let mut stats = BuildStats::default();
        for line in BufReader::new(dump).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match self.encode_line(&line)? {
                Some(codes) => {
                    for code in codes {
                        writeln!(kb_list, "{code}")?;
                    }
                    stats.facts += 1;
                }
                None => stats.skipped_lines += 1,
            }
        }
        kb_list.flush()?;

        stats.entities = self.entities.len();
        stats.predicates = self.predicates.len();
        stats.literals = self.literals.len();
        self.write_dictionaries()?;
        info!(
            facts = stats.facts,
            entities = stats.entities,
            predicates = stats.predicates,
            literals = stats.literals,
            skipped = stats.skipped_lines,
            "index built"
        );
        Ok(stats)
    }

    /// Encode one dump line, or `None` when the fact is dropped.
    fn encode_line(&mut self, line: &str) -> Result<Option<Vec<Code>>> {
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 3 {
            return Ok(None);
        }
        let subject = normalize(fields[0]);
        let Token::Entity(subject) = subject else {
            return Ok(None);
        };
        let Token::Predicate(predicate) = normalize(fields[1]) else {
            return Ok(None);
        };
        let object = match normalize(fields[2]) {
            Token::TooLong => return Ok(None),
            token => token,
        };

        let mut codes = vec![
            self.entity_code(&subject),
            self.predicate_code(&predicate)?,
            self.token_code(object)?,
        ];
        // qualifier pairs; a dangling trailing field is dropped
        for pair in fields[3..].chunks_exact(2) {
            let Token::Predicate(qualifier_predicate) = normalize(pair[0]) else {
                continue;
            };
            let qualifier_object = match normalize(pair[1]) {
                Token::TooLong => continue,
                token => token,
            };
            codes.push(self.predicate_code(&qualifier_predicate)?);
            codes.push(self.token_code(qualifier_object)?);
        }
        Ok(Some(codes))
    }

    fn entity_code(&mut self, id: &str) -> Code {
        if let Some(&code) = self.entities.get(id) {
            return code;
        }
        let code = ENTITY_CODE_START + self.inverse_entities.len() as Code;
        self.entities.insert(id.to_string(), code);
        self.inverse_entities.push(id.to_string());
        code
    }

    fn predicate_code(&mut self, id: &str) -> Result<Code> {
        if let Some(&code) = self.predicates.get(id) {
            return Ok(code);
        }
        let code = self.inverse_predicates.len() as Code;
        if code >= ENTITY_CODE_START {
            bail!("predicate dictionary overflow: more than {} distinct predicates", ENTITY_CODE_START - 1);
        }
        self.predicates.insert(id.to_string(), code);
        self.inverse_predicates.push(id.to_string());
        Ok(code)
    }

    fn token_code(&mut self, token: Token) -> Result<Code> {
        match token {
            Token::Entity(id) => Ok(self.entity_code(&id)),
            Token::Predicate(id) => self.predicate_code(&id),
            Token::Literal(value) => {
                if let Some(&magnitude) = self.literals.get(&value) {
                    return Ok(-magnitude);
                }
                let magnitude = self.inverse_literals.len() as i64;
                self.literals.insert(value.clone(), magnitude);
                self.inverse_literals.push(value);
                Ok(-magnitude)
            }
            Token::TooLong => bail!("over-long literal reached token_code"),
        }
    }

    fn write_dictionaries(&self) -> Result<()> {
        let highest_id = ENTITY_CODE_START as usize + self.inverse_entities.len();

        let metadata: FxHashMap<String, ItemMetadata> = match &self.metadata_path {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("failed to open metadata {}", path.display()))?;
                serde_json::from_reader(BufReader::new(file))
                    .with_context(|| format!("failed to parse metadata {}", path.display()))?
            }
            None => FxHashMap::default(),
        };

        let mut labels: Vec<Vec<String>> = vec![Vec::new(); highest_id];
        let mut aliases: Vec<Vec<String>> = vec![Vec::new(); highest_id];
        let mut descriptions: Vec<String> = vec![String::new(); highest_id];
        for (id, &code) in self.entities.iter().chain(self.predicates.iter()) {
            if let Some(meta) = metadata.get(id) {
                let slot = code as usize;
                labels[slot] = meta.labels.clone();
                aliases[slot] = meta.aliases.clone();
                descriptions[slot] = meta.description.clone();
            }
        }

        std::fs::write(
            self.out_dir.join("HIGHEST_ID.txt"),
            format!("{highest_id}\n"),
        )?;
        self.write_json("entity_nodes.json", &self.entities)?;
        self.write_json("pred_nodes.json", &self.predicates)?;
        self.write_json("literals.json", &self.literals)?;
        self.write_json("inverse_entity_nodes.json", &self.inverse_entities)?;
        self.write_json("inverse_pred_nodes.json", &self.inverse_predicates)?;
        self.write_json("inverse_literals.json", &self.inverse_literals)?;
        self.write_json("labels.json", &labels)?;
        self.write_json("aliases.json", &aliases)?;
        self.write_json("descriptions.json", &descriptions)?;
        Ok(())
    }

    fn write_json<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.out_dir.join(name);
        let file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), value)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

/// Classify a dump token. `Q…`/`P…` ids lose statement suffixes (`P21-1`
/// encodes as `P21`); everything else is a literal.
fn normalize(token: &str) -> Token {
    let token = token.trim();
    if token.starts_with('Q') || token.starts_with('P') {
        let base = token.split('-').next().unwrap_or(token);
        if ENTITY_PATTERN.is_match(base) {
            return Token::Entity(base.to_string());
        }
        if PREDICATE_PATTERN.is_match(base) {
            return Token::Predicate(base.to_string());
        }
    }
    if token.chars().count() >= MAX_LITERAL_LEN {
        return Token::TooLong;
    }
    Token::Literal(token.to_string())
}
