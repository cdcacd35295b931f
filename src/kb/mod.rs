pub mod builder;
pub mod index;
pub mod load;

pub use builder::IndexBuilder;
pub use index::KbIndex;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Internal item code. Predicates occupy `1..10000`, entities `>= 10000`,
/// literals are negative. Code 0 is never assigned.
pub type Code = i64;

/// First code assigned to entities; everything below (positive) is a predicate.
pub const ENTITY_CODE_START: Code = 10_000;

/// Items whose total fact count exceeds this are skipped when enumerating
/// 2-hop paths, to avoid walking through "human"-sized hubs.
pub const HUB_FREQUENCY_THRESHOLD: usize = 100_000;

/// Literal strings of this length or more are not indexed.
pub const MAX_LITERAL_LEN: usize = 40;

lazy_static! {
    pub(crate) static ref ENTITY_PATTERN: Regex = Regex::new("^Q[0-9]+$").unwrap();
    pub(crate) static ref PREDICATE_PATTERN: Regex = Regex::new("^P[0-9]+$").unwrap();
    pub(crate) static ref TIMESTAMP_PATTERN: Regex =
        Regex::new("^\"[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]T00:00:00Z\"").unwrap();
}

pub fn code_is_entity(code: Code) -> bool {
    code >= ENTITY_CODE_START
}

pub fn code_is_predicate(code: Code) -> bool {
    code > 0 && code < ENTITY_CODE_START
}

pub fn code_is_literal(code: Code) -> bool {
    code < 0
}

/// Whether the string has the shape of an entity id (`Q…`).
pub fn is_entity_id(s: &str) -> bool {
    ENTITY_PATTERN.is_match(s)
}

/// Whether the string has the shape of a predicate id (`P…`).
pub fn is_predicate_id(s: &str) -> bool {
    PREDICATE_PATTERN.is_match(s)
}

/// Whether the string is a quoted timestamp literal.
pub fn is_timestamp_literal(s: &str) -> bool {
    TIMESTAMP_PATTERN.is_match(s.trim())
}

/// A type assigned to an item, e.g. `{Q6979593, "national association
/// football team"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRecord {
    pub id: String,
    pub label: String,
}

/// One element of a decoded fact. `label` and `item_type` are filled only
/// when the caller opted into decoration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub item_type: Option<TypeRecord>,
}

impl FactEntry {
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            item_type: None,
        }
    }
}

/// A decoded fact: `[subject, predicate, object, (qualifier-predicate,
/// qualifier-object)*]`, always of odd length >= 3.
pub type Fact = Vec<FactEntry>;

/// A connection between two items: either a single fact containing both, or
/// (through a middle item) the facts to and from that middle item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConnectionPath {
    Direct(Fact),
    TwoHop(Vec<Fact>, Vec<Fact>),
}
