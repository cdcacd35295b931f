use chrono::{Datelike, NaiveDate};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Mutex;

use super::{
    code_is_entity, code_is_literal, code_is_predicate, is_entity_id, is_timestamp_literal,
    Code, ConnectionPath, Fact, FactEntry, TypeRecord, ENTITY_CODE_START, ENTITY_PATTERN,
    HUB_FREQUENCY_THRESHOLD, MAX_LITERAL_LEN, PREDICATE_PATTERN,
};

/// Positions of the facts an item occurs in, split by role. Indices point
/// into the fact arena.
#[derive(Debug, Clone, Default)]
pub(crate) struct FactRefs {
    /// Facts with the item as subject.
    pub subject: Vec<u32>,
    /// Facts with the item as object or qualifier-object (predicates land
    /// here as well).
    pub object: Vec<u32>,
}

/// In-memory KB index over integer-coded items.
///
/// Entities, predicates and literals are mapped to disjoint integer ranges;
/// per-item records (labels, facts, neighbor sets) live in dense arrays
/// indexed by code. The index is built once (offline) and is read-only at
/// query time: no query-path method panics on unknown or malformed input.
pub struct KbIndex {
    pub(crate) entities: FxHashMap<String, Code>,
    pub(crate) predicates: FxHashMap<String, Code>,
    /// Literal string -> code magnitude (the code itself is the negation).
    pub(crate) literals: FxHashMap<String, i64>,
    pub(crate) inverse_entities: Vec<String>,
    /// Row 0 is unused; predicate codes start at 1.
    pub(crate) inverse_predicates: Vec<String>,
    /// Row 0 is unused; literal magnitudes start at 1.
    pub(crate) inverse_literals: Vec<String>,
    /// Indexed by non-negative code; length `highest_id`.
    pub(crate) labels: Vec<Vec<String>>,
    pub(crate) aliases: Vec<Vec<String>>,
    pub(crate) descriptions: Vec<String>,
    /// Fact arena; every fact sequence is owned exactly once.
    pub(crate) facts: Vec<Vec<Code>>,
    pub(crate) fact_refs: Vec<Option<FactRefs>>,
    pub(crate) neighbors: Vec<Option<FxHashSet<Code>>>,
    pub(crate) highest_id: usize,
    /// Optional memo for connectivity checks, keyed by ordered code pair.
    pub(crate) connectivity_memo: Option<Mutex<FxHashMap<(Code, Code), f64>>>,
}

impl std::fmt::Debug for KbIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KbIndex")
            .field("entities", &self.entities.len())
            .field("predicates", &self.predicates.len())
            .field("literals", &self.literals.len())
            .field("facts", &self.facts.len())
            .field("highest_id", &self.highest_id)
            .finish_non_exhaustive()
    }
}

impl KbIndex {
    /// Enable a process-lifetime memo for `connectivity` results.
    pub fn with_connectivity_memo(mut self) -> Self {
        self.connectivity_memo = Some(Mutex::new(FxHashMap::default()));
        self
    }

    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// External ids of all entities, in code order.
    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.inverse_entities.iter().map(|s| s.as_str())
    }

    /// External ids of all predicates, in code order.
    pub fn predicate_ids(&self) -> impl Iterator<Item = &str> {
        self.inverse_predicates
            .iter()
            .skip(1)
            .map(|s| s.as_str())
    }

    // ---- encoding -------------------------------------------------------

    pub(crate) fn encode(&self, item: &str) -> Option<Code> {
        if item.starts_with('Q') && ENTITY_PATTERN.is_match(item) {
            self.entities.get(item).copied()
        } else if item.starts_with('P') && PREDICATE_PATTERN.is_match(item) {
            self.predicates.get(item).copied()
        } else if item.chars().count() < MAX_LITERAL_LEN {
            self.literals.get(item).map(|magnitude| -magnitude)
        } else {
            None
        }
    }

    pub(crate) fn decode(&self, code: Code) -> Option<&str> {
        if code_is_entity(code) {
            self.inverse_entities
                .get((code - ENTITY_CODE_START) as usize)
                .map(|s| s.as_str())
        } else if code_is_predicate(code) {
            self.inverse_predicates.get(code as usize).map(|s| s.as_str())
        } else if code_is_literal(code) {
            self.inverse_literals.get((-code) as usize).map(|s| s.as_str())
        } else {
            None
        }
    }

    fn refs(&self, code: Code) -> Option<&FactRefs> {
        if code < 0 {
            return None;
        }
        self.fact_refs.get(code as usize)?.as_ref()
    }

    fn neighbor_set(&self, code: Code) -> Option<&FxHashSet<Code>> {
        if code < 0 {
            return None;
        }
        self.neighbors.get(code as usize)?.as_ref()
    }

    // ---- labels, aliases, descriptions, types ---------------------------

    /// All labels stored for the item. Literals pass through unchanged,
    /// except for timestamps which render as human-readable dates. Unknown
    /// items come back as themselves.
    pub fn labels_of(&self, item: &str) -> Vec<String> {
        let Some(code) = self.encode(item) else {
            return vec![item.to_string()];
        };
        if code_is_literal(code) {
            if is_timestamp_literal(item) {
                if let Some(date) = format_timestamp(item) {
                    return vec![date];
                }
            }
            return vec![item.to_string()];
        }
        match self.labels.get(code as usize) {
            Some(labels) if !labels.is_empty() => labels.clone(),
            _ => vec![item.to_string()],
        }
    }

    /// The display label: the first stored label that is not itself a bare
    /// id, falling back to the first label, falling back to the id.
    pub fn label(&self, item: &str) -> String {
        let labels = self.labels_of(item);
        labels
            .iter()
            .find(|l| !ENTITY_PATTERN.is_match(l) && !PREDICATE_PATTERN.is_match(l))
            .cloned()
            .unwrap_or_else(|| labels[0].clone())
    }

    pub fn aliases_of(&self, item: &str) -> Vec<String> {
        let aliases = self
            .encode(item)
            .filter(|code| !code_is_literal(*code))
            .and_then(|code| self.aliases.get(code as usize).cloned())
            .unwrap_or_default();
        if aliases.is_empty() {
            vec![item.to_string()]
        } else {
            aliases
        }
    }

    pub fn description(&self, item: &str) -> String {
        self.encode(item)
            .filter(|code| !code_is_literal(*code))
            .and_then(|code| self.descriptions.get(code as usize).cloned())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "None".to_string())
    }

    /// Types of the item: objects of its "instance of" (P31) and
    /// "occupation" (P106) facts, with labels.
    pub fn types(&self, item: &str) -> Vec<TypeRecord> {
        let Some(code) = self.encode(item) else {
            return Vec::new();
        };
        let Some(refs) = self.refs(code) else {
            return Vec::new();
        };
        let instance_of = self.predicates.get("P31").copied();
        let occupation = self.predicates.get("P106").copied();
        let mut types = Vec::new();
        for &fact_index in &refs.subject {
            let fact = &self.facts[fact_index as usize];
            let predicate = fact[1];
            if Some(predicate) == instance_of || Some(predicate) == occupation {
                if let Some(object) = self.decode(fact[2]) {
                    types.push(TypeRecord {
                        id: object.to_string(),
                        label: self.label(object),
                    });
                }
            }
        }
        types
    }

    /// The type with the highest subject+object frequency, if any type has a
    /// non-zero one.
    pub fn most_frequent_type(&self, item: &str) -> Option<TypeRecord> {
        let mut best: Option<TypeRecord> = None;
        let mut best_frequency = 0usize;
        for type_record in self.types(item) {
            let (subj, obj) = self.frequency(&type_record.id);
            if subj + obj > best_frequency {
                best_frequency = subj + obj;
                best = Some(type_record);
            }
        }
        best
    }

    /// (facts as subject, facts as object/qualifier-object).
    pub fn frequency(&self, item: &str) -> (usize, usize) {
        self.encode(item)
            .and_then(|code| self.refs(code))
            .map(|refs| (refs.subject.len(), refs.object.len()))
            .unwrap_or((0, 0))
    }

    fn code_frequency_sum(&self, code: Code) -> usize {
        self.refs(code)
            .map(|refs| refs.subject.len() + refs.object.len())
            .unwrap_or(0)
    }

    /// Whether the item maps to a code with at least one indexed fact.
    pub fn is_known(&self, item: &str) -> bool {
        self.encode(item)
            .map(|code| self.refs(code).is_some())
            .unwrap_or(false)
    }

    // ---- connectivity and paths -----------------------------------------

    /// Graph distance capped at 2 hops: 1.0 if the items share a fact, 0.5
    /// if they share a neighbor, 0.0 otherwise. Symmetric.
    pub fn connectivity(&self, item1: &str, item2: &str) -> f64 {
        let (Some(code1), Some(code2)) = (self.encode(item1), self.encode(item2)) else {
            return 0.0;
        };
        if let Some(memo) = &self.connectivity_memo {
            let key = ordered_pair(code1, code2);
            if let Some(&cached) = memo.lock().unwrap().get(&key) {
                return cached;
            }
            let score = self.connectivity_codes(code1, code2);
            memo.lock().unwrap().insert(key, score);
            return score;
        }
        self.connectivity_codes(code1, code2)
    }

    fn connectivity_codes(&self, code1: Code, code2: Code) -> f64 {
        let (Some(neighbors1), Some(neighbors2)) =
            (self.neighbor_set(code1), self.neighbor_set(code2))
        else {
            return 0.0;
        };
        if code1 == code2 {
            // adjacent to itself only through a fact holding it twice
            return if neighbors1.contains(&code1) { 1.0 } else { 0.0 };
        }
        if neighbors1.contains(&code2) || neighbors2.contains(&code1) {
            return 1.0;
        }
        // iterate the smaller set, probe the larger
        let (small, large) = if neighbors1.len() <= neighbors2.len() {
            (neighbors1, neighbors2)
        } else {
            (neighbors2, neighbors1)
        };
        if small.iter().any(|code| large.contains(code)) {
            0.5
        } else {
            0.0
        }
    }

    /// All 1-hop or 2-hop paths between the items. `hop` overrides the
    /// connectivity check when the caller already knows the distance.
    pub fn connect(&self, item1: &str, item2: &str, hop: Option<f64>) -> Vec<ConnectionPath> {
        let (Some(code1), Some(code2)) = (self.encode(item1), self.encode(item2)) else {
            return Vec::new();
        };
        let hop = hop.unwrap_or_else(|| self.connectivity(item1, item2));
        if hop == 1.0 {
            self.connect_one_hop(code1, code2)
                .into_iter()
                .map(ConnectionPath::Direct)
                .collect()
        } else if hop == 0.5 {
            self.connect_two_hop(code1, code2)
        } else {
            Vec::new()
        }
    }

    /// Decoded facts containing both items, found by scanning the smaller
    /// side's fact list.
    fn connect_one_hop(&self, code1: Code, code2: Code) -> Vec<Fact> {
        let len1 = self.code_frequency_sum(code1);
        let len2 = self.code_frequency_sum(code2);
        let (scan, needle) = if len1 > len2 {
            (code2, code1)
        } else {
            (code1, code2)
        };
        let Some(refs) = self.refs(scan) else {
            return Vec::new();
        };
        let mut connections = Vec::new();
        for &fact_index in refs.subject.iter().chain(refs.object.iter()) {
            let fact = &self.facts[fact_index as usize];
            if fact.contains(&needle) {
                connections.push(self.decode_fact(fact));
            }
        }
        connections
    }

    /// For every shared neighbor below the hub threshold, the pair of 1-hop
    /// connections through it. Middle items are visited in code order so
    /// path enumeration is deterministic.
    fn connect_two_hop(&self, code1: Code, code2: Code) -> Vec<ConnectionPath> {
        let (Some(neighbors1), Some(neighbors2)) =
            (self.neighbor_set(code1), self.neighbor_set(code2))
        else {
            return Vec::new();
        };
        let (small, large) = if neighbors1.len() <= neighbors2.len() {
            (neighbors1, neighbors2)
        } else {
            (neighbors2, neighbors1)
        };
        let mut middle: Vec<Code> = small.iter().filter(|c| large.contains(c)).copied().collect();
        middle.sort_unstable();

        let mut connections = Vec::new();
        for code in middle {
            if self.code_frequency_sum(code) > HUB_FREQUENCY_THRESHOLD {
                continue;
            }
            let first = self.connect_one_hop(code1, code);
            let second = self.connect_one_hop(code, code2);
            connections.push(ConnectionPath::TwoHop(first, second));
        }
        connections
    }

    /// Exact graph distance, breadth-first over neighbor sets. Slow path:
    /// not bounded by the 2-hop fast check. `None` when the items are
    /// disconnected or unknown.
    pub fn distance(&self, item1: &str, item2: &str) -> Option<usize> {
        let (Some(code1), Some(code2)) = (self.encode(item1), self.encode(item2)) else {
            return None;
        };
        if code1 == code2 {
            return Some(0);
        }
        let mut visited: FxHashSet<Code> = FxHashSet::default();
        visited.insert(code1);
        let mut frontier = vec![code1];
        let mut depth = 0usize;
        while !frontier.is_empty() {
            depth += 1;
            let mut next = Vec::new();
            for code in frontier {
                let Some(neighbors) = self.neighbor_set(code) else {
                    continue;
                };
                if neighbors.contains(&code2) {
                    return Some(depth);
                }
                for &neighbor in neighbors {
                    if visited.insert(neighbor) {
                        next.push(neighbor);
                    }
                }
            }
            frontier = next;
        }
        None
    }

    // ---- neighborhoods and search space ---------------------------------

    /// 1-hop neighborhood. When the item occurs as object in more than `p`
    /// facts, only its subject facts are returned (hub pruning); `p = 0`
    /// disables pruning.
    pub fn neighborhood(
        &self,
        item: &str,
        p: usize,
        include_labels: bool,
        include_type: bool,
    ) -> Vec<Fact> {
        let Some(code) = self.encode(item) else {
            return Vec::new();
        };
        let (mut facts, _pruned) = self.neighborhood_codes(code, p);
        self.decorate(&mut facts, include_labels, include_type);
        facts
    }

    /// 2-hop neighborhood: the 1-hop facts plus, for every entity reached,
    /// its 1-hop facts minus those leading back through the starting item.
    pub fn neighborhood_two_hop(
        &self,
        item: &str,
        p: usize,
        include_labels: bool,
        include_type: bool,
    ) -> Vec<Fact> {
        let one_hop = self.neighborhood(item, p, include_labels, include_type);
        let mut next_hop_items: Vec<String> = Vec::new();
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for fact in &one_hop {
            for entry in fact {
                if entry.id != item && is_entity_id(&entry.id) && seen.insert(entry.id.as_str()) {
                    next_hop_items.push(entry.id.clone());
                }
            }
        }
        let mut two_hop = one_hop.clone();
        for next_item in next_hop_items {
            let facts = self.neighborhood(&next_item, p, include_labels, include_type);
            for fact in facts {
                if fact.iter().any(|entry| entry.id == item) {
                    continue;
                }
                two_hop.push(fact);
            }
        }
        two_hop
    }

    fn neighborhood_codes(&self, code: Code, p: usize) -> (Vec<Fact>, bool) {
        let Some(refs) = self.refs(code) else {
            return (Vec::new(), false);
        };
        let mut pruned = false;
        let indices: Vec<u32> = if p > 0 && refs.object.len() > p {
            pruned = true;
            refs.subject.clone()
        } else {
            refs.subject.iter().chain(refs.object.iter()).copied().collect()
        };
        let facts = indices
            .iter()
            .map(|&i| self.decode_fact(&self.facts[i as usize]))
            .collect();
        (facts, pruned)
    }

    /// Concatenated 1-hop neighborhoods of all tuple items.
    pub fn extract_search_space(
        &self,
        kb_item_tuple: &[String],
        p: usize,
        include_labels: bool,
        include_type: bool,
    ) -> Vec<Fact> {
        let mut search_space = Vec::new();
        for item in kb_item_tuple {
            let Some(code) = self.encode(item) else {
                continue;
            };
            let (facts, _pruned) = self.neighborhood_codes(code, p);
            search_space.extend(facts);
        }
        self.decorate(&mut search_space, include_labels, include_type);
        search_space
    }

    /// Like `extract_search_space`, keeping only facts that touch at least
    /// two distinct tuple items.
    pub fn extract_connected_search_space(
        &self,
        kb_item_tuple: &[String],
        p: usize,
        include_labels: bool,
        include_type: bool,
    ) -> Vec<Fact> {
        let tuple_ids: FxHashSet<&str> = kb_item_tuple.iter().map(|s| s.as_str()).collect();
        let mut connected: Vec<Fact> = Vec::new();
        for item in kb_item_tuple {
            let Some(code) = self.encode(item) else {
                continue;
            };
            let (facts, _pruned) = self.neighborhood_codes(code, p);
            for fact in facts {
                let touched: FxHashSet<&str> = fact
                    .iter()
                    .map(|entry| entry.id.as_str())
                    .filter(|id| tuple_ids.contains(id))
                    .collect();
                if touched.len() > 1 {
                    connected.push(fact);
                }
            }
        }
        self.decorate(&mut connected, include_labels, include_type);
        connected
    }

    fn decorate(&self, facts: &mut [Fact], include_labels: bool, include_type: bool) {
        if !include_labels {
            return;
        }
        for fact in facts.iter_mut() {
            for entry in fact.iter_mut() {
                entry.label = Some(self.label(&entry.id));
                if include_type {
                    entry.item_type = self.most_frequent_type(&entry.id);
                }
            }
        }
    }

    fn decode_fact(&self, fact: &[Code]) -> Fact {
        fact.iter()
            .map(|&code| FactEntry::bare(self.decode(code).unwrap_or("None")))
            .collect()
    }
}

fn ordered_pair(a: Code, b: Code) -> (Code, Code) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Render a quoted timestamp literal as a date ("15 July 2018"); the 1st of
/// January collapses to the bare year.
fn format_timestamp(timestamp: &str) -> Option<String> {
    let inner = timestamp.trim().trim_matches('"');
    let date_part = inner.split('T').next()?;
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    if date.month() == 1 && date.day() == 1 {
        return Some(date.year().to_string());
    }
    Some(format!("{} {} {}", date.day(), month_name(date.month()), date.year()))
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_renders_as_date() {
        assert_eq!(
            format_timestamp("\"2018-07-15T00:00:00Z\"").as_deref(),
            Some("15 July 2018")
        );
    }

    #[test]
    fn first_of_january_collapses_to_year() {
        assert_eq!(
            format_timestamp("\"1998-01-01T00:00:00Z\"").as_deref(),
            Some("1998")
        );
    }

    #[test]
    fn day_has_no_leading_zero() {
        assert_eq!(
            format_timestamp("\"2002-03-04T00:00:00Z\"").as_deref(),
            Some("4 March 2002")
        );
    }
}
