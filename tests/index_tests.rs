mod common;

use common::{football_index, load_index};
use kbcontext::kb::ConnectionPath;

#[test]
fn display_label_skips_bare_ids() {
    let (_dir, index) = football_index();
    // the first stored label is the id itself and must be skipped
    assert_eq!(
        index.label("Q47774"),
        "France national association football team"
    );
    assert_eq!(
        index.labels_of("Q47774"),
        vec!["Q47774", "France national association football team"]
    );
}

#[test]
fn unknown_items_label_as_themselves() {
    let (_dir, index) = football_index();
    assert_eq!(index.label("Q999999"), "Q999999");
    assert_eq!(index.labels_of("not-an-id"), vec!["not-an-id"]);
}

#[test]
fn timestamp_literals_render_as_dates() {
    let (_dir, index) = football_index();
    assert_eq!(
        index.labels_of("\"2018-07-15T00:00:00Z\""),
        vec!["15 July 2018"]
    );
}

#[test]
fn aliases_and_description() {
    let (_dir, index) = football_index();
    assert_eq!(index.aliases_of("Q47774"), vec!["Les Bleus", "France"]);
    assert_eq!(
        index.description("Q47774"),
        "men's national association football team representing France"
    );
    assert_eq!(index.description("Q999999"), "None");
}

#[test]
fn types_follow_instance_of() {
    let (_dir, index) = football_index();
    let types = index.types("Q47774");
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].id, "Q6979593");
    assert_eq!(types[0].label, "national association football team");

    let most_frequent = index.most_frequent_type("Q47774").unwrap();
    assert_eq!(most_frequent.id, "Q6979593");
}

#[test]
fn frequency_counts_subject_and_object_roles() {
    let (_dir, index) = football_index();
    // subject of P17 and P31 facts, object of the winner fact
    assert_eq!(index.frequency("Q47774"), (2, 1));
    // predicates count on the object side
    assert_eq!(index.frequency("P17"), (0, 2));
    assert_eq!(index.frequency("Q999999"), (0, 0));
}

#[test]
fn fact_ids_round_trip_through_the_codes() {
    let (_dir, index) = football_index();
    let facts = index.neighborhood("Q47774", 0, false, false);
    let ids: Vec<Vec<&str>> = facts
        .iter()
        .map(|fact| fact.iter().map(|entry| entry.id.as_str()).collect())
        .collect();
    assert!(ids.contains(&vec!["Q47774", "P17", "Q142"]));
    assert!(ids.contains(&vec![
        "Q170645",
        "P1346",
        "Q47774",
        "P585",
        "\"2018-07-15T00:00:00Z\""
    ]));
}

#[test]
fn known_items_have_facts() {
    let (_dir, index) = football_index();
    assert!(index.is_known("Q47774"));
    assert!(index.is_known("P17"));
    assert!(!index.is_known("Q999999"));
    assert!(!index.is_known("garbage ~~~"));
}

#[test]
fn connectivity_is_symmetric() {
    let (_dir, index) = football_index();
    assert_eq!(index.connectivity("Q47774", "Q142"), 1.0);
    assert_eq!(index.connectivity("Q142", "Q47774"), 1.0);
    // France team and Paris only share the neighbor France
    assert_eq!(index.connectivity("Q47774", "Q90"), 0.5);
    assert_eq!(index.connectivity("Q90", "Q47774"), 0.5);
    // nothing in common
    assert_eq!(index.connectivity("Q224", "Q90"), 0.0);
    assert_eq!(index.connectivity("Q47774", "Q999999"), 0.0);
}

#[test]
fn self_connectivity_requires_a_repeated_occurrence() {
    let (_dir, index) = football_index();
    // no fact contains Q47774 twice
    assert_eq!(index.connectivity("Q47774", "Q47774"), 0.0);
}

#[test]
fn one_hop_paths_contain_both_items() {
    let (_dir, index) = football_index();
    let paths = index.connect("Q47774", "Q142", None);
    assert!(!paths.is_empty());
    for path in &paths {
        let ConnectionPath::Direct(fact) = path else {
            panic!("expected direct paths for 1-hop items");
        };
        assert!(fact.iter().any(|entry| entry.id == "Q47774"));
        assert!(fact.iter().any(|entry| entry.id == "Q142"));
    }
}

#[test]
fn two_hop_paths_go_through_the_shared_neighbor() {
    let (_dir, index) = football_index();
    let paths = index.connect("Q47774", "Q90", None);
    assert_eq!(paths.len(), 1);
    let ConnectionPath::TwoHop(first, second) = &paths[0] else {
        panic!("expected a 2-hop path");
    };
    // both legs pass through France
    assert!(first
        .iter()
        .all(|fact| fact.iter().any(|entry| entry.id == "Q142")));
    assert!(second
        .iter()
        .all(|fact| fact.iter().any(|entry| entry.id == "Q142")));
}

#[test]
fn connect_honours_explicit_hop() {
    let (_dir, index) = football_index();
    // forcing the wrong hop finds nothing, it never invents paths
    assert!(index.connect("Q47774", "Q90", Some(1.0)).is_empty());
    assert!(index.connect("Q224", "Q90", None).is_empty());
}

#[test]
fn neighborhood_returns_all_roles() {
    let (_dir, index) = football_index();
    let facts = index.neighborhood("Q47774", 1000, false, false);
    assert_eq!(facts.len(), 3);
    // the qualifier fact keeps its full length
    assert!(facts.iter().any(|fact| fact.len() == 5));
}

#[test]
fn neighborhood_prunes_hub_objects() {
    let (_dir, index) = football_index();
    // France is the object of two facts; with p = 1 only its subject facts
    // survive
    let facts = index.neighborhood("Q142", 1, false, false);
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0][0].id, "Q142");
    // p = 0 disables pruning
    let unpruned = index.neighborhood("Q142", 0, false, false);
    assert_eq!(unpruned.len(), 3);
}

#[test]
fn neighborhood_labels_are_opt_in() {
    let (_dir, index) = football_index();
    let plain = index.neighborhood("Q90", 1000, false, false);
    assert!(plain[0][0].label.is_none());
    let labeled = index.neighborhood("Q90", 1000, true, false);
    assert_eq!(labeled[0][0].label.as_deref(), Some("France"));
    // the team's instance-of fact gives its subject a type
    let typed = index.neighborhood("Q47774", 1000, true, true);
    assert!(typed
        .iter()
        .flatten()
        .any(|entry| entry.item_type.is_some()));
}

#[test]
fn two_hop_neighborhood_drops_paths_back_through_the_start() {
    let (_dir, index) = football_index();
    let facts = index.neighborhood_two_hop("Q90", 1000, false, false);
    // 1-hop: the capital fact; 2-hop through France: country facts of the
    // team and the final; the capital fact itself is not re-added
    assert_eq!(facts.len(), 3);
    assert!(facts
        .iter()
        .skip(1)
        .all(|fact| fact.iter().all(|entry| entry.id != "Q90")));
}

#[test]
fn search_space_is_the_union_of_neighborhoods() {
    let (_dir, index) = football_index();
    let tuple = vec!["Q47774".to_string(), "Q90".to_string()];
    let space = index.extract_search_space(&tuple, 1000, false, false);
    let expected = index.neighborhood("Q47774", 1000, false, false).len()
        + index.neighborhood("Q90", 1000, false, false).len();
    assert_eq!(space.len(), expected);
    // unknown tuple items contribute nothing
    let with_unknown = index.extract_search_space(
        &["Q47774".to_string(), "Q999999".to_string()],
        1000,
        false,
        false,
    );
    assert_eq!(
        with_unknown.len(),
        index.neighborhood("Q47774", 1000, false, false).len()
    );
}

#[test]
fn connected_search_space_keeps_multi_tuple_facts() {
    let (_dir, index) = football_index();
    let tuple = vec!["Q170645".to_string(), "Q47774".to_string()];
    let connected = index.extract_connected_search_space(&tuple, 1000, false, false);
    assert!(!connected.is_empty());
    for fact in &connected {
        let touched = fact
            .iter()
            .filter(|entry| entry.id == "Q170645" || entry.id == "Q47774")
            .count();
        assert!(touched > 1);
    }
}

#[test]
fn distance_walks_past_two_hops() {
    let (_dir, index) = football_index();
    assert_eq!(index.distance("Q47774", "Q47774"), Some(0));
    assert_eq!(index.distance("Q47774", "Q142"), Some(1));
    assert_eq!(index.distance("Q47774", "Q90"), Some(2));
    assert_eq!(index.distance("Q47774", "Q999999"), None);
}

#[test]
fn loader_keeps_the_trailing_fact() {
    // the last fact has no following entity to mark its boundary
    let dir = tempfile::tempdir().unwrap();
    common::build_index_dir(dir.path(), "Q1000,P1,Q1001\nQ1002,P1,Q1003\n", None);
    let index = load_index(&dir);
    assert_eq!(index.fact_count(), 2);
    assert!(index.is_known("Q1002"));
    assert_eq!(index.connectivity("Q1002", "Q1003"), 1.0);
}

#[test]
fn qualifier_objects_join_the_neighbor_sets() {
    let dir = tempfile::tempdir().unwrap();
    common::build_index_dir(dir.path(), "Q1,P1,Q2,P2,Q3\nQ3,P1,Q4\n", None);
    let index = load_index(&dir);
    // Q1 and Q3 co-occur in the qualifier fact
    assert_eq!(index.connectivity("Q1", "Q3"), 1.0);
    // Q1 reaches Q4 only through Q3
    assert_eq!(index.connectivity("Q1", "Q4"), 0.5);
}
