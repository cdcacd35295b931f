mod common;

use common::{build_index_dir, load_index};
use kbcontext::kb::HUB_FREQUENCY_THRESHOLD;

/// Build a dump where Q5 is the object of enough facts to cross the hub
/// threshold, and the only link between Q7 and Q8.
fn hub_dump() -> String {
    let mut dump = String::with_capacity(24 * (HUB_FREQUENCY_THRESHOLD + 3));
    dump.push_str("Q7,P1,Q5\n");
    dump.push_str("Q8,P1,Q5\n");
    for i in 0..(HUB_FREQUENCY_THRESHOLD - 1) {
        dump.push_str(&format!("Q{},P1,Q5\n", 1_000_000 + i));
    }
    dump
}

#[test]
fn hub_neighbors_stay_connected_but_yield_no_paths() {
    let dir = tempfile::tempdir().unwrap();
    build_index_dir(dir.path(), &hub_dump(), None);
    let index = load_index(&dir);

    // Q5 is the object of HUB_FREQUENCY_THRESHOLD + 1 facts
    let (subject, object) = index.frequency("Q5");
    assert_eq!(subject, 0);
    assert!(object > HUB_FREQUENCY_THRESHOLD);

    // the 2-hop relation is still visible to the connectivity check
    assert_eq!(index.connectivity("Q7", "Q8"), 0.5);

    // but path enumeration skips the hub and returns nothing
    assert!(index.connect("Q7", "Q8", None).is_empty());
}
