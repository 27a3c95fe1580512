use crate::wire::ProcessInfo;
use crate::ProcessSnapshot;

fn entry(pid: u32, name: &str) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        command: format!("{name} --session"),
        uid: Some(1000),
    }
}

/// **VALUE**: Verifies that pid lookup finds the matching entry regardless of order.
///
/// **WHY THIS MATTERS**: The ancestry walk probes the snapshot once per level;
/// a lookup that depended on insertion order would make resolution results
/// depend on enumeration order, which is explicitly unspecified.
///
/// **BUG THIS CATCHES**: Would catch a lookup rewritten to binary search over
/// an unsorted vector, or one comparing the wrong field.
#[test]
fn given_unordered_entries_when_find_called_then_returns_matching_entry() {
    // GIVEN: A snapshot with entries in no particular order
    let snapshot: ProcessSnapshot = vec![entry(42, "term"), entry(7, "editor"), entry(19, "shell")]
        .into_iter()
        .collect();

    // WHEN: Looking up a pid from the middle
    let found = snapshot.find(7);

    // THEN: The matching entry is returned
    assert_eq!(found.map(|p| p.name.as_str()), Some("editor"));
}

/// **VALUE**: Verifies that lookup of an unknown pid returns None.
///
/// **WHY THIS MATTERS**: "Not in the snapshot" is the signal that drives the
/// walk one level up the ancestry chain; a false positive here would resolve
/// arbitrary pids to the wrong owner.
///
/// **BUG THIS CATCHES**: Would catch a lookup falling back to a default entry
/// instead of None.
#[test]
fn given_unknown_pid_when_find_called_then_returns_none() {
    // GIVEN: A snapshot without pid 99
    let snapshot: ProcessSnapshot = vec![entry(42, "term")].into_iter().collect();

    // WHEN: Looking up the unknown pid
    // THEN: Nothing is found
    assert!(snapshot.find(99).is_none());
    assert_eq!(snapshot.len(), 1);
    assert!(!snapshot.is_empty());
}
