// Unit tests for the ancestry resolver against synthetic process trees
// The live /proc implementation gets one smoke test on Linux.

use crate::resolver::{parse_parent_pid, resolve_owner, ParentLinks};
#[cfg(target_os = "linux")]
use crate::resolver::ProcfsParentLinks;

use models::wire::ProcessInfo;
use models::ProcessSnapshot;

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::io;

/// Synthetic parent links with injectable "process died" pids and a read
/// counter for termination checks.
struct FakeParentLinks {
    parents: HashMap<u32, u32>,
    dead: HashSet<u32>,
    reads: Cell<usize>,
}

impl FakeParentLinks {
    fn new(chain: &[(u32, u32)]) -> Self {
        Self {
            parents: chain.iter().copied().collect(),
            dead: HashSet::new(),
            reads: Cell::new(0),
        }
    }

    fn with_dead(mut self, pid: u32) -> Self {
        self.dead.insert(pid);
        self
    }
}

impl ParentLinks for FakeParentLinks {
    fn parent_of(&self, pid: u32) -> io::Result<Option<u32>> {
        self.reads.set(self.reads.get() + 1);
        if self.dead.contains(&pid) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "process exited"));
        }
        Ok(self.parents.get(&pid).copied())
    }
}

fn info(pid: u32, name: &str) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        command: format!("{name} --daemon"),
        uid: Some(1000),
    }
}

/// **VALUE**: Verifies that the walk finds a known ancestor several levels up.
///
/// **WHY THIS MATTERS**: This is the whole point of the resolver - a helper
/// forked through several intermediate shells must still map back to the
/// session that owns it.
///
/// **BUG THIS CATCHES**: Would catch a walk that only checks the starting pid,
/// or one following the wrong link direction.
#[test]
fn given_known_ancestor_when_resolving_then_returns_its_entry() {
    // GIVEN: Chain 10 -> 7 -> 5 -> 1 with pid 5 known
    let links = FakeParentLinks::new(&[(10, 7), (7, 5), (5, 1)]);
    let known: ProcessSnapshot = vec![info(5, "term")].into_iter().collect();

    // WHEN: Resolving the leaf pid
    let owner = resolve_owner(10, &known, &links);

    // THEN: The known ancestor's entry comes back
    assert_eq!(owner.map(|p| p.pid), Some(5));
}

/// **VALUE**: Verifies that a chain ending at the root without a match yields not-found.
///
/// **WHY THIS MATTERS**: Root pids are the sentinel stop condition; without
/// them the walk over a chain with no known entry would never end.
///
/// **BUG THIS CATCHES**: Would catch the walk probing pid 1/0 or looping at
/// the root instead of terminating cleanly.
#[test]
fn given_no_known_ancestor_when_resolving_then_returns_none() {
    // GIVEN: Chain 2 -> 1 with nothing known
    let links = FakeParentLinks::new(&[(2, 1)]);
    let known = ProcessSnapshot::default();

    // WHEN: Resolving
    let owner = resolve_owner(2, &known, &links);

    // THEN: Not found, after exactly one parent read
    assert!(owner.is_none());
    assert_eq!(links.reads.get(), 1);
}

/// **VALUE**: Verifies that a pid dying mid-walk terminates the walk as not-found.
///
/// **WHY THIS MATTERS**: Live process state mutates under the walk; a pid that
/// exits between the snapshot probe and the parent read must degrade to
/// not-found, never to an error or a hang.
///
/// **BUG THIS CATCHES**: Would catch the read error being propagated to the
/// caller, and (via the read count) the walk not stopping at the failure.
#[test]
fn given_process_dies_at_depth_k_when_resolving_then_not_found_after_k_reads() {
    // GIVEN: Chain 10 -> 9 -> 8 -> 7 with pid 8 exiting mid-walk
    let links = FakeParentLinks::new(&[(10, 9), (9, 8), (8, 7)]).with_dead(8);
    let known: ProcessSnapshot = vec![info(3, "unrelated")].into_iter().collect();

    // WHEN: Resolving from the leaf
    let owner = resolve_owner(10, &known, &links);

    // THEN: Not found after exactly the reads for 10, 9 and the failing 8
    assert!(owner.is_none());
    assert_eq!(links.reads.get(), 3);
}

/// **VALUE**: Verifies that a pid present in the snapshot resolves without any parent read.
///
/// **WHY THIS MATTERS**: The common case is a known process asking about
/// itself; touching /proc for it would be wasted work and a needless race
/// window.
///
/// **BUG THIS CATCHES**: Would catch the walk reading the parent link before
/// probing the snapshot.
#[test]
fn given_pid_in_snapshot_when_resolving_then_no_parent_reads() {
    // GIVEN: The queried pid itself is known
    let links = FakeParentLinks::new(&[(42, 1)]);
    let known: ProcessSnapshot = vec![info(42, "shell")].into_iter().collect();

    // WHEN: Resolving
    let owner = resolve_owner(42, &known, &links);

    // THEN: Found with zero link reads
    assert_eq!(owner.map(|p| p.name), Some(String::from("shell")));
    assert_eq!(links.reads.get(), 0);
}

/// **VALUE**: Verifies that root and invalid pids resolve to not-found immediately.
///
/// **WHY THIS MATTERS**: Pids <= 1 are roots by contract; even a snapshot
/// entry for pid 1 must not be returned because the walk never inspects roots.
///
/// **BUG THIS CATCHES**: Would catch an off-by-one in the sentinel comparison
/// that lets the walk read the root's parent link.
#[test]
fn given_root_pid_when_resolving_then_returns_none_without_reads() {
    // GIVEN: Links that would answer if asked
    let links = FakeParentLinks::new(&[(1, 0)]);
    let known: ProcessSnapshot = vec![info(1, "init")].into_iter().collect();

    // WHEN/THEN: Roots are never resolved
    assert!(resolve_owner(1, &known, &links).is_none());
    assert!(resolve_owner(0, &known, &links).is_none());
    assert_eq!(links.reads.get(), 0);
}

/// **VALUE**: Verifies PPid extraction from a realistic status record.
///
/// **WHY THIS MATTERS**: The status record is a free-form key/value text
/// blob; the parser must find the PPid line among the others and survive a
/// record where it is missing or mangled.
///
/// **BUG THIS CATCHES**: Would catch a parser matching `TracerPid:` via a
/// substring check, or panicking on a record without the field.
#[test]
fn given_status_record_when_parsing_then_extracts_parent_pid() {
    // GIVEN: A realistic /proc status excerpt
    let status = "Name:\tbash\nUmask:\t0022\nState:\tS (sleeping)\nTgid:\t4321\nPid:\t4321\nPPid:\t1234\nTracerPid:\t0\n";

    // WHEN/THEN: The PPid value is extracted
    assert_eq!(parse_parent_pid(status), Some(1234));

    // AND: Records without a usable PPid yield None
    assert_eq!(parse_parent_pid("Name:\tbash\nPid:\t4321\n"), None);
    assert_eq!(parse_parent_pid("PPid:\tnot-a-number\n"), None);
    assert_eq!(parse_parent_pid(""), None);
}

/// **VALUE**: Smoke-tests the real /proc implementation against this process.
///
/// **WHY THIS MATTERS**: The synthetic tests prove the walk; this proves the
/// production link reader actually understands the kernel's status format.
///
/// **BUG THIS CATCHES**: Would catch a format drift between the parser and
/// real /proc records (wrong key, wrong separator handling).
#[cfg(target_os = "linux")]
#[test]
fn given_own_pid_when_reading_procfs_links_then_returns_parent() {
    // GIVEN: Our own pid, which certainly exists
    let links = ProcfsParentLinks;

    // WHEN: Reading the parent link
    let parent = links.parent_of(std::process::id());

    // THEN: A parent pid is found
    assert!(matches!(parent, Ok(Some(_))), "Own process must have a parent");
}

/// **VALUE**: Verifies the real link reader treats a nonexistent pid as an error.
///
/// **WHY THIS MATTERS**: "Process absent" must surface as Err so the walk
/// maps it to not-found; returning Ok(None) for missing AND for malformed
/// records is fine, but a panic here would crash the host's request handler.
///
/// **BUG THIS CATCHES**: Would catch an unwrap on the file read.
#[cfg(target_os = "linux")]
#[test]
fn given_nonexistent_pid_when_reading_procfs_links_then_returns_error() {
    // GIVEN: A pid that cannot exist
    let links = ProcfsParentLinks;

    // WHEN/THEN: The read fails without panicking
    assert!(links.parent_of(u32::MAX).is_err());
}
