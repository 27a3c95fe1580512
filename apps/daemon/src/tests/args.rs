// Unit tests for command-line argument parsing

use crate::args::parse_port_arg;

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// **VALUE**: Verifies that the --port flag value is extracted wherever it appears.
///
/// **WHY THIS MATTERS**: The client spawns the daemon with exactly this flag
/// shape; a parsing mismatch between the two sides means every spawned worker
/// silently ignores its assigned port.
///
/// **BUG THIS CATCHES**: Would catch the parser expecting `--port=N` while the
/// spawner passes `--port N`, or positional assumptions about argv.
#[test]
fn given_port_flag_when_parsing_then_returns_port() {
    // GIVEN: Argument lists with the flag in different positions
    // WHEN/THEN: The value is extracted
    assert_eq!(parse_port_arg(&args(&["privlinkd", "--port", "4096"])), Some(4096));
    assert_eq!(parse_port_arg(&args(&["privlinkd", "-v", "--port", "80"])), Some(80));
    assert_eq!(parse_port_arg(&args(&["--port", "0"])), Some(0));
}

/// **VALUE**: Verifies that missing or malformed port values parse to None.
///
/// **WHY THIS MATTERS**: None falls back to the environment and then to
/// auto-select; an error or panic here would kill the daemon on a typo.
///
/// **BUG THIS CATCHES**: Would catch an unwrap on the flag value, which
/// panics when --port is the last argument.
#[test]
fn given_missing_or_invalid_value_when_parsing_then_returns_none() {
    // GIVEN: Argument lists without a usable port
    // WHEN/THEN: Parsing degrades to None
    assert_eq!(parse_port_arg(&args(&["privlinkd"])), None);
    assert_eq!(parse_port_arg(&args(&["privlinkd", "--port"])), None);
    assert_eq!(parse_port_arg(&args(&["privlinkd", "--port", "not-a-port"])), None);
    assert_eq!(parse_port_arg(&args(&["privlinkd", "--port", "99999"])), None);
}
