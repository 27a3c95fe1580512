//! Command-line argument handling.
//!
//! The daemon takes a single optional `--port` flag, matching the
//! argument shape the client uses when spawning it. Everything else is
//! environment-driven.

const PORT_FLAG: &str = "--port";

/// Extract the `--port` value from an argument list.
///
/// Returns `None` when the flag is absent, has no value, or the value
/// does not parse as a port - the caller falls back to the environment
/// and then to auto-select.
pub fn parse_port_arg(args: &[String]) -> Option<u16> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == PORT_FLAG {
            return iter.next().and_then(|value| value.parse().ok());
        }
    }
    None
}
