use crate::{ModelError, WorkerInfoBuilder};

/// **VALUE**: Verifies that builder validation rejects zero PIDs.
///
/// **WHY THIS MATTERS**: PID 0 is an invalid process ID on all platforms.
/// Allowing it would break worker tracking, liveness checks and the ancestry
/// walk that stops at root pids.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Validation logic is accidentally removed or bypassed
/// - PID zero check is deleted during refactoring
/// - Builder allows invalid WorkerInfo instances to be created
#[test]
fn given_zero_pid_when_building_worker_info_then_returns_validation_error() {
    // GIVEN: Builder with PID set to zero
    let builder = WorkerInfoBuilder::default()
        .with_pid(0)
        .with_port(4096)
        .with_base_url("ws://127.0.0.1:4096")
        .with_name("privlinkd")
        .with_command("privlinkd --port 4096")
        .with_owned(true);

    // WHEN: Attempting to build
    let result = builder.build();

    // THEN: Should return validation error
    assert!(result.is_err());
    match result.unwrap_err() {
        ModelError::Validation { message, .. } => {
            assert_eq!(message, "PID must be non-zero");
        }
    }
}

/// **VALUE**: Verifies that builder validation rejects missing PID.
///
/// **WHY THIS MATTERS**: Every WorkerInfo must carry a PID so the client can
/// verify the worker is still alive and stop it on request. A missing PID
/// would break both paths silently.
///
/// **BUG THIS CATCHES**: Would catch if required-field validation is removed
/// or the builder starts allowing incomplete construction.
#[test]
fn given_missing_pid_when_building_then_returns_validation_error() {
    // GIVEN: Builder without PID
    let builder = WorkerInfoBuilder::default()
        .with_port(4096)
        .with_base_url("ws://127.0.0.1:4096")
        .with_name("privlinkd")
        .with_command("privlinkd --port 4096")
        .with_owned(true);

    // WHEN: Attempting to build
    let result = builder.build();

    // THEN: Should return validation error
    assert!(result.is_err());
    match result.unwrap_err() {
        ModelError::Validation { message, .. } => {
            assert_eq!(message, "PID is required");
        }
    }
}

/// **VALUE**: Verifies that builder validation rejects non-WebSocket URL schemes.
///
/// **WHY THIS MATTERS**: The worker speaks WebSocket only. An http:// or
/// garbage URL would fail at connect time with a confusing transport error
/// instead of a clear validation error at construction.
///
/// **BUG THIS CATCHES**: Would catch if the scheme check is loosened or
/// removed, letting unusable endpoints into the connect path.
#[test]
fn given_invalid_url_scheme_when_building_then_returns_validation_error() {
    // GIVEN: Builder with an http URL instead of ws
    let builder = WorkerInfoBuilder::default()
        .with_pid(12345)
        .with_port(4096)
        .with_base_url("http://127.0.0.1:4096")
        .with_name("privlinkd")
        .with_command("privlinkd --port 4096")
        .with_owned(true);

    // WHEN: Attempting to build
    let result = builder.build();

    // THEN: Should return validation error with the URL in the message
    assert!(result.is_err());
    match result.unwrap_err() {
        ModelError::Validation { message, .. } => {
            assert!(message.starts_with("Invalid base URL format:"));
            assert!(message.contains("http://"));
        }
    }
}

/// **VALUE**: Verifies that builder validation rejects empty base URLs.
///
/// **WHY THIS MATTERS**: An empty URL would fail deep inside the WebSocket
/// connector; catching it at build time points at the actual bug site.
///
/// **BUG THIS CATCHES**: Would catch if the empty-string check is removed.
#[test]
fn given_empty_base_url_when_building_then_returns_validation_error() {
    // GIVEN: Builder with empty base URL
    let builder = WorkerInfoBuilder::default()
        .with_pid(12345)
        .with_port(4096)
        .with_base_url("")
        .with_name("privlinkd")
        .with_command("privlinkd --port 4096")
        .with_owned(true);

    // WHEN: Attempting to build
    let result = builder.build();

    // THEN: Should return validation error
    assert!(result.is_err());
    match result.unwrap_err() {
        ModelError::Validation { message, .. } => {
            assert_eq!(message, "Base URL cannot be empty");
        }
    }
}

/// **VALUE**: Verifies that builder validation rejects missing owned flag.
///
/// **WHY THIS MATTERS**: The 'owned' flag determines whether stopping the
/// worker is allowed. Guessing a default would either leak spawned workers or
/// kill daemons we merely discovered.
///
/// **BUG THIS CATCHES**: Would catch if the flag becomes optional or a default
/// is silently assumed.
#[test]
fn given_missing_owned_flag_when_building_then_returns_validation_error() {
    // GIVEN: Builder without owned flag
    let builder = WorkerInfoBuilder::default()
        .with_pid(12345)
        .with_port(4096)
        .with_base_url("ws://127.0.0.1:4096")
        .with_name("privlinkd")
        .with_command("privlinkd --port 4096");

    // WHEN: Attempting to build
    let result = builder.build();

    // THEN: Should return validation error
    assert!(result.is_err());
    match result.unwrap_err() {
        ModelError::Validation { message, .. } => {
            assert_eq!(message, "Owned is required");
        }
    }
}

/// **VALUE**: Verifies that builder successfully creates WorkerInfo with all valid fields.
///
/// **WHY THIS MATTERS**: This is the happy path - every discovery and spawn
/// result goes through this builder, so a regression here breaks connecting
/// entirely.
///
/// **BUG THIS CATCHES**: Would catch broken field assignments or valid data
/// being incorrectly rejected after a refactoring.
#[test]
fn given_all_valid_fields_when_building_then_returns_worker_info() {
    // GIVEN: Builder with all valid fields
    let builder = WorkerInfoBuilder::default()
        .with_pid(12345)
        .with_port(4096)
        .with_base_url("ws://127.0.0.1:4096")
        .with_name("privlinkd")
        .with_command("privlinkd --port 4096")
        .with_owned(false);

    // WHEN: Building
    let result = builder.build();

    // THEN: Should succeed and populate all fields correctly
    assert!(result.is_ok());
    let worker_info = result.unwrap();
    assert_eq!(worker_info.pid, 12345);
    assert_eq!(worker_info.port, 4096);
    assert_eq!(worker_info.base_url, "ws://127.0.0.1:4096");
    assert_eq!(worker_info.name, "privlinkd");
    assert_eq!(worker_info.command, "privlinkd --port 4096");
    assert!(!worker_info.owned);
}

/// **VALUE**: Verifies u16 port converts to u32 correctly for the wire format.
///
/// **WHY THIS MATTERS**: The wire format uses u32 for ports while Rust network
/// APIs use u16. The conversion must not corrupt the extreme values.
///
/// **BUG THIS CATCHES**: Would catch a truncating or otherwise lossy
/// conversion at the type boundary.
#[test]
fn given_u16_port_when_building_then_converts_to_u32_correctly() {
    // GIVEN: Builder with maximum u16 port
    let builder = WorkerInfoBuilder::default()
        .with_pid(12345)
        .with_port(65535_u16)
        .with_base_url("ws://127.0.0.1:65535")
        .with_name("privlinkd")
        .with_command("privlinkd --port 65535")
        .with_owned(true);

    // WHEN: Building
    let result = builder.build();

    // THEN: Should convert u16 to u32 without loss
    assert!(result.is_ok());
    assert_eq!(result.unwrap().port, 65535_u32);
}
