use crate::RedactedToken;

/// **VALUE**: Verifies that Debug and Display output never leak the token value.
///
/// **WHY THIS MATTERS**: Tokens end up in log lines through `{:?}` formatting of
/// larger structures. A single leak puts the worker handshake secret into
/// plaintext log files.
///
/// **BUG THIS CATCHES**: Would catch if someone derives Debug instead of keeping
/// the manual redacting implementation.
#[test]
fn given_token_when_formatted_then_value_is_redacted() {
    // GIVEN: A token with a known value
    let token = RedactedToken::new(String::from("super-secret-value"));

    // WHEN: Formatting via Debug and Display
    let debug = format!("{:?}", token);
    let display = format!("{}", token);

    // THEN: Neither output contains the value
    assert!(!debug.contains("super-secret-value"), "Debug must redact");
    assert!(!display.contains("super-secret-value"), "Display must redact");
    assert!(debug.contains("REDACTED"), "Debug should say it redacts");
}

/// **VALUE**: Verifies that serialization of a token is refused outright.
///
/// **WHY THIS MATTERS**: The runtime record and config files are serialized with
/// serde; a token embedded in one of those structures by accident must fail
/// loudly instead of landing on disk.
///
/// **BUG THIS CATCHES**: Would catch if the refusing Serialize implementation is
/// replaced with a derive.
#[test]
fn given_token_when_serialized_then_returns_error() {
    // GIVEN: A token
    let token = RedactedToken::new(String::from("another-secret"));

    // WHEN: Serializing to JSON
    let result = serde_json::to_string(&token);

    // THEN: Serialization is refused
    assert!(result.is_err(), "Token serialization must be refused");
}

/// **VALUE**: Verifies the explicit accessor still exposes the value for the handshake.
///
/// **WHY THIS MATTERS**: The token is useless if the one sanctioned access path
/// stops returning the real value.
///
/// **BUG THIS CATCHES**: Would catch an accessor accidentally returning the
/// redacted placeholder.
#[test]
fn given_token_when_as_str_called_then_returns_value() {
    // GIVEN: A token with a known value
    let token = RedactedToken::new(String::from("handshake-token"));

    // WHEN: Reading through the explicit accessor
    // THEN: The real value is returned
    assert_eq!(token.as_str(), "handshake-token");
    assert_eq!(token.len(), "handshake-token".len());
    assert!(!token.is_empty());
}
