//! Tests for logging configuration and format parsing

use nirava::observability::logging::{init_logging, parse_level, LogFormat};
use nirava::{session_span, stage_span};
use tracing::Level;

#[test]
fn test_log_format_parse_is_case_insensitive() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
    assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("COMPACT"), LogFormat::Compact);
}

#[test]
fn test_log_format_unknown_values_default_to_compact() {
    // Terminal output stays readable when the variable is unset or mistyped
    assert_eq!(LogFormat::parse(""), LogFormat::Compact);
    assert_eq!(LogFormat::parse("xml"), LogFormat::Compact);
    assert_eq!(LogFormat::parse("  json  "), LogFormat::Compact);
}

#[test]
fn test_level_parsing_defaults_to_warn() {
    assert_eq!(parse_level("error"), Level::ERROR);
    assert_eq!(parse_level("INFO"), Level::INFO);
    assert_eq!(parse_level("debug"), Level::DEBUG);
    assert_eq!(parse_level("Trace"), Level::TRACE);
    assert_eq!(parse_level("warn"), Level::WARN);
    assert_eq!(parse_level("loud"), Level::WARN);
}

#[test]
fn test_init_logging_twice_does_not_panic() {
    init_logging(Level::WARN, LogFormat::Compact, false);
    init_logging(Level::DEBUG, LogFormat::Json, true);
}

#[test]
fn test_span_macros_build_spans() {
    init_logging(Level::INFO, LogFormat::Compact, false);

    let session = session_span!(session_id = "s1", turn = 1);
    let _entered = session.enter();
    let stage = stage_span!(stage = "research");
    stage.in_scope(|| tracing::info!("inside stage"));
}
