//! Tool result envelope serialization: exact round-trips except for the
//! deliberate field/tool degradation.

use serde_json::json;

use tenex::tools::{EnvelopeErrorKind, ToolError, ToolResultEnvelope, UNKNOWN_SENTINEL};

#[test]
fn failed_envelope_round_trips_with_field_degraded_to_unknown() {
    let err = ToolError::validation("input", "Invalid input");
    let envelope =
        ToolResultEnvelope::failure("test_tool", json!({ "input": "invalid" }), 50, &err);

    let serialized = serde_json::to_string(&envelope).unwrap();
    let back: ToolResultEnvelope = serde_json::from_str(&serialized).unwrap();

    assert!(!back.success);
    assert_eq!(back.duration_ms, 50);
    assert_eq!(back.tool_name, "test_tool");
    assert_eq!(back.tool_args, json!({ "input": "invalid" }));
    assert_eq!(back.output, None);

    let error = back.error.unwrap();
    assert_eq!(error.kind, EnvelopeErrorKind::Validation);
    assert_eq!(error.message, "Invalid input");
    assert_eq!(error.field, UNKNOWN_SENTINEL);
    assert_eq!(error.tool, UNKNOWN_SENTINEL);
}

#[test]
fn successful_envelope_round_trips_exactly() {
    let envelope = ToolResultEnvelope::success(
        "grep",
        json!({ "pattern": "INFO", "head_limit": 10 }),
        123,
        "3 matches",
    );
    let back: ToolResultEnvelope =
        serde_json::from_str(&serde_json::to_string(&envelope).unwrap()).unwrap();
    assert_eq!(back, envelope);
}

#[test]
fn every_error_kind_survives_a_round_trip() {
    let errors = vec![
        ToolError::validation("f", "bad shape"),
        ToolError::execution("grep", "exit status 2"),
        ToolError::system("registry poisoned"),
    ];
    let kinds = [
        EnvelopeErrorKind::Validation,
        EnvelopeErrorKind::Execution,
        EnvelopeErrorKind::System,
    ];
    for (err, kind) in errors.iter().zip(kinds) {
        let envelope = ToolResultEnvelope::failure("t", json!({}), 1, err);
        let back: ToolResultEnvelope =
            serde_json::from_str(&serde_json::to_string(&envelope).unwrap()).unwrap();
        let error = back.error.unwrap();
        assert_eq!(error.kind, kind);
        assert_eq!(error.field, UNKNOWN_SENTINEL);
        assert_eq!(error.tool, UNKNOWN_SENTINEL);
    }
}
