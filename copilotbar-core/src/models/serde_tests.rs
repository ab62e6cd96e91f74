//! Serde tests for wire and persisted model shapes.

use chrono::{TimeZone, Utc};

use super::{DisplayOptions, UsageLevel, UsagePayload, parse_billing_end};
use crate::CoreError;

// ============================================================================
// UsagePayload
// ============================================================================

#[test]
fn test_payload_parses_api_body() {
    let json = r#"{
        "premium_requests_used": 450,
        "premium_requests_limit": 500,
        "billing_cycle_end": "2025-07-01T00:00:00Z"
    }"#;

    let payload = UsagePayload::from_json(json).unwrap();
    assert_eq!(payload.premium_requests_used, 450);
    assert_eq!(payload.premium_requests_limit, 500);
    assert_eq!(
        payload.billing_cycle_end,
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(payload.percentage(), 90);
}

#[test]
fn test_payload_accepts_offset_timestamps_and_extra_fields() {
    let json = r#"{
        "premium_requests_used": 3,
        "premium_requests_limit": 300,
        "billing_cycle_end": "2025-07-01T02:00:00+02:00",
        "plan": "copilot_pro"
    }"#;

    let payload = UsagePayload::from_json(json).unwrap();
    assert_eq!(
        payload.billing_cycle_end,
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    );
}

#[test]
fn test_payload_rejects_missing_field() {
    let json = r#"{"premium_requests_used": 3, "premium_requests_limit": 300}"#;
    assert!(UsagePayload::from_json(json).is_err());
}

#[test]
fn test_payload_rejects_negative_counts() {
    let json = r#"{
        "premium_requests_used": -1,
        "premium_requests_limit": 300,
        "billing_cycle_end": "2025-07-01T00:00:00Z"
    }"#;
    assert!(UsagePayload::from_json(json).is_err());
}

#[test]
fn test_payload_accepts_date_only_billing_end() {
    let json = r#"{
        "premium_requests_used": 10,
        "premium_requests_limit": 100,
        "billing_cycle_end": "2025-07-01"
    }"#;

    let payload = UsagePayload::from_json(json).unwrap();
    assert_eq!(
        payload.billing_cycle_end,
        Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(payload.percentage(), 10);
}

#[test]
fn test_payload_accepts_billing_end_without_offset() {
    let json = r#"{
        "premium_requests_used": 10,
        "premium_requests_limit": 100,
        "billing_cycle_end": "2025-07-01T12:30:00"
    }"#;

    let payload = UsagePayload::from_json(json).unwrap();
    assert_eq!(
        payload.billing_cycle_end,
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 30, 0).unwrap()
    );
}

#[test]
fn test_payload_reparses_its_own_output() {
    let end = Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap();
    let json = serde_json::to_string(&UsagePayload::new(1, 2, end)).unwrap();
    assert_eq!(UsagePayload::from_json(&json).unwrap().billing_cycle_end, end);
}

#[test]
fn test_parse_billing_end_forms() {
    let midnight = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
    assert_eq!(parse_billing_end("2025-07-01T00:00:00Z").unwrap(), midnight);
    assert_eq!(parse_billing_end("2025-07-01T02:00:00+02:00").unwrap(), midnight);
    assert_eq!(parse_billing_end("2025-07-01T00:00:00.000").unwrap(), midnight);
    assert_eq!(parse_billing_end(" 2025-07-01 ").unwrap(), midnight);
    assert!(matches!(
        parse_billing_end("07/01/2025"),
        Err(CoreError::InvalidData(_))
    ));
}

#[test]
fn test_payload_rejects_bad_timestamp() {
    let json = r#"{
        "premium_requests_used": 1,
        "premium_requests_limit": 300,
        "billing_cycle_end": "next tuesday"
    }"#;
    assert!(UsagePayload::from_json(json).is_err());
}

// ============================================================================
// DisplayOptions
// ============================================================================

#[test]
fn test_display_options_missing_keys_default_true() {
    let opts: DisplayOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(opts, DisplayOptions::new(true, true));

    let opts: DisplayOptions = serde_json::from_str(r#"{"show_bar": false}"#).unwrap();
    assert_eq!(opts, DisplayOptions::new(false, true));
}

#[test]
fn test_display_options_keys() {
    let json = serde_json::to_value(DisplayOptions::new(true, false)).unwrap();
    assert_eq!(json["show_bar"], true);
    assert_eq!(json["show_percent"], false);
}

// ============================================================================
// UsageLevel
// ============================================================================

#[test]
fn test_usage_level_snake_case() {
    assert_eq!(serde_json::to_string(&UsageLevel::Critical).unwrap(), "\"critical\"");
    let level: UsageLevel = serde_json::from_str("\"warning\"").unwrap();
    assert_eq!(level, UsageLevel::Warning);
}
