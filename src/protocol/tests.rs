use super::*;
use crate::location::EntityType;

#[test]
fn test_decode_initial_frame() {
    let raw = r#"{
        "type": "initial",
        "locations": [
            {
                "entityId": "bike-001",
                "entityType": "bike",
                "latitude": 51.50,
                "longitude": -0.10,
                "timestamp": "2025-06-01T12:00:00Z",
                "updatedAt": "2025-06-01T12:00:01Z"
            },
            {
                "entityId": "rider-002",
                "entityType": "rider",
                "latitude": 53.48,
                "longitude": -2.24,
                "speed": 18.2,
                "timestamp": "2025-06-01T12:00:00Z",
                "updatedAt": "2025-06-01T12:00:01Z"
            }
        ]
    }"#;

    match decode(raw).unwrap() {
        InboundMessage::Initial { locations } => {
            assert_eq!(locations.len(), 2);
            assert_eq!(locations[0].entity_id, "bike-001");
            assert_eq!(locations[1].entity_type, EntityType::Rider);
            assert_eq!(locations[1].speed, Some(18.2));
        }
        other => panic!("expected initial, got {:?}", other),
    }
}

#[test]
fn test_decode_update_frame() {
    let raw = r#"{
        "type": "update",
        "location": {
            "entityId": "bike-001",
            "entityType": "bike",
            "latitude": 51.51,
            "longitude": -0.11,
            "heading": 270.0,
            "timestamp": "2025-06-01T12:01:00Z",
            "updatedAt": "2025-06-01T12:01:01Z"
        }
    }"#;

    match decode(raw).unwrap() {
        InboundMessage::Update { location } => {
            assert_eq!(location.entity_id, "bike-001");
            assert_eq!(location.heading, Some(270.0));
        }
        other => panic!("expected update, got {:?}", other),
    }
}

#[test]
fn test_decode_error_frame() {
    let raw = r#"{"type": "error", "message": "rate limited"}"#;
    match decode(raw).unwrap() {
        InboundMessage::Error { message } => assert_eq!(message, "rate limited"),
        other => panic!("expected error, got {:?}", other),
    }
}

#[test]
fn test_non_json_frame_fails() {
    let result = decode("not json at all {{{");
    assert!(matches!(result, Err(DecodeError::NotJson(_))));
}

#[test]
fn test_frame_without_type_fails() {
    let result = decode(r#"{"locations": []}"#);
    assert_eq!(result.unwrap_err(), DecodeError::MissingType);
}

#[test]
fn test_unknown_tag_fails() {
    let result = decode(r#"{"type": "bogus"}"#);
    assert_eq!(
        result.unwrap_err(),
        DecodeError::UnknownType("bogus".to_string())
    );
}

#[test]
fn test_initial_without_locations_fails() {
    let result = decode(r#"{"type": "initial"}"#);
    match result.unwrap_err() {
        DecodeError::InvalidPayload { msg_type, .. } => assert_eq!(msg_type, "initial"),
        other => panic!("expected InvalidPayload, got {:?}", other),
    }
}

#[test]
fn test_update_without_location_fails() {
    let result = decode(r#"{"type": "update"}"#);
    match result.unwrap_err() {
        DecodeError::InvalidPayload { msg_type, .. } => assert_eq!(msg_type, "update"),
        other => panic!("expected InvalidPayload, got {:?}", other),
    }
}

#[test]
fn test_error_without_message_fails() {
    let result = decode(r#"{"type": "error"}"#);
    assert!(matches!(
        result.unwrap_err(),
        DecodeError::InvalidPayload { .. }
    ));
}

#[test]
fn test_update_with_malformed_record_fails() {
    // latitude as string is a payload error, not a crash
    let raw = r#"{
        "type": "update",
        "location": {
            "entityId": "bike-001",
            "entityType": "bike",
            "latitude": "fifty-one",
            "longitude": -0.11,
            "timestamp": "2025-06-01T12:01:00Z"
        }
    }"#;
    assert!(matches!(
        decode(raw).unwrap_err(),
        DecodeError::InvalidPayload { .. }
    ));
}
