// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sample() -> Envelope {
    Envelope::new("lv:X", "increment")
        .with_ref("2")
        .with_join_ref("1")
        .with_payload(serde_json::json!({"value": 1}))
}

#[test]
fn decode_tuple_form() {
    let codec = Codec::default();
    let bytes = br#"["1","2","lv:X","increment",{"value":1}]"#;
    let envelope = codec.decode(bytes).expect("decode");
    assert_eq!(envelope, sample());
}

#[test]
fn decode_object_form() {
    let codec = Codec::default();
    let bytes = br#"{"ref":"2","join_ref":"1","topic":"lv:X","event":"increment","payload":{"value":1}}"#;
    let envelope = codec.decode(bytes).expect("decode");
    assert_eq!(envelope, sample());
}

#[test]
fn decode_tuple_with_null_refs() {
    let codec = Codec::default();
    let bytes = br#"[null,"7","phoenix","phx_heartbeat",{}]"#;
    let envelope = codec.decode(bytes).expect("decode");
    assert_eq!(envelope.join_ref, None);
    assert_eq!(envelope.r#ref, Some("7".to_owned()));
}

#[test]
fn decode_integer_ref_normalizes_to_string() {
    let codec = Codec::default();
    let bytes = br#"[1,2,"lv:X","increment",null]"#;
    let envelope = codec.decode(bytes).expect("decode");
    assert_eq!(envelope.join_ref, Some("1".to_owned()));
    assert_eq!(envelope.r#ref, Some("2".to_owned()));
}

#[test]
fn decode_rejects_non_json() {
    let codec = Codec::default();
    let err = codec.decode(b"not json").unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));
}

#[test]
fn decode_rejects_wrong_arity() {
    let codec = Codec::default();
    let err = codec.decode(br#"["1","2","lv:X"]"#).unwrap_err();
    assert!(matches!(err, Error::MalformedFrame(_)));
}

#[test]
fn decode_rejects_non_string_topic() {
    let codec = Codec::default();
    let err = codec.decode(br#"["1","2",5,"increment",null]"#).unwrap_err();
    assert!(matches!(err, Error::FieldType(_)));
}

#[test]
fn decode_rejects_non_object_payload() {
    let codec = Codec::default();
    let err = codec.decode(br#"["1","2","lv:X","increment","oops"]"#).unwrap_err();
    assert!(matches!(err, Error::FieldType(_)));
}

#[test]
fn encode_tuple_uses_nulls_for_absent_optional_fields() {
    let codec = Codec::new(CodecConfig { shape: WireShape::Tuple });
    let envelope = Envelope::new("phoenix", "phx_reply");
    let bytes = codec.encode(&envelope).expect("encode");
    let value: serde_json::Value = serde_json::from_slice(&bytes).expect("valid json");
    assert_eq!(value, serde_json::json!([null, null, "phoenix", "phx_reply", null]));
}

#[test]
fn encode_object_has_stable_field_order() {
    let codec = Codec::new(CodecConfig { shape: WireShape::Object });
    let bytes = codec.encode(&sample()).expect("encode");
    let text = String::from_utf8(bytes).expect("utf8");
    let ref_pos = text.find("\"ref\"").unwrap();
    let join_ref_pos = text.find("\"join_ref\"").unwrap();
    let topic_pos = text.find("\"topic\"").unwrap();
    let event_pos = text.find("\"event\"").unwrap();
    let payload_pos = text.find("\"payload\"").unwrap();
    assert!(ref_pos < join_ref_pos);
    assert!(join_ref_pos < topic_pos);
    assert!(topic_pos < event_pos);
    assert!(event_pos < payload_pos);
}

#[test]
fn round_trip_tuple() {
    let codec = Codec::new(CodecConfig { shape: WireShape::Tuple });
    let envelope = sample();
    let bytes = codec.encode(&envelope).expect("encode");
    let decoded = codec.decode(&bytes).expect("decode");
    assert_eq!(decoded, envelope);
}

#[test]
fn round_trip_object() {
    let codec = Codec::new(CodecConfig { shape: WireShape::Object });
    let envelope = sample();
    let bytes = codec.encode(&envelope).expect("encode");
    let decoded = codec.decode(&bytes).expect("decode");
    assert_eq!(decoded, envelope);
}

#[test]
fn round_trip_absent_payload_normalizes_to_none() {
    let codec = Codec::default();
    let envelope = Envelope::new("phoenix", "phx_heartbeat");
    let bytes = codec.encode(&envelope).expect("encode");
    let decoded = codec.decode(&bytes).expect("decode");
    assert_eq!(decoded.payload, None);
}

proptest::proptest! {
    #[test]
    fn decode_encode_decode_is_idempotent(
        r#ref in proptest::option::of("[a-z0-9]{1,6}"),
        join_ref in proptest::option::of("[a-z0-9]{1,6}"),
        topic in "[a-z:]{1,12}",
        event in "[a-z_]{1,12}",
    ) {
        let codec = Codec::default();
        let envelope = Envelope {
            join_ref,
            r#ref,
            topic,
            event,
            payload: Some(serde_json::json!({"n": 1})),
        };
        let bytes = codec.encode(&envelope).expect("encode");
        let once = codec.decode(&bytes).expect("decode");
        let twice_bytes = codec.encode(&once).expect("encode");
        let twice = codec.decode(&twice_bytes).expect("decode");
        prop_assert_eq!(once, twice);
    }
}
