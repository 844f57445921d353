use super::*;
use crate::state::test_helpers::dummy_member;
use serde_json::{Value, json};

#[test]
fn update_kind_round_trips_every_mutation_type() {
    for kind in [UpdateKind::Code, UpdateKind::Tasks, UpdateKind::Notes, UpdateKind::Link, UpdateKind::Team] {
        assert_eq!(UpdateKind::from_type(kind.as_str()), Some(kind));
    }
}

#[test]
fn initial_state_is_not_a_client_update() {
    assert_eq!(UpdateKind::from_type(INITIAL_STATE), None);
    assert_eq!(UpdateKind::from_type("code_update"), None);
}

#[test]
fn decode_keeps_payload_untyped() {
    let envelope = decode(r#"{"type":"TASKS_UPDATE","payload":[{"id":"t1","text":"x","completed":false}]}"#).unwrap();
    assert_eq!(envelope.kind, "TASKS_UPDATE");
    assert_eq!(envelope.update_kind(), Some(UpdateKind::Tasks));
    assert!(envelope.payload.is_array());
}

#[test]
fn decode_defaults_missing_payload_to_null() {
    let envelope = decode(r#"{"type":"PING"}"#).unwrap();
    assert_eq!(envelope.kind, "PING");
    assert!(envelope.payload.is_null());
    assert_eq!(envelope.update_kind(), None);
}

#[test]
fn decode_rejects_non_envelopes() {
    assert!(decode("not json").is_err());
    assert!(decode(r#"{"payload":"no type"}"#).is_err());
    assert!(decode(r#"["CODE_UPDATE"]"#).is_err());
}

#[test]
fn initial_state_carries_snapshot_and_client_id() {
    let client_id = Uuid::new_v4();
    let content = BoardContent::welcome("b1");
    let text = initial_state(&content, client_id).unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(value["type"], "INITIAL_STATE");
    assert_eq!(value["clientId"], client_id.to_string());
    assert_eq!(value["payload"]["id"], "b1");
    assert_eq!(value["payload"]["contentTasks"], json!([]));
}

#[test]
fn team_update_omits_client_id() {
    let text = team_update(&[dummy_member("m1")]).unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(value["type"], "TEAM_UPDATE");
    assert_eq!(value["payload"][0]["id"], "m1");
    assert!(value.get("clientId").is_none());
}
