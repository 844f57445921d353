use super::*;

fn make_response(content: serde_json::Value) -> String {
    serde_json::json!({
        "id": "msg_123",
        "type": "message",
        "role": "assistant",
        "content": content,
        "model": "claude-sonnet-4-5-20250929",
        "stop_reason": "end_turn",
        "usage": { "input_tokens": 100, "output_tokens": 50 }
    })
    .to_string()
}

#[test]
fn parse_text_response() {
    let json = make_response(serde_json::json!([
        { "type": "text", "text": "Hello world" }
    ]));
    assert_eq!(parse_response(&json).unwrap(), "Hello world");
}

#[test]
fn parse_joins_text_blocks_and_skips_unknown() {
    let json = make_response(serde_json::json!([
        { "type": "thinking", "thinking": "hmm" },
        { "type": "text", "text": "### Correctness\n" },
        { "type": "text", "text": "Looks fine." }
    ]));
    assert_eq!(parse_response(&json).unwrap(), "### Correctness\nLooks fine.");
}

#[test]
fn parse_empty_content_is_an_error() {
    let json = make_response(serde_json::json!([]));
    assert!(matches!(parse_response(&json), Err(LlmError::ApiParse(_))));
}

#[test]
fn parse_invalid_json() {
    assert!(matches!(parse_response("not json"), Err(LlmError::ApiParse(_))));
}

#[test]
fn request_serializes_single_user_message() {
    let body = ApiRequest { model: "m", max_tokens: 64, messages: [ApiMessage { role: "user", content: "hi" }] };
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(value["model"], "m");
    assert_eq!(value["max_tokens"], 64);
    assert_eq!(value["messages"][0]["role"], "user");
    assert_eq!(value["messages"][0]["content"], "hi");
}
