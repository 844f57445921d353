use super::*;
use crate::llm::types::LlmError;
use crate::state::test_helpers::{MockLlm, test_app_state, test_app_state_with_llm};
use std::sync::Arc;

fn request(action: &str, code: &str, lang: &str) -> Result<Json<AiRequest>, JsonRejection> {
    Ok(Json(AiRequest { action: action.into(), code: code.into(), lang: lang.into() }))
}

#[test]
fn error_statuses() {
    assert_eq!(review_error_to_status(&ReviewError::UnknownAction("x".into())), StatusCode::BAD_REQUEST);
    assert_eq!(review_error_to_status(&ReviewError::NotConfigured), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(
        review_error_to_status(&ReviewError::Llm(LlmError::ApiResponse { status: 500, body: String::new() })),
        StatusCode::BAD_GATEWAY
    );
}

#[test]
fn request_accepts_language_alias() {
    let req: AiRequest = serde_json::from_str(r#"{"action":"analyze","code":"x","language":"go"}"#).unwrap();
    assert_eq!(req.lang, "go");
    let req: AiRequest = serde_json::from_str(r#"{"action":"analyze"}"#).unwrap();
    assert!(req.code.is_empty());
}

#[tokio::test]
async fn analyze_returns_result() {
    let llm = Arc::new(MockLlm::replying("### Correctness\nok"));
    let state = test_app_state_with_llm(llm.clone());

    let Json(resp) = handle_ai(State(state), request("analyze", "print(1)", "python")).await.unwrap();
    assert_eq!(resp.result, "### Correctness\nok");
    assert!(llm.prompts.lock().unwrap()[0].contains("```python\nprint(1)\n```"));
}

#[tokio::test]
async fn unknown_action_is_bad_request() {
    let llm = Arc::new(MockLlm::replying("unused"));
    let state = test_app_state_with_llm(llm.clone());

    let (status, Json(body)) = handle_ai(State(state), request("execute", "x", "go")).await.unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.error.contains("execute"));
    assert!(llm.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_provider_is_not_implemented() {
    let (status, Json(body)) = handle_ai(State(test_app_state()), request("analyze", "x", "go")).await.unwrap_err();
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert!(body.error.contains("disabled"));
}

#[tokio::test]
async fn provider_failure_is_bad_gateway() {
    let state = test_app_state_with_llm(Arc::new(MockLlm::failing("timeout")));

    let (status, Json(body)) = handle_ai(State(state), request("refactor", "x", "go")).await.unwrap_err();
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.error.contains("timeout"));
}
