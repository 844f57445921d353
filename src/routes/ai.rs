//! AI review route — `POST /api/ai`.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::services::review::{self, ReviewAction, ReviewError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AiRequest {
    pub action: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, alias = "language")]
    pub lang: String,
}

#[derive(Debug, Serialize)]
pub struct AiResponse {
    pub result: String,
}

#[derive(Debug, Serialize)]
pub struct AiErrorBody {
    pub error: String,
}

type AiResult = Result<Json<AiResponse>, (StatusCode, Json<AiErrorBody>)>;

pub(crate) fn review_error_to_status(err: &ReviewError) -> StatusCode {
    match err {
        ReviewError::UnknownAction(_) => StatusCode::BAD_REQUEST,
        ReviewError::NotConfigured => StatusCode::NOT_IMPLEMENTED,
        ReviewError::Llm(_) => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(status: StatusCode, message: String) -> (StatusCode, Json<AiErrorBody>) {
    (status, Json(AiErrorBody { error: message }))
}

fn review_error_response(err: &ReviewError) -> (StatusCode, Json<AiErrorBody>) {
    error_response(review_error_to_status(err), err.to_string())
}

pub async fn handle_ai(State(state): State<AppState>, body: Result<Json<AiRequest>, JsonRejection>) -> AiResult {
    let Some(llm) = state.llm.as_deref() else {
        return Err(review_error_response(&ReviewError::NotConfigured));
    };

    let Json(req) = body.map_err(|e| error_response(StatusCode::BAD_REQUEST, e.body_text()))?;
    let action = ReviewAction::parse(&req.action).map_err(|e| review_error_response(&e))?;

    match review::review(llm, &req.code, &req.lang, action).await {
        Ok(result) => Ok(Json(AiResponse { result })),
        Err(e) => {
            tracing::warn!(?action, error = %e, "ai review failed");
            Err(review_error_response(&e))
        }
    }
}

#[cfg(test)]
#[path = "ai_test.rs"]
mod tests;
