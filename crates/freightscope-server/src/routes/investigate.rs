//! Investigation endpoint.
//!
//! This is the top-level error boundary: a malformed request is rejected
//! with 400 before any work starts, and an investigation task that dies
//! unexpectedly becomes a 500 carrying the standard failure payload.

use std::time::Instant;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use freightscope_investigate::{
    HistoryMessage, InvestigationMode, InvestigationRequest, InvestigationResult,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ServerError;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body of `POST /api/v1/investigate`.
///
/// `question` and `customer_id` default to empty so that a missing field is
/// reported as a 400 with a readable message instead of a deserialization
/// rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestigateRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryMessage>,
    #[serde(default)]
    pub preferences: Preferences,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    /// Reasoning is returned unless this is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_reasoning: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_mode: Option<InvestigationMode>,
}

impl From<InvestigateRequest> for InvestigationRequest {
    fn from(body: InvestigateRequest) -> Self {
        let mut request = InvestigationRequest::new(body.question, body.customer_id)
            .with_user(body.user_id)
            .with_history(body.conversation_history)
            .with_show_reasoning(body.preferences.show_reasoning.unwrap_or(true));
        if let Some(mode) = body.preferences.force_mode {
            request = request.with_mode(mode);
        }
        request
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/investigate
///
/// The investigation runs on its own task. Dropping this handler (the
/// client went away) cancels it through the drop guard.
pub async fn investigate_handler(
    State(state): State<AppState>,
    payload: Result<Json<InvestigateRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(body) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge
        } else {
            ServerError::BadRequest(rejection.body_text())
        }
    })?;

    let request = InvestigationRequest::from(body);
    request.validate()?;

    let started = Instant::now();
    let question = request.question.clone();
    let force_mode = request.force_mode;

    let cancellation = CancellationToken::new();
    let _guard = cancellation.clone().drop_guard();

    let investigator = state.investigator.clone();
    let task = tokio::spawn(async move {
        investigator
            .investigate_with_cancel(request, cancellation)
            .await
    });

    match task.await {
        Ok(Ok(result)) => Ok((StatusCode::OK, Json(result)).into_response()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => {
            // The routing decision died with the task; rebuild it for the payload.
            let classification = state.investigator.classify(&question);
            let mode = force_mode.unwrap_or(classification.mode);
            tracing::error!(error = %e, mode = %mode, "Investigation task failed");
            let failure = InvestigationResult::failure(
                mode,
                classification,
                started.elapsed().as_millis() as u64,
            );
            Ok((StatusCode::INTERNAL_SERVER_ERROR, Json(failure)).into_response())
        }
    }
}
