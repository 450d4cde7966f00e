//! Approval submission endpoint.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::common::ApprovalError;
use crate::domains::approval::models::Decision;
use crate::domains::approval::{ApprovalDispatcher, SubmitApprovalRequest};
use crate::server::app::AppState;

#[derive(Serialize)]
pub struct SubmitApprovalResponse {
    pub id: Uuid,
    pub decision: Decision,
    pub notified_approvers: usize,
}

/// Accept an approval request and broadcast it to its approvers.
pub async fn submit_approval_handler(
    Extension(state): Extension<AppState>,
    Json(submission): Json<SubmitApprovalRequest>,
) -> Result<(StatusCode, Json<SubmitApprovalResponse>), (StatusCode, String)> {
    if submission.approvers.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "at least one approver is required".to_string(),
        ));
    }

    let dispatcher = ApprovalDispatcher::new(
        state.deps.approvals.clone(),
        state.deps.chat.clone(),
        state.deps.messages.clone(),
    );

    let (request, notified) = dispatcher.submit(submission).await.map_err(|e| {
        error!(error = %e, "approval submission failed");
        match e {
            ApprovalError::NotFound(what) => (StatusCode::NOT_FOUND, what),
            ApprovalError::Conflict(id) => (
                StatusCode::CONFLICT,
                format!("approval request {id} was modified concurrently"),
            ),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    })?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitApprovalResponse {
            id: request.id,
            decision: request.decision,
            notified_approvers: notified,
        }),
    ))
}
