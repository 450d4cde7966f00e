//! Webhook endpoint: provider verification handshake (GET) and event
//! delivery (POST).

use axum::extract::{Extension, Query};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::{info, warn};

use crate::domains::approval::WebhookPayload;
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Subscription handshake check: echo the challenge iff mode and token match.
pub fn check_verification(params: &VerifyParams, expected_token: &str) -> Option<String> {
    if params.mode.as_deref() != Some("subscribe") {
        return None;
    }
    if params.verify_token.as_deref() != Some(expected_token) {
        return None;
    }
    params.challenge.clone()
}

pub async fn verify_webhook_handler(
    Extension(state): Extension<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<String, StatusCode> {
    match check_verification(&params, &state.verify_token) {
        Some(challenge) => {
            info!("webhook verification succeeded");
            Ok(challenge)
        }
        None => {
            warn!(mode = ?params.mode, "webhook verification rejected");
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// Event delivery. Always acknowledged with 200 so the provider does not
/// redeliver; the payload is processed on the background worker.
pub async fn receive_webhook_handler(
    Extension(state): Extension<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode {
    state.queue.enqueue(payload);
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mode: &str, token: &str, challenge: &str) -> VerifyParams {
        VerifyParams {
            mode: Some(mode.to_string()),
            verify_token: Some(token.to_string()),
            challenge: Some(challenge.to_string()),
        }
    }

    #[test]
    fn matching_token_echoes_challenge() {
        let p = params("subscribe", "secret", "1158201444");
        assert_eq!(
            check_verification(&p, "secret"),
            Some("1158201444".to_string())
        );
    }

    #[test]
    fn wrong_token_is_rejected() {
        let p = params("subscribe", "guess", "1158201444");
        assert_eq!(check_verification(&p, "secret"), None);
    }

    #[test]
    fn wrong_mode_is_rejected() {
        let p = params("unsubscribe", "secret", "1158201444");
        assert_eq!(check_verification(&p, "secret"), None);
    }

    #[test]
    fn missing_params_are_rejected() {
        let p = VerifyParams {
            mode: None,
            verify_token: None,
            challenge: None,
        };
        assert_eq!(check_verification(&p, "secret"), None);
    }
}
