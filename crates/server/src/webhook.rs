//! `POST /webhook` acknowledges structurally valid notifications at once and
//! hands them to the intake pipeline in a detached task. Signature checks and
//! everything after them happen in that task, so the sender never learns the
//! outcome.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use autoresponder_core::intake::IntakeOutcome;
use autoresponder_core::webhook::{verify_envelope, VerifyError, SIGNATURE_HEADER};

use crate::app::AppState;

pub const ACK_MESSAGE: &str = "message received and being processed by webhook";
pub const BAD_PAYLOAD_MESSAGE: &str = "Bad payload for Webhook";

#[derive(Debug, Serialize)]
struct Ack {
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct Rejection {
    message: &'static str,
    details: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhook", get(redirect_home).post(receive))
}

async fn redirect_home() -> Redirect {
    Redirect::to("/")
}

async fn receive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let event = match serde_json::from_slice::<Value>(&body)
        .map_err(|error| VerifyError::MalformedPayload(format!("body is not JSON: {error}")))
        .and_then(|payload| verify_envelope(&payload))
    {
        Ok(event) => event,
        Err(error) => {
            info!(
                event_name = "webhook.receive.rejected",
                correlation_id = "unassigned",
                reason = error.kind(),
                error = %error,
            );
            let rejection = Rejection { message: BAD_PAYLOAD_MESSAGE, details: error.to_string() };
            return (StatusCode::BAD_REQUEST, Json(rejection)).into_response();
        }
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let pipeline = state.pipeline.clone();
    info!(
        event_name = "webhook.receive.accepted",
        correlation_id = %event.id,
        resource = event.resource.as_str(),
        event = event.event.as_str(),
    );

    tokio::spawn(async move {
        match pipeline.process(&event, &body, signature.as_deref()).await {
            IntakeOutcome::Skipped(reason) => info!(
                event_name = "webhook.intake.skipped",
                correlation_id = %event.id,
                account_id = %event.created_by,
                reason = reason.as_str(),
            ),
            IntakeOutcome::Failed(error) => warn!(
                event_name = "webhook.intake.failed",
                correlation_id = %event.id,
                account_id = %event.created_by,
                error = %error,
            ),
            IntakeOutcome::Rejected(_) | IntakeOutcome::Responded(_) => {}
        }
    });

    (StatusCode::OK, Json(Ack { message: ACK_MESSAGE })).into_response()
}
