use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

use autoresponder_core::config::AppConfig;
use autoresponder_core::errors::{ApplicationError, InterfaceError};
use autoresponder_core::intake::IntakePipeline;
use autoresponder_core::platform::{Clock, MessagingPlatform};
use autoresponder_core::settings::AccountService;
use autoresponder_core::store::ConfigStore;

use crate::sessions::SessionStore;
use crate::{settings, webhook};

/// Links and the anti-forgery value the login flow needs.
#[derive(Clone, Debug)]
pub struct OAuthLinks {
    pub login_url: String,
    pub logout_url: String,
    pub state: String,
}

impl OAuthLinks {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            login_url: config.webex.authorize_url(),
            logout_url: config.webex.logout_url.clone(),
            state: config.webex.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: IntakePipeline,
    pub accounts: AccountService,
    pub sessions: SessionStore,
    pub links: Arc<OAuthLinks>,
}

impl AppState {
    pub fn new(
        platform: Arc<dyn MessagingPlatform>,
        store: ConfigStore,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        Self {
            pipeline: IntakePipeline::new(platform.clone(), store.clone(), clock.clone()),
            accounts: AccountService::new(platform, store),
            sessions: SessionStore::new(config.server.session_ttl_secs, clock),
            links: Arc::new(OAuthLinks::from_config(config)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(webhook::routes())
        .merge(settings::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    details: String,
    correlation_id: String,
}

/// Handler error carrying the interface-level classification.
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn from_application(error: impl Into<ApplicationError>, correlation_id: &str) -> Self {
        Self(error.into().into_interface(correlation_id))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(
                event_name = "server.request.failed",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
            );
        }
        let body = ErrorBody {
            message: self.0.user_message().to_owned(),
            details: self.0.to_string(),
            correlation_id: self.0.correlation_id().to_owned(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Response, StatusCode};
    use serde_json::Value;

    use autoresponder_core::config::AppConfig;
    use autoresponder_core::errors::InterfaceError;
    use autoresponder_core::store::ConfigStore;
    use autoresponder_core::testing::{FixedClock, ScriptedPlatform};

    use super::{ApiError, AppState};
    use axum::response::IntoResponse;

    pub(crate) fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.webex.client_id = "client-123".to_owned();
        config.webex.client_secret = "shh".to_owned().into();
        config.webex.public_url = "https://bot.example.com".to_owned();
        config
    }

    pub(crate) fn test_state(
        platform: Arc<ScriptedPlatform>,
        store: ConfigStore,
        clock: FixedClock,
    ) -> AppState {
        AppState::new(platform, store, Arc::new(clock), &test_config())
    }

    pub(crate) async fn json_body(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn api_error_maps_interface_class_to_status() {
        let cases = [
            (
                InterfaceError::Unprocessable {
                    message: "Missing Auto Response".to_owned(),
                    correlation_id: "req-1".to_owned(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                InterfaceError::ServiceUnavailable {
                    message: "webhooks returned 502".to_owned(),
                    correlation_id: "req-2".to_owned(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, expected) in cases {
            let correlation_id = error.correlation_id().to_owned();
            let response = ApiError(error).into_response();
            assert_eq!(response.status(), expected);
            let body = json_body(response).await;
            assert_eq!(body["correlation_id"], correlation_id);
        }
    }
}
