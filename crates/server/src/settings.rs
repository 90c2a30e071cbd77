//! Owner-facing routes: login, OAuth callback and the settings surface.
//!
//! - `GET  /`               - login link, or on to `/config` with a session
//! - `GET  /oauth`          - authorization callback
//! - `GET  /config`         - current settings
//! - `POST /config/update`  - save settings
//! - `GET  /config/test`    - send the auto-response to the primary contact
//! - `GET  /config/delete`  - remove the account and log out
//! - `GET  /config/logout`  - end the session

use axum::extract::{Form, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use autoresponder_core::settings::{SettingsForm, SettingsView, WebhookTransition};

use crate::app::{ApiError, AppState};
use crate::sessions::{Session, SessionStore};

#[derive(Debug, Default, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginLink<'a> {
    login_url: &'a str,
}

#[derive(Debug, Serialize)]
struct SettingsPage {
    display_name: String,
    #[serde(flatten)]
    settings: SettingsView,
}

#[derive(Debug, Serialize)]
struct SaveResult {
    saved: bool,
    errors: Vec<String>,
    webhook: WebhookTransition,
    settings: SettingsView,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/oauth", get(oauth_callback))
        .route("/config", get(show_settings))
        .route("/config/update", post(update_settings))
        .route("/config/test", get(send_test))
        .route("/config/delete", get(delete_account))
        .route("/config/logout", get(logout))
}

fn failure_page(detail: &str) -> Html<String> {
    Html(format!("<h1>OAuth Integration could not complete</h1><p>{detail}</p>"))
}

fn oauth_error_detail(error: &str) -> &'static str {
    match error {
        "access_denied" => "Authorization was declined.",
        "invalid_scope" => "The application requested an invalid scope.",
        "server_error" => "Webex reported a server error.",
        _ => "The authorization server returned an unexpected error.",
    }
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some((session_id, _)) = state.sessions.from_headers(&headers).await {
        return with_session_cookie(&state.sessions, &session_id, Redirect::to("/config"));
    }
    Json(LoginLink { login_url: &state.links.login_url }).into_response()
}

async fn oauth_callback(
    State(state): State<AppState>,
    Query(callback): Query<OAuthCallback>,
) -> Response {
    if let Some(error) = callback.error.as_deref() {
        info!(event_name = "account.oauth.declined", correlation_id = "oauth", error = %error);
        return failure_page(oauth_error_detail(error)).into_response();
    }

    let (Some(code), Some(returned_state)) = (callback.code, callback.state) else {
        return Redirect::to("/").into_response();
    };
    if returned_state != state.links.state {
        warn!(event_name = "account.oauth.state_mismatch", correlation_id = "oauth");
        return failure_page("State mismatch, aborting.").into_response();
    }

    match state.accounts.onboard(&code).await {
        Ok(onboarded) => {
            let session_id =
                state.sessions.open(onboarded.account_id, onboarded.display_name).await;
            with_session_cookie(&state.sessions, &session_id, Redirect::to("/config"))
        }
        Err(error) => {
            warn!(event_name = "account.oauth.failed", correlation_id = "oauth", error = %error);
            failure_page("Could not retrieve your access token. Try again.").into_response()
        }
    }
}

async fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(String, Session), Response> {
    state.sessions.from_headers(headers).await.ok_or_else(|| Redirect::to("/").into_response())
}

/// The lookup slid the server-side expiry, so the browser copy is renewed too.
fn with_session_cookie(
    sessions: &SessionStore,
    session_id: &str,
    response: impl IntoResponse,
) -> Response {
    let mut response = response.into_response();
    response.headers_mut().insert(header::SET_COOKIE, sessions.set_cookie(session_id));
    response
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

async fn show_settings(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session_id, session) = match require_session(&state, &headers).await {
        Ok(found) => found,
        Err(redirect) => return redirect,
    };
    let response = match state.accounts.settings(&session.person_id).await {
        Ok(account) => Json(SettingsPage {
            display_name: session.display_name,
            settings: SettingsView::from(&account),
        })
        .into_response(),
        Err(error) => ApiError::from_application(error, &correlation_id()).into_response(),
    };
    with_session_cookie(&state.sessions, &session_id, response)
}

async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<SettingsForm>,
) -> Response {
    let (session_id, session) = match require_session(&state, &headers).await {
        Ok(found) => found,
        Err(redirect) => return redirect,
    };
    let correlation_id = correlation_id();

    let response = match state.accounts.update_settings(&session.person_id, form).await {
        Ok(outcome) => {
            let status = if outcome.errors.is_empty() {
                StatusCode::OK
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            let body = SaveResult {
                saved: outcome.saved,
                errors: outcome.errors,
                webhook: outcome.webhook,
                settings: SettingsView::from(&outcome.account),
            };
            (status, Json(body)).into_response()
        }
        Err(error) => ApiError::from_application(error, &correlation_id).into_response(),
    };
    with_session_cookie(&state.sessions, &session_id, response)
}

async fn send_test(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (session_id, session) = match require_session(&state, &headers).await {
        Ok(found) => found,
        Err(redirect) => return redirect,
    };
    if let Err(error) = state.accounts.send_test(&session.person_id).await {
        warn!(
            event_name = "account.settings.test_failed",
            correlation_id = %session.person_id,
            account_id = %session.person_id,
            error = %error,
        );
    }
    with_session_cookie(&state.sessions, &session_id, Redirect::to("/config"))
}

async fn delete_account(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some((session_id, session)) = state.sessions.from_headers(&headers).await else {
        return Redirect::to("/").into_response();
    };
    if let Err(error) = state.accounts.remove_account(&session.person_id).await {
        return ApiError::from_application(error, &correlation_id()).into_response();
    }
    end_session(&state.sessions, &session_id, &state.links.logout_url).await
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match state.sessions.from_headers(&headers).await {
        Some((session_id, _)) => {
            end_session(&state.sessions, &session_id, &state.links.logout_url).await
        }
        None => Redirect::to(&state.links.logout_url).into_response(),
    }
}

async fn end_session(sessions: &SessionStore, session_id: &str, logout_url: &str) -> Response {
    sessions.destroy(session_id).await;
    let mut response = Redirect::to(logout_url).into_response();
    response.headers_mut().insert(header::SET_COOKIE, SessionStore::clear_cookie());
    response
}
