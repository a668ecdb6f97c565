use crate::{
    auth::{bearer_token, LoginRequest, SessionToken},
    errors::ServiceError,
    handlers::AppJson,
    AppState,
};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use tracing::info;

pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

/// Exchange the shared password for a session token
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = SessionToken),
        (status = 400, description = "Access control disabled", body = crate::errors::ErrorResponse),
        (status = 401, description = "Wrong password", body = crate::errors::ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.session_gate.login(&payload.password)?;
    Ok(Json(session))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Session closed")),
    tag = "auth"
)]
pub async fn logout(State(state): State<AppState>, request: Request) -> StatusCode {
    if let Some(token) = bearer_token(&request) {
        state.session_gate.logout(token);
        info!("session closed");
    }
    StatusCode::NO_CONTENT
}
