//! Contains all endpoint-associated functions, grouped by the resource they act on.
//!
//! Authentication and service-status endpoints live here. Assignment, submission and
//! annotation endpoints are in their own submodules.

use axum::{Extension, Json, extract::State};
use chrono::Utc;
use serde_json::{Value, json};

use crate::database;
use crate::error::{ApiError, ApiResult};
use crate::model::request::{
    GoogleCallbackRequest, GoogleLoginRequest, LoginRequest, RegisterRequest, UpdateRoleRequest,
};
use crate::model::response_object::{MessageResponse, SessionResponse};
use crate::model::user::{AuthProvider, Role, User};
use crate::security::{AuthUser, CurrentSession};
use crate::state::AppState;

pub mod annotation;
pub mod assignment;
pub mod submission;

const FEATURES: [&str; 6] = [
    "User Authentication (Teachers & Students)",
    "Assignment Management with 5-character codes",
    "PDF File Upload and Storage",
    "Submission Tracking and Grading",
    "PDF Annotation System",
    "Analytics and Reporting",
];

/// Issues a fresh session for the user, ending any earlier one
async fn start_session(state: &AppState, user: User) -> ApiResult<Json<SessionResponse>> {
    let token = database::auth::create_session(&state.pool, user.id, state.session_ttl()).await?;
    Ok(Json(SessionResponse::new(token, user)))
}

/// Logs in a user with their email and password
///
/// Unknown emails and wrong passwords are reported the same way.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let user = database::user::verify_credentials(&state.pool, &req.email, &req.password)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    tracing::info!(user_id = user.id, "Logged in");
    start_session(&state, user).await
}

/// Creates a local account and signs it in
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let role = req.validate()?;
    let user = database::user::register(&state.pool, &req, role).await?;
    start_session(&state, user).await
}

/// Trades the current session for a new one with a fresh expiry
pub async fn refresh(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<SessionResponse>> {
    start_session(&state, user).await
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(CurrentSession(token)): Extension<CurrentSession>,
) -> ApiResult<Json<MessageResponse>> {
    database::auth::delete_session(&state.pool, &token).await?;
    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// Lets a Google account pick its role. Local accounts chose theirs at registration.
pub async fn update_role(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<UpdateRoleRequest>,
) -> ApiResult<Json<SessionResponse>> {
    if user.auth_provider != AuthProvider::Google {
        return Err(ApiError::BadRequest(
            "Role update only allowed for Google OAuth users".into(),
        ));
    }

    let role: Role = req
        .role
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid role: {}", req.role)))?;

    let user = database::user::update_role(&state.pool, user.id, role).await?;
    tracing::info!(user_id = user.id, role = %role, "Role updated");
    start_session(&state, user).await
}

/// Signs in with an ID token from the Google button
pub async fn google_login(
    State(state): State<AppState>,
    Json(req): Json<GoogleLoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let profile = state.google.verify_id_token(&req.id_token).await?;
    let user = database::user::find_or_create_google_user(&state.pool, &profile, req.role()).await?;
    start_session(&state, user).await
}

/// Completes the redirect flow with the authorization code Google handed back
pub async fn google_callback(
    State(state): State<AppState>,
    Json(req): Json<GoogleCallbackRequest>,
) -> ApiResult<Json<SessionResponse>> {
    req.validate()?;

    let profile = state
        .google
        .profile_from_code(&req.code, &req.redirect_uri)
        .await?;
    let user =
        database::user::find_or_create_google_user(&state.pool, &profile, Some(req.role())).await?;
    start_session(&state, user).await
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let server = &state.config.server;
    Json(json!({
        "status": "UP",
        "application": server.application_name,
        "port": server.port,
        "timestamp": Utc::now(),
        "message": format!("{} is running successfully!", server.application_name),
    }))
}

pub async fn info(State(state): State<AppState>) -> Json<Value> {
    let server = &state.config.server;
    Json(json!({
        "name": server.application_name,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Assignment management for teachers and students",
        "port": server.port,
        "features": FEATURES,
    }))
}
