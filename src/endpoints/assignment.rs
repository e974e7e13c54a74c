//! Assignment endpoints. Creating and managing assignments is reserved for the teacher who
//! owns them; any signed-in user may look one up by its code.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;

use crate::assignment_code::{is_valid_code, normalize_code};
use crate::database;
use crate::error::{ApiError, ApiResult};
use crate::model::assignment::{Assignment, AssignmentRequest, AssignmentResponse};
use crate::model::response_object::MessageResponse;
use crate::model::user::Role;
use crate::security::{AuthUser, Teacher};
use crate::state::AppState;

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Assignment not found with id: {id}"))
}

/// Loads an assignment and checks that `teacher_id` created it
pub(crate) async fn owned_assignment(
    state: &AppState,
    id: i64,
    teacher_id: i64,
) -> ApiResult<Assignment> {
    let assignment = database::assignment::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;

    if !assignment.is_owned_by(teacher_id) {
        return Err(ApiError::access_denied());
    }
    Ok(assignment)
}

/// Soft-deleted assignments can no longer be edited
fn ensure_active(assignment: &Assignment) -> ApiResult<()> {
    if assignment.is_active {
        Ok(())
    } else {
        Err(not_found(assignment.id))
    }
}

pub async fn create(
    State(state): State<AppState>,
    Teacher(teacher): Teacher,
    Json(req): Json<AssignmentRequest>,
) -> ApiResult<Json<AssignmentResponse>> {
    req.validate()?;
    let assignment = database::assignment::create(&state.pool, &req, teacher.id).await?;
    Ok(Json(assignment.into()))
}

/// The caller's active assignments, newest first
pub async fn list(
    State(state): State<AppState>,
    Teacher(teacher): Teacher,
) -> ApiResult<Json<Vec<AssignmentResponse>>> {
    let now = Utc::now();
    let assignments = database::assignment::list_by_teacher(&state.pool, teacher.id).await?;
    Ok(Json(
        assignments
            .into_iter()
            .map(|a| AssignmentResponse::new(a, now))
            .collect(),
    ))
}

/// Teachers may only read their own assignments. Students may read any active one.
pub async fn get(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<AssignmentResponse>> {
    let assignment = database::assignment::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))?;

    match user.role {
        Some(Role::Teacher) if assignment.is_owned_by(user.id) => {}
        Some(Role::Student) if assignment.is_active => {}
        Some(Role::Student) => return Err(not_found(id)),
        _ => return Err(ApiError::access_denied()),
    }

    Ok(Json(assignment.into()))
}

pub async fn search(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(code): Path<String>,
) -> ApiResult<Json<AssignmentResponse>> {
    let code = normalize_code(&code);
    if !is_valid_code(&code) {
        return Err(ApiError::BadRequest("Invalid assignment code format".into()));
    }

    let assignment = database::assignment::find_by_code(&state.pool, &code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No assignment found with code {code}")))?;

    Ok(Json(assignment.into()))
}

pub async fn update(
    State(state): State<AppState>,
    Teacher(teacher): Teacher,
    Path(id): Path<i64>,
    Json(req): Json<AssignmentRequest>,
) -> ApiResult<Json<AssignmentResponse>> {
    req.validate()?;
    let existing = owned_assignment(&state, id, teacher.id).await?;
    ensure_active(&existing)?;

    let assignment = database::assignment::update(&state.pool, id, &req)
        .await?
        .ok_or_else(|| not_found(id))?;

    tracing::info!(assignment_id = id, "Assignment updated");
    Ok(Json(assignment.into()))
}

pub async fn delete(
    State(state): State<AppState>,
    Teacher(teacher): Teacher,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    owned_assignment(&state, id, teacher.id).await?;
    database::assignment::deactivate(&state.pool, id).await?;

    tracing::info!(assignment_id = id, "Assignment deleted");
    Ok(Json(MessageResponse::new("Assignment deleted successfully")))
}
