use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::database;
use crate::endpoints::submission::{owned_submission, visible_submission};
use crate::error::{ApiError, ApiResult};
use crate::model::annotation::{Annotation, AnnotationRequest};
use crate::model::response_object::MessageResponse;
use crate::security::{AuthUser, Teacher};
use crate::state::AppState;

/// Everyone who may read the submission may read its annotations
pub async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(submission_id): Path<i64>,
) -> ApiResult<Json<Vec<Annotation>>> {
    visible_submission(&state, submission_id, &user).await?;
    let annotations = database::annotation::list_by_submission(&state.pool, submission_id).await?;
    Ok(Json(annotations))
}

pub async fn create(
    State(state): State<AppState>,
    Teacher(teacher): Teacher,
    Path(submission_id): Path<i64>,
    Json(req): Json<AnnotationRequest>,
) -> ApiResult<(StatusCode, Json<Annotation>)> {
    req.validate()?;
    owned_submission(&state, submission_id, teacher.id).await?;

    let annotation =
        database::annotation::create(&state.pool, submission_id, &req, teacher.id).await?;
    tracing::debug!(annotation_id = annotation.id, submission_id, "Annotation added");
    Ok((StatusCode::CREATED, Json(annotation)))
}

/// Only the author may remove an annotation
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let annotation = database::annotation::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Annotation not found with id: {id}")))?;

    if annotation.created_by != user.id {
        return Err(ApiError::access_denied());
    }

    database::annotation::delete(&state.pool, id).await?;
    Ok(Json(MessageResponse::new("Annotation deleted successfully")))
}
