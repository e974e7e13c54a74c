//! Submission endpoints: students upload, teachers grade, both may read what is theirs.

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{
        HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE, X_FRAME_OPTIONS},
    },
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use crate::assignment_code::normalize_code;
use crate::database::{
    self,
    submission::{Grade, NewSubmission, already_submitted},
};
use crate::endpoints::assignment::owned_assignment;
use crate::error::{ApiError, ApiResult};
use crate::model::request::StatusQuery;
use crate::model::assignment::Assignment;
use crate::model::response_object::{MessageResponse, UploadResponse};
use crate::model::stats::SubmissionStats;
use crate::model::submission::{Submission, SubmissionResponse, SubmissionStatus};
use crate::model::user::User;
use crate::security::{AuthUser, Student, Teacher};
use crate::state::AppState;
use crate::storage::FileStorage;

const PDF: &str = "application/pdf";

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("Submission not found with id: {id}"))
}

fn missing_part(name: &str) -> ApiError {
    ApiError::BadRequest(format!("Required part '{name}' is not present"))
}

async fn find_submission(state: &AppState, id: i64) -> ApiResult<Submission> {
    database::submission::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| not_found(id))
}

/// Loads a submission the user may read: the owning teacher's or the submitting student's
pub(crate) async fn visible_submission(
    state: &AppState,
    id: i64,
    user: &User,
) -> ApiResult<Submission> {
    let submission = find_submission(state, id).await?;
    if !submission.is_visible_to(user) {
        return Err(ApiError::access_denied());
    }
    Ok(submission)
}

/// Loads a submission to an assignment the teacher owns
pub(crate) async fn owned_submission(
    state: &AppState,
    id: i64,
    teacher_id: i64,
) -> ApiResult<Submission> {
    let submission = find_submission(state, id).await?;
    if submission.assignment_owner != teacher_id {
        return Err(ApiError::access_denied());
    }
    Ok(submission)
}

struct UploadedFile {
    filename: String,
    content_type: Option<String>,
    contents: Bytes,
}

/// Rejects uploads once the assignment no longer takes submissions
fn ensure_accepting(assignment: &Assignment, now: DateTime<Utc>) -> ApiResult<()> {
    if assignment.accepts_submissions_at(now) {
        Ok(())
    } else {
        Err(ApiError::BadRequest("Assignment deadline has passed".into()))
    }
}

/// Parses the `marks` part, which must be a whole number in `0..=max_marks`
fn parse_marks(raw: &str, max_marks: i32) -> ApiResult<i32> {
    let marks: i32 = raw
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Marks must be a whole number, got {raw:?}")))?;

    if !(0..=max_marks).contains(&marks) {
        return Err(ApiError::BadRequest(format!(
            "Marks must be between 0 and {max_marks}"
        )));
    }
    Ok(marks)
}

/// An empty `correctedFile` part means none was attached. Anything else must be a PDF.
fn corrected_pdf(file: Option<UploadedFile>) -> ApiResult<Option<UploadedFile>> {
    match file.filter(|f| !f.contents.is_empty()) {
        Some(file) if file.content_type.as_deref() != Some(PDF) => {
            Err(ApiError::BadRequest("Corrected file must be a PDF".into()))
        }
        file => Ok(file),
    }
}

/// Removes a file whose database record was never written
async fn discard_orphan(storage: &FileStorage, path: &std::path::Path) {
    if let Err(e) = storage.delete(path).await {
        tracing::warn!("Could not remove orphaned file {}: {e}", path.display());
    }
}

fn to_responses(submissions: Vec<Submission>) -> Json<Vec<SubmissionResponse>> {
    Json(submissions.into_iter().map(Into::into).collect())
}

/// Accepts a student's PDF for the assignment named by `assignmentCode`
pub async fn upload(
    State(state): State<AppState>,
    Student(student): Student,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut file = None;
    let mut code = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_owned();
                let content_type = field.content_type().map(str::to_owned);
                file = Some(UploadedFile {
                    filename,
                    content_type,
                    contents: field.bytes().await?,
                });
            }
            Some("assignmentCode") => code = Some(field.text().await?),
            _ => {}
        }
    }

    let file = file.ok_or_else(|| missing_part("file"))?;
    let code = normalize_code(&code.ok_or_else(|| missing_part("assignmentCode"))?);

    let assignment = database::assignment::find_by_code(&state.pool, &code)
        .await?
        .ok_or_else(|| ApiError::BadRequest(format!("Assignment not found with code: {code}")))?;

    let submitted_at = Utc::now();
    ensure_accepting(&assignment, submitted_at)?;
    if database::submission::exists(&state.pool, assignment.id, student.id).await? {
        return Err(already_submitted());
    }

    let path = state
        .storage
        .store(&file.contents, &file.filename, &assignment.assignment_code, &student.email)
        .await?;
    let file_path = path.to_string_lossy();
    let file_size = file.contents.len() as i64;
    let is_late_submission = assignment.is_expired_at(submitted_at);

    let new = NewSubmission {
        assignment_id: assignment.id,
        student_id: student.id,
        file_path: &file_path,
        original_filename: &file.filename,
        file_size,
        is_late_submission,
    };

    let submission_id = match database::submission::create(&state.pool, &new).await {
        Ok(id) => id,
        Err(e) => {
            discard_orphan(&state.storage, &path).await;
            return Err(e);
        }
    };

    tracing::info!(
        submission_id,
        assignment_id = assignment.id,
        student_id = student.id,
        content_type = file.content_type.as_deref().unwrap_or("unknown"),
        "Submission stored"
    );

    Ok(Json(UploadResponse {
        message: "File uploaded successfully",
        submission_id,
        file_name: file.filename,
        file_size,
        is_late_submission,
    }))
}

/// Submissions to one of the teacher's assignments, oldest first
pub async fn by_assignment(
    State(state): State<AppState>,
    Teacher(teacher): Teacher,
    Path(assignment_id): Path<i64>,
) -> ApiResult<Json<Vec<SubmissionResponse>>> {
    owned_assignment(&state, assignment_id, teacher.id).await?;
    let submissions = database::submission::list_by_assignment(&state.pool, assignment_id).await?;
    Ok(to_responses(submissions))
}

pub async fn for_student(
    State(state): State<AppState>,
    Student(student): Student,
) -> ApiResult<Json<Vec<SubmissionResponse>>> {
    let submissions = database::submission::list_by_student(&state.pool, student.id).await?;
    Ok(to_responses(submissions))
}

pub async fn for_teacher(
    State(state): State<AppState>,
    Teacher(teacher): Teacher,
) -> ApiResult<Json<Vec<SubmissionResponse>>> {
    let submissions = database::submission::list_by_teacher(&state.pool, teacher.id).await?;
    Ok(to_responses(submissions))
}

/// Records marks and optional feedback, optionally with a marked-up PDF for the student
pub async fn grade(
    State(state): State<AppState>,
    Teacher(teacher): Teacher,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> ApiResult<Json<SubmissionResponse>> {
    let submission = owned_submission(&state, id, teacher.id).await?;

    let mut marks = None;
    let mut feedback = None;
    let mut corrected = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("marks") => marks = Some(field.text().await?),
            Some("feedback") => feedback = Some(field.text().await?),
            Some("correctedFile") => {
                let filename = field.file_name().unwrap_or("corrected.pdf").to_owned();
                let content_type = field.content_type().map(str::to_owned);
                corrected = Some(UploadedFile {
                    filename,
                    content_type,
                    contents: field.bytes().await?,
                });
            }
            _ => {}
        }
    }

    let marks = marks.ok_or_else(|| missing_part("marks"))?;
    let marks = parse_marks(&marks, submission.assignment_max_marks)?;
    let corrected = corrected_pdf(corrected)?;

    let stored = match &corrected {
        Some(file) => {
            let owner = format!("corrected_by_{}", teacher.email);
            let path = state
                .storage
                .store(&file.contents, &file.filename, &submission.assignment_code, &owner)
                .await?;
            Some(path.to_string_lossy().into_owned())
        }
        None => None,
    };

    let feedback = feedback.as_deref().map(str::trim).filter(|f| !f.is_empty());
    let grade = Grade {
        marks,
        feedback,
        corrected_file: stored
            .as_deref()
            .zip(corrected.as_ref().map(|f| f.filename.as_str())),
        graded_by: teacher.id,
    };

    let graded = match database::submission::grade(&state.pool, id, &grade).await {
        Ok(Some(graded)) => graded,
        result => {
            if let Some(path) = &stored {
                discard_orphan(&state.storage, std::path::Path::new(path)).await;
            }
            return Err(match result {
                Err(e) => e.into(),
                Ok(_) => not_found(id),
            });
        }
    };

    // A replaced corrected file is no longer reachable
    if let (Some(_), Some(previous)) = (&stored, &submission.corrected_file_path) {
        if let Err(e) = state.storage.delete(previous).await {
            tracing::warn!("Could not remove replaced corrected file {previous}: {e}");
        }
    }

    Ok(Json(graded.into()))
}

pub async fn update_status(
    State(state): State<AppState>,
    Teacher(teacher): Teacher,
    Path(id): Path<i64>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<MessageResponse>> {
    let status: SubmissionStatus = query.status.parse().map_err(ApiError::BadRequest)?;
    owned_submission(&state, id, teacher.id).await?;

    database::submission::update_status(&state.pool, id, status).await?;
    tracing::info!(submission_id = id, status = status.as_str(), "Status updated");
    Ok(Json(MessageResponse::new("Status updated successfully")))
}

pub async fn download(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    serve_file(&state, &user, id, Disposition::Attachment).await
}

/// Serves the PDF inline so the viewer can embed it in a frame
pub async fn view(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    serve_file(&state, &user, id, Disposition::Inline).await
}

pub async fn stats(
    State(state): State<AppState>,
    Teacher(teacher): Teacher,
) -> ApiResult<Json<SubmissionStats>> {
    let submissions = database::submission::list_by_teacher(&state.pool, teacher.id).await?;
    Ok(Json(SubmissionStats::from_submissions(&submissions)))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Disposition {
    Attachment,
    Inline,
}

impl Disposition {
    fn as_str(&self) -> &'static str {
        match self {
            Disposition::Attachment => "attachment",
            Disposition::Inline => "inline",
        }
    }
}

async fn serve_file(
    state: &AppState,
    user: &User,
    id: i64,
    disposition: Disposition,
) -> ApiResult<Response> {
    let submission = visible_submission(state, id, user).await?;
    let (path, filename) = submission.file_to_serve();
    let contents = state.storage.load(path).await?;

    let content_disposition = HeaderValue::from_str(&format!(
        "{}; filename=\"{}\"",
        disposition.as_str(),
        header_safe_filename(filename)
    ))
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut response = (
        [
            (CONTENT_TYPE, HeaderValue::from_static(PDF)),
            (CONTENT_DISPOSITION, content_disposition),
        ],
        contents,
    )
        .into_response();

    if disposition == Disposition::Inline {
        response
            .headers_mut()
            .insert(X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
    }

    Ok(response)
}

/// Keeps a filename inside a quoted header parameter
fn header_safe_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect()
}
