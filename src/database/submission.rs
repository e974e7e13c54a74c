use sqlx::PgPool;

use crate::database::is_unique_violation;
use crate::error::ApiError;
use crate::model::submission::{Submission, SubmissionStatus};

const SELECT_SUBMISSION: &str = "SELECT s.id, s.assignment_id, a.title AS assignment_title,
        a.assignment_code, a.max_marks AS assignment_max_marks, a.created_by AS assignment_owner,
        s.student_id, st.first_name || ' ' || st.last_name AS student_name, st.email AS student_email,
        s.file_path, s.original_filename, s.file_size, s.submitted_at, s.status, s.marks_obtained,
        s.feedback, s.corrected_file_path, s.corrected_filename, s.graded_at,
        g.first_name || ' ' || g.last_name AS graded_by_name, s.is_late_submission
    FROM submissions s
    JOIN assignments a ON a.id = s.assignment_id
    JOIN users st ON st.id = s.student_id
    LEFT JOIN users g ON g.id = s.graded_by";

pub struct NewSubmission<'a> {
    pub assignment_id: i64,
    pub student_id: i64,
    pub file_path: &'a str,
    pub original_filename: &'a str,
    pub file_size: i64,
    pub is_late_submission: bool,
}

/// Records an uploaded file. A second submission for the same assignment is rejected.
pub async fn create(pool: &PgPool, new: &NewSubmission<'_>) -> Result<i64, ApiError> {
    let inserted = sqlx::query_scalar::<_, i64>(
        "INSERT INTO submissions (assignment_id, student_id, file_path, original_filename, file_size, status, is_late_submission)
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id;",
    )
    .bind(new.assignment_id)
    .bind(new.student_id)
    .bind(new.file_path)
    .bind(new.original_filename)
    .bind(new.file_size)
    .bind(SubmissionStatus::Uploaded.as_str())
    .bind(new.is_late_submission)
    .fetch_one(pool)
    .await;

    match inserted {
        Ok(id) => Ok(id),
        Err(e) if is_unique_violation(&e) => Err(already_submitted()),
        Err(e) => Err(e.into()),
    }
}

pub fn already_submitted() -> ApiError {
    ApiError::BadRequest("You have already submitted for this assignment".into())
}

pub async fn exists(pool: &PgPool, assignment_id: i64, student_id: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM submissions WHERE assignment_id = $1 AND student_id = $2);",
    )
    .bind(assignment_id)
    .bind(student_id)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query(&format!("{SELECT_SUBMISSION} WHERE s.id = $1;"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(|row| Submission::from_row(&row))
        .transpose()
}

/// Oldest first, the order a teacher grades in
pub async fn list_by_assignment(
    pool: &PgPool,
    assignment_id: i64,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query(&format!(
        "{SELECT_SUBMISSION} WHERE s.assignment_id = $1 ORDER BY s.submitted_at ASC;"
    ))
    .bind(assignment_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(Submission::from_row)
    .collect()
}

pub async fn list_by_student(pool: &PgPool, student_id: i64) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query(&format!(
        "{SELECT_SUBMISSION} WHERE s.student_id = $1 ORDER BY s.submitted_at DESC;"
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(Submission::from_row)
    .collect()
}

/// Every submission to any assignment the teacher created, newest first
pub async fn list_by_teacher(pool: &PgPool, teacher_id: i64) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query(&format!(
        "{SELECT_SUBMISSION} WHERE a.created_by = $1 ORDER BY s.submitted_at DESC;"
    ))
    .bind(teacher_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(Submission::from_row)
    .collect()
}

pub struct Grade<'a> {
    pub marks: i32,
    pub feedback: Option<&'a str>,
    /// Stored path and display name of the marked-up copy, if one was uploaded
    pub corrected_file: Option<(&'a str, &'a str)>,
    pub graded_by: i64,
}

/// Sets the grade and completes the submission. An earlier corrected file is kept unless replaced.
pub async fn grade(pool: &PgPool, id: i64, grade: &Grade<'_>) -> Result<Option<Submission>, sqlx::Error> {
    let (corrected_path, corrected_name) = grade.corrected_file.unzip();

    sqlx::query(
        "UPDATE submissions SET marks_obtained = $1, feedback = $2,
            corrected_file_path = COALESCE($3, corrected_file_path),
            corrected_filename = COALESCE($4, corrected_filename),
            graded_by = $5, graded_at = now(), status = $6
         WHERE id = $7;",
    )
    .bind(grade.marks)
    .bind(grade.feedback)
    .bind(corrected_path)
    .bind(corrected_name)
    .bind(grade.graded_by)
    .bind(SubmissionStatus::Completed.as_str())
    .bind(id)
    .execute(pool)
    .await?;

    tracing::info!(submission_id = id, marks = grade.marks, "Submission graded");
    find_by_id(pool, id).await
}

pub async fn update_status(
    pool: &PgPool,
    id: i64,
    status: SubmissionStatus,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query("UPDATE submissions SET status = $1 WHERE id = $2;")
        .bind(status.as_str())
        .bind(id)
        .execute(pool)
        .await?;

    find_by_id(pool, id).await
}
