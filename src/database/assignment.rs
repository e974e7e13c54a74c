use sqlx::PgPool;

use crate::assignment_code::generate_code;
use crate::database::is_unique_violation;
use crate::error::ApiError;
use crate::model::assignment::{Assignment, AssignmentRequest};

/// Attempts at finding an unused code before giving up
const MAX_CODE_ATTEMPTS: usize = 16;

const SELECT_ASSIGNMENT: &str = "SELECT a.id, a.title, a.description, a.assignment_code, a.created_by,
        u.first_name || ' ' || u.last_name AS created_by_name,
        a.deadline, a.max_marks, a.instructions, a.created_at, a.updated_at, a.is_active,
        (SELECT COUNT(*) FROM submissions s WHERE s.assignment_id = a.id) AS submission_count
    FROM assignments a JOIN users u ON u.id = a.created_by";

/// Inserts the assignment under a freshly generated code
pub async fn create(
    pool: &PgPool,
    req: &AssignmentRequest,
    teacher_id: i64,
) -> Result<Assignment, ApiError> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_code();

        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO assignments (title, description, assignment_code, created_by, deadline, max_marks, instructions)
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id;",
        )
        .bind(req.title.trim())
        .bind(req.description.as_deref())
        .bind(&code)
        .bind(teacher_id)
        .bind(req.deadline)
        .bind(req.max_marks())
        .bind(req.instructions.as_deref())
        .fetch_one(pool)
        .await;

        match inserted {
            Ok(id) => {
                tracing::info!(assignment_id = id, code = %code, teacher_id, "Assignment created");
                return find_by_id(pool, id)
                    .await?
                    .ok_or_else(|| ApiError::Internal(format!("assignment {id} vanished")));
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(code = %code, "Assignment code already taken, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::Internal(
        "could not generate a unique assignment code".into(),
    ))
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query(&format!("{SELECT_ASSIGNMENT} WHERE a.id = $1;"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(|row| Assignment::from_row(&row))
        .transpose()
}

/// Looks up an active assignment by its code
pub async fn find_by_code(pool: &PgPool, code: &str) -> Result<Option<Assignment>, sqlx::Error> {
    sqlx::query(&format!(
        "{SELECT_ASSIGNMENT} WHERE a.assignment_code = $1 AND a.is_active;"
    ))
    .bind(code)
    .fetch_optional(pool)
    .await?
    .map(|row| Assignment::from_row(&row))
    .transpose()
}

/// The teacher's active assignments, newest first
pub async fn list_by_teacher(pool: &PgPool, teacher_id: i64) -> Result<Vec<Assignment>, sqlx::Error> {
    sqlx::query(&format!(
        "{SELECT_ASSIGNMENT} WHERE a.created_by = $1 AND a.is_active ORDER BY a.created_at DESC;"
    ))
    .bind(teacher_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(Assignment::from_row)
    .collect()
}

/// Updates an active assignment. Returns `None` when it is missing or deleted.
pub async fn update(
    pool: &PgPool,
    id: i64,
    req: &AssignmentRequest,
) -> Result<Option<Assignment>, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE assignments SET title = $1, description = $2, deadline = $3, max_marks = $4,
            instructions = $5, updated_at = now()
         WHERE id = $6 AND is_active;",
    )
    .bind(req.title.trim())
    .bind(req.description.as_deref())
    .bind(req.deadline)
    .bind(req.max_marks())
    .bind(req.instructions.as_deref())
    .bind(id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Ok(None);
    }
    find_by_id(pool, id).await
}

/// Soft delete. Submissions stay readable.
pub async fn deactivate(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE assignments SET is_active = FALSE, updated_at = now() WHERE id = $1;")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
