use sqlx::PgPool;

use crate::model::annotation::{Annotation, AnnotationRequest};

const ANNOTATION_COLUMNS: &str = "id, submission_id, page_number, annotation_type, x, y, width, \
                                  height, comment, color, created_by, created_at";

/// Stores a validated annotation with its normalized marker
pub async fn create(
    pool: &PgPool,
    submission_id: i64,
    req: &AnnotationRequest,
    created_by: i64,
) -> Result<Annotation, sqlx::Error> {
    let marker = req.marker();
    let comment = req
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let row = sqlx::query(&format!(
        "INSERT INTO annotations (submission_id, page_number, annotation_type, x, y, width, height, comment, color, created_by)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {ANNOTATION_COLUMNS};"
    ))
    .bind(submission_id)
    .bind(req.page_number)
    .bind(req.annotation_type.as_str())
    .bind(marker.x)
    .bind(marker.y)
    .bind(marker.width)
    .bind(marker.height)
    .bind(comment)
    .bind(req.color.as_deref())
    .bind(created_by)
    .fetch_one(pool)
    .await?;

    Annotation::from_row(&row)
}

/// Top to bottom, page by page
pub async fn list_by_submission(
    pool: &PgPool,
    submission_id: i64,
) -> Result<Vec<Annotation>, sqlx::Error> {
    sqlx::query(&format!(
        "SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE submission_id = $1
         ORDER BY page_number, y, id;"
    ))
    .bind(submission_id)
    .fetch_all(pool)
    .await?
    .iter()
    .map(Annotation::from_row)
    .collect()
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Annotation>, sqlx::Error> {
    sqlx::query(&format!(
        "SELECT {ANNOTATION_COLUMNS} FROM annotations WHERE id = $1;"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(|row| Annotation::from_row(&row))
    .transpose()
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM annotations WHERE id = $1;")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
