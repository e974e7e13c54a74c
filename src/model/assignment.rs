use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{Row, postgres::PgRow};

use crate::error::ApiError;

pub const DEFAULT_MAX_MARKS: i32 = 100;
const MAX_TITLE_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub assignment_code: String,
    pub created_by: i64,
    pub created_by_name: String,
    pub deadline: DateTime<Utc>,
    pub max_marks: i32,
    pub instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
    pub submission_count: i64,
}

impl Assignment {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.created_by == user_id
    }

    /// Students may submit while the assignment is active and the deadline has not passed
    pub fn accepts_submissions_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    pub fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            assignment_code: row.try_get("assignment_code")?,
            created_by: row.try_get("created_by")?,
            created_by_name: row.try_get("created_by_name")?,
            deadline: row.try_get("deadline")?,
            max_marks: row.try_get("max_marks")?,
            instructions: row.try_get("instructions")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            is_active: row.try_get("is_active")?,
            submission_count: row.try_get("submission_count")?,
        })
    }
}

/// Body of create and update requests
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRequest {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(deserialize_with = "deserialize_deadline")]
    pub deadline: DateTime<Utc>,
    pub max_marks: Option<i32>,
    pub instructions: Option<String>,
}

impl AssignmentRequest {
    pub fn max_marks(&self) -> i32 {
        self.max_marks.unwrap_or(DEFAULT_MAX_MARKS)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = BTreeMap::new();

        if self.title.trim().is_empty() {
            errors.insert("title".into(), "must not be blank".into());
        } else if self.title.chars().count() > MAX_TITLE_LEN {
            errors.insert(
                "title".into(),
                format!("size must be between 0 and {MAX_TITLE_LEN}"),
            );
        }

        if self.max_marks() <= 0 {
            errors.insert("maxMarks".into(), "must be greater than 0".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub assignment_code: String,
    pub created_by_name: String,
    pub created_by_id: i64,
    pub deadline: DateTime<Utc>,
    pub max_marks: i32,
    pub instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_expired: bool,
    pub is_active: bool,
    pub submission_count: i64,
}

impl AssignmentResponse {
    pub fn new(assignment: Assignment, now: DateTime<Utc>) -> Self {
        let is_expired = assignment.is_expired_at(now);
        Self {
            id: assignment.id,
            title: assignment.title,
            description: assignment.description,
            assignment_code: assignment.assignment_code,
            created_by_name: assignment.created_by_name,
            created_by_id: assignment.created_by,
            deadline: assignment.deadline,
            max_marks: assignment.max_marks,
            instructions: assignment.instructions,
            created_at: assignment.created_at,
            is_expired,
            is_active: assignment.is_active,
            submission_count: assignment.submission_count,
        }
    }
}

impl From<Assignment> for AssignmentResponse {
    fn from(assignment: Assignment) -> Self {
        Self::new(assignment, Utc::now())
    }
}

/// Accepts RFC 3339 timestamps as well as the zone-less `yyyy-MM-ddTHH:mm[:ss]` an HTML
/// `datetime-local` input produces. Zone-less values are taken as UTC.
pub fn parse_deadline(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map(|naive| naive.and_utc())
}

fn deserialize_deadline<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_deadline(&raw)
        .map_err(|e| serde::de::Error::custom(format!("invalid deadline {raw:?}: {e}")))
}
