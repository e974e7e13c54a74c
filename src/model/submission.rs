use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, postgres::PgRow};

use crate::model::user::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubmissionStatus {
    Uploaded,
    Pending,
    Completed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Uploaded => "UPLOADED",
            SubmissionStatus::Pending => "PENDING",
            SubmissionStatus::Completed => "COMPLETED",
        }
    }

    /// Anything not yet graded is still waiting on the teacher
    pub fn is_awaiting_grade(&self) -> bool {
        !matches!(self, SubmissionStatus::Completed)
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "UPLOADED" => Ok(SubmissionStatus::Uploaded),
            "PENDING" => Ok(SubmissionStatus::Pending),
            "COMPLETED" => Ok(SubmissionStatus::Completed),
            other => Err(format!("Invalid submission status: {other}")),
        }
    }
}

/// A submission joined with the assignment, student and grader details the views need
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: i64,
    pub assignment_id: i64,
    pub assignment_title: String,
    pub assignment_code: String,
    pub assignment_max_marks: i32,
    /// The teacher who owns the assignment
    pub assignment_owner: i64,
    pub student_id: i64,
    pub student_name: String,
    pub student_email: String,
    pub file_path: String,
    pub original_filename: String,
    pub file_size: i64,
    pub submitted_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub marks_obtained: Option<i32>,
    pub feedback: Option<String>,
    pub corrected_file_path: Option<String>,
    pub corrected_filename: Option<String>,
    pub graded_at: Option<DateTime<Utc>>,
    pub graded_by_name: Option<String>,
    pub is_late_submission: bool,
}

impl Submission {
    pub fn is_graded(&self) -> bool {
        self.marks_obtained.is_some() && self.graded_at.is_some()
    }

    /// The owning teacher and the submitting student may see a submission
    pub fn is_visible_to(&self, user: &User) -> bool {
        match user.role {
            Some(Role::Teacher) => self.assignment_owner == user.id,
            Some(Role::Student) => self.student_id == user.id,
            None => false,
        }
    }

    /// The corrected copy when a teacher uploaded one, otherwise the original
    pub fn file_to_serve(&self) -> (&str, &str) {
        match (&self.corrected_file_path, &self.corrected_filename) {
            (Some(path), Some(name)) if !path.is_empty() => (path.as_str(), name.as_str()),
            _ => (self.file_path.as_str(), self.original_filename.as_str()),
        }
    }

    pub fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<SubmissionStatus>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(Self {
            id: row.try_get("id")?,
            assignment_id: row.try_get("assignment_id")?,
            assignment_title: row.try_get("assignment_title")?,
            assignment_code: row.try_get("assignment_code")?,
            assignment_max_marks: row.try_get("assignment_max_marks")?,
            assignment_owner: row.try_get("assignment_owner")?,
            student_id: row.try_get("student_id")?,
            student_name: row.try_get("student_name")?,
            student_email: row.try_get("student_email")?,
            file_path: row.try_get("file_path")?,
            original_filename: row.try_get("original_filename")?,
            file_size: row.try_get("file_size")?,
            submitted_at: row.try_get("submitted_at")?,
            status,
            marks_obtained: row.try_get("marks_obtained")?,
            feedback: row.try_get("feedback")?,
            corrected_file_path: row.try_get("corrected_file_path")?,
            corrected_filename: row.try_get("corrected_filename")?,
            graded_at: row.try_get("graded_at")?,
            graded_by_name: row.try_get("graded_by_name")?,
            is_late_submission: row.try_get("is_late_submission")?,
        })
    }
}

/// Human readable size, truncating like `1536` -> `1 KB`
pub fn format_file_size(bytes: i64) -> String {
    const KB: i64 = 1024;
    const MB: i64 = 1024 * 1024;

    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{} KB", bytes / KB)
    } else {
        format!("{} MB", bytes / MB)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSummary {
    pub id: i64,
    pub title: String,
    pub assignment_code: String,
    pub max_marks: i32,
}

/// The JSON view of a submission. Storage paths stay on the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub id: i64,
    pub assignment: AssignmentSummary,
    pub assignment_id: i64,
    pub assignment_title: String,
    pub assignment_code: String,
    pub assignment_max_marks: i32,
    pub student_id: i64,
    pub student_name: String,
    pub student_email: String,
    pub original_filename: String,
    pub file_size: i64,
    pub file_size_formatted: String,
    pub submitted_at: DateTime<Utc>,
    pub status: SubmissionStatus,
    pub marks_obtained: Option<i32>,
    pub feedback: Option<String>,
    pub has_corrected_file: bool,
    pub corrected_filename: Option<String>,
    pub graded_at: Option<DateTime<Utc>>,
    pub graded_by_name: Option<String>,
    pub is_late_submission: bool,
    pub is_graded: bool,
}

impl From<Submission> for SubmissionResponse {
    fn from(s: Submission) -> Self {
        let is_graded = s.is_graded();
        Self {
            id: s.id,
            assignment: AssignmentSummary {
                id: s.assignment_id,
                title: s.assignment_title.clone(),
                assignment_code: s.assignment_code.clone(),
                max_marks: s.assignment_max_marks,
            },
            assignment_id: s.assignment_id,
            assignment_title: s.assignment_title,
            assignment_code: s.assignment_code,
            assignment_max_marks: s.assignment_max_marks,
            student_id: s.student_id,
            student_name: s.student_name,
            student_email: s.student_email,
            original_filename: s.original_filename,
            file_size: s.file_size,
            file_size_formatted: format_file_size(s.file_size),
            submitted_at: s.submitted_at,
            status: s.status,
            marks_obtained: s.marks_obtained,
            feedback: s.feedback,
            has_corrected_file: s.corrected_file_path.is_some(),
            corrected_filename: s.corrected_filename,
            graded_at: s.graded_at,
            graded_by_name: s.graded_by_name,
            is_late_submission: s.is_late_submission,
            is_graded,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::user::tests::user;

    pub fn submission(id: i64, owner: i64, student_id: i64) -> Submission {
        Submission {
            id,
            assignment_id: 1,
            assignment_title: "Essay".into(),
            assignment_code: "AB12C".into(),
            assignment_max_marks: 100,
            assignment_owner: owner,
            student_id,
            student_name: "Alan Turing".into(),
            student_email: "alan@example.com".into(),
            file_path: "/uploads/AB12C_alan.pdf".into(),
            original_filename: "essay.pdf".into(),
            file_size: 2048,
            submitted_at: Utc::now(),
            status: SubmissionStatus::Uploaded,
            marks_obtained: None,
            feedback: None,
            corrected_file_path: None,
            corrected_filename: None,
            graded_at: None,
            graded_by_name: None,
            is_late_submission: false,
        }
    }

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(1536), "1 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024 + 10), "5 MB");
    }

    #[test]
    fn visibility_follows_ownership() {
        let s = submission(1, 10, 20);
        assert!(s.is_visible_to(&user(10, Some(Role::Teacher))));
        assert!(s.is_visible_to(&user(20, Some(Role::Student))));
        assert!(!s.is_visible_to(&user(11, Some(Role::Teacher))));
        assert!(!s.is_visible_to(&user(21, Some(Role::Student))));
        // A student id that happens to match the owner id is still a student
        assert!(!s.is_visible_to(&user(10, Some(Role::Student))));
        assert!(!s.is_visible_to(&user(20, None)));
    }

    #[test]
    fn corrected_file_is_preferred() {
        let mut s = submission(1, 10, 20);
        assert_eq!(s.file_to_serve(), ("/uploads/AB12C_alan.pdf", "essay.pdf"));

        s.corrected_file_path = Some("/uploads/corrected.pdf".into());
        s.corrected_filename = Some("essay-marked.pdf".into());
        assert_eq!(
            s.file_to_serve(),
            ("/uploads/corrected.pdf", "essay-marked.pdf")
        );
    }

    #[test]
    fn graded_requires_marks_and_timestamp() {
        let mut s = submission(1, 10, 20);
        s.marks_obtained = Some(80);
        assert!(!s.is_graded());
        s.graded_at = Some(Utc::now());
        assert!(s.is_graded());
    }

    #[test]
    fn status_parsing() {
        assert_eq!(
            "completed".parse::<SubmissionStatus>().unwrap(),
            SubmissionStatus::Completed
        );
        assert!("GRADED".parse::<SubmissionStatus>().is_err());
        assert!(SubmissionStatus::Pending.is_awaiting_grade());
        assert!(!SubmissionStatus::Completed.is_awaiting_grade());
    }

    #[test]
    fn response_hides_storage_paths() {
        let json = serde_json::to_value(SubmissionResponse::from(submission(5, 1, 2))).unwrap();
        assert!(json.get("filePath").is_none());
        assert_eq!(json["assignment"]["assignmentCode"], "AB12C");
        assert_eq!(json["fileSizeFormatted"], "2 KB");
        assert_eq!(json["status"], "UPLOADED");
        assert_eq!(json["isLateSubmission"], false);
    }
}
