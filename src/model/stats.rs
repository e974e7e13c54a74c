use serde::Serialize;

use crate::model::submission::{Submission, SubmissionStatus};

/// Aggregate counts over every submission to a teacher's assignments
#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionStats {
    pub total_submissions: u64,
    pub pending_submissions: u64,
    pub graded_submissions: u64,
    pub late_submissions: u64,
    pub average_marks: Option<f64>,
}

impl SubmissionStats {
    pub fn from_submissions(submissions: &[Submission]) -> Self {
        let mut stats = Self::default();
        let mut marks_total = 0i64;
        let mut marked = 0u64;

        for s in submissions {
            stats.total_submissions += 1;
            if s.status.is_awaiting_grade() {
                stats.pending_submissions += 1;
            }
            if s.status == SubmissionStatus::Completed {
                stats.graded_submissions += 1;
            }
            if s.is_late_submission {
                stats.late_submissions += 1;
            }
            if let Some(marks) = s.marks_obtained {
                marks_total += marks as i64;
                marked += 1;
            }
        }

        if marked > 0 {
            stats.average_marks = Some(marks_total as f64 / marked as f64);
        }

        stats
    }
}
