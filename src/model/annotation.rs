//! Markers a teacher draws over a rendered page of a submission.
//!
//! Coordinates are in unscaled page space; the viewer multiplies by its zoom factor when drawing.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, postgres::PgRow};

use crate::error::ApiError;

const MAX_COMMENT_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnnotationType {
    Rectangle,
    Comment,
}

impl AnnotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationType::Rectangle => "RECTANGLE",
            AnnotationType::Comment => "COMMENT",
        }
    }
}

impl FromStr for AnnotationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECTANGLE" => Ok(AnnotationType::Rectangle),
            "COMMENT" => Ok(AnnotationType::Comment),
            other => Err(format!("unknown annotation type {other}")),
        }
    }
}

/// The normalized rectangle of a marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Marker {
    /// Turns a drag from `start` to `end`, in any direction, into a top-left anchored rectangle.
    /// Points left of or above the page are clamped onto it.
    pub fn from_drag(start: (f64, f64), end: (f64, f64)) -> Self {
        let (sx, sy) = (start.0.max(0.0), start.1.max(0.0));
        let (ex, ey) = (end.0.max(0.0), end.1.max(0.0));

        Self {
            x: sx.min(ex),
            y: sy.min(ey),
            width: (ex - sx).abs(),
            height: (ey - sy).abs(),
        }
    }

    /// Comments are pinned where the pointer went down
    pub fn point(at: (f64, f64)) -> Self {
        Self {
            x: at.0.max(0.0),
            y: at.1.max(0.0),
            width: 0.0,
            height: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRequest {
    pub page_number: i32,
    pub annotation_type: AnnotationType,
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: Option<f64>,
    pub end_y: Option<f64>,
    pub comment: Option<String>,
    pub color: Option<String>,
}

impl AnnotationRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = BTreeMap::new();

        if self.page_number < 1 {
            errors.insert("pageNumber".into(), "must be at least 1".into());
        }

        if [self.start_x, self.start_y]
            .into_iter()
            .chain(self.end_x)
            .chain(self.end_y)
            .any(|c| !c.is_finite())
        {
            errors.insert("coordinates".into(), "must be finite numbers".into());
        }

        match self.annotation_type {
            AnnotationType::Comment => {
                let comment = self.comment.as_deref().unwrap_or_default().trim();
                if comment.is_empty() {
                    errors.insert("comment".into(), "must not be blank".into());
                } else if comment.chars().count() > MAX_COMMENT_LEN {
                    errors.insert(
                        "comment".into(),
                        format!("size must be between 1 and {MAX_COMMENT_LEN}"),
                    );
                }
            }
            AnnotationType::Rectangle => {
                if self.end_x.is_none() || self.end_y.is_none() {
                    errors.insert("endX".into(), "rectangles need an end point".into());
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }

    pub fn marker(&self) -> Marker {
        let start = (self.start_x, self.start_y);
        match (self.annotation_type, self.end_x, self.end_y) {
            (AnnotationType::Rectangle, Some(ex), Some(ey)) => Marker::from_drag(start, (ex, ey)),
            _ => Marker::point(start),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub id: i64,
    pub submission_id: i64,
    pub page_number: i32,
    #[serde(rename = "type")]
    pub annotation_type: AnnotationType,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub comment: Option<String>,
    pub color: Option<String>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl Annotation {
    pub fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let annotation_type: String = row.try_get("annotation_type")?;
        let annotation_type = annotation_type
            .parse::<AnnotationType>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(Self {
            id: row.try_get("id")?,
            submission_id: row.try_get("submission_id")?,
            page_number: row.try_get("page_number")?,
            annotation_type,
            x: row.try_get("x")?,
            y: row.try_get("y")?,
            width: row.try_get("width")?,
            height: row.try_get("height")?,
            comment: row.try_get("comment")?,
            color: row.try_get("color")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(start: (f64, f64), end: (f64, f64)) -> AnnotationRequest {
        AnnotationRequest {
            page_number: 1,
            annotation_type: AnnotationType::Rectangle,
            start_x: start.0,
            start_y: start.1,
            end_x: Some(end.0),
            end_y: Some(end.1),
            comment: None,
            color: None,
        }
    }

    #[test]
    fn drag_in_any_direction_normalizes() {
        let expected = Marker {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
        };
        assert_eq!(Marker::from_drag((10.0, 20.0), (40.0, 60.0)), expected);
        assert_eq!(Marker::from_drag((40.0, 60.0), (10.0, 20.0)), expected);
        assert_eq!(Marker::from_drag((40.0, 20.0), (10.0, 60.0)), expected);
    }

    #[test]
    fn negative_coordinates_clamp_to_page() {
        let m = Marker::from_drag((-5.0, 10.0), (20.0, -3.0));
        assert_eq!(
            m,
            Marker {
                x: 0.0,
                y: 0.0,
                width: 20.0,
                height: 10.0
            }
        );
    }

    #[test]
    fn comments_are_points() {
        let req = AnnotationRequest {
            annotation_type: AnnotationType::Comment,
            end_x: Some(90.0),
            end_y: Some(90.0),
            comment: Some("Cite this".into()),
            ..rect((12.0, 34.0), (0.0, 0.0))
        };
        assert!(req.validate().is_ok());
        assert_eq!(
            req.marker(),
            Marker {
                x: 12.0,
                y: 34.0,
                width: 0.0,
                height: 0.0
            }
        );
    }

    #[test]
    fn comment_text_is_required() {
        let req = AnnotationRequest {
            annotation_type: AnnotationType::Comment,
            comment: Some("   ".into()),
            ..rect((1.0, 1.0), (2.0, 2.0))
        };
        let Err(ApiError::Validation(errors)) = req.validate() else {
            panic!("expected validation errors");
        };
        assert!(errors.contains_key("comment"));
    }

    #[test]
    fn page_numbers_start_at_one() {
        let req = AnnotationRequest {
            page_number: 0,
            ..rect((1.0, 1.0), (2.0, 2.0))
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn rectangles_need_both_corners() {
        let req = AnnotationRequest {
            end_y: None,
            ..rect((1.0, 1.0), (2.0, 2.0))
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        assert!(rect((f64::NAN, 1.0), (2.0, 2.0)).validate().is_err());
        assert!(rect((1.0, 1.0), (f64::INFINITY, 2.0)).validate().is_err());
    }

    #[test]
    fn request_deserializes_from_viewer_payload() {
        let req: AnnotationRequest = serde_json::from_str(
            r##"{ "pageNumber": 2, "annotationType": "RECTANGLE",
                 "startX": 5, "startY": 6, "endX": 1, "endY": 2, "color": "#EF4444" }"##,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(
            req.marker(),
            Marker {
                x: 1.0,
                y: 2.0,
                width: 4.0,
                height: 4.0
            }
        );
    }
}
