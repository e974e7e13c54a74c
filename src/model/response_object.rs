use serde::Serialize;

use crate::model::user::{Role, User};

/// Returned by every endpoint that signs a user in
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: &'static str,
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<Role>,
    pub profile_picture_url: Option<String>,
}

impl SessionResponse {
    pub fn new(token: String, user: User) -> Self {
        Self {
            token,
            token_type: "Bearer",
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            profile_picture_url: user.profile_picture_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: &'static str,
    pub submission_id: i64,
    pub file_name: String,
    pub file_size: i64,
    pub is_late_submission: bool,
}
