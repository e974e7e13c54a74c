use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, postgres::PgRow};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Teacher,
    Student,
}

#[derive(Debug, Error)]
#[error("Role must be either STUDENT or TEACHER")]
pub struct InvalidRole;

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "TEACHER",
            Role::Student => "STUDENT",
        }
    }
}

impl FromStr for Role {
    type Err = InvalidRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TEACHER" => Ok(Role::Teacher),
            "STUDENT" => Ok(Role::Student),
            _ => Err(InvalidRole),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthProvider {
    Local,
    Google,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Local => "LOCAL",
            AuthProvider::Google => "GOOGLE",
        }
    }
}

impl FromStr for AuthProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCAL" => Ok(AuthProvider::Local),
            "GOOGLE" => Ok(AuthProvider::Google),
            other => Err(format!("unknown auth provider {other}")),
        }
    }
}

/// An account. Google accounts may not have picked a role yet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Option<Role>,
    pub auth_provider: AuthProvider,
    #[serde(skip)]
    pub google_id: Option<String>,
    pub profile_picture_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    pub fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let role: Option<String> = row.try_get("role")?;
        let role = role
            .map(|r| r.parse::<Role>())
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        let auth_provider: String = row.try_get("auth_provider")?;
        let auth_provider = auth_provider
            .parse::<AuthProvider>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            role,
            auth_provider,
            google_id: row.try_get("google_id")?,
            profile_picture_url: row.try_get("profile_picture_url")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn user(id: i64, role: Option<Role>) -> User {
        User {
            id,
            email: format!("user{id}@example.com"),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            role,
            auth_provider: AuthProvider::Local,
            google_id: None,
            profile_picture_url: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!(" STUDENT ".parse::<Role>().unwrap(), Role::Student);
        assert!("ADMIN".parse::<Role>().is_err());
    }

    #[test]
    fn serializes_with_frontend_field_names() {
        let json = serde_json::to_value(user(7, Some(Role::Teacher))).unwrap();
        assert_eq!(json["firstName"], "Ada");
        assert_eq!(json["role"], "TEACHER");
        assert_eq!(json["authProvider"], "LOCAL");
        assert!(json.get("googleId").is_none());
    }

    #[test]
    fn role_less_user_has_no_role() {
        let u = user(1, None);
        assert!(!u.has_role(Role::Student));
        assert!(!u.has_role(Role::Teacher));
    }
}
