//! Bodies of the authentication requests.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ApiError;
use crate::model::user::Role;

const MIN_PASSWORD_LEN: usize = 6;
const MAX_NAME_LEN: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: Option<String>,
}

impl RegisterRequest {
    /// Checks every field, returning the parsed role on success
    pub fn validate(&self) -> Result<Role, ApiError> {
        let mut errors = BTreeMap::new();

        if !is_plausible_email(&self.email) {
            errors.insert("email".into(), "must be a well-formed email address".into());
        }

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.insert(
                "password".into(),
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            );
        }

        for (field, value) in [("firstName", &self.first_name), ("lastName", &self.last_name)] {
            let value = value.trim();
            if value.is_empty() {
                errors.insert(field.into(), "must not be blank".into());
            } else if value.chars().count() > MAX_NAME_LEN {
                errors.insert(field.into(), format!("size must be at most {MAX_NAME_LEN}"));
            }
        }

        let role = match self.role.as_deref().map(str::parse::<Role>) {
            Some(Ok(role)) => Some(role),
            Some(Err(e)) => {
                errors.insert("role".into(), e.to_string());
                None
            }
            None => {
                errors.insert("role".into(), "must not be null".into());
                None
            }
        };

        match role {
            Some(role) if errors.is_empty() => Ok(role),
            _ => Err(ApiError::Validation(errors)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRequest {
    #[serde(default)]
    pub id_token: String,
    pub role: Option<String>,
}

impl GoogleLoginRequest {
    /// An unrecognized role leaves a new account role-less, to be picked after sign-in
    pub fn role(&self) -> Option<Role> {
        self.role.as_deref().and_then(|r| r.parse().ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCallbackRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub redirect_uri: String,
    pub role: Option<String>,
}

impl GoogleCallbackRequest {
    /// New accounts from the redirect flow are students unless they asked otherwise
    pub fn role(&self) -> Role {
        self.role
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(Role::Student)
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.code.trim().is_empty() {
            return Err(ApiError::BadRequest("Authorization code is missing".into()));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(ApiError::BadRequest("Redirect URI is missing".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusQuery {
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Lowercases and trims, so logins are not case sensitive
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(email: &str, password: &str, role: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: password.into(),
            first_name: "Katherine".into(),
            last_name: "Johnson".into(),
            role: role.map(Into::into),
        }
    }

    #[test]
    fn valid_registration_yields_role() {
        let role = register("kj@nasa.gov", "orbit123", Some("teacher"))
            .validate()
            .unwrap();
        assert_eq!(role, Role::Teacher);
    }

    #[test]
    fn invalid_registration_collects_all_errors() {
        let mut req = register("not-an-email", "123", Some("ADMIN"));
        req.first_name = " ".into();

        let Err(ApiError::Validation(errors)) = req.validate() else {
            panic!("expected validation errors");
        };
        assert_eq!(
            errors.keys().cloned().collect::<Vec<_>>(),
            vec!["email", "firstName", "password", "role"]
        );
    }

    #[test]
    fn role_is_required() {
        let Err(ApiError::Validation(errors)) =
            register("kj@nasa.gov", "orbit123", None).validate()
        else {
            panic!("expected validation errors");
        };
        assert_eq!(errors["role"], "must not be null");
    }

    #[test]
    fn email_plausibility() {
        assert!(is_plausible_email("a@b.co"));
        assert!(!is_plausible_email("a@b"));
        assert!(!is_plausible_email("@b.co"));
        assert!(!is_plausible_email("a@@b.co"));
        assert!(!is_plausible_email("a b@c.co"));
        assert!(!is_plausible_email("a@.co"));
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Jane.Doe@School.EDU "), "jane.doe@school.edu");
    }

    #[test]
    fn google_callback_uses_camel_case() {
        let req: GoogleCallbackRequest = serde_json::from_str(
            r#"{ "code": "4/0Adeu5B", "redirectUri": "http://localhost:5173/auth/callback" }"#,
        )
        .unwrap();
        assert_eq!(req.redirect_uri, "http://localhost:5173/auth/callback");
        assert_eq!(req.role(), Role::Student);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn google_role_defaults() {
        let login = GoogleLoginRequest {
            id_token: "t".into(),
            role: Some("principal".into()),
        };
        assert_eq!(login.role(), None);

        let callback = GoogleCallbackRequest {
            code: "c".into(),
            redirect_uri: "".into(),
            role: Some("principal".into()),
        };
        assert_eq!(callback.role(), Role::Student);
        assert!(callback.validate().is_err());

        let callback = GoogleCallbackRequest {
            role: Some("teacher".into()),
            ..callback
        };
        assert_eq!(callback.role(), Role::Teacher);
    }
}
