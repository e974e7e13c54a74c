//! Google sign-in. ID tokens from the client-side button are checked against Google's
//! tokeninfo endpoint; authorization codes from the redirect flow are exchanged for an access
//! token and then resolved through the userinfo endpoint.

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::config::AuthConfig;
use crate::error::ApiError;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("Google sign-in is not configured")]
    NotConfigured,

    #[error("Invalid Google token or authentication failed")]
    InvalidToken,

    #[error("OAuth callback failed: {0}")]
    Upstream(String),
}

impl From<GoogleError> for ApiError {
    fn from(e: GoogleError) -> Self {
        match e {
            GoogleError::NotConfigured => ApiError::Internal(e.to_string()),
            GoogleError::InvalidToken => ApiError::BadRequest(e.to_string()),
            GoogleError::Upstream(_) => ApiError::Upstream(e.to_string()),
        }
    }
}

/// The parts of a Google account the portal keeps
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleProfile {
    pub google_id: String,
    pub email: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub picture: Option<String>,
}

impl GoogleProfile {
    pub fn first_name(&self) -> &str {
        non_blank(self.given_name.as_deref()).unwrap_or("Google User")
    }

    pub fn last_name(&self) -> &str {
        non_blank(self.family_name.as_deref()).unwrap_or("User")
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    iss: String,
    sub: String,
    email: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    id: String,
    email: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

pub struct GoogleAuth {
    client: Client,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl GoogleAuth {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            client: Client::new(),
            client_id: config.google_client_id.clone(),
            client_secret: config.google_client_secret.clone(),
        }
    }

    fn client_id(&self) -> Result<&str, GoogleError> {
        self.client_id.as_deref().ok_or(GoogleError::NotConfigured)
    }

    /// Checks an ID token issued to this application and returns the account behind it
    pub async fn verify_id_token(&self, id_token: &str) -> Result<GoogleProfile, GoogleError> {
        let client_id = self.client_id()?;
        if id_token.trim().is_empty() {
            return Err(GoogleError::InvalidToken);
        }

        let response = self
            .client
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| GoogleError::Upstream(e.to_string()))?;

        // Google answers 400 for malformed and expired tokens
        if response.status().is_client_error() {
            return Err(GoogleError::InvalidToken);
        }
        if !response.status().is_success() {
            return Err(GoogleError::Upstream(format!(
                "tokeninfo returned {}",
                response.status()
            )));
        }

        let info: TokenInfo = response
            .json()
            .await
            .map_err(|e| GoogleError::Upstream(e.to_string()))?;

        profile_from_token_info(info, client_id)
    }

    /// Exchanges the code from the redirect flow and fetches the signed-in account
    pub async fn profile_from_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<GoogleProfile, GoogleError> {
        let access_token = self.exchange_code(code, redirect_uri).await?;
        self.user_info(&access_token).await
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, GoogleError> {
        let client_id = self.client_id()?;
        let client_secret = self
            .client_secret
            .as_deref()
            .ok_or(GoogleError::NotConfigured)?;

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| GoogleError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Google token exchange failed");
            return Err(GoogleError::Upstream(format!(
                "token exchange returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GoogleError::Upstream(e.to_string()))?;

        Ok(token.access_token)
    }

    async fn user_info(&self, access_token: &str) -> Result<GoogleProfile, GoogleError> {
        let response = self
            .client
            .get(USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| GoogleError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GoogleError::Upstream(format!(
                "userinfo returned {}",
                response.status()
            )));
        }

        let info: UserInfo = response
            .json()
            .await
            .map_err(|e| GoogleError::Upstream(e.to_string()))?;

        let email = info
            .email
            .ok_or_else(|| GoogleError::Upstream("userinfo did not include an email".into()))?;

        Ok(GoogleProfile {
            google_id: info.id,
            email,
            given_name: info.given_name,
            family_name: info.family_name,
            picture: info.picture,
        })
    }
}

fn profile_from_token_info(info: TokenInfo, client_id: &str) -> Result<GoogleProfile, GoogleError> {
    if info.aud != client_id || !ISSUERS.contains(&info.iss.as_str()) {
        return Err(GoogleError::InvalidToken);
    }
    let email = info.email.ok_or(GoogleError::InvalidToken)?;

    Ok(GoogleProfile {
        google_id: info.sub,
        email,
        given_name: info.given_name,
        family_name: info.family_name,
        picture: info.picture,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_info(aud: &str) -> TokenInfo {
        serde_json::from_value(serde_json::json!({
            "aud": aud,
            "iss": "https://accounts.google.com",
            "sub": "110169484474386276334",
            "email": "grace@example.com",
            "email_verified": "true",
            "given_name": "Grace",
            "family_name": "Hopper",
            "exp": "1700000000"
        }))
        .unwrap()
    }

    #[test]
    fn token_for_this_client_is_accepted() {
        let profile = profile_from_token_info(token_info("client-1"), "client-1").unwrap();
        assert_eq!(profile.google_id, "110169484474386276334");
        assert_eq!(profile.email, "grace@example.com");
        assert_eq!(profile.first_name(), "Grace");
    }

    #[test]
    fn token_for_another_client_is_rejected() {
        assert!(matches!(
            profile_from_token_info(token_info("someone-else"), "client-1"),
            Err(GoogleError::InvalidToken)
        ));
    }

    #[test]
    fn blank_names_fall_back() {
        let profile = GoogleProfile {
            google_id: "1".into(),
            email: "x@example.com".into(),
            given_name: Some("  ".into()),
            family_name: None,
            picture: None,
        };
        assert_eq!(profile.first_name(), "Google User");
        assert_eq!(profile.last_name(), "User");
    }

    #[tokio::test]
    async fn unconfigured_client_refuses() {
        let google = GoogleAuth::new(&AuthConfig::default());
        assert!(matches!(
            google.verify_id_token("abc").await,
            Err(GoogleError::NotConfigured)
        ));
        assert!(matches!(
            google.profile_from_code("code", "http://localhost").await,
            Err(GoogleError::NotConfigured)
        ));
    }

    #[test]
    fn errors_map_to_statuses() {
        use axum::http::StatusCode;
        assert_eq!(ApiError::from(GoogleError::InvalidToken).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(GoogleError::Upstream("boom".into())).status(),
            StatusCode::BAD_GATEWAY
        );
    }
}
