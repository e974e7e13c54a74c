//! Authentication middleware and the extractors handlers use to demand a role.
//!
//! `handle_basic_auth` resolves the session token to a user and stores it in the request
//! extensions. `handle_embedded_auth` does the same for the inline PDF view, where the token
//! may also arrive as `?token=`. The `AuthUser`, `Teacher` and `Student` extractors then read it back, rejecting
//! with 401 when no user was attached and 403 when the role does not match.

use axum::{
    body::Body,
    extract::{FromRequestParts, Query, State},
    http::{Request, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::database;
use crate::error::ApiError;
use crate::model::request::TokenQuery;
use crate::model::user::{Role, User};
use crate::state::AppState;

/// The raw token of the session that authenticated the request
#[derive(Debug, Clone)]
pub struct CurrentSession(pub String);

/// Where a request may carry its session token
#[derive(Debug, Clone, Copy, PartialEq)]
enum TokenSource {
    Header,
    /// The header, falling back to `?token=` for PDFs embedded where headers cannot be set
    HeaderOrQuery,
}

/// Checks to see if the user is authenticated.
pub async fn handle_basic_auth(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    authenticate(&state, request, next, TokenSource::Header).await
}

/// Like `handle_basic_auth`, but also accepts the token as a query parameter
pub async fn handle_embedded_auth(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    authenticate(&state, request, next, TokenSource::HeaderOrQuery).await
}

async fn authenticate(
    state: &AppState,
    mut request: Request<Body>,
    next: Next,
    source: TokenSource,
) -> Response {
    let Some(token) = session_token(&request, source) else {
        return ApiError::Unauthorized.into_response();
    };

    let user = match database::auth::user_from_session(&state.pool, &token).await {
        Ok(Some(user)) => user,
        Ok(None) => return ApiError::Unauthorized.into_response(),
        Err(e) => return ApiError::from(e).into_response(),
    };

    tracing::debug!(user_id = user.id, "Authenticated request");

    request.extensions_mut().insert(user);
    request.extensions_mut().insert(CurrentSession(token));
    next.run(request).await
}

/// Reads the token from `Authorization: Bearer <token>`, then from `?token=` when allowed
fn session_token(request: &Request<Body>, source: TokenSource) -> Option<String> {
    let from_header = request
        .headers()
        .get(&AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned);

    if from_header.is_some() || source == TokenSource::Header {
        return from_header;
    }

    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.token)
        // An unescaped '+' in a query string decodes to a space
        .map(|t| t.trim().replace(' ', "+"))
        .filter(|t| !t.is_empty())
}

/// Any signed-in user
pub struct AuthUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(AuthUser)
            .ok_or(ApiError::Unauthorized)
    }
}

pub struct Teacher(pub User);

impl<S: Send + Sync> FromRequestParts<S> for Teacher {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.has_role(Role::Teacher) {
            Ok(Teacher(user))
        } else {
            Err(ApiError::access_denied())
        }
    }
}

pub struct Student(pub User);

impl<S: Send + Sync> FromRequestParts<S> for Student {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.has_role(Role::Student) {
            Ok(Student(user))
        } else {
            Err(ApiError::access_denied())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::user::tests::user;

    fn request(uri: &str, auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    use TokenSource::{Header, HeaderOrQuery};

    #[test]
    fn bearer_prefix_is_optional() {
        assert_eq!(
            session_token(&request("/api/x", Some("Bearer abc123==")), Header).as_deref(),
            Some("abc123==")
        );
        assert_eq!(
            session_token(&request("/api/x", Some("abc123==")), Header).as_deref(),
            Some("abc123==")
        );
    }

    #[test]
    fn query_token_is_a_fallback_where_allowed() {
        assert_eq!(
            session_token(
                &request("/api/submissions/view/3?token=a%2Bb%3D%3D", None),
                HeaderOrQuery
            )
            .as_deref(),
            Some("a+b==")
        );
        assert_eq!(
            session_token(&request("/api/submissions/view/3?token=a+b", None), HeaderOrQuery)
                .as_deref(),
            Some("a+b")
        );
        assert_eq!(
            session_token(&request("/api/x?token=q", Some("Bearer h")), HeaderOrQuery).as_deref(),
            Some("h")
        );
    }

    #[test]
    fn query_token_is_ignored_elsewhere() {
        assert!(session_token(&request("/api/assignments?token=abc", None), Header).is_none());
        assert_eq!(
            session_token(&request("/api/assignments?token=q", Some("Bearer h")), Header)
                .as_deref(),
            Some("h")
        );
    }

    #[test]
    fn missing_token() {
        assert!(session_token(&request("/api/x", None), HeaderOrQuery).is_none());
        assert!(session_token(&request("/api/x", Some("Bearer ")), Header).is_none());
        assert!(session_token(&request("/api/x?token=", None), HeaderOrQuery).is_none());
    }

    #[tokio::test]
    async fn role_extractors() {
        let (mut parts, _) = request("/", None).into_parts();
        assert!(matches!(
            AuthUser::from_request_parts(&mut parts, &()).await,
            Err(ApiError::Unauthorized)
        ));

        parts.extensions.insert(user(1, Some(Role::Student)));
        assert!(Student::from_request_parts(&mut parts, &()).await.is_ok());
        assert!(matches!(
            Teacher::from_request_parts(&mut parts, &()).await,
            Err(ApiError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn role_less_users_are_neither() {
        let (mut parts, _) = request("/", None).into_parts();
        parts.extensions.insert(user(1, None));
        assert!(AuthUser::from_request_parts(&mut parts, &()).await.is_ok());
        assert!(Student::from_request_parts(&mut parts, &()).await.is_err());
        assert!(Teacher::from_request_parts(&mut parts, &()).await.is_err());
    }
}
