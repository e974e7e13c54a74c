//! Session storage. Tokens are handed to the client once and only their digest is kept.

use base64::{Engine, prelude::BASE64_STANDARD};
use chrono::{TimeDelta, Utc};
use sha2::{Digest, Sha512};
use sqlx::{PgPool, Row};

use crate::model::user::User;

fn session_hash(session_id: &[u8]) -> Vec<u8> {
    Sha512::digest(session_id).to_vec()
}

/// Starts a new session for the user, ending any previous one, and returns the base64 token
pub async fn create_session(
    pool: &PgPool,
    user_id: i64,
    ttl: TimeDelta,
) -> Result<String, sqlx::Error> {
    let mut session_id = [0u8; 16];
    rand::fill(&mut session_id);

    let mut transaction = pool.begin().await?;

    sqlx::query("DELETE FROM sessions WHERE expiration < now();")
        .execute(&mut *transaction)
        .await?;

    // Clear previous sessions
    sqlx::query("DELETE FROM sessions WHERE user_id = $1;")
        .bind(user_id)
        .execute(&mut *transaction)
        .await?;

    sqlx::query("INSERT INTO sessions (session_hash, user_id, expiration) VALUES ($1, $2, $3);")
        .bind(session_hash(&session_id))
        .bind(user_id)
        .bind(Utc::now() + ttl)
        .execute(&mut *transaction)
        .await?;

    transaction.commit().await?;

    tracing::info!(user_id, "Session started");
    Ok(BASE64_STANDARD.encode(session_id))
}

/// Resolves a token to its active user. Malformed, unknown and expired tokens all yield `None`.
pub async fn user_from_session(pool: &PgPool, token: &str) -> Result<Option<User>, sqlx::Error> {
    let Ok(session_id) = BASE64_STANDARD.decode(token) else {
        return Ok(None);
    };

    let row = sqlx::query(
        "SELECT u.id, u.email, u.first_name, u.last_name, u.role, u.auth_provider, u.google_id,
                u.profile_picture_url, u.is_active, u.created_at, s.expiration
         FROM sessions s JOIN users u ON u.id = s.user_id
         WHERE s.session_hash = $1;",
    )
    .bind(session_hash(&session_id))
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let expiration: chrono::DateTime<Utc> = row.try_get("expiration")?;
    if Utc::now() > expiration {
        return Ok(None);
    }

    let user = User::from_row(&row)?;
    Ok(user.is_active.then_some(user))
}

/// Ends the session identified by the token, if it exists
pub async fn delete_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    let Ok(session_id) = BASE64_STANDARD.decode(token) else {
        return Ok(());
    };

    sqlx::query("DELETE FROM sessions WHERE session_hash = $1;")
        .bind(session_hash(&session_id))
        .execute(pool)
        .await?;

    Ok(())
}
