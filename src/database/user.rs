use sha2::{Digest, Sha512};
use sqlx::{PgPool, Row};

use crate::database::is_unique_violation;
use crate::error::ApiError;
use crate::google::GoogleProfile;
use crate::model::request::{RegisterRequest, normalize_email};
use crate::model::user::{AuthProvider, Role, User};

const USER_COLUMNS: &str = "id, email, first_name, last_name, role, auth_provider, google_id, \
                            profile_picture_url, is_active, created_at";

/// Digest of the password with the salt split around it
fn create_hash(salt: &[u8], pass: impl AsRef<[u8]>) -> Vec<u8> {
    let (first_half, last_half) = salt.split_at(salt.len() / 2);
    let secret_sauce = [first_half, pass.as_ref(), last_half].concat();
    Sha512::digest(secret_sauce).to_vec()
}

/// A Google id can belong to only one account
fn google_account_conflict(e: sqlx::Error) -> ApiError {
    if is_unique_violation(&e) {
        ApiError::BadRequest("This Google account is already linked to another user".into())
    } else {
        e.into()
    }
}

/// Creates a local account. The request must already be validated.
pub async fn register(pool: &PgPool, req: &RegisterRequest, role: Role) -> Result<User, ApiError> {
    let mut salt = [0u8; 16];
    rand::fill(&mut salt);
    let hash = create_hash(&salt, &req.password);

    let mut transaction = pool.begin().await?;

    let row = match sqlx::query(&format!(
        "INSERT INTO users (email, first_name, last_name, role, auth_provider)
         VALUES ($1, $2, $3, $4, 'LOCAL') RETURNING {USER_COLUMNS};"
    ))
    .bind(normalize_email(&req.email))
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(role.as_str())
    .fetch_one(&mut *transaction)
    .await
    {
        Ok(row) => row,
        Err(e) if is_unique_violation(&e) => {
            return Err(ApiError::BadRequest("Email is already registered".into()));
        }
        Err(e) => return Err(e.into()),
    };
    let user = User::from_row(&row)?;

    sqlx::query("INSERT INTO user_auth (user_id, salt, hash) VALUES ($1, $2, $3);")
        .bind(user.id)
        .bind(&salt[..])
        .bind(hash)
        .execute(&mut *transaction)
        .await?;

    transaction.commit().await?;

    tracing::info!(user_id = user.id, role = %role, "User created");
    Ok(user)
}

/// Returns the user only when the email exists, the password matches and the account is active
pub async fn verify_credentials(
    pool: &PgPool,
    email: &str,
    password: &str,
) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {USER_COLUMNS}, a.salt, a.hash FROM users u
         JOIN user_auth a ON a.user_id = u.id WHERE u.email = $1;"
    ))
    .bind(normalize_email(email))
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let salt: Vec<u8> = row.try_get("salt")?;
    let stored: Vec<u8> = row.try_get("hash")?;
    if create_hash(&salt, password) != stored {
        return Ok(None);
    }

    let user = User::from_row(&row)?;
    Ok(user.is_active.then_some(user))
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1;"))
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await?
        .map(|row| User::from_row(&row))
        .transpose()
}

/// Finds the account for a verified Google profile, creating or linking one as needed.
///
/// An existing account with the same email is linked to the Google id and keeps its role.
/// A new account gets `role`, which may be absent until the user picks one.
pub async fn find_or_create_google_user(
    pool: &PgPool,
    profile: &GoogleProfile,
    role: Option<Role>,
) -> Result<User, ApiError> {
    if let Some(existing) = find_by_email(pool, &profile.email).await? {
        if !existing.is_active {
            return Err(ApiError::Unauthorized);
        }

        let row = sqlx::query(&format!(
            "UPDATE users SET google_id = $1,
                profile_picture_url = COALESCE($2, profile_picture_url)
             WHERE id = $3 RETURNING {USER_COLUMNS};"
        ))
        .bind(&profile.google_id)
        .bind(profile.picture.as_deref())
        .bind(existing.id)
        .fetch_one(pool)
        .await
        .map_err(google_account_conflict)?;

        return Ok(User::from_row(&row)?);
    }

    let row = sqlx::query(&format!(
        "INSERT INTO users (email, first_name, last_name, role, auth_provider, google_id, profile_picture_url)
         VALUES ($1, $2, $3, $4, 'GOOGLE', $5, $6) RETURNING {USER_COLUMNS};"
    ))
    .bind(normalize_email(&profile.email))
    .bind(profile.first_name())
    .bind(profile.last_name())
    .bind(role.map(|r| r.as_str()))
    .bind(&profile.google_id)
    .bind(profile.picture.as_deref())
    .fetch_one(pool)
    .await
    .map_err(google_account_conflict)?;

    let user = User::from_row(&row)?;
    tracing::info!(user_id = user.id, provider = AuthProvider::Google.as_str(), "User created");
    Ok(user)
}

pub async fn update_role(pool: &PgPool, user_id: i64, role: Role) -> Result<User, sqlx::Error> {
    let row = sqlx::query(&format!(
        "UPDATE users SET role = $1 WHERE id = $2 RETURNING {USER_COLUMNS};"
    ))
    .bind(role.as_str())
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    User::from_row(&row)
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::error::Error as StdError;

    use sqlx::error::{DatabaseError, ErrorKind};

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("duplicate key value violates unique constraint")]
    struct Violation {
        unique: bool,
    }

    impl DatabaseError for Violation {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint \"users_google_id_key\""
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed("23505"))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            if self.unique {
                ErrorKind::UniqueViolation
            } else {
                ErrorKind::Other
            }
        }
    }

    #[test]
    fn linked_google_id_is_a_bad_request() {
        let err = sqlx::Error::Database(Box::new(Violation { unique: true }));
        let ApiError::BadRequest(message) = google_account_conflict(err) else {
            panic!("expected a bad request");
        };
        assert_eq!(message, "This Google account is already linked to another user");
    }

    #[test]
    fn other_database_errors_stay_internal() {
        let err = sqlx::Error::Database(Box::new(Violation { unique: false }));
        assert!(matches!(google_account_conflict(err), ApiError::Database(_)));
        assert!(matches!(
            google_account_conflict(sqlx::Error::RowNotFound),
            ApiError::Database(_)
        ));
    }

    #[test]
    fn hash_depends_on_salt_and_password() {
        let a = create_hash(b"0123456789abcdef", "hunter22");
        assert_eq!(a, create_hash(b"0123456789abcdef", "hunter22"));
        assert_ne!(a, create_hash(b"0123456789abcdeF", "hunter22"));
        assert_ne!(a, create_hash(b"0123456789abcdef", "hunter23"));
        assert_eq!(a.len(), 64);
    }
}
