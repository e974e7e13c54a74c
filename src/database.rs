use sqlx::{Executor, PgPool, postgres::PgPoolOptions};

use crate::config::DatabaseConfig;

pub mod annotation;
pub mod assignment;
pub mod auth;
pub mod submission;
pub mod user;

/// Connects to Postgres and creates the `portal` schema and its tables if they do not exist yet
pub async fn init_database(config: &DatabaseConfig) -> Result<PgPool, String> {
    let pool = match PgPoolOptions::new()
        .max_connections(config.max_connections)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET search_path TO portal;").await?;
                Ok(())
            })
        })
        .connect(&config.connection_url())
        .await
    {
        Ok(p) => p,
        Err(e) => {
            return Err(format!("Could not connect to the database: {e}"));
        }
    };

    let mut transaction = match pool.begin().await {
        Ok(t) => t,
        Err(e) => return Err(format!("Could not begin schema transaction: {e}")),
    };

    if let Err(e) = sqlx::query("CREATE SCHEMA IF NOT EXISTS portal;")
        .execute(&mut *transaction)
        .await
    {
        return Err(format!("Could not create schema 'portal': {e}"));
    }

    if let Err(e) = sqlx::query(
        "CREATE TABLE IF NOT EXISTS portal.users(
            id BIGINT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
            email TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            role TEXT,
            auth_provider TEXT NOT NULL DEFAULT 'LOCAL',
            google_id TEXT UNIQUE,
            profile_picture_url TEXT,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );",
    )
    .execute(&mut *transaction)
    .await
    {
        return Err(format!("Could not create table users: {e}"));
    }

    // Only local accounts have a row here
    if let Err(e) = sqlx::query(
        "CREATE TABLE IF NOT EXISTS portal.user_auth(
            user_id BIGINT PRIMARY KEY REFERENCES portal.users (id) ON DELETE CASCADE,
            salt BYTEA NOT NULL,
            hash BYTEA NOT NULL
        );",
    )
    .execute(&mut *transaction)
    .await
    {
        return Err(format!("Could not create table user_auth: {e}"));
    }

    if let Err(e) = sqlx::query(
        "CREATE TABLE IF NOT EXISTS portal.sessions(
            session_hash BYTEA PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES portal.users (id) ON DELETE CASCADE,
            expiration TIMESTAMPTZ NOT NULL
        );",
    )
    .execute(&mut *transaction)
    .await
    {
        return Err(format!("Could not create table sessions: {e}"));
    }

    if let Err(e) = sqlx::query(
        "CREATE TABLE IF NOT EXISTS portal.assignments(
            id BIGINT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
            title VARCHAR(255) NOT NULL,
            description TEXT,
            assignment_code CHAR(5) NOT NULL UNIQUE,
            created_by BIGINT NOT NULL REFERENCES portal.users (id),
            deadline TIMESTAMPTZ NOT NULL,
            max_marks INTEGER NOT NULL DEFAULT 100 CHECK (max_marks > 0),
            instructions TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            is_active BOOLEAN NOT NULL DEFAULT TRUE
        );",
    )
    .execute(&mut *transaction)
    .await
    {
        return Err(format!("Could not create table assignments: {e}"));
    }

    if let Err(e) = sqlx::query(
        "CREATE TABLE IF NOT EXISTS portal.submissions(
            id BIGINT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
            assignment_id BIGINT NOT NULL REFERENCES portal.assignments (id),
            student_id BIGINT NOT NULL REFERENCES portal.users (id),
            file_path TEXT NOT NULL,
            original_filename TEXT NOT NULL,
            file_size BIGINT NOT NULL,
            submitted_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            status TEXT NOT NULL DEFAULT 'UPLOADED',
            marks_obtained INTEGER,
            feedback TEXT,
            corrected_file_path TEXT,
            corrected_filename TEXT,
            graded_at TIMESTAMPTZ,
            graded_by BIGINT REFERENCES portal.users (id),
            is_late_submission BOOLEAN NOT NULL DEFAULT FALSE,
            CONSTRAINT one_submission_per_student UNIQUE (assignment_id, student_id)
        );",
    )
    .execute(&mut *transaction)
    .await
    {
        return Err(format!("Could not create table submissions: {e}"));
    }

    if let Err(e) = sqlx::query(
        "CREATE TABLE IF NOT EXISTS portal.annotations(
            id BIGINT PRIMARY KEY GENERATED ALWAYS AS IDENTITY,
            submission_id BIGINT NOT NULL REFERENCES portal.submissions (id) ON DELETE CASCADE,
            page_number INTEGER NOT NULL CHECK (page_number >= 1),
            annotation_type TEXT NOT NULL,
            x DOUBLE PRECISION NOT NULL,
            y DOUBLE PRECISION NOT NULL,
            width DOUBLE PRECISION NOT NULL,
            height DOUBLE PRECISION NOT NULL,
            comment TEXT,
            color TEXT,
            created_by BIGINT NOT NULL REFERENCES portal.users (id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        );",
    )
    .execute(&mut *transaction)
    .await
    {
        return Err(format!("Could not create table annotations: {e}"));
    }

    if let Err(e) = transaction.commit().await {
        return Err(format!("Could not commit table-creation transaction: {e}"));
    }

    Ok(pool)
}

/// True when the error came from a UNIQUE constraint
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|d| d.is_unique_violation())
        .unwrap_or(false)
}
