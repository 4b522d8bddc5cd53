use crate::auth::repo_types::UserRow;
use crate::error::AppError;
use sqlx::PgPool;

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, updated_at";

pub async fn find_by_id(db: &PgPool, id: i32) -> Result<Option<UserRow>, AppError> {
    let user = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// Batch lookup used by the user loader.
pub async fn find_by_ids(db: &PgPool, ids: &[i32]) -> Result<Vec<UserRow>, sqlx::Error> {
    sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
    ))
    .bind(ids)
    .fetch_all(db)
    .await
}

pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<UserRow>, AppError> {
    let user = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn find_by_username(db: &PgPool, username: &str) -> Result<Option<UserRow>, AppError> {
    let user = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// Insert a user. Unique violations come back as `AppError::Database`.
pub async fn create(
    db: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<UserRow, AppError> {
    let user = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        INSERT INTO users (username, email, password_hash)
        VALUES ($1, $2, $3)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .fetch_one(db)
    .await?;
    Ok(user)
}

pub async fn update_password(
    db: &PgPool,
    id: i32,
    password_hash: &str,
) -> Result<Option<UserRow>, AppError> {
    let user = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        UPDATE users
           SET password_hash = $2, updated_at = now()
         WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(id)
    .bind(password_hash)
    .fetch_optional(db)
    .await?;
    Ok(user)
}
