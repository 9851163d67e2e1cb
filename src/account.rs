use argon2::{
    Argon2, PasswordVerifier,
    password_hash::{PasswordHash, PasswordHasher, SaltString, rand_core::OsRng},
};
use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::error::ApiError;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(stored_hash: &str, password: &str) -> Result<(), ApiError> {
    let parsed_hash = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Validation("Invalid credentials".to_string()))?;
    Ok(())
}

/// Creates a user keyed by email-as-username. The email UNIQUE constraint
/// is the duplicate check, so a concurrent double signup loses cleanly.
pub async fn signup(
    database: &SqlitePool,
    email: &str,
    password: &str,
    password_confirm: &str,
) -> Result<i64, ApiError> {
    if email.is_empty() || password.is_empty() || password_confirm.is_empty() {
        return Err(ApiError::Validation(
            "All fields (email, password1, password2) are required".to_string(),
        ));
    }
    if password != password_confirm {
        return Err(ApiError::Validation("Passwords do not match".to_string()));
    }
    let password_hash = hash_password(password)?;
    let now = OffsetDateTime::now_utc();
    let result = sqlx::query("INSERT INTO user (email, password, created_at) VALUES (?, ?, ?)")
        .bind(email)
        .bind(&password_hash)
        .bind(now)
        .execute(database)
        .await
        .map_err(|e| ApiError::conflict_or_db(e, "Email already registered!"))?;
    Ok(result.last_insert_rowid())
}

/// Verifies credentials and returns the user id. Unknown email and bad
/// password answer identically.
pub async fn login(database: &SqlitePool, email: &str, password: &str) -> Result<i64, ApiError> {
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "Email and password are required".to_string(),
        ));
    }
    let row =
        sqlx::query_as::<_, (i64, String)>("SELECT id, password FROM user WHERE email = ?")
            .bind(email)
            .fetch_optional(database)
            .await?;
    let Some((id, stored_hash)) = row else {
        return Err(ApiError::Validation("Invalid credentials".to_string()));
    };
    verify_password(&stored_hash, password)?;
    Ok(id)
}

pub async fn get_user_info(database: &SqlitePool, id: i64) -> Result<UserInfo, ApiError> {
    sqlx::query_as::<_, UserInfo>("SELECT id, email FROM user WHERE id = ?")
        .bind(id)
        .fetch_optional(database)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

pub async fn list_users(database: &SqlitePool) -> Result<Vec<UserInfo>, ApiError> {
    Ok(
        sqlx::query_as::<_, UserInfo>("SELECT id, email FROM user ORDER BY id")
            .fetch_all(database)
            .await?,
    )
}

/// Back-office credentials live in their own table, provisioned
/// out-of-band rather than through signup.
pub async fn create_manager(
    database: &SqlitePool,
    email: &str,
    password: &str,
) -> Result<i64, ApiError> {
    let password_hash = hash_password(password)?;
    let result = sqlx::query("INSERT INTO manager (email, password) VALUES (?, ?)")
        .bind(email)
        .bind(&password_hash)
        .execute(database)
        .await
        .map_err(|e| ApiError::conflict_or_db(e, "Manager already registered!"))?;
    Ok(result.last_insert_rowid())
}

pub async fn manager_login(
    database: &SqlitePool,
    email: &str,
    password: &str,
) -> Result<i64, ApiError> {
    let row =
        sqlx::query_as::<_, (i64, String)>("SELECT id, password FROM manager WHERE email = ?")
            .bind(email)
            .fetch_optional(database)
            .await?;
    let Some((id, stored_hash)) = row else {
        return Err(ApiError::Validation("Invalid credentials".to_string()));
    };
    verify_password(&stored_hash, password)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_pool;

    #[tokio::test]
    async fn signup_then_login() {
        let pool = test_pool().await;
        let id = signup(&pool, "a@x.com", "p1", "p1").await.unwrap();
        assert!(id > 0);
        let logged_in = login(&pool, "a@x.com", "p1").await.unwrap();
        assert_eq!(logged_in, id);
        let info = get_user_info(&pool, id).await.unwrap();
        assert_eq!(info.email, "a@x.com");
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let pool = test_pool().await;
        signup(&pool, "a@x.com", "p1", "p1").await.unwrap();
        let err = signup(&pool, "a@x.com", "p1", "p1").await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(err.to_string(), "Email already registered!");
    }

    #[tokio::test]
    async fn mismatched_passwords_rejected() {
        let pool = test_pool().await;
        let err = signup(&pool, "a@x.com", "p1", "p2").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(err.to_string(), "Passwords do not match");
    }

    #[tokio::test]
    async fn missing_fields_rejected() {
        let pool = test_pool().await;
        let err = signup(&pool, "", "p1", "p1").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn bad_credentials_rejected() {
        let pool = test_pool().await;
        signup(&pool, "a@x.com", "p1", "p1").await.unwrap();
        let err = login(&pool, "a@x.com", "wrong").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = login(&pool, "nobody@x.com", "p1").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn manager_login_checks_hash() {
        let pool = test_pool().await;
        let id = create_manager(&pool, "admin@x.com", "secret").await.unwrap();
        assert_eq!(manager_login(&pool, "admin@x.com", "secret").await.unwrap(), id);
        assert!(manager_login(&pool, "admin@x.com", "nope").await.is_err());
    }
}
