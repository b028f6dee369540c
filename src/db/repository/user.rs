use sqlx::SqlitePool;

use crate::db::models::User;
use crate::error::{AppError, AppResult};

pub struct UserRepository;

impl UserRepository {
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, phone, email, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(user)
    }

    /// Accounts are created by the account system; tests seed them here.
    #[cfg(test)]
    pub async fn create(
        pool: &SqlitePool,
        id: &str,
        username: &str,
        phone: Option<&str>,
    ) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, phone, email)
            VALUES (?, ?, ?, ?)
            RETURNING id, username, phone, email, created_at
            "#,
        )
        .bind(id)
        .bind(username)
        .bind(phone)
        .bind(format!("{}@example.com", username))
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(user)
    }
}
