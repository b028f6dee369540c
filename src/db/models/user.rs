use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account record owned by the account system. Read-only here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Local subscriber number, normalized before dispatch.
    pub phone: Option<String>,
    pub email: String,
    pub created_at: NaiveDateTime,
}
