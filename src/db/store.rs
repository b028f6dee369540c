//! Narrow interfaces the wishlist core depends on, plus their SQLite
//! implementations.
//!
//! The scheduler and the wishlist service only see these traits, so tests
//! can swap in in-memory doubles and another engine can be plugged in
//! without touching the core.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::db::models::{NewWishlistEntry, WishlistEntry};
use crate::db::repository::{UserRepository, WishlistRepository};
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait WishlistStore: Send + Sync + 'static {
    /// Persist a new entry with `notified = false`. Never drops a write
    /// silently; storage failures surface as an error.
    async fn add(&self, entry: NewWishlistEntry) -> AppResult<WishlistEntry>;

    /// Every entry with `notified = false`, in no particular order.
    async fn list_pending(&self) -> AppResult<Vec<WishlistEntry>>;

    /// Atomically set `notified = true`. `AppError::NotFound` for an unknown id.
    async fn mark_notified(&self, id: &str) -> AppResult<()>;

    async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<WishlistEntry>>;
}

/// Read-only view of the account store used to find where to send alerts.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Contact address (phone number) of the user. `AppError::Resolution`
    /// when the user is unknown or has no number on file.
    async fn resolve_destination(&self, user_id: &str) -> AppResult<String>;
}

/// Await a store or directory call for at most `limit`. An elapsed call
/// becomes `AppError::Timeout` and is treated like any other failure.
pub async fn bounded<T, F>(what: &str, limit: Duration, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        AppError::Timeout(format!("{} exceeded {}s", what, limit.as_secs()))
    })?
}

#[derive(Clone)]
pub struct SqliteWishlistStore {
    pool: SqlitePool,
}

impl SqliteWishlistStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WishlistStore for SqliteWishlistStore {
    async fn add(&self, entry: NewWishlistEntry) -> AppResult<WishlistEntry> {
        WishlistRepository::create(&self.pool, entry).await
    }

    async fn list_pending(&self) -> AppResult<Vec<WishlistEntry>> {
        WishlistRepository::list_pending(&self.pool).await
    }

    async fn mark_notified(&self, id: &str) -> AppResult<()> {
        WishlistRepository::mark_notified(&self.pool, id).await
    }

    async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<WishlistEntry>> {
        WishlistRepository::list_by_user(&self.pool, user_id).await
    }
}

#[derive(Clone)]
pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn resolve_destination(&self, user_id: &str) -> AppResult<String> {
        let user = UserRepository::find_by_id(&self.pool, user_id)
            .await?
            .ok_or_else(|| AppError::Resolution(user_id.to_string()))?;

        user.phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| AppError::Resolution(user_id.to_string()))
    }
}
