use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::db::models::{NewWishlistEntry, WishlistEntry};
use crate::error::{AppError, AppResult};

/// Repository for wishlist entries.
///
/// Timestamps are stored as RFC 3339 text with an explicit offset so the
/// add path and the scan path always agree on the instant. Rows whose
/// timestamps fail to parse are logged and skipped by the list queries
/// instead of failing the whole read.
pub struct WishlistRepository;

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, user_id, title, platform, price,
        expiry_time, notified, notified_at, created_at
    FROM wishlist
"#;

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

fn map_row(r: &SqliteRow) -> Result<WishlistEntry, String> {
    let id: String = r.try_get("id").map_err(|e| e.to_string())?;

    let parse = |column: &str| -> Result<DateTime<Utc>, String> {
        let raw: String = r.try_get(column).map_err(|e| e.to_string())?;
        parse_timestamp(&raw).map_err(|e| format!("{} {:?}: {}", column, raw, e))
    };

    let notified_at = match r
        .try_get::<Option<String>, _>("notified_at")
        .map_err(|e| e.to_string())?
    {
        Some(raw) => Some(
            parse_timestamp(&raw).map_err(|e| format!("notified_at {:?}: {}", raw, e))?,
        ),
        None => None,
    };

    Ok(WishlistEntry {
        user_id: r.try_get("user_id").map_err(|e| e.to_string())?,
        title: r.try_get("title").map_err(|e| e.to_string())?,
        platform: r.try_get("platform").map_err(|e| e.to_string())?,
        price: r.try_get("price").map_err(|e| e.to_string())?,
        expiry_time: parse("expiry_time")?,
        notified: r.try_get("notified").map_err(|e| e.to_string())?,
        notified_at,
        created_at: parse("created_at")?,
        id,
    })
}

fn map_rows(rows: Vec<SqliteRow>) -> Vec<WishlistEntry> {
    rows.iter()
        .filter_map(|r| match map_row(r) {
            Ok(entry) => Some(entry),
            Err(e) => {
                let id: Option<String> = r.try_get("id").ok();
                tracing::warn!(
                    "Skipping malformed wishlist row {}: {}",
                    id.as_deref().unwrap_or("<unknown>"),
                    e
                );
                None
            }
        })
        .collect()
}

impl WishlistRepository {
    /// Persist a new entry with `notified = false`.
    pub async fn create(pool: &SqlitePool, entry: NewWishlistEntry) -> AppResult<WishlistEntry> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO wishlist (
                id, user_id, title, platform, price,
                expiry_time, notified, notified_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, 0, NULL, ?)
            "#,
        )
        .bind(&id)
        .bind(&entry.user_id)
        .bind(&entry.title)
        .bind(&entry.platform)
        .bind(&entry.price)
        .bind(entry.expiry_time.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(WishlistEntry {
            id,
            user_id: entry.user_id,
            title: entry.title,
            platform: entry.platform,
            price: entry.price,
            expiry_time: entry.expiry_time,
            notified: false,
            notified_at: None,
            created_at: now,
        })
    }

    /// All entries that still wait for their notification.
    pub async fn list_pending(pool: &SqlitePool) -> AppResult<Vec<WishlistEntry>> {
        let rows = sqlx::query(&format!("{} WHERE notified = 0", SELECT_COLUMNS))
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(map_rows(rows))
    }

    /// Entries of a single user, newest first.
    pub async fn list_by_user(pool: &SqlitePool, user_id: &str) -> AppResult<Vec<WishlistEntry>> {
        let rows = sqlx::query(&format!(
            "{} WHERE user_id = ? ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(map_rows(rows))
    }

    /// Set `notified = 1` in a single statement. Marking an already notified
    /// entry is a no-op that keeps the first `notified_at`.
    pub async fn mark_notified(pool: &SqlitePool, id: &str) -> AppResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE wishlist
            SET notified = 1, notified_at = COALESCE(notified_at, ?)
            WHERE id = ?
            "#,
        )
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("wishlist entry {}", id)));
        }

        Ok(())
    }

    #[cfg(test)]
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> AppResult<Option<WishlistEntry>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(AppError::Database)?;

        row.map(|r| map_row(&r).map_err(AppError::Persistence))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::UserRepository;
    use crate::test_utils::memory_pool;

    /// Entries reference `users(id)`, so the owners must exist first.
    async fn pool_with_users() -> SqlitePool {
        let pool = memory_pool().await;
        UserRepository::create(&pool, "u1", "asha", Some("9876543210"))
            .await
            .unwrap();
        UserRepository::create(&pool, "u2", "ravi", Some("9123456780"))
            .await
            .unwrap();
        pool
    }

    fn new_entry(user_id: &str, title: &str, expiry_time: DateTime<Utc>) -> NewWishlistEntry {
        NewWishlistEntry {
            user_id: user_id.to_string(),
            title: title.to_string(),
            platform: "Flipkart".to_string(),
            price: "₹1,299".to_string(),
            expiry_time,
        }
    }

    #[tokio::test]
    async fn create_then_list_pending_sees_the_write() {
        let pool = pool_with_users().await;
        let expiry = Utc::now() + chrono::Duration::minutes(5);

        let created = WishlistRepository::create(&pool, new_entry("u1", "Kettle", expiry))
            .await
            .unwrap();
        assert!(!created.notified);
        assert!(!created.id.is_empty());

        let pending = WishlistRepository::list_pending(&pool).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, created.id);
        assert_eq!(pending[0].title, "Kettle");
        assert_eq!(pending[0].price, "₹1,299");
        assert_eq!(pending[0].expiry_time.timestamp(), expiry.timestamp());
    }

    #[tokio::test]
    async fn mark_notified_removes_entry_from_pending_and_is_idempotent() {
        let pool = pool_with_users().await;
        let expiry = Utc::now() + chrono::Duration::minutes(5);
        let a = WishlistRepository::create(&pool, new_entry("u1", "A", expiry))
            .await
            .unwrap();
        let b = WishlistRepository::create(&pool, new_entry("u1", "B", expiry))
            .await
            .unwrap();

        WishlistRepository::mark_notified(&pool, &a.id).await.unwrap();

        let pending = WishlistRepository::list_pending(&pool).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);

        let first = WishlistRepository::find_by_id(&pool, &a.id)
            .await
            .unwrap()
            .unwrap();
        assert!(first.notified);
        let first_notified_at = first.notified_at.unwrap();

        // second mark keeps the flag and the original timestamp
        WishlistRepository::mark_notified(&pool, &a.id).await.unwrap();
        let again = WishlistRepository::find_by_id(&pool, &a.id)
            .await
            .unwrap()
            .unwrap();
        assert!(again.notified);
        assert_eq!(again.notified_at, Some(first_notified_at));
    }

    #[tokio::test]
    async fn create_for_unknown_user_is_rejected() {
        let pool = pool_with_users().await;
        let expiry = Utc::now() + chrono::Duration::minutes(5);

        match WishlistRepository::create(&pool, new_entry("ghost", "Kettle", expiry)).await {
            Err(AppError::Database(_)) => {}
            other => panic!("expected Database error, got {:?}", other),
        }
        assert!(WishlistRepository::list_pending(&pool)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn mark_notified_unknown_id_is_not_found() {
        let pool = pool_with_users().await;
        match WishlistRepository::mark_notified(&pool, "missing").await {
            Err(AppError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn list_by_user_includes_notified_entries() {
        let pool = pool_with_users().await;
        let expiry = Utc::now() + chrono::Duration::minutes(5);
        let a = WishlistRepository::create(&pool, new_entry("u1", "A", expiry))
            .await
            .unwrap();
        WishlistRepository::create(&pool, new_entry("u2", "B", expiry))
            .await
            .unwrap();
        WishlistRepository::mark_notified(&pool, &a.id).await.unwrap();

        let mine = WishlistRepository::list_by_user(&pool, "u1").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(mine[0].notified);
    }

    #[tokio::test]
    async fn malformed_timestamp_rows_are_skipped() {
        let pool = pool_with_users().await;
        let expiry = Utc::now() + chrono::Duration::minutes(5);
        let good = WishlistRepository::create(&pool, new_entry("u1", "Good", expiry))
            .await
            .unwrap();

        sqlx::query(
            r#"
            INSERT INTO wishlist (id, user_id, title, platform, price, expiry_time, notified, created_at)
            VALUES ('bad', 'u1', 'Bad', 'Amazon', '10', 'next tuesday', 0, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .unwrap();

        let pending = WishlistRepository::list_pending(&pool).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, good.id);
    }

    #[tokio::test]
    async fn offset_timestamps_are_read_as_the_same_instant() {
        let pool = pool_with_users().await;

        sqlx::query(
            r#"
            INSERT INTO wishlist (id, user_id, title, platform, price, expiry_time, notified, created_at)
            VALUES ('ist', 'u1', 'Phone', 'Amazon', '10', '2024-06-01T17:35:00+05:30', 0, '2024-06-01T17:30:00+05:30')
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let entry = WishlistRepository::find_by_id(&pool, "ist")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.expiry_time.to_rfc3339(), "2024-06-01T12:05:00+00:00");
    }
}
