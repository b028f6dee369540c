use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::db::store::bounded;
use crate::db::{NewWishlistEntry, WishlistEntry, WishlistStore};
use crate::error::{AppError, AppResult};
use crate::services::clock::Clock;

/// Offer details copied from the originating product listing.
#[derive(Debug, Clone, Deserialize)]
pub struct AddWishlistItem {
    pub title: String,
    pub platform: String,
    pub price: String,
}

/// Presentation view of an entry. Derived fields are computed on read and
/// never stored.
#[derive(Debug, Clone, Serialize)]
pub struct WishlistEntryView {
    pub id: String,
    pub title: String,
    pub platform: String,
    pub price: String,
    pub expiry_time: DateTime<Tz>,
    pub remaining_seconds: i64,
    pub is_expired: bool,
    pub notified: bool,
}

impl WishlistEntryView {
    pub fn from_entry(entry: WishlistEntry, now: &DateTime<Tz>) -> Self {
        let time_left = entry.time_left(now);
        Self {
            remaining_seconds: time_left.num_seconds().max(0),
            is_expired: entry.is_expired(now),
            expiry_time: entry.expiry_time.with_timezone(&now.timezone()),
            id: entry.id,
            title: entry.title,
            platform: entry.platform,
            price: entry.price,
            notified: entry.notified,
        }
    }
}

/// Foreground façade used by request handlers.
#[derive(Clone)]
pub struct WishlistService {
    store: Arc<dyn WishlistStore>,
    clock: Arc<dyn Clock>,
    offer_window: chrono::Duration,
    store_timeout: Duration,
}

fn required(field: &str, value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

impl WishlistService {
    pub fn new(
        store: Arc<dyn WishlistStore>,
        clock: Arc<dyn Clock>,
        offer_window: Duration,
        store_timeout: Duration,
    ) -> AppResult<Self> {
        let offer_window = chrono::Duration::from_std(offer_window)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("offer window out of range: {}", e)))?;
        Ok(Self {
            store,
            clock,
            offer_window,
            store_timeout,
        })
    }

    /// Save an offer for `user_id`, expiring one offer window from now.
    pub async fn add(&self, user_id: &str, item: AddWishlistItem) -> AppResult<WishlistEntry> {
        let user_id = required("user_id", user_id)?;
        let title = required("title", &item.title)?;
        let platform = required("platform", &item.platform)?;
        let price = required("price", &item.price)?;

        let now = self.clock.now();
        let expiry_time = (now + self.offer_window).with_timezone(&Utc);

        let entry = bounded(
            "add wishlist entry",
            self.store_timeout,
            self.store.add(NewWishlistEntry {
                user_id,
                title,
                platform,
                price,
                expiry_time,
            }),
        )
        .await?;

        tracing::info!(
            "Added wishlist entry {} for user {} expiring at {}",
            entry.id,
            entry.user_id,
            entry.expiry_time.with_timezone(&self.clock.timezone()).to_rfc3339()
        );

        Ok(entry)
    }

    /// Entries of `user_id` with remaining time and expiry state derived
    /// against the current reference time.
    pub async fn list_for_display(&self, user_id: &str) -> AppResult<Vec<WishlistEntryView>> {
        let entries = bounded(
            "list wishlist entries",
            self.store_timeout,
            self.store.list_by_user(user_id),
        )
        .await?;
        let now = self.clock.now();

        Ok(entries
            .into_iter()
            .map(|e| WishlistEntryView::from_entry(e, &now))
            .collect())
    }
}
