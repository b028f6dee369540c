use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One offer a user wants to be alerted about before it expires.
///
/// `expiry_time` is fixed at creation. `notified` only ever goes from
/// `false` to `true`; once set the entry is no longer scanned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistEntry {
    /// Primary key (UUID), assigned by the store.
    pub id: String,

    /// Owning user id (references `users.id`).
    pub user_id: String,

    pub title: String,
    pub platform: String,
    pub price: String,

    /// Absolute instant after which the offer is gone.
    pub expiry_time: DateTime<Utc>,

    pub notified: bool,

    /// When the entry was first marked notified.
    pub notified_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

/// Data required to persist a new wishlist entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWishlistEntry {
    pub user_id: String,
    pub title: String,
    pub platform: String,
    pub price: String,
    pub expiry_time: DateTime<Utc>,
}

impl WishlistEntry {
    /// Signed time until expiry; negative once the offer has lapsed.
    pub fn time_left<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> chrono::Duration {
        self.expiry_time - now.with_timezone(&Utc)
    }

    pub fn is_expired<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        self.time_left(now) <= chrono::Duration::zero()
    }
}
