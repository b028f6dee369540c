//! In-process doubles for the store, directory, sink and clock, plus an
//! in-memory SQLite pool with migrations applied.

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::db::{NewWishlistEntry, UserDirectory, WishlistEntry, WishlistStore};
use crate::error::{AppError, AppResult};
use crate::services::clock::Clock;
use crate::services::sink::{NotificationSink, SendError};

pub async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
    // one connection, kept forever: every new in-memory connection is a new database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub struct ManualClock {
    now: Mutex<DateTime<Tz>>,
}

impl ManualClock {
    /// A clock in the Asia/Kolkata reference zone pinned at the given UTC time.
    pub fn at_utc(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        let utc = Utc
            .with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap();
        Self {
            now: Mutex::new(utc.with_timezone(&chrono_tz::Asia::Kolkata)),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.now.lock().unwrap().with_timezone(&Utc)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Tz> {
        *self.now.lock().unwrap()
    }

    fn timezone(&self) -> Tz {
        self.now.lock().unwrap().timezone()
    }
}

#[derive(Default)]
struct MemoryState {
    entries: Vec<WishlistEntry>,
    next_id: u64,
    fail_writes: bool,
    fail_list: bool,
    hang: bool,
    fail_mark: HashSet<String>,
}

/// Wishlist store kept in a `Vec`, with switches to inject failures.
#[derive(Default)]
pub struct InMemoryWishlistStore {
    state: Mutex<MemoryState>,
}

impl InMemoryWishlistStore {
    fn insert(&self, entry: NewWishlistEntry) -> WishlistEntry {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let created = WishlistEntry {
            id: format!("entry-{}", state.next_id),
            user_id: entry.user_id,
            title: entry.title,
            platform: entry.platform,
            price: entry.price,
            expiry_time: entry.expiry_time,
            notified: false,
            notified_at: None,
            created_at: Utc::now(),
        };
        state.entries.push(created.clone());
        created
    }

    /// Insert an entry directly, bypassing the service, and return its id.
    pub fn seed(&self, user_id: &str, title: &str, expiry_time: DateTime<Utc>) -> String {
        self.insert(NewWishlistEntry {
            user_id: user_id.to_string(),
            title: title.to_string(),
            platform: "Amazon".to_string(),
            price: "4,499".to_string(),
            expiry_time,
        })
        .id
    }

    pub fn get(&self, id: &str) -> Option<WishlistEntry> {
        let state = self.state.lock().unwrap();
        state.entries.iter().find(|e| e.id == id).cloned()
    }

    pub fn pending_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .entries
            .iter()
            .filter(|e| !e.notified)
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Make `add` and `list_by_user` never complete.
    pub fn hang(&self, hang: bool) {
        self.state.lock().unwrap().hang = hang;
    }

    pub fn fail_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_list = fail;
    }

    pub fn fail_mark_for(&self, id: &str) {
        self.state.lock().unwrap().fail_mark.insert(id.to_string());
    }

    pub fn clear_mark_failures(&self) {
        self.state.lock().unwrap().fail_mark.clear();
    }
}

#[async_trait]
impl WishlistStore for InMemoryWishlistStore {
    async fn add(&self, entry: NewWishlistEntry) -> AppResult<WishlistEntry> {
        let (fail, hang) = {
            let state = self.state.lock().unwrap();
            (state.fail_writes, state.hang)
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(AppError::Persistence("store unavailable".to_string()));
        }
        Ok(self.insert(entry))
    }

    async fn list_pending(&self) -> AppResult<Vec<WishlistEntry>> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(AppError::Persistence("store unavailable".to_string()));
        }
        Ok(state.entries.iter().filter(|e| !e.notified).cloned().collect())
    }

    async fn mark_notified(&self, id: &str) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_mark.contains(id) {
            return Err(AppError::Persistence(format!("cannot update {}", id)));
        }
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| AppError::NotFound(format!("wishlist entry {}", id)))?;
        entry.notified = true;
        entry.notified_at.get_or_insert_with(Utc::now);
        Ok(())
    }

    async fn list_by_user(&self, user_id: &str) -> AppResult<Vec<WishlistEntry>> {
        let hang = self.state.lock().unwrap().hang;
        if hang {
            std::future::pending::<()>().await;
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct StaticDirectory {
    phones: Mutex<HashMap<String, String>>,
}

impl StaticDirectory {
    pub fn set(&self, user_id: &str, phone: &str) {
        self.phones
            .lock()
            .unwrap()
            .insert(user_id.to_string(), phone.to_string());
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn resolve_destination(&self, user_id: &str) -> AppResult<String> {
        self.phones
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| AppError::Resolution(user_id.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentAlert {
    pub destination: String,
    pub title: String,
    pub platform: String,
}

#[derive(Default)]
struct SinkState {
    sent: Vec<SentAlert>,
    queued_failures: VecDeque<SendError>,
    failing_titles: HashSet<String>,
    hang: bool,
}

/// Sink that records every successful send and can be told to fail or hang.
#[derive(Default)]
pub struct RecordingSink {
    state: Mutex<SinkState>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<SentAlert> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Fail the next `n` sends with `err`, whatever their destination.
    pub fn fail_next(&self, n: usize, err: SendError) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..n {
            state.queued_failures.push_back(err.clone());
        }
    }

    pub fn fail_title(&self, title: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_titles
            .insert(title.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.queued_failures.clear();
        state.failing_titles.clear();
    }

    pub fn hang(&self, hang: bool) {
        self.state.lock().unwrap().hang = hang;
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(
        &self,
        destination: &str,
        title: &str,
        platform: &str,
    ) -> Result<(), SendError> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            if let Some(err) = state.queued_failures.pop_front() {
                return Err(err);
            }
            if state.failing_titles.contains(title) {
                return Err(SendError::Permanent(format!("rejected {}", title)));
            }
            if !state.hang {
                state.sent.push(SentAlert {
                    destination: destination.to_string(),
                    title: title.to_string(),
                    platform: platform.to_string(),
                });
            }
            state.hang
        };

        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Application state over `pool` with a pinned clock and a recording sink.
pub fn test_state(pool: SqlitePool) -> std::sync::Arc<crate::AppState> {
    use std::sync::Arc;

    let config = crate::config::Config::default();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_utc(2024, 6, 1, 12, 0, 0));
    let store: Arc<dyn WishlistStore> = Arc::new(crate::db::SqliteWishlistStore::new(pool.clone()));
    let wishlist = crate::services::wishlist::WishlistService::new(
        store.clone(),
        clock.clone(),
        config.wishlist.offer_window(),
        config.scheduler.store_timeout(),
    )
    .unwrap();

    Arc::new(crate::AppState {
        db: pool.clone(),
        config,
        store,
        directory: Arc::new(crate::db::SqliteUserDirectory::new(pool)),
        sink: Arc::new(RecordingSink::default()),
        clock,
        wishlist,
    })
}
