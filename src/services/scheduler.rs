//! Background reconciliation of pending wishlist entries against the clock.
//!
//! Every entry is a two-state machine, `Pending -> Notified`. Each tick the
//! scheduler reads the pending set and, for entries inside the notification
//! window, sends an alert and then marks the entry notified. Sends that fail
//! are retried on later ticks while the entry is still in its window, so
//! delivery is at-least-once and time-boxed: a mark that fails after a
//! successful send leads to a duplicate, an entry whose window closes before
//! a successful send is never alerted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SchedulerConfig;
use crate::db::store;
use crate::db::{UserDirectory, WishlistEntry, WishlistStore};
use crate::error::{AppError, AppResult};
use crate::services::clock::Clock;
use crate::services::sink::NotificationSink;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub scan_interval: Duration,
    pub notify_window: Duration,
    pub send_timeout: Duration,
    pub store_timeout: Duration,
}

impl From<&SchedulerConfig> for SchedulerSettings {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            scan_interval: config.scan_interval(),
            notify_window: config.notify_window(),
            send_timeout: config.send_timeout(),
            store_timeout: config.store_timeout(),
        }
    }
}

/// Where an entry stands relative to its notification window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    /// `time_left <= 0`: the offer is gone, nothing is sent.
    Lapsed,
    /// `0 < time_left < window`: eligible for an alert.
    InWindow,
    /// `time_left >= window`: re-evaluated on a later tick.
    NotYetDue,
}

pub fn classify(time_left: chrono::Duration, window: Duration) -> WindowPosition {
    if time_left <= chrono::Duration::zero() {
        return WindowPosition::Lapsed;
    }
    match time_left.to_std() {
        Ok(left) if left < window => WindowPosition::InWindow,
        _ => WindowPosition::NotYetDue,
    }
}

/// Summary of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub scanned: usize,
    pub sent: usize,
    pub lapsed: usize,
    pub not_yet_due: usize,
    pub failed: usize,
    /// The pending set could not be read; nothing was evaluated.
    pub store_unavailable: bool,
    /// Shutdown was requested before every entry was evaluated.
    pub interrupted: bool,
}

enum EntryOutcome {
    Sent,
    Lapsed,
    NotYetDue,
}

pub struct ExpiryScheduler {
    store: Arc<dyn WishlistStore>,
    directory: Arc<dyn UserDirectory>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
}

fn stop_requested(rx: &mut broadcast::Receiver<()>) -> bool {
    !matches!(rx.try_recv(), Err(TryRecvError::Empty))
}

impl ExpiryScheduler {
    pub fn new(
        store: Arc<dyn WishlistStore>,
        directory: Arc<dyn UserDirectory>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            directory,
            sink,
            clock,
            settings,
        }
    }

    /// Start the loop as a background task. It stops after the current
    /// entry once `shutdown` fires (or every sender is dropped).
    pub fn spawn(self: Arc<Self>, shutdown: &broadcast::Sender<()>) -> JoinHandle<()> {
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move { self.run(shutdown_rx).await })
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        tracing::info!(
            "Expiry scheduler started: scan every {}s, notify window {}s",
            self.settings.scan_interval.as_secs(),
            self.settings.notify_window.as_secs()
        );

        let mut ticker = tokio::time::interval(self.settings.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!("Expiry scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let report = self.scan(|| stop_requested(&mut shutdown_rx)).await;
            tracing::debug!(
                "Expiry scan: scanned={} sent={} lapsed={} not_yet_due={} failed={}",
                report.scanned,
                report.sent,
                report.lapsed,
                report.not_yet_due,
                report.failed
            );

            if report.interrupted {
                tracing::info!("Expiry scheduler received shutdown signal mid-scan");
                break;
            }
        }
    }

    /// Run one full scan.
    pub async fn tick(&self) -> TickReport {
        self.scan(|| false).await
    }

    async fn scan<F>(&self, mut should_stop: F) -> TickReport
    where
        F: FnMut() -> bool + Send,
    {
        let mut report = TickReport::default();
        let now = self.clock.now();

        let pending = match self
            .bounded("list pending entries", self.store.list_pending())
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!("Failed to list pending wishlist entries: {}", e);
                report.store_unavailable = true;
                return report;
            }
        };

        for entry in pending {
            if should_stop() {
                report.interrupted = true;
                break;
            }

            report.scanned += 1;
            match self.process_entry(&entry, &now).await {
                Ok(EntryOutcome::Sent) => report.sent += 1,
                Ok(EntryOutcome::Lapsed) => report.lapsed += 1,
                Ok(EntryOutcome::NotYetDue) => report.not_yet_due += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        "Failed to notify for wishlist entry {} ({}): {}",
                        entry.id,
                        entry.title,
                        e
                    );
                }
            }
        }

        report
    }

    async fn process_entry(
        &self,
        entry: &WishlistEntry,
        now: &DateTime<Tz>,
    ) -> AppResult<EntryOutcome> {
        let time_left = entry.time_left(now);

        match classify(time_left, self.settings.notify_window) {
            WindowPosition::Lapsed => {
                tracing::debug!(
                    "Wishlist entry {} lapsed {}s ago without an alert",
                    entry.id,
                    -time_left.num_seconds()
                );
                Ok(EntryOutcome::Lapsed)
            }
            WindowPosition::NotYetDue => Ok(EntryOutcome::NotYetDue),
            WindowPosition::InWindow => {
                let destination = self
                    .bounded(
                        "resolve destination",
                        self.directory.resolve_destination(&entry.user_id),
                    )
                    .await?;

                match tokio::time::timeout(
                    self.settings.send_timeout,
                    self.sink.send(&destination, &entry.title, &entry.platform),
                )
                .await
                {
                    Err(_) => {
                        return Err(AppError::Timeout(format!(
                            "send exceeded {}s",
                            self.settings.send_timeout.as_secs()
                        )))
                    }
                    Ok(Err(e)) => return Err(AppError::Send(e)),
                    Ok(Ok(())) => {}
                }

                if let Err(e) = self
                    .bounded("mark notified", self.store.mark_notified(&entry.id))
                    .await
                {
                    tracing::warn!(
                        "Alert for wishlist entry {} was sent but not recorded; it will be resent",
                        entry.id
                    );
                    return Err(e);
                }

                tracing::info!(
                    "Notified user {} about expiring offer {} ({}s left)",
                    entry.user_id,
                    entry.id,
                    time_left.num_seconds()
                );
                Ok(EntryOutcome::Sent)
            }
        }
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        store::bounded(what, self.settings.store_timeout, fut).await
    }
}
