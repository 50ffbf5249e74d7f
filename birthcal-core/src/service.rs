//! Background sync actor that keeps the feed cache and entry list fresh.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cache::FeedCache;
use crate::entries::EntryStore;
use crate::error::{BirthcalError, BirthcalResult};
use crate::sync::{Generator, SyncConfig, SyncPhase, SyncStats};

/// What the last sync attempts left behind.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatus {
    pub phase: SyncPhase,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub today_count: usize,
}

pub struct BirthdayService {
    generator: Generator,
    config: SyncConfig,
    cache: Arc<FeedCache>,
    entries: Arc<EntryStore>,
    in_flight: tokio::sync::Mutex<()>,
    status: Mutex<ServiceStatus>,
}

impl BirthdayService {
    pub fn new(
        generator: Generator,
        config: SyncConfig,
        cache: Arc<FeedCache>,
        entries: Arc<EntryStore>,
    ) -> Self {
        BirthdayService {
            generator,
            config,
            cache,
            entries,
            in_flight: tokio::sync::Mutex::new(()),
            status: Mutex::new(ServiceStatus::default()),
        }
    }

    pub fn cache(&self) -> &Arc<FeedCache> {
        &self.cache
    }

    pub fn entries(&self) -> &Arc<EntryStore> {
        &self.entries
    }

    pub fn status(&self) -> ServiceStatus {
        let mut status = self
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        status.phase = self.generator.phase();
        status
    }

    /// Run one sync and publish its results.
    ///
    /// Fails with [`BirthcalError::SyncInProgress`] if another sync is
    /// running. On any failure the previously published feed stays in place.
    pub async fn sync_now(&self, cancel: &CancellationToken) -> BirthcalResult<SyncStats> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::warn!(component = "worker", "Sync already running, trigger ignored");
            return Err(BirthcalError::SyncInProgress);
        };

        match self.generator.run_sync(cancel, &self.config).await {
            Ok(output) => {
                let generated_at = Utc::now();
                self.entries.replace(output.entries);
                self.cache.update_at(output.feed, generated_at);

                let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
                status.last_success = Some(generated_at);
                status.last_error = None;
                status.today_count = output.today_count;

                tracing::info!(
                    component = "worker",
                    birthdays = output.stats.with_birthday,
                    today = output.today_count,
                    "Sync completed"
                );
                Ok(output.stats)
            }
            Err(err) => {
                if err.is_cancelled() {
                    tracing::info!(component = "worker", "Sync cancelled");
                } else {
                    tracing::error!(component = "worker", error = %err, "Sync failed");
                }
                self.status
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Sync immediately, then on every `interval` tick or manual trigger
    /// until `cancel` fires.
    ///
    /// Failed syncs are logged and retried on the next tick only.
    pub async fn run(
        &self,
        interval: Duration,
        cancel: CancellationToken,
        mut triggers: mpsc::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut triggers_open = true;

        tracing::info!(
            component = "worker",
            interval_secs = interval.as_secs(),
            mode = %self.config.mode,
            "Sync worker started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                trigger = triggers.recv(), if triggers_open => {
                    if trigger.is_none() {
                        triggers_open = false;
                        continue;
                    }
                    tracing::info!(component = "worker", "Manual sync requested");
                }
            }

            // Errors are already logged and recorded in the status
            let _ = self.sync_now(&cancel.child_token()).await;
        }

        tracing::info!(component = "worker", "Sync worker stopped");
    }
}
