//! The sync pipeline: acquire a vCard stream, decode it card by card and
//! assemble the birthday feed plus the display entries.

use std::fmt;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use chrono::{DateTime, FixedOffset, Utc};
use ical::VcardParser;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::clock::TimeSource;
use crate::contact::{BirthdayEntry, record_or_skip};
use crate::error::{BirthcalError, BirthcalResult};
use crate::events::{EventProjector, SummaryFormatter};
use crate::fetch::StreamFetcher;
use crate::ics::generate_feed;
use crate::reminder::ReminderTrigger;

/// Where contacts are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// A `.vcf` file on disk.
    #[default]
    Local,
    /// A CardDAV/WebDAV URL serving a vCard stream.
    Web,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceMode::Local => f.write_str("local"),
            SourceMode::Web => f.write_str("web"),
        }
    }
}

/// Everything a single sync needs to know.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    pub mode: SourceMode,
    pub local_path: PathBuf,
    pub web_url: String,
    pub web_user: String,
    pub web_password: String,
    pub reminder: Option<ReminderTrigger>,
}

/// Card counters gathered during one sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Cards decoded successfully.
    pub processed: usize,
    /// Cards with a usable birthday.
    pub with_birthday: usize,
    /// Contacts whose birthday is today.
    pub today: usize,
}

/// Result of a successful sync.
#[derive(Debug, Clone)]
pub struct SyncOutput {
    pub feed: Vec<u8>,
    /// Unordered; the display layer sorts.
    pub entries: Vec<BirthdayEntry>,
    pub today_count: usize,
    pub stats: SyncStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SyncPhase {
    #[default]
    Idle = 0,
    AcquiringStream = 1,
    Decoding = 2,
    Assembling = 3,
    Done = 4,
    Failed = 5,
    Cancelled = 6,
}

impl SyncPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncPhase::AcquiringStream,
            2 => SyncPhase::Decoding,
            3 => SyncPhase::Assembling,
            4 => SyncPhase::Done,
            5 => SyncPhase::Failed,
            6 => SyncPhase::Cancelled,
            _ => SyncPhase::Idle,
        }
    }
}

/// Current phase of a generator, readable from other tasks.
#[derive(Debug, Default)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub fn get(&self) -> SyncPhase {
        SyncPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, phase: SyncPhase) {
        self.0.store(phase as u8, Ordering::Release);
        tracing::debug!(component = "engine", phase = ?phase, "Sync phase");
    }
}

/// Runs syncs with injected clock, fetcher and summary formatter.
#[derive(Clone)]
pub struct Generator {
    clock: Arc<dyn TimeSource>,
    fetcher: Option<Arc<dyn StreamFetcher>>,
    formatter: Option<Arc<dyn SummaryFormatter>>,
    phase: Arc<PhaseCell>,
}

impl Generator {
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Generator {
            clock,
            fetcher: None,
            formatter: None,
            phase: Arc::new(PhaseCell::default()),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn StreamFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_formatter(mut self, formatter: Arc<dyn SummaryFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase.get()
    }

    /// Fetch, parse and render.
    ///
    /// Configuration problems are returned as [`BirthcalError::Config`],
    /// stream failures as [`BirthcalError::SourceAcquisition`], and a fired
    /// token as [`BirthcalError::Cancelled`] without any partial output.
    pub async fn run_sync(
        &self,
        cancel: &CancellationToken,
        config: &SyncConfig,
    ) -> BirthcalResult<SyncOutput> {
        let start = Instant::now();
        tracing::info!(component = "engine", mode = %config.mode, "Synchronization started");

        let result = self.run_phases(cancel, config).await;

        match &result {
            Ok(_) => {
                self.phase.set(SyncPhase::Done);
                tracing::debug!(
                    component = "engine",
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Sync finished"
                );
            }
            Err(err) if err.is_cancelled() => self.phase.set(SyncPhase::Cancelled),
            Err(_) => self.phase.set(SyncPhase::Failed),
        }

        result
    }

    async fn run_phases(
        &self,
        cancel: &CancellationToken,
        config: &SyncConfig,
    ) -> BirthcalResult<SyncOutput> {
        self.phase.set(SyncPhase::AcquiringStream);
        let reader = match self.acquire_stream(cancel, config).await {
            Ok(reader) => reader,
            Err(_) if cancel.is_cancelled() => return Err(BirthcalError::Cancelled),
            Err(err) if err.is_config() || err.is_cancelled() => return Err(err),
            Err(err) => return Err(BirthcalError::SourceAcquisition(Box::new(err))),
        };

        if cancel.is_cancelled() {
            return Err(BirthcalError::Cancelled);
        }

        self.phase.set(SyncPhase::Decoding);
        let builder = FeedBuilder {
            now: self.clock.now(),
            reminder: config.reminder.clone(),
            formatter: self.formatter.clone(),
            phase: Some(Arc::clone(&self.phase)),
        };
        let token = cancel.clone();

        tokio::task::spawn_blocking(move || builder.build(reader, &token))
            .await
            .map_err(|e| BirthcalError::Io(std::io::Error::other(e)))?
    }

    async fn acquire_stream(
        &self,
        cancel: &CancellationToken,
        config: &SyncConfig,
    ) -> BirthcalResult<Box<dyn Read + Send>> {
        match config.mode {
            SourceMode::Local => {
                if config.local_path.as_os_str().is_empty() {
                    return Err(BirthcalError::Config("local path is empty".into()));
                }
                let file = tokio::fs::File::open(&config.local_path).await?;
                Ok(Box::new(file.into_std().await))
            }
            SourceMode::Web => {
                if config.web_url.is_empty() {
                    return Err(BirthcalError::Config("web URL is empty".into()));
                }
                let fetcher = self.fetcher.as_ref().ok_or_else(|| {
                    BirthcalError::Config("network fetcher is not initialized".into())
                })?;
                fetcher
                    .fetch(cancel, &config.web_url, &config.web_user, &config.web_password)
                    .await
            }
        }
    }
}

/// Synchronous decode-and-assemble stage of a sync.
pub struct FeedBuilder {
    pub now: DateTime<FixedOffset>,
    pub reminder: Option<ReminderTrigger>,
    pub formatter: Option<Arc<dyn SummaryFormatter>>,
    phase: Option<Arc<PhaseCell>>,
}

impl FeedBuilder {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        FeedBuilder {
            now,
            reminder: None,
            formatter: None,
            phase: None,
        }
    }

    /// Decode every card of `reader` and render the feed.
    ///
    /// Malformed cards and unreadable birthdays are skipped. The token is
    /// checked before each card is decoded and once more at end of input. A
    /// read failure fails the whole build as [`BirthcalError::SourceAcquisition`].
    pub fn build<R: Read>(self, reader: R, cancel: &CancellationToken) -> BirthcalResult<SyncOutput> {
        let projector = EventProjector {
            today: self.now.date_naive(),
            reminder: self.reminder.as_ref(),
            formatter: self.formatter.as_deref(),
        };

        let mut source = FailureLatch {
            inner: reader,
            failure: None,
        };
        let mut cards = VcardParser::new(BufReader::new(&mut source));
        let mut stats = SyncStats::default();
        let mut entries = Vec::new();
        let mut events = Vec::new();

        loop {
            if cancel.is_cancelled() {
                return Err(BirthcalError::Cancelled);
            }

            let Some(card) = cards.next() else { break };
            let card = match card {
                Ok(card) => card,
                Err(err) => {
                    // Keep going: one broken card must not hide the others
                    let err = BirthcalError::Decode(err.to_string());
                    tracing::warn!(component = "engine", error = %err, "Skipping malformed vCard");
                    continue;
                }
            };
            stats.processed += 1;

            let Some(record) = record_or_skip(&card) else {
                continue;
            };
            stats.with_birthday += 1;

            let uid = record.uid();
            entries.push(BirthdayEntry::new(&record, uid.clone(), &self.now));

            let projection = projector.project(&record, &uid);
            if projection.is_today {
                stats.today += 1;
                tracing::info!(
                    component = "engine",
                    name = %record.name,
                    date_of_birth = %record.birth.date,
                    "Birthday found today"
                );
            }
            events.extend(projection.events);
        }
        drop(cards);

        // A cut-off stream looks like end of input to the parser
        if cancel.is_cancelled() {
            return Err(BirthcalError::Cancelled);
        }
        if let Some(err) = source.failure.take() {
            return Err(BirthcalError::SourceAcquisition(Box::new(BirthcalError::Io(err))));
        }

        if let Some(phase) = &self.phase {
            phase.set(SyncPhase::Assembling);
        }

        let feed = generate_feed(&events, self.now.with_timezone(&Utc))?;

        tracing::info!(
            component = "engine",
            total_cards = stats.processed,
            birthdays_found = stats.with_birthday,
            birthdays_today = stats.today,
            "Calendar generation successful"
        );

        Ok(SyncOutput {
            feed: feed.into_bytes(),
            entries,
            today_count: stats.today,
            stats,
        })
    }
}

/// Keeps the first read error, which the vCard parser does not report.
struct FailureLatch<R> {
    inner: R,
    failure: Option<io::Error>,
}

impl<R: Read> Read for FailureLatch<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Err(err) if err.kind() != io::ErrorKind::Interrupted => {
                if self.failure.is_none() {
                    self.failure = Some(io::Error::new(err.kind(), err.to_string()));
                }
                Err(err)
            }
            other => other,
        }
    }
}
