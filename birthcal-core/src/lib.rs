//! Core engine for birthcal.
//!
//! Turns a vCard address book into an iCalendar feed of yearly birthdays:
//! - `date` and `contact` read birthdays out of decoded cards
//! - `events` and `ics` project them onto calendar events and render the feed
//! - `sync` runs the fetch/decode/render pipeline, `service` schedules it
//! - `cache` and `entries` hold the results served to readers

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod contact;
pub mod date;
pub mod entries;
pub mod error;
pub mod events;
pub mod fetch;
pub mod ics;
pub mod reminder;
pub mod service;
pub mod sync;

pub use cache::{FeedCache, FeedSnapshot};
pub use clock::{FixedClock, SystemClock, TimeSource};
pub use config::AppConfig;
pub use contact::{BirthdayEntry, ContactRecord};
pub use entries::{EntryStore, SortColumn, sort_entries};
pub use error::{BirthcalError, BirthcalResult};
pub use events::{AgeSummaryFormatter, SummaryFormatter};
pub use fetch::{HttpFetcher, StreamFetcher};
pub use service::{BirthdayService, ServiceStatus};
pub use sync::{Generator, SourceMode, SyncConfig, SyncOutput, SyncPhase, SyncStats};
