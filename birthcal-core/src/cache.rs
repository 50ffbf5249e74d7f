//! Single-slot cache of the rendered feed.
//!
//! The feed is read on every HTTP request but only replaced after a sync,
//! so the slot is an atomically swapped `Arc` and readers never take a lock.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use sha2::{Digest, Sha256};

use crate::constants::HTTP_DATE_FORMAT;

/// An immutable rendering of the feed with its HTTP validators.
#[derive(Debug)]
pub struct FeedSnapshot {
    data: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
}

impl FeedSnapshot {
    fn new(data: Bytes, generated_at: DateTime<Utc>) -> Self {
        FeedSnapshot {
            etag: etag_for(&data),
            // HTTP dates carry whole seconds only
            last_modified: generated_at.trunc_subsecs(0),
            data,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Quoted entity tag, e.g. `"3a7b…"`.
    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    /// `Last-Modified` header value.
    pub fn last_modified_http(&self) -> String {
        self.last_modified.format(HTTP_DATE_FORMAT).to_string()
    }
}

/// Quoted hex SHA-256 of `data`.
pub fn etag_for(data: &[u8]) -> String {
    format!("\"{:x}\"", Sha256::digest(data))
}

/// Latest feed snapshot, or nothing before the first successful sync.
#[derive(Debug, Default)]
pub struct FeedCache {
    slot: ArcSwapOption<FeedSnapshot>,
}

impl FeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the served feed.
    pub fn update(&self, data: impl Into<Bytes>) -> Arc<FeedSnapshot> {
        self.update_at(data, Utc::now())
    }

    /// Replace the served feed, stamping it with `generated_at`.
    pub fn update_at(&self, data: impl Into<Bytes>, generated_at: DateTime<Utc>) -> Arc<FeedSnapshot> {
        let snapshot = Arc::new(FeedSnapshot::new(data.into(), generated_at));
        self.slot.store(Some(Arc::clone(&snapshot)));

        tracing::debug!(
            component = "server",
            size_bytes = snapshot.data.len(),
            etag = %snapshot.etag,
            "Calendar cache updated"
        );

        snapshot
    }

    pub fn load(&self) -> Option<Arc<FeedSnapshot>> {
        self.slot.load_full()
    }
}
