//! Read-only view over a domain's snapshots. Everything here is
//! recomputed from the filesystem layout on each call; nothing is cached
//! or stored.

use crate::change::{self, ChangeEstimate};
use chrono::Utc;
use serde::Serialize;
use std::io;
use std::time::Duration;
use tracing::debug;
use webstash_archiver::store::{CaptureEntry, SnapshotStore};

/// How old a domain's newest capture may be before it is due for
/// re-archiving.
pub const DEFAULT_REFRESH_AFTER: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One capture in a domain's history, annotated with the change signal
/// against its immediate predecessor.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSummary {
    pub capture_id: i64,
    pub relative_path: String,
    pub percent_difference: f64,
    pub changed: bool,
}

pub struct ArchiveIndex {
    store: SnapshotStore,
}

impl ArchiveIndex {
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn list_domains(&self) -> io::Result<Vec<String>> {
        self.store.list_domains().await
    }

    /// Captures for `domain`, newest first. The oldest capture has no
    /// predecessor and reports a zero change signal.
    pub async fn list_captures(&self, domain: &str) -> io::Result<Vec<CaptureSummary>> {
        let entries = self.store.list_captures(domain).await?;
        let mut summaries = Vec::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            let estimate = match entries.get(position + 1) {
                Some(predecessor) => {
                    self.compare(domain, predecessor.capture_id, entry.capture_id)
                        .await?
                }
                None => ChangeEstimate::NONE,
            };
            summaries.push(CaptureSummary {
                capture_id: entry.capture_id,
                relative_path: entry.relative_path.clone(),
                percent_difference: estimate.percent_difference,
                changed: estimate.changed,
            });
        }
        Ok(summaries)
    }

    pub async fn get_capture(
        &self,
        domain: &str,
        capture_id: i64,
    ) -> io::Result<Option<CaptureEntry>> {
        self.store.get_capture(domain, capture_id).await
    }

    pub async fn latest_capture(&self, domain: &str) -> io::Result<Option<CaptureEntry>> {
        Ok(self.store.list_captures(domain).await?.into_iter().next())
    }

    /// True when `domain` has no capture newer than `staleness`. Consumed
    /// by an external re-archive sweep; a domain with no captures at all
    /// is always due.
    pub async fn needs_refresh(&self, domain: &str, staleness: Duration) -> io::Result<bool> {
        let Some(latest) = self.latest_capture(domain).await? else {
            return Ok(true);
        };
        let age_millis = Utc::now().timestamp_millis() - latest.capture_id;
        Ok(age_millis > staleness.as_millis() as i64)
    }

    async fn compare(
        &self,
        domain: &str,
        older_id: i64,
        newer_id: i64,
    ) -> io::Result<ChangeEstimate> {
        debug!("comparing capture {older_id} to {newer_id} for {domain}");
        let older = self.store.read_primary_document(domain, older_id).await?;
        let newer = self.store.read_primary_document(domain, newer_id).await?;
        Ok(change::estimate(older.as_deref(), newer.as_deref()))
    }
}
