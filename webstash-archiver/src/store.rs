//! Filesystem layout for snapshots.
//!
//! The durable contract is `<root>/<sanitizedDomain>/<captureMillis>/<path>`;
//! everything that serves, lists or diffs snapshots relies on exactly this
//! shape. A completed capture directory is immutable - re-archiving always
//! creates a new timestamped sibling.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Logical path of the originally requested page inside every capture.
/// The change estimator and any viewer treat this file as the capture's
/// primary document.
pub const PRIMARY_DOCUMENT: &str = "index/index.html";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureEntry {
    pub capture_id: i64,
    /// Path of the capture directory relative to the store root,
    /// `<domain>/<capture_id>`.
    pub relative_path: String,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory-safe label for a hostname: anything that is not
    /// alphanumeric or a dot becomes an underscore.
    pub fn sanitize_domain(host: &str) -> String {
        host.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
            .collect()
    }

    pub fn capture_root(&self, domain: &str, capture_id: i64) -> PathBuf {
        self.root.join(domain).join(capture_id.to_string())
    }

    /// Absolute location for a logical path within a capture. A leading
    /// slash on `logical_path` is stripped so it always lands inside the
    /// capture directory.
    pub fn resolve_path(&self, domain: &str, capture_id: i64, logical_path: &str) -> PathBuf {
        let relative = logical_path.strip_prefix('/').unwrap_or(logical_path);
        self.capture_root(domain, capture_id).join(relative)
    }

    /// Create intermediate directories and write `bytes`, overwriting any
    /// existing file. Directory creation is idempotent, so concurrent
    /// saves into overlapping trees all succeed.
    pub async fn save(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, bytes).await?;
        debug!("saved {}", path.display());
        Ok(())
    }

    /// Capture directories for `domain`, newest first. Directory names
    /// that are not millisecond timestamps are ignored; a domain with no
    /// captures (or no directory at all) yields an empty list.
    pub async fn list_captures(&self, domain: &str) -> io::Result<Vec<CaptureEntry>> {
        let domain_dir = self.root.join(domain);
        let mut entries = match fs::read_dir(&domain_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut captures = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Ok(capture_id) = name.parse::<i64>() {
                captures.push(CaptureEntry {
                    capture_id,
                    relative_path: format!("{domain}/{capture_id}"),
                });
            }
        }

        captures.sort_by(|a, b| b.capture_id.cmp(&a.capture_id));
        Ok(captures)
    }

    pub async fn get_capture(
        &self,
        domain: &str,
        capture_id: i64,
    ) -> io::Result<Option<CaptureEntry>> {
        let dir = self.capture_root(domain, capture_id);
        match fs::metadata(&dir).await {
            Ok(metadata) if metadata.is_dir() => Ok(Some(CaptureEntry {
                capture_id,
                relative_path: format!("{domain}/{capture_id}"),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sorted list of domains with at least one directory under the root.
    /// A missing root is an empty archive, not an error.
    pub async fn list_domains(&self) -> io::Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut domains = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                domains.push(name.to_string());
            }
        }

        domains.sort();
        Ok(domains)
    }

    /// The capture's primary document, or `None` when it was never written
    /// (a valid "no baseline" signal for change estimation).
    pub async fn read_primary_document(
        &self,
        domain: &str,
        capture_id: i64,
    ) -> io::Result<Option<String>> {
        let path = self.resolve_path(domain, capture_id, PRIMARY_DOCUMENT);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}
