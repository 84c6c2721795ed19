use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One unit of pending crawl work. Owned by the active session's frontier
/// and never persisted.
#[derive(Debug, Clone)]
pub struct FrontierItem {
    /// Canonical URL, as produced by `urls::normalize`.
    pub url: String,
    pub depth: usize,
    /// Assets are fetched as bytes and bypass the depth gate.
    pub is_asset: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedPage {
    pub url: String,
    pub local_path: String,
    pub content_type: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedAsset {
    pub url: String,
    pub local_path: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureError {
    pub url: String,
    pub message: String,
}

/// Durable result record of one capture session, built incrementally while
/// the crawl runs. The file tree under `root_path` is the only artifact
/// the store guarantees to keep; persisting this record beyond the session
/// is the caller's business.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub source_url: String,
    pub capture_id: i64,
    pub domain: String,
    pub root_path: PathBuf,
    pub pages: Vec<CapturedPage>,
    pub assets: Vec<CapturedAsset>,
    pub errors: Vec<CaptureError>,
}

impl CaptureMetadata {
    pub fn new(source_url: &str, capture_id: i64, domain: &str, root_path: &Path) -> Self {
        Self {
            source_url: source_url.to_string(),
            capture_id,
            domain: domain.to_string(),
            root_path: root_path.to_path_buf(),
            pages: Vec::new(),
            assets: Vec::new(),
            errors: Vec::new(),
        }
    }
}
