//! Crawl orchestration for one capture session.
//!
//! A session seeds the frontier with the start URL, runs a bounded pool of
//! fetch workers, routes every discovered same-origin reference back into
//! the frontier, and assembles the capture metadata. All session state
//! (frontier, visited set, in-flight counter, metadata) lives behind one
//! mutex; marking a URL visited happens in the same critical section that
//! enqueues it, which is what keeps concurrent discovery from fetching
//! anything twice.

use crate::capture::{CaptureError, CaptureMetadata, CapturedAsset, CapturedPage, FrontierItem};
use crate::error::{ArchiveError, Result};
use crate::rewrite;
use crate::store::SnapshotStore;
use crate::urls::{self, UrlOutcome};
use chrono::Utc;
use futures::future::join_all;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

/// Tunables for a capture session.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Upper bound on concurrent fetch workers.
    pub max_concurrency: usize,
    /// Pages deeper than this still get fetched if already queued, but
    /// their page links stop being enqueued. Assets always pass the gate.
    pub max_depth: usize,
    pub request_timeout: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            max_depth: 3,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Selector/attribute table for link discovery. The flag marks references
/// fetched as binary assets, which bypass the depth gate.
const LINK_SELECTORS: &[(&str, &str, bool)] = &[
    ("a[href]", "href", false),
    ("link[rel=\"stylesheet\"]", "href", true),
    ("script[src]", "src", true),
    ("img[src]", "src", true),
    ("source[src]", "src", true),
];

/// Content-type to file-extension table, checked top to bottom; first
/// match wins. `image/*` maps to the subtype, anything else falls back to
/// the extension already present in the URL path, then `.unknown`.
const EXTENSION_TABLE: &[(&str, &str)] = &[
    ("text/html", ".html"),
    ("text/css", ".css"),
    ("application/javascript", ".js"),
    ("text/javascript", ".js"),
];

pub struct Archiver {
    client: Client,
    store: SnapshotStore,
    config: ArchiveConfig,
    progress_callback: Option<ProgressCallback>,
    /// One capture at a time: overlapping `archive` calls serialize here.
    session_gate: Mutex<()>,
}

/// Immutable per-session facts shared by every worker.
struct SessionContext {
    origin: String,
    domain: String,
    capture_id: i64,
    max_depth: usize,
}

/// Mutable session state, owned by one mutex for the session's lifetime.
struct SessionState {
    frontier: VecDeque<FrontierItem>,
    visited: HashSet<String>,
    in_flight: usize,
    metadata: CaptureMetadata,
}

enum ItemRecord {
    Page(CapturedPage),
    Asset(CapturedAsset),
}

impl Archiver {
    pub fn new(store: SnapshotStore) -> Self {
        Self::with_config(store, ArchiveConfig::default())
    }

    pub fn with_config(store: SnapshotStore, config: ArchiveConfig) -> Self {
        let client = Client::builder()
            .user_agent(concat!("Webstash/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout / 2)
            .pool_max_idle_per_host(50)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            store,
            config,
            progress_callback: None,
            session_gate: Mutex::new(()),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.config.max_concurrency = workers;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Run one complete capture session starting at `start_url`.
    ///
    /// Only two failures are fatal: a start URL that cannot be parsed or
    /// resolved, and a capture root directory that cannot be created.
    /// Everything after initialization is recorded per item in the
    /// metadata error list and never aborts the session.
    pub async fn archive(&self, start_url: &str) -> Result<CaptureMetadata> {
        let _session = self.session_gate.lock().await;

        let canonical = match urls::normalize(start_url) {
            UrlOutcome::Resolved(url) => url,
            UrlOutcome::Fallback { original, reason } => {
                return Err(ArchiveError::InvalidStartUrl(format!("{original}: {reason}")));
            }
        };
        let parsed = Url::parse(&canonical)
            .map_err(|e| ArchiveError::InvalidStartUrl(format!("{canonical}: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ArchiveError::InvalidStartUrl(format!("{canonical} has no host")))?;
        let origin = urls::base_origin(&canonical)
            .ok_or_else(|| ArchiveError::InvalidStartUrl(format!("{canonical} has no origin")))?;

        // Resolve the host before touching the filesystem: a dead hostname
        // fails the session without leaving an empty capture behind.
        let port = parsed.port_or_known_default().unwrap_or(443);
        tokio::net::lookup_host((host, port)).await.map_err(|e| {
            ArchiveError::InvalidStartUrl(format!("cannot resolve host {host}: {e}"))
        })?;

        let domain = SnapshotStore::sanitize_domain(host);
        let capture_id = Utc::now().timestamp_millis();
        let capture_root = self.store.capture_root(&domain, capture_id);
        tokio::fs::create_dir_all(&capture_root).await?;
        info!("initialized capture at {}", capture_root.display());

        let context = Arc::new(SessionContext {
            origin,
            domain: domain.clone(),
            capture_id,
            max_depth: self.config.max_depth,
        });
        let state = Arc::new(Mutex::new(SessionState {
            frontier: VecDeque::new(),
            visited: HashSet::new(),
            in_flight: 0,
            metadata: CaptureMetadata::new(start_url, capture_id, &domain, &capture_root),
        }));
        {
            let mut session = state.lock().await;
            session.visited.insert(canonical.clone());
            session.frontier.push_back(FrontierItem {
                url: canonical,
                depth: 0,
                is_asset: false,
            });
        }

        let mut workers = Vec::new();
        for worker_id in 0..self.config.max_concurrency.max(1) {
            let client = self.client.clone();
            let store = self.store.clone();
            let context = context.clone();
            let state = state.clone();
            let progress = self.progress_callback.clone();
            workers.push(tokio::spawn(run_worker(
                worker_id, client, store, context, state, progress,
            )));
        }
        for outcome in join_all(workers).await {
            outcome?;
        }

        let mut session = state.lock().await;
        info!(
            "capture {capture_id} of {domain} complete: {} pages, {} assets, {} errors",
            session.metadata.pages.len(),
            session.metadata.assets.len(),
            session.metadata.errors.len()
        );
        Ok(std::mem::take(&mut session.metadata))
    }
}

async fn run_worker(
    worker_id: usize,
    client: Client,
    store: SnapshotStore,
    context: Arc<SessionContext>,
    state: Arc<Mutex<SessionState>>,
    progress: Option<ProgressCallback>,
) {
    debug!("worker {worker_id} started");
    loop {
        let item = {
            let mut session = state.lock().await;
            match session.frontier.pop_front() {
                Some(item) => {
                    session.in_flight += 1;
                    Some(item)
                }
                None if session.in_flight == 0 => break,
                None => None,
            }
        };
        let Some(item) = item else {
            // peers may still discover new work; idle briefly and re-poll
            tokio::time::sleep(Duration::from_millis(10)).await;
            continue;
        };

        if let Some(ref callback) = progress {
            callback(worker_id, item.url.clone());
        }

        let outcome = fetch_and_store(&client, &store, &context, &item).await;

        let mut session = state.lock().await;
        match outcome {
            Ok((record, discovered)) => {
                match record {
                    ItemRecord::Page(page) => session.metadata.pages.push(page),
                    ItemRecord::Asset(asset) => session.metadata.assets.push(asset),
                }
                for found in discovered {
                    // visited is marked in the same critical section that
                    // enqueues, so concurrent discovery cannot double-queue
                    if session.visited.contains(&found.url) {
                        continue;
                    }
                    if found.is_asset || found.depth <= context.max_depth {
                        session.visited.insert(found.url.clone());
                        session.frontier.push_back(found);
                    }
                }
            }
            Err(error) => {
                warn!("error fetching or processing {}: {error}", item.url);
                session.metadata.errors.push(CaptureError {
                    url: item.url,
                    message: error.to_string(),
                });
            }
        }
        session.in_flight -= 1;
    }
    debug!("worker {worker_id} finished");
}

/// Fetch one frontier item, rewrite and extract links when it is an HTML
/// page, and save the result at its derived local path.
async fn fetch_and_store(
    client: &Client,
    store: &SnapshotStore,
    context: &SessionContext,
    item: &FrontierItem,
) -> Result<(ItemRecord, Vec<FrontierItem>)> {
    debug!("fetching [depth {}] {}", item.depth, item.url);

    let response = client.get(&item.url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ArchiveError::StatusError(status.as_u16()));
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let extension = extension_for(&content_type, &item.url);
    let local_path = local_relative_path(&item.url, item.is_asset, &extension);
    let full_path = store.resolve_path(&context.domain, context.capture_id, &local_path);

    let is_html = content_type.contains("text/html");
    let mut discovered = Vec::new();

    let body = if is_html && !item.is_asset && item.depth <= context.max_depth {
        let text = response.text().await?;
        let prefix = prefix_to_root(&local_path);
        let rewritten = rewrite::rewrite_html(&text, &item.url, &prefix);
        discovered = extract_links(&text, &item.url, &context.origin, item.depth + 1);
        rewritten.into_bytes()
    } else {
        response.bytes().await?.to_vec()
    };

    store.save(&full_path, &body).await?;

    let record = if item.is_asset {
        ItemRecord::Asset(CapturedAsset {
            url: item.url.clone(),
            local_path,
            content_type,
        })
    } else {
        ItemRecord::Page(CapturedPage {
            url: item.url.clone(),
            local_path,
            content_type,
            depth: item.depth,
        })
    };
    Ok((record, discovered))
}

/// Same-origin references found in `html`, canonicalized and tagged with
/// the depth they would be fetched at. Cross-origin and unparseable
/// references are dropped here; the visited/depth gate is applied by the
/// worker at enqueue time.
fn extract_links(html: &str, page_url: &str, origin: &str, next_depth: usize) -> Vec<FrontierItem> {
    let document = Html::parse_document(html);
    let mut found = Vec::new();

    for (selector, attribute, is_asset) in LINK_SELECTORS {
        let selector = Selector::parse(selector).expect("hardcoded selector is valid");
        for element in document.select(&selector) {
            if let Some(reference) = element.value().attr(attribute) {
                push_candidate(reference, page_url, origin, next_depth, *is_asset, &mut found);
            }
        }
    }

    // url(...) references inside inline <style> blocks are assets
    let style_selector = Selector::parse("style").expect("hardcoded selector is valid");
    for element in document.select(&style_selector) {
        let css = element.text().collect::<String>();
        for reference in rewrite::css_url_candidates(&css) {
            push_candidate(&reference, page_url, origin, next_depth, true, &mut found);
        }
    }

    found
}

fn push_candidate(
    reference: &str,
    page_url: &str,
    origin: &str,
    depth: usize,
    is_asset: bool,
    found: &mut Vec<FrontierItem>,
) {
    let resolved = match urls::resolve(reference, page_url) {
        UrlOutcome::Resolved(url) => url,
        // a discovered link that does not parse is dropped, not recorded
        UrlOutcome::Fallback { .. } => return,
    };
    let normalized = match urls::normalize(&resolved) {
        UrlOutcome::Resolved(url) => url,
        UrlOutcome::Fallback { .. } => return,
    };
    if !urls::same_origin(&normalized, origin) {
        return;
    }
    found.push(FrontierItem {
        url: normalized,
        depth,
        is_asset,
    });
}

fn extension_for(content_type: &str, url: &str) -> String {
    for (marker, extension) in EXTENSION_TABLE {
        if content_type.contains(marker) {
            return (*extension).to_string();
        }
    }
    if let Some(rest) = content_type.split("image/").nth(1) {
        let subtype: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        if !subtype.is_empty() {
            return format!(".{subtype}");
        }
    }
    url_path_extension(url).unwrap_or_else(|| ".unknown".to_string())
}

fn url_path_extension(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path().rsplit('/').next()?;
    let (_, extension) = segment.rsplit_once('.')?;
    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(format!(".{extension}"))
}

/// Where a fetched URL lands inside the capture directory.
///
/// Assets keep their URL path (minus the leading slash), gaining the
/// classified extension when the path has none. Pages without an extension
/// are treated as directories and stored as `<path>/index.html`, so the
/// site root becomes `index/index.html` - the capture's primary document.
fn local_relative_path(url: &str, is_asset: bool, extension: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| "/".to_string());

    if is_asset {
        let mut relative = path.trim_start_matches('/').to_string();
        if relative.is_empty() {
            relative = "index".to_string();
        }
        if !urls::has_file_extension(&relative) && extension != ".unknown" {
            relative.push_str(extension);
        }
        relative
    } else if urls::has_file_extension(&path) {
        path.trim_start_matches('/').to_string()
    } else {
        let trimmed = path.trim_start_matches('/').trim_end_matches('/');
        if trimmed.is_empty() {
            "index/index.html".to_string()
        } else {
            format!("{trimmed}/index.html")
        }
    }
}

/// Relative filesystem distance from a page's save directory back to the
/// capture root: one `../` per directory level.
fn prefix_to_root(local_path: &str) -> String {
    "../".repeat(local_path.matches('/').count())
}
