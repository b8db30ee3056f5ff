//! Download orchestration: fetch every resolved Book of Reference into the content store.
//!
//! One task per `Found` link, bounded by the configured concurrency. A task
//! never returns an error; transport failures, bad statuses and write
//! failures all end up as a `Failed` [`DownloadResult`] for that entity only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::contract::{
    ContentKind, DownloadResult, DownloadStatus, Fetcher, LinkRecord, LinkStatus,
};
use crate::http::join_url;

const OFFICE_MARKERS: [&str; 2] = ["officedocument.wordprocessingml", "msword"];

/// Kind implied by the response header and URL, or `None` when neither decides.
///
/// An office marker in the header wins outright; otherwise the URL suffix is
/// consulted, then a plain `application/pdf` header.
pub fn infer_content_kind(content_type: Option<&str>, url: &str) -> Option<ContentKind> {
    let header = content_type.map(str::to_ascii_lowercase);

    if let Some(h) = &header {
        if OFFICE_MARKERS.iter().any(|m| h.contains(m)) {
            return Some(ContentKind::Docx);
        }
    }

    match url_suffix(url).as_deref() {
        Some("docx") | Some("doc") => return Some(ContentKind::Docx),
        Some("pdf") => return Some(ContentKind::Pdf),
        _ => {}
    }

    match &header {
        Some(h) if h.contains("application/pdf") => Some(ContentKind::Pdf),
        _ => None,
    }
}

/// Lowercased extension of the last path segment, ignoring query and fragment.
fn url_suffix(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

const UNSAFE_IN_FILE_NAMES: [char; 10] = ['%', '/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Percent-encodes characters that are unsafe in file names.
///
/// `%` is encoded too, so distinct ids always give distinct names.
pub fn sanitize_entity_id(entity_id: &str) -> String {
    let mut name = String::with_capacity(entity_id.len());
    for c in entity_id.chars() {
        if UNSAFE_IN_FILE_NAMES.contains(&c) {
            name.push_str(&format!("%{:02X}", c as u32));
        } else {
            name.push(c);
        }
    }
    name
}

/// Where a document for `entity_id` of `kind` is stored.
pub fn storage_path(dir: &Path, entity_id: &str, kind: ContentKind) -> PathBuf {
    dir.join(format!("{}.{}", sanitize_entity_id(entity_id), kind.extension()))
}

/// Downloads one document and persists it, overwriting any earlier copy.
pub async fn download<F>(
    fetcher: &F,
    config: &PipelineConfig,
    entity_id: &str,
    url: &str,
) -> DownloadResult
where
    F: Fetcher + ?Sized,
{
    let guessed = infer_content_kind(None, url).unwrap_or(ContentKind::Unknown);

    let absolute = match join_url(&config.base_url, url) {
        Ok(u) => u,
        Err(e) => {
            warn!(entity_id, url, error = %e, "Cannot build document URL");
            return DownloadResult::failed(entity_id, guessed, e);
        }
    };

    let resp = match fetcher.get(&absolute).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(entity_id, url = %absolute, error = %e, "Document download failed");
            return DownloadResult::failed(entity_id, guessed, e);
        }
    };

    let kind = match infer_content_kind(resp.content_type.as_deref(), &absolute) {
        Some(kind) => kind,
        None => {
            warn!(
                entity_id,
                url = %absolute,
                content_type = ?resp.content_type,
                fallback = %config.fallback_kind,
                "Content kind undetermined by header and URL; using configured fallback"
            );
            config.fallback_kind
        }
    };

    let path = storage_path(&config.output_dir, entity_id, kind);
    if let Err(e) = tokio::fs::write(&path, &resp.body).await {
        warn!(entity_id, path = %path.display(), error = %e, "Failed to write document");
        return DownloadResult::failed(entity_id, kind, format!("write {}: {e}", path.display()));
    }

    debug!(entity_id, path = %path.display(), bytes = resp.body.len(), %kind, "Stored document");
    DownloadResult {
        entity_id: entity_id.to_string(),
        stored_path: Some(path),
        content_kind: kind,
        status: DownloadStatus::Success,
        error: None,
    }
}

/// Downloads every `Found` link; the result has exactly one entry per such link.
pub async fn download_all<F>(
    fetcher: &F,
    config: &PipelineConfig,
    links: &BTreeMap<String, LinkRecord>,
) -> BTreeMap<String, DownloadResult>
where
    F: Fetcher + ?Sized,
{
    let found: Vec<&LinkRecord> = links
        .values()
        .filter(|r| r.status == LinkStatus::Found)
        .collect();
    info!(documents = found.len(), concurrency = config.workers(), "Downloading documents");

    let results: Vec<DownloadResult> = stream::iter(found)
        .map(|record| async move {
            match record.url.as_deref() {
                Some(url) => download(fetcher, config, &record.entity_id, url).await,
                None => DownloadResult::failed(
                    &record.entity_id,
                    ContentKind::Unknown,
                    "link record has no url",
                ),
            }
        })
        .buffer_unordered(config.workers())
        .collect()
        .await;

    let downloads: BTreeMap<String, DownloadResult> = results
        .into_iter()
        .map(|r| (r.entity_id.clone(), r))
        .collect();

    let ok = downloads
        .values()
        .filter(|r| r.status == DownloadStatus::Success)
        .count();
    info!(ok, failed = downloads.len() - ok, "Downloads complete");
    downloads
}
