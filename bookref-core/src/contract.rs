//! # contract: shared data model and the HTTP seam
//!
//! Every stage of the pipeline reads and produces the plain data types
//! defined here. Records are produced exactly once per entity (or document)
//! by their owning stage and never mutated afterwards.
//!
//! ## Mocking & Testing
//! - [`Fetcher`] is annotated for `mockall`, so stage and pipeline tests can
//!   script responses and transport failures per URL without a network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mockall::automock;

use crate::error::FetchError;

/// An externally enumerated unit of work (an infrastructure project).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique project reference, e.g. `EN010012`.
    pub id: String,
    pub name: String,
    /// Path (or absolute URL) of the project's document index page.
    pub lookup_path: String,
}

impl Entity {
    /// Builds an entity whose lookup path is the project's document search
    /// filtered to Book of Reference documents.
    pub fn from_reference(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        let lookup_path = format!("/projects/{id}/documents?searchTerm=book+of+reference");
        Self {
            id,
            name: name.into(),
            lookup_path,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Found,
    NotFound,
    FetchError,
}

/// Which selector tier produced a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTier {
    /// "Book of Reference" together with "Clean".
    Clean,
    /// "Book of Reference" alone.
    Any,
}

/// Outcome of resolving one entity's document index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub entity_id: String,
    /// Selected reference with spaces escaped; set only when `Found`.
    pub url: Option<String>,
    pub status: LinkStatus,
    pub tier: Option<LinkTier>,
    pub error: Option<String>,
}

impl LinkRecord {
    pub fn found(entity_id: &str, url: String, tier: LinkTier) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            url: Some(url),
            status: LinkStatus::Found,
            tier: Some(tier),
            error: None,
        }
    }

    pub fn not_found(entity_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            url: None,
            status: LinkStatus::NotFound,
            tier: None,
            error: None,
        }
    }

    pub fn fetch_error(entity_id: &str, error: &FetchError) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            url: None,
            status: LinkStatus::FetchError,
            tier: None,
            error: Some(error.to_string()),
        }
    }
}

/// Kind of document body, inferred from headers and URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Pdf,
    Docx,
    Unknown,
}

impl ContentKind {
    pub fn extension(self) -> &'static str {
        match self {
            ContentKind::Pdf => "pdf",
            ContentKind::Docx => "docx",
            ContentKind::Unknown => "bin",
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => ContentKind::Pdf,
            "docx" | "doc" => ContentKind::Docx,
            _ => ContentKind::Unknown,
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ContentKind::Pdf => "pdf",
            ContentKind::Docx => "docx",
            ContentKind::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Success,
    Failed,
}

/// Outcome of downloading one resolved document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub entity_id: String,
    pub stored_path: Option<std::path::PathBuf>,
    pub content_kind: ContentKind,
    pub status: DownloadStatus,
    pub error: Option<String>,
}

impl DownloadResult {
    pub fn failed(entity_id: &str, content_kind: ContentKind, error: impl ToString) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            stored_path: None,
            content_kind,
            status: DownloadStatus::Failed,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Processed,
    Unprocessed,
    Archived,
    Error,
}

/// Terminal classification of one stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentClassification {
    pub document_id: String,
    pub category: Category,
    /// Category 3 postcode total; defined only for `Processed`.
    pub derived_count: Option<u64>,
    pub error: Option<String>,
}

impl DocumentClassification {
    pub fn processed(document_id: &str, count: u64) -> Self {
        Self::with_category(document_id, Category::Processed, Some(count), None)
    }

    pub fn unprocessed(document_id: &str) -> Self {
        Self::with_category(document_id, Category::Unprocessed, None, None)
    }

    pub fn archived(document_id: &str) -> Self {
        Self::with_category(document_id, Category::Archived, None, None)
    }

    pub fn error(document_id: &str, cause: impl ToString) -> Self {
        Self::with_category(document_id, Category::Error, None, Some(cause.to_string()))
    }

    fn with_category(
        document_id: &str,
        category: Category,
        derived_count: Option<u64>,
        error: Option<String>,
    ) -> Self {
        Self {
            document_id: document_id.to_string(),
            category,
            derived_count,
            error,
        }
    }
}

/// A successful HTTP response, already fully read.
#[derive(Debug, Clone, Default)]
pub struct FetchedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Trait for issuing unauthenticated GET requests.
///
/// Implementations must return `Err` for transport failures, timeouts and
/// non-success statuses, so callers only ever see usable bodies in `Ok`.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchedResponse, FetchError>;
}
