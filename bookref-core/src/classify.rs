//! Document classification: turn a stored Book of Reference into a category and a count.
//!
//! Pages are scanned in order. Each page yields a [`PageObservation`]: the
//! number of distinct postcodes on it and which marker phrases it contains.
//!
//! - A document with exactly one page is a placeholder and is `Archived`
//!   without looking at its text.
//! - A page with postcodes, "category 3" and "category 1" or "category 2"
//!   is ambiguous and stops the scan with `Unprocessed`.
//! - Otherwise every page mentioning "category 3" adds its postcode count,
//!   and a completed scan is `Processed` with that total.
//!
//! Anything that prevents reading a page ends in `Error`. Classification has
//! no side effects and is deterministic for identical bytes.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::contract::{
    Category, ContentKind, DocumentClassification, DownloadResult, DownloadStatus,
};
use crate::error::ClassifyError;
use crate::pdf_text;

// UK postcodes, plus the GIR 0AA special case.
static POSTCODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[A-Z]{1,2}\d[A-Z\d]?\s?\d[A-Z]{2}\b|\bGIR\s?0AA\b")
        .expect("static postcode pattern")
});

/// Marker phrases looked for (case-insensitively) on every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Category1,
    Category2,
    Category3,
    Part1,
    Part2,
}

impl Marker {
    pub const ALL: [Marker; 5] = [
        Marker::Category1,
        Marker::Category2,
        Marker::Category3,
        Marker::Part1,
        Marker::Part2,
    ];

    /// Lowercase phrase matched against lowercased page text.
    pub fn phrase(self) -> &'static str {
        match self {
            Marker::Category1 => "category 1",
            Marker::Category2 => "category 2",
            Marker::Category3 => "category 3",
            Marker::Part1 => "part 1",
            Marker::Part2 => "part 2",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of markers present on a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerFlags(u8);

impl MarkerFlags {
    pub fn scan(text: &str) -> Self {
        let lower = text.to_lowercase();
        Marker::ALL
            .iter()
            .filter(|m| lower.contains(m.phrase()))
            .fold(MarkerFlags::default(), |flags, m| flags.with(*m))
    }

    pub fn with(self, marker: Marker) -> Self {
        MarkerFlags(self.0 | marker.bit())
    }

    pub fn contains(self, marker: Marker) -> bool {
        self.0 & marker.bit() != 0
    }
}

/// Counts distinct postcode-shaped matches; distinctness is by exact matched text.
pub fn count_unique_postcodes(text: &str) -> usize {
    POSTCODE
        .find_iter(text)
        .map(|m| m.as_str())
        .collect::<HashSet<_>>()
        .len()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageObservation {
    pub page_index: usize,
    pub postcode_count: usize,
    pub markers: MarkerFlags,
}

impl PageObservation {
    pub fn observe(page_index: usize, text: &str) -> Self {
        Self {
            page_index,
            postcode_count: count_unique_postcodes(text),
            markers: MarkerFlags::scan(text),
        }
    }

    /// Postcodes alongside category 3 and an earlier category.
    pub fn is_conflicting(&self) -> bool {
        self.postcode_count > 0
            && self.markers.contains(Marker::Category3)
            && (self.markers.contains(Marker::Category1) || self.markers.contains(Marker::Category2))
    }

    /// Postcodes that count towards the category 3 total.
    pub fn category_3_contribution(&self) -> u64 {
        if self.markers.contains(Marker::Category3) {
            self.postcode_count as u64
        } else {
            0
        }
    }
}

/// Page-addressable document text.
pub trait PagedDocument {
    fn page_count(&self) -> usize;

    /// Text of the zero-based page `index`.
    fn page_text(&self, index: usize) -> Result<String, ClassifyError>;
}

/// Already-extracted page texts.
#[derive(Debug, Clone, Default)]
pub struct TextPages(pub Vec<String>);

impl PagedDocument for TextPages {
    fn page_count(&self) -> usize {
        self.0.len()
    }

    fn page_text(&self, index: usize) -> Result<String, ClassifyError> {
        self.0.get(index).cloned().ok_or(ClassifyError::PageText {
            page: index,
            message: "page out of range".to_string(),
        })
    }
}

/// A PDF parsed with `lopdf`; text is extracted lazily per page.
pub struct PdfDocument {
    doc: lopdf::Document,
    pages: Vec<lopdf::ObjectId>,
}

impl PdfDocument {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ClassifyError> {
        let doc = lopdf::Document::load_mem(bytes).map_err(|e| ClassifyError::Open(e.to_string()))?;
        let pages = doc.get_pages().into_values().collect();
        Ok(Self { doc, pages })
    }
}

impl PagedDocument for PdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Result<String, ClassifyError> {
        let page_id = *self.pages.get(index).ok_or(ClassifyError::PageText {
            page: index,
            message: "page out of range".to_string(),
        })?;
        pdf_text::page_text(&self.doc, page_id).map_err(|e| ClassifyError::PageText {
            page: index,
            message: e.to_string(),
        })
    }
}

/// Runs the page scan over an opened document.
pub fn classify_document<D>(document_id: &str, doc: &D) -> DocumentClassification
where
    D: PagedDocument + ?Sized,
{
    let pages = doc.page_count();
    if pages == 1 {
        warn!(document_id, stage = "classify", "Single-page document treated as archived");
        return DocumentClassification::archived(document_id);
    }

    let mut total: u64 = 0;
    for index in 0..pages {
        let text = match doc.page_text(index) {
            Ok(text) => text,
            Err(e) => {
                warn!(document_id, stage = "classify", error = %e, "Page text unavailable");
                return DocumentClassification::error(document_id, e);
            }
        };

        let page = PageObservation::observe(index, &text);
        if page.is_conflicting() {
            warn!(
                document_id,
                stage = "classify",
                page = index + 1,
                postcodes = page.postcode_count,
                "Category 3 mixed with category 1/2 on one page; document unprocessed"
            );
            return DocumentClassification::unprocessed(document_id);
        }
        total += page.category_3_contribution();
    }

    debug!(document_id, pages, total, "Document processed");
    DocumentClassification::processed(document_id, total)
}

/// Opens `bytes` as `kind` and classifies it.
pub fn classify_bytes(document_id: &str, kind: ContentKind, bytes: &[u8]) -> DocumentClassification {
    match kind {
        ContentKind::Pdf => match PdfDocument::from_bytes(bytes) {
            Ok(doc) => classify_document(document_id, &doc),
            Err(e) => {
                warn!(document_id, stage = "classify", error = %e, "Document could not be opened");
                DocumentClassification::error(document_id, e)
            }
        },
        other => {
            let e = ClassifyError::Unsupported(other);
            warn!(document_id, stage = "classify", error = %e, "Document kind not classifiable");
            DocumentClassification::error(document_id, e)
        }
    }
}

/// Reads a stored document and classifies it off the async runtime.
pub async fn classify_stored(
    document_id: &str,
    path: &Path,
    kind: ContentKind,
) -> DocumentClassification {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let e = ClassifyError::Io(e);
            warn!(document_id, path = %path.display(), error = %e, "Stored document unreadable");
            return DocumentClassification::error(document_id, e);
        }
    };

    let id = document_id.to_string();
    match tokio::task::spawn_blocking(move || classify_bytes(&id, kind, &bytes)).await {
        Ok(classification) => classification,
        Err(e) => {
            warn!(document_id, error = %e, "Classification task aborted");
            DocumentClassification::error(document_id, e)
        }
    }
}

fn document_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Classifies a file, using its stem as document id and its extension as kind.
pub async fn classify_path(path: &Path) -> DocumentClassification {
    let kind = path
        .extension()
        .map(|e| ContentKind::from_extension(&e.to_string_lossy()))
        .unwrap_or(ContentKind::Unknown);
    classify_stored(&document_id(path), path, kind).await
}

/// Classifies every successful download, keyed by entity id.
pub async fn classify_all(
    downloads: &BTreeMap<String, DownloadResult>,
    concurrency: usize,
) -> BTreeMap<String, DocumentClassification> {
    let stored: Vec<(&str, &Path, ContentKind)> = downloads
        .values()
        .filter(|d| d.status == DownloadStatus::Success)
        .filter_map(|d| {
            d.stored_path
                .as_deref()
                .map(|p| (d.entity_id.as_str(), p, d.content_kind))
        })
        .collect();
    info!(documents = stored.len(), concurrency, "Classifying documents");

    let results: Vec<DocumentClassification> = stream::iter(stored)
        .map(|(id, path, kind)| classify_stored(id, path, kind))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    collect_classifications(results)
}

/// Classifies the `.pdf` and `.docx` files directly inside `dir`.
///
/// A stem stored under both kinds is classified once, from the PDF.
pub async fn classify_dir(
    dir: &Path,
    concurrency: usize,
) -> Result<BTreeMap<String, DocumentClassification>, ClassifyError> {
    let mut found: Vec<(ContentKind, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let kind = path
            .extension()
            .map(|e| ContentKind::from_extension(&e.to_string_lossy()));
        if let Some(kind @ (ContentKind::Pdf | ContentKind::Docx)) = kind {
            if entry.file_type().await?.is_file() {
                found.push((kind, path));
            }
        }
    }
    found.sort_by(|a, b| a.1.cmp(&b.1));

    let mut by_id: BTreeMap<String, (ContentKind, PathBuf)> = BTreeMap::new();
    for (kind, path) in found {
        let id = document_id(&path);
        let replace = match by_id.get(&id) {
            None => true,
            Some((kept_kind, kept)) => {
                let replace = *kept_kind != ContentKind::Pdf && kind == ContentKind::Pdf;
                let (kept, skipped) = if replace { (&path, kept) } else { (kept, &path) };
                warn!(
                    document_id = %id,
                    kept = %kept.display(),
                    skipped = %skipped.display(),
                    "Document stored under more than one kind; classifying one copy"
                );
                replace
            }
        };
        if replace {
            by_id.insert(id, (kind, path));
        }
    }
    info!(dir = %dir.display(), documents = by_id.len(), "Classifying directory");

    let results: Vec<DocumentClassification> = stream::iter(by_id.into_iter())
        .map(|(id, (kind, path))| async move { classify_stored(&id, &path, kind).await })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    Ok(collect_classifications(results))
}

fn collect_classifications(
    results: Vec<DocumentClassification>,
) -> BTreeMap<String, DocumentClassification> {
    let mut map: BTreeMap<String, DocumentClassification> = BTreeMap::new();
    for classification in results {
        match map.entry(classification.document_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(classification);
            }
            Entry::Occupied(kept) => warn!(
                document_id = %kept.key(),
                kept = ?kept.get().category,
                dropped = ?classification.category,
                "Duplicate document id; keeping first classification"
            ),
        }
    }
    let processed = map
        .values()
        .filter(|c| c.category == Category::Processed)
        .count();
    info!(processed, total = map.len(), "Classification complete");
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_flags_are_case_insensitive() {
        let flags = MarkerFlags::scan("PART 2 ... Category 3 claimants");
        assert!(flags.contains(Marker::Part2));
        assert!(flags.contains(Marker::Category3));
        assert!(!flags.contains(Marker::Category1));
        assert!(!flags.contains(Marker::Part1));
    }

    #[test]
    fn postcodes_counted_once_per_distinct_text() {
        let text = "SW1A 1AA, SW1A 1AA, M1 1AE and GIR 0AA";
        assert_eq!(count_unique_postcodes(text), 3);
        assert_eq!(count_unique_postcodes("ec1a1bb"), 1);
        assert_eq!(count_unique_postcodes("no postcodes here 12345"), 0);
    }

    #[test]
    fn conflict_requires_postcodes() {
        let quiet = PageObservation::observe(0, "Category 1 and Category 3, no addresses");
        assert!(!quiet.is_conflicting());
        let loud = PageObservation::observe(0, "Category 2 and Category 3 at LS1 4AP");
        assert!(loud.is_conflicting());
    }

    #[test]
    fn repeated_document_id_keeps_first() {
        let map = collect_classifications(vec![
            DocumentClassification::processed("X", 4),
            DocumentClassification::error("X", "second copy"),
            DocumentClassification::archived("Y"),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["X"], DocumentClassification::processed("X", 4));
    }
}
