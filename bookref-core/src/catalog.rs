//! Project catalog: the site's CSV export of all projects, turned into [`Entity`] values.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::contract::{Entity, Fetcher};
use crate::error::CatalogError;
use crate::http::join_url;

pub const REFERENCE_COLUMN: &str = "Project reference";
pub const NAME_COLUMN: &str = "Project name";
pub const SEARCH_PATH: &str = "/project-search";

static DOWNLOAD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[download][href*="/api/applications-download"]"#)
        .expect("static download selector")
});

/// Reads entities from CSV with a header row.
///
/// Rows without a reference are skipped; a repeated reference keeps its first row.
pub fn parse_catalog<R: Read>(reader: R) -> Result<Vec<Entity>, CatalogError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
            .ok_or_else(|| CatalogError::MissingColumn(name.to_string()))
    };
    let reference_idx = column(REFERENCE_COLUMN)?;
    let name_idx = column(NAME_COLUMN)?;

    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let reference = row.get(reference_idx).unwrap_or_default().trim();
        if reference.is_empty() {
            continue;
        }
        if !seen.insert(reference.to_string()) {
            warn!(entity_id = reference, "Duplicate project reference in catalog; keeping first");
            continue;
        }
        let name = row.get(name_idx).unwrap_or_default().trim();
        entities.push(Entity::from_reference(reference, name));
    }

    info!(entities = entities.len(), "Catalog parsed");
    Ok(entities)
}

pub fn load_catalog(path: &Path) -> Result<Vec<Entity>, CatalogError> {
    info!(path = %path.display(), "Loading catalog");
    let file = std::fs::File::open(path)?;
    parse_catalog(file)
}

/// The catalog export link on the project search page, if present.
pub fn find_catalog_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let href = document
        .select(&DOWNLOAD_SELECTOR)
        .find_map(|a| a.value().attr("href"))
        .map(str::to_string);
    href
}

/// Downloads the catalog export linked from the search page into `dest`.
pub async fn fetch_catalog<F>(fetcher: &F, base_url: &str, dest: &Path) -> Result<(), CatalogError>
where
    F: Fetcher + ?Sized,
{
    let search_url = join_url(base_url, SEARCH_PATH)?;
    info!(url = %search_url, "Fetching project search page");
    let page = fetcher.get(&search_url).await?.text();

    let link = find_catalog_link(&page).ok_or_else(|| CatalogError::LinkNotFound(search_url.clone()))?;
    let file_url = join_url(base_url, &link)?;
    info!(url = %file_url, "Downloading catalog");
    let file = fetcher.get(&file_url).await?;

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dest, &file.body).await?;
    info!(path = %dest.display(), bytes = file.body.len(), "Catalog saved");
    Ok(())
}
