//! Link resolution: find each project's Book of Reference on its document index page.
//!
//! Anchors are checked against an ordered list of tier rules and the first
//! rule with a matching anchor wins, so a "Clean" copy always beats any other
//! Book of Reference on the same page.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};

use crate::contract::{Entity, Fetcher, LinkRecord, LinkStatus, LinkTier};
use crate::http::join_url;

pub const BOOK_OF_REFERENCE: &str = "Book of Reference";
pub const CLEAN: &str = "Clean";

// Constant selector; parse cannot fail.
static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static anchor selector"));

struct TierRule {
    tier: LinkTier,
    required: &'static [&'static str],
}

impl TierRule {
    fn matches(&self, href: &str) -> bool {
        self.required.iter().all(|marker| href.contains(marker))
    }
}

/// Highest priority first.
const TIER_RULES: [TierRule; 2] = [
    TierRule {
        tier: LinkTier::Clean,
        required: &[BOOK_OF_REFERENCE, CLEAN],
    },
    TierRule {
        tier: LinkTier::Any,
        required: &[BOOK_OF_REFERENCE],
    },
];

/// Picks the reference to download from an index page, in document order within a tier.
pub fn select_link(html: &str) -> Option<(LinkTier, String)> {
    let document = Html::parse_document(html);
    let hrefs: Vec<&str> = document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .collect();

    TIER_RULES.iter().find_map(|rule| {
        hrefs
            .iter()
            .find(|href| rule.matches(href))
            .map(|href| (rule.tier, href.to_string()))
    })
}

/// Escapes literal spaces and nothing else.
pub fn normalize_reference(reference: &str) -> String {
    reference.replace(' ', "%20")
}

/// Resolves one entity. Never fails: problems become `NotFound`/`FetchError` records.
pub async fn resolve<F>(fetcher: &F, base_url: &str, entity: &Entity) -> LinkRecord
where
    F: Fetcher + ?Sized,
{
    let index_url = match join_url(base_url, &entity.lookup_path) {
        Ok(url) => url,
        Err(e) => {
            warn!(entity_id = %entity.id, lookup_path = %entity.lookup_path, error = %e, "Invalid lookup path");
            return LinkRecord::fetch_error(&entity.id, &e);
        }
    };

    debug!(entity_id = %entity.id, url = %index_url, "Fetching document index");
    let page = match fetcher.get(&index_url).await {
        Ok(resp) => resp.text(),
        Err(e) => {
            warn!(entity_id = %entity.id, url = %index_url, error = %e, "Document index fetch failed");
            return LinkRecord::fetch_error(&entity.id, &e);
        }
    };

    match select_link(&page) {
        Some((tier, reference)) => {
            let url = normalize_reference(&reference);
            debug!(entity_id = %entity.id, ?tier, url = %url, "Book of Reference found");
            LinkRecord::found(&entity.id, url, tier)
        }
        None => {
            warn!(entity_id = %entity.id, name = %entity.name, "No Book of Reference link on index page");
            LinkRecord::not_found(&entity.id)
        }
    }
}

/// Resolves every entity with at most `concurrency` index fetches in flight.
///
/// Each task returns its own record; the map is built here once all tasks finish.
pub async fn resolve_all<F>(
    fetcher: &F,
    base_url: &str,
    entities: &[Entity],
    concurrency: usize,
) -> BTreeMap<String, LinkRecord>
where
    F: Fetcher + ?Sized,
{
    info!(entities = entities.len(), concurrency, "Resolving Book of Reference links");

    let records: Vec<LinkRecord> = stream::iter(entities)
        .map(|entity| resolve(fetcher, base_url, entity))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let links: BTreeMap<String, LinkRecord> = records
        .into_iter()
        .map(|record| (record.entity_id.clone(), record))
        .collect();

    let found = links
        .values()
        .filter(|r| r.status == LinkStatus::Found)
        .count();
    info!(found, total = links.len(), "Link resolution complete");
    links
}
