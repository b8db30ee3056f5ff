mod common;

use bookref_core::contract::{Entity, LinkStatus, LinkTier, MockFetcher};
use bookref_core::error::FetchError;
use bookref_core::resolve::{normalize_reference, resolve, resolve_all, select_link};

use common::{html, index_url, BASE_URL};

#[test]
fn normalize_escapes_spaces_only() {
    assert_eq!(
        normalize_reference("Book of Reference Clean.pdf"),
        "Book%20of%20Reference%20Clean.pdf"
    );
    assert_eq!(
        normalize_reference("/docs/EN010012-000123-2.1 Book of Reference (Clean)&v=2.pdf"),
        "/docs/EN010012-000123-2.1%20Book%20of%20Reference%20(Clean)&v=2.pdf"
    );
}

#[test]
fn clean_anchor_beats_earlier_plain_anchor() {
    let page = r#"
        <a href="/docs/Book of Reference.pdf">Book of Reference</a>
        <a href="/docs/Book of Reference Clean.pdf">Book of Reference (clean)</a>
        <a href="/docs/Book of Reference Tracked.pdf">Tracked</a>
    "#;
    assert_eq!(
        select_link(page),
        Some((LinkTier::Clean, "/docs/Book of Reference Clean.pdf".to_string()))
    );
}

#[test]
fn falls_back_to_first_plain_anchor() {
    let page = r#"
        <a href="/docs/Land Plans.pdf">Land plans</a>
        <a href="/docs/Book of Reference Rev 2.pdf">Rev 2</a>
        <a href="/docs/Book of Reference Rev 1.pdf">Rev 1</a>
    "#;
    assert_eq!(
        select_link(page),
        Some((LinkTier::Any, "/docs/Book of Reference Rev 2.pdf".to_string()))
    );
}

#[test]
fn markers_are_matched_on_href_not_link_text() {
    let page = r#"<a href="/docs/EN0100-000321.pdf">Book of Reference Clean</a>"#;
    assert_eq!(select_link(page), None);
}

#[tokio::test]
async fn resolve_fetches_lookup_path_and_normalizes() {
    let entity = Entity::from_reference("EN010012", "North Falls");
    let expected = index_url("EN010012");

    let mut fetcher = MockFetcher::new();
    fetcher
        .expect_get()
        .withf(move |url| url.to_string() == expected)
        .times(1)
        .returning(|_| {
            Ok(html(
                r#"<a href="/docs/Book of Reference.pdf">a</a><a href="/docs/Book of Reference Clean.pdf">b</a>"#,
            ))
        });

    let record = resolve(&fetcher, BASE_URL, &entity).await;
    assert_eq!(record.entity_id, "EN010012");
    assert_eq!(record.status, LinkStatus::Found);
    assert_eq!(record.tier, Some(LinkTier::Clean));
    assert_eq!(
        record.url.as_deref(),
        Some("/docs/Book%20of%20Reference%20Clean.pdf")
    );
}

#[tokio::test]
async fn resolve_reports_not_found() {
    let entity = Entity::from_reference("TR010001", "Bypass");
    let mut fetcher = MockFetcher::new();
    fetcher
        .expect_get()
        .returning(|_| Ok(html(r#"<a href="/docs/Statement of Reasons.pdf">SoR</a>"#)));

    let record = resolve(&fetcher, BASE_URL, &entity).await;
    assert_eq!(record.status, LinkStatus::NotFound);
    assert_eq!(record.url, None);
    assert_eq!(record.error, None);
}

#[tokio::test]
async fn resolve_turns_http_failure_into_fetch_error() {
    let entity = Entity::from_reference("WN010003", "Tidal lagoon");
    let mut fetcher = MockFetcher::new();
    fetcher
        .expect_get()
        .returning(|_| Err(FetchError::Status(503)));

    let record = resolve(&fetcher, BASE_URL, &entity).await;
    assert_eq!(record.status, LinkStatus::FetchError);
    assert_eq!(record.url, None);
    assert!(record.error.as_deref().unwrap_or_default().contains("503"));
}

#[tokio::test]
async fn resolve_all_isolates_failures_per_entity() {
    let entities: Vec<Entity> = (1..=6)
        .map(|i| Entity::from_reference(format!("EN0100{i:02}"), format!("Project {i}")))
        .collect();

    let mut fetcher = MockFetcher::new();
    fetcher.expect_get().times(6).returning(|url: &str| {
        if url.contains("EN010003") {
            Err(FetchError::Timeout)
        } else if url.contains("EN010005") {
            Ok(html("<p>No documents</p>"))
        } else {
            Ok(html(r#"<a href="https://cdn.example.org/Book of Reference.pdf">BoR</a>"#))
        }
    });

    let links = resolve_all(&fetcher, BASE_URL, &entities, 3).await;
    assert_eq!(links.len(), 6);
    assert_eq!(links["EN010003"].status, LinkStatus::FetchError);
    assert_eq!(links["EN010005"].status, LinkStatus::NotFound);
    for id in ["EN010001", "EN010002", "EN010004", "EN010006"] {
        assert_eq!(links[id].status, LinkStatus::Found, "{id}");
        assert_eq!(
            links[id].url.as_deref(),
            Some("https://cdn.example.org/Book%20of%20Reference.pdf")
        );
    }
}
