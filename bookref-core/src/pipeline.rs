//! Top-level orchestration: resolve → download → classify.
//!
//! Each stage is a fan-out/fan-in phase over all entities and is fully
//! collected before the next one starts. Per-entity problems are recorded
//! in the stage output and summarised in [`RunReport`]; the only run-level
//! failure is a content store that cannot be created.
//!
//! # Navigation
//! - Main entrypoint: [`run`]
//! - Output: [`RunReport`], [`RunTotals`], [`StageFailure`]

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::classify::classify_all;
use crate::config::PipelineConfig;
use crate::contract::{
    Category, DocumentClassification, DownloadResult, DownloadStatus, Entity, Fetcher, LinkRecord,
    LinkStatus,
};
use crate::download::download_all;
use crate::error::PipelineError;
use crate::resolve::resolve_all;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Download,
    Classify,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Resolve => "resolve",
            Stage::Download => "download",
            Stage::Classify => "classify",
        })
    }
}

/// One non-success outcome, with enough context to retry or inspect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub entity_id: String,
    pub stage: Stage,
    pub status: &'static str,
    pub cause: Option<String>,
    /// Transient failures (network, I/O, parsing) as opposed to content outcomes.
    pub retryable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub entities: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub fetch_errors: usize,
    pub downloaded: usize,
    pub download_failed: usize,
    pub classified: usize,
    pub processed: usize,
    pub unprocessed: usize,
    pub archived: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub totals: RunTotals,
    pub links: BTreeMap<String, LinkRecord>,
    pub downloads: BTreeMap<String, DownloadResult>,
    pub classifications: BTreeMap<String, DocumentClassification>,
    pub failures: Vec<StageFailure>,
}

impl RunReport {
    pub fn from_stages(
        entities: usize,
        links: BTreeMap<String, LinkRecord>,
        downloads: BTreeMap<String, DownloadResult>,
        classifications: BTreeMap<String, DocumentClassification>,
    ) -> Self {
        let mut totals = RunTotals {
            entities,
            ..RunTotals::default()
        };
        let mut failures = Vec::new();

        for link in links.values() {
            match link.status {
                LinkStatus::Found => totals.resolved += 1,
                LinkStatus::NotFound => {
                    totals.not_found += 1;
                    failures.push(StageFailure {
                        entity_id: link.entity_id.clone(),
                        stage: Stage::Resolve,
                        status: "not_found",
                        cause: None,
                        retryable: false,
                    });
                }
                LinkStatus::FetchError => {
                    totals.fetch_errors += 1;
                    failures.push(StageFailure {
                        entity_id: link.entity_id.clone(),
                        stage: Stage::Resolve,
                        status: "fetch_error",
                        cause: link.error.clone(),
                        retryable: true,
                    });
                }
            }
        }

        for download in downloads.values() {
            match download.status {
                DownloadStatus::Success => totals.downloaded += 1,
                DownloadStatus::Failed => {
                    totals.download_failed += 1;
                    failures.push(StageFailure {
                        entity_id: download.entity_id.clone(),
                        stage: Stage::Download,
                        status: "download_failed",
                        cause: download.error.clone(),
                        retryable: true,
                    });
                }
            }
        }

        for doc in classifications.values() {
            totals.classified += 1;
            let (status, retryable) = match doc.category {
                Category::Processed => {
                    totals.processed += 1;
                    continue;
                }
                Category::Unprocessed => {
                    totals.unprocessed += 1;
                    ("unprocessed", false)
                }
                Category::Archived => {
                    totals.archived += 1;
                    ("archived", false)
                }
                Category::Error => {
                    totals.errors += 1;
                    ("error", true)
                }
            };
            failures.push(StageFailure {
                entity_id: doc.document_id.clone(),
                stage: Stage::Classify,
                status,
                cause: doc.error.clone(),
                retryable,
            });
        }

        Self {
            totals,
            links,
            downloads,
            classifications,
            failures,
        }
    }

    /// Entities worth another attempt, in id order.
    pub fn failed_entity_ids(&self) -> Vec<&str> {
        let ids: std::collections::BTreeSet<&str> = self
            .failures
            .iter()
            .filter(|f| f.retryable)
            .map(|f| f.entity_id.as_str())
            .collect();
        ids.into_iter().collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Drops repeated entity ids, keeping the first occurrence.
pub fn unique_entities(entities: &[Entity]) -> Vec<Entity> {
    let mut seen: HashSet<String> = HashSet::new();
    entities
        .iter()
        .filter(|e| {
            let fresh = seen.insert(e.id.clone());
            if !fresh {
                warn!(entity_id = %e.id, "Duplicate entity id; ignoring repeat");
            }
            fresh
        })
        .cloned()
        .collect()
}

/// Runs all three stages for `entities`.
pub async fn run<F>(
    config: &PipelineConfig,
    fetcher: &F,
    entities: &[Entity],
) -> Result<RunReport, PipelineError>
where
    F: Fetcher + ?Sized,
{
    info!(entities = entities.len(), "[RUN] Starting pipeline");

    if let Err(source) = tokio::fs::create_dir_all(&config.output_dir).await {
        error!(path = %config.output_dir.display(), error = %source, "[RUN][ERROR] Content store unavailable");
        return Err(PipelineError::Store {
            path: config.output_dir.clone(),
            source,
        });
    }

    let entities = unique_entities(entities);
    let workers = config.workers();

    info!("[RUN] Stage 1/3: resolve");
    let links = resolve_all(fetcher, &config.base_url, &entities, workers).await;

    info!("[RUN] Stage 2/3: download");
    let downloads = download_all(fetcher, config, &links).await;

    info!("[RUN] Stage 3/3: classify");
    let classifications = classify_all(&downloads, workers).await;

    let report = RunReport::from_stages(entities.len(), links, downloads, classifications);
    info!(totals = ?report.totals, failures = report.failures.len(), "[RUN] Pipeline complete");
    Ok(report)
}
