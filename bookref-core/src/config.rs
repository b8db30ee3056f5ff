use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::contract::ContentKind;

pub const DEFAULT_BASE_URL: &str =
    "https://national-infrastructure-consenting.planninginspectorate.gov.uk";
pub const DEFAULT_OUTPUT_DIR: &str = "data/book-of-references";
pub const DEFAULT_CONCURRENCY: usize = 16;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Settings shared by all three stages of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Content store; every downloaded document lands directly in here.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Upper bound on in-flight tasks within one stage.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Kind assumed when neither the response header nor the URL suffix decides.
    #[serde(default = "default_fallback_kind")]
    pub fallback_kind: ContentKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            output_dir: default_output_dir(),
            concurrency: DEFAULT_CONCURRENCY,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            fallback_kind: ContentKind::Pdf,
        }
    }
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Concurrency clamped to at least one worker.
    pub fn workers(&self) -> usize {
        self.concurrency.max(1)
    }

    pub fn trace_loaded(&self) {
        info!(
            base_url = %self.base_url,
            output_dir = %self.output_dir.display(),
            concurrency = self.workers(),
            timeout_secs = self.timeout_secs,
            fallback_kind = %self.fallback_kind,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_fallback_kind() -> ContentKind {
    ContentKind::Pdf
}
