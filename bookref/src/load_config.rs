/// `load_config` module: loads the static YAML run configuration and adapts it into the core [`PipelineConfig`].
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into typed sections (`site`, `catalog`, `download`)
/// - Fill every omitted key with the core defaults
/// - Apply the `BOOKREF_BASE_URL` environment override
///
/// # Errors
/// All errors use `anyhow::Error` and name the offending file; YAML problems mention "parse".
use anyhow::Result;
use bookref_core::config::{
    PipelineConfig, DEFAULT_BASE_URL, DEFAULT_CONCURRENCY, DEFAULT_OUTPUT_DIR, DEFAULT_TIMEOUT_SECS,
};
use bookref_core::contract::ContentKind;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const BASE_URL_ENV: &str = "BOOKREF_BASE_URL";
pub const DEFAULT_CATALOG_PATH: &str = "data/projects.csv";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub download: DownloadSection,
}

#[derive(Debug, Deserialize)]
pub struct SiteSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CatalogSection {
    #[serde(default = "default_catalog_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct DownloadSection {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fallback_kind")]
    pub fallback_kind: ContentKind,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            fallback_kind: default_fallback_kind(),
        }
    }
}

impl CliConfig {
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            base_url: self.site.base_url.clone(),
            output_dir: self.download.output_dir.clone(),
            concurrency: self.download.concurrency,
            timeout_secs: self.download.timeout_secs,
            fallback_kind: self.download.fallback_kind,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from(DEFAULT_CATALOG_PATH)
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

/// Loads a YAML config file and applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!(
                "Failed to parse config YAML {:?}: {e}",
                path_ref
            ));
        }
    };

    if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
        if !base_url.trim().is_empty() {
            info!(base_url = %base_url, "Base URL overridden from environment");
            config.site.base_url = base_url;
        }
    }

    Ok(config)
}
