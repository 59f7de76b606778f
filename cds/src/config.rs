//! Configuration for cardsync

use batchsync::{FieldMapping, PostgrestConfig, SourceQuery};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Main cardsync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub log_level: Option<String>,

    /// Where every job writes
    pub destination: DestinationConfig,

    /// Settings a job inherits unless it overrides them
    pub defaults: Defaults,

    pub jobs: Vec<JobConfig>,
}

/// Destination store, selected by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DestinationConfig {
    Sqlite { path: PathBuf },
    Postgrest(PostgrestConfig),
}

impl Default for DestinationConfig {
    fn default() -> Self {
        DestinationConfig::Sqlite {
            path: default_data_dir().join("remote.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Defaults {
    pub batch_size: usize,

    /// Attempts per batch for retryable write errors
    pub write_attempts: u32,

    /// Delay before the first retry, doubled on each further attempt
    pub retry_backoff_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            batch_size: batchsync::DEFAULT_BATCH_SIZE,
            write_attempts: 1,
            retry_backoff_ms: batchsync::DEFAULT_RETRY_BACKOFF.as_millis() as u64,
        }
    }
}

/// One source query synced into one destination table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobConfig {
    pub name: String,

    /// Local SQLite database the scraper writes
    pub source_path: PathBuf,

    pub query: SourceQuery,

    /// Source column `--lang` filters on
    #[serde(default)]
    pub language_column: Option<String>,

    /// Destination table
    pub table: String,

    pub conflict_key: Vec<String>,

    #[serde(default)]
    pub batch_size: Option<usize>,

    #[serde(default)]
    pub write_attempts: Option<u32>,

    #[serde(default)]
    pub mapping: FieldMapping,
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cardsync")
}

impl Config {
    /// Check job names are present and unique, and every mapping is sound.
    ///
    /// Batch sizes and conflict keys are checked when a job is built.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for job in &self.jobs {
            if job.name.trim().is_empty() {
                return Err(eyre::eyre!("Job with table {} has no name", job.table));
            }
            if !names.insert(job.name.as_str()) {
                return Err(eyre::eyre!("Job {} is defined more than once", job.name));
            }
            job.mapping
                .validate()
                .context(format!("Invalid mapping for job {}", job.name))?;
        }
        Ok(())
    }

    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|job| job.name == name)
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .cardsync.yml
        let local_config = PathBuf::from(".cardsync.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/cardsync/cardsync.yml
        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only `log-level`, before logging is set up
    ///
    /// Follows the same fallback chain as `load` and never fails.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "kebab-case")]
        struct LogLevelOnly {
            log_level: Option<String>,
        }

        let candidates = [
            config_path.cloned(),
            Some(PathBuf::from(".cardsync.yml")),
            Self::user_config_path(),
        ];
        let path = candidates.into_iter().flatten().find(|p| p.exists())?;
        let content = fs::read_to_string(path).ok()?;
        serde_yaml::from_str::<LogLevelOnly>(&content).ok()?.log_level
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cardsync").join("cardsync.yml"))
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
