//! PostgREST destination (hosted Postgres behind a REST gateway)
//!
//! A batch is one `POST /rest/v1/{table}?on_conflict=...` with
//! `Prefer: resolution=merge-duplicates`, which PostgREST turns into a single
//! `INSERT ... ON CONFLICT DO UPDATE` statement.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Destination, DestinationWriter, uniform_columns};
use crate::error::WriteError;
use crate::ident;
use crate::record::{ConflictKey, MappedRecord};

/// Connection settings; the API key itself only ever comes from the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PostgrestConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub base_url: String,

    /// Environment variable holding the API key, if the gateway needs one
    pub api_key_env: Option<String>,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for PostgrestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key_env: None,
            timeout_ms: 30_000,
        }
    }
}

impl PostgrestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct PostgrestDestination {
    config: PostgrestConfig,
}

impl PostgrestDestination {
    pub fn new(config: PostgrestConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Destination for PostgrestDestination {
    fn describe(&self) -> String {
        format!("postgrest:{}", self.config.base_url)
    }

    async fn connect(&self) -> Result<Box<dyn DestinationWriter>, WriteError> {
        let api_key = match &self.config.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| WriteError::Connect(format!("environment variable {} is not set", var)))?,
            ),
            None => None,
        };

        let client = Client::builder()
            .timeout(self.config.timeout())
            .build()
            .map_err(|e| WriteError::Connect(e.to_string()))?;

        debug!(base_url = %self.config.base_url, "PostgrestDestination::connect: client ready");
        Ok(Box::new(PostgrestWriter {
            client,
            base_url: self.config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout: self.config.timeout(),
        }))
    }
}

struct PostgrestWriter {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[async_trait]
impl DestinationWriter for PostgrestWriter {
    async fn upsert(&mut self, table: &str, records: &[MappedRecord], key: &ConflictKey) -> Result<(), WriteError> {
        ident::check(table).map_err(|e| WriteError::InvalidBatch(e.to_string()))?;
        let columns = uniform_columns(records)?.join(",");
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        debug!(%url, records = records.len(), on_conflict = %key, "PostgrestWriter::upsert: posting batch");

        let mut request = self
            .client
            .post(&url)
            .query(&[("on_conflict", key.to_string()), ("columns", columns)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(records);
        if let Some(api_key) = &self.api_key {
            request = request.header("apikey", api_key).bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                WriteError::Timeout(self.timeout)
            } else {
                WriteError::Network(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(WriteError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
