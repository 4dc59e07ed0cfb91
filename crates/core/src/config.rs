// Pipeline configuration model
//
// Loaded once at process start by the daemon (see `leadflow-daemon`), then
// handed read-only to the services that need it.

use crate::domain::JobType;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default batch sizes per stage
pub const DEFAULT_INGESTION_BATCH: u32 = 1000;
pub const DEFAULT_FINDYMAIL_BATCH: u32 = 100;
pub const DEFAULT_AI_ENRICHMENT_BATCH: u32 = 50;
pub const DEFAULT_UPLOAD_BATCH: u32 = 500;

/// Default retry policy (fixed delay, no backoff)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5000;

/// Default claim lease (10 minutes)
pub const DEFAULT_CLAIM_LEASE_MS: i64 = 10 * 60 * 1000;

/// Default expired-claim sweep interval (1 minute)
pub const DEFAULT_REAPER_INTERVAL_MS: u64 = 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSizes {
    pub ingestion: u32,
    pub findymail: u32,
    pub ai_enrichment: u32,
    pub upload: u32,
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            ingestion: DEFAULT_INGESTION_BATCH,
            findymail: DEFAULT_FINDYMAIL_BATCH,
            ai_enrichment: DEFAULT_AI_ENRICHMENT_BATCH,
            upload: DEFAULT_UPLOAD_BATCH,
        }
    }
}

impl BatchSizes {
    pub fn for_stage(&self, stage: JobType) -> u32 {
        match stage {
            JobType::Ingestion => self.ingestion,
            JobType::FindymailEnrichment => self.findymail,
            JobType::AiEnrichment => self.ai_enrichment,
            JobType::Upload => self.upload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per external call (>= 1)
    pub max_attempts: u32,
    /// Fixed delay between attempts
    pub delay_ms: u64,
    /// Lead-level retries before a failed lead stays failed
    pub max_lead_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_lead_retries: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimConfig {
    pub lease_ms: i64,
    pub reaper_interval_ms: u64,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            lease_ms: DEFAULT_CLAIM_LEASE_MS,
            reaper_interval_ms: DEFAULT_REAPER_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Store URL (e.g. `sqlite:///var/lib/leadflow/leads.db`). Required.
    pub database_url: Option<String>,
    pub batch_sizes: BatchSizes,
    pub retry: RetryConfig,
    pub claim: ClaimConfig,
}

impl PipelineConfig {
    /// Reject configurations the pipeline cannot start with
    pub fn validate(&self) -> Result<()> {
        match self.database_url.as_deref().map(str::trim) {
            None | Some("") => {
                return Err(AppError::Config(
                    "database_url is not configured".to_string(),
                ))
            }
            Some(_) => {}
        }

        if self.retry.max_attempts == 0 {
            return Err(AppError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        for stage in JobType::ALL {
            if self.batch_sizes.for_stage(stage) == 0 {
                return Err(AppError::Config(format!(
                    "batch size for {} must be positive",
                    stage
                )));
            }
        }

        if self.claim.lease_ms <= 0 {
            return Err(AppError::Config(
                "claim.lease_ms must be positive".to_string(),
            ));
        }

        if self.claim.reaper_interval_ms == 0 {
            return Err(AppError::Config(
                "claim.reaper_interval_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// The validated store URL
    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| AppError::Config("database_url is not configured".to_string()))
    }
}
