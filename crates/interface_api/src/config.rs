//! API configuration
//!
//! Every field has a default, so the server starts with no environment at
//! all: in-memory store, chain-only execution against local collaborators.

use std::time::Duration;

use serde::Deserialize;

use core_kernel::CoreError;

use domain_claims::workflow::DEFAULT_FACILITY_ID;
use domain_claims::{RetentionPolicy, StepTimeouts, WorkflowSettings, DEFAULT_MAX_ATTACHMENT_BYTES};

/// Where claims are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Log level
    pub log_level: String,
    pub log_format: LogFormat,
    /// Base URL used to build tracking links
    pub public_base_url: String,
    pub store_backend: StoreBackend,
    /// Database URL, used when `store_backend` is postgres
    pub database_url: String,
    pub database_max_connections: u32,
    /// Workflow orchestrator endpoint; without it every run uses the direct chain
    pub orchestrator_url: Option<String>,
    pub fallback_enabled: bool,
    pub normalizer_url: String,
    pub rules_url: String,
    pub signer_url: String,
    pub bridge_url: String,
    pub orchestrator_timeout_secs: u64,
    pub normalizer_timeout_secs: u64,
    pub rules_timeout_secs: u64,
    pub signer_timeout_secs: u64,
    pub bridge_timeout_secs: u64,
    pub default_facility_id: String,
    pub retention_hours: u64,
    pub sweep_interval_secs: u64,
    pub max_attachment_bytes: u64,
    pub allow_rejected_retry: bool,
    pub cors_allow_any: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            public_base_url: "http://localhost:8080".to_string(),
            store_backend: StoreBackend::Memory,
            database_url: "postgres://localhost/claims".to_string(),
            database_max_connections: 10,
            orchestrator_url: None,
            fallback_enabled: true,
            normalizer_url: "http://localhost:8000".to_string(),
            rules_url: "http://localhost:8002".to_string(),
            signer_url: "http://localhost:8001".to_string(),
            bridge_url: "http://localhost:8003".to_string(),
            orchestrator_timeout_secs: 30,
            normalizer_timeout_secs: 10,
            rules_timeout_secs: 10,
            signer_timeout_secs: 10,
            bridge_timeout_secs: 30,
            default_facility_id: DEFAULT_FACILITY_ID.to_string(),
            retention_hours: 24,
            sweep_interval_secs: 3600,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            allow_rejected_retry: true,
            cors_allow_any: true,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from `API_`-prefixed environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Rejects settings the server cannot run with
    pub fn validate(&self) -> Result<(), CoreError> {
        let timeouts = [
            ("orchestrator_timeout_secs", self.orchestrator_timeout_secs),
            ("normalizer_timeout_secs", self.normalizer_timeout_secs),
            ("rules_timeout_secs", self.rules_timeout_secs),
            ("signer_timeout_secs", self.signer_timeout_secs),
            ("bridge_timeout_secs", self.bridge_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(CoreError::configuration(format!("{} must be greater than zero", name)));
        }
        if self.retention_hours == 0 {
            return Err(CoreError::configuration("retention_hours must be greater than zero"));
        }
        if !self.public_base_url.starts_with("http://") && !self.public_base_url.starts_with("https://") {
            return Err(CoreError::configuration(format!(
                "public_base_url must be an http(s) URL, got '{}'",
                self.public_base_url
            )));
        }
        if self.store_backend == StoreBackend::Postgres && self.database_url.trim().is_empty() {
            return Err(CoreError::configuration("database_url is required for the postgres store"));
        }
        Ok(())
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Status URL handed back to submitters
    pub fn tracking_url(&self, claim_id: impl std::fmt::Display) -> String {
        format!(
            "{}/api/v1/claims/{}/status",
            self.public_base_url.trim_end_matches('/'),
            claim_id
        )
    }

    /// Orchestrator endpoint, ignoring blank values
    pub fn orchestrator_endpoint(&self) -> Option<&str> {
        self.orchestrator_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            fallback_enabled: self.fallback_enabled,
            default_facility_id: self.default_facility_id.clone(),
            timeouts: StepTimeouts {
                orchestrator: Duration::from_secs(self.orchestrator_timeout_secs),
                normalizer: Duration::from_secs(self.normalizer_timeout_secs),
                rules: Duration::from_secs(self.rules_timeout_secs),
                signer: Duration::from_secs(self.signer_timeout_secs),
                bridge: Duration::from_secs(self.bridge_timeout_secs),
            },
        }
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            retention: Duration::from_secs(self.retention_hours * 60 * 60),
            interval: Duration::from_secs(self.sweep_interval_secs.max(1)),
        }
    }
}
