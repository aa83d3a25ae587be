//! HTTP Adapters for Claim Collaborators
//!
//! Reqwest-backed implementations of the collaborator ports. All adapters
//! share one [`reqwest::Client`] and the same error mapping:
//!
//! - timeout -> `PortError::Timeout`
//! - connect failure -> `PortError::Connection`
//! - 404 -> `PortError::NotFound`
//! - 401/403 -> `PortError::Unauthorized`
//! - 429 -> `PortError::RateLimited`
//! - 5xx -> `PortError::ServiceUnavailable`
//! - undecodable body -> `PortError::Transformation`
//! - anything else -> `PortError::Internal`
//!
//! # Usage
//!
//! ```rust,ignore
//! let client = build_client(Duration::from_secs(5))?;
//! let collaborators = Collaborators {
//!     orchestrator: config.orchestrator_url.as_ref().map(|url| {
//!         Arc::new(OrchestratorClient::new(client.clone(), url)) as Arc<dyn OrchestratorPort>
//!     }),
//!     normalizer: Arc::new(NormalizerClient::new(client.clone(), &config.normalizer_url)),
//!     rules: Arc::new(RulesEngineClient::new(client.clone(), &config.rules_url)),
//!     signer: Arc::new(SignerClient::new(client.clone(), &config.signer_url)),
//!     bridge: Arc::new(BridgeClient::new(client, &config.bridge_url)),
//! };
//! ```

pub mod http;
pub mod services;

pub use http::{build_client, HttpEndpoint, CORRELATION_HEADER};
pub use services::{
    BridgeClient, NormalizerClient, OrchestratorClient, RulesEngineClient, SignerClient,
};
