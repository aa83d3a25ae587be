//! HTTP clients for the orchestrator and the four chain collaborators

use async_trait::async_trait;
use reqwest::Client;

use core_kernel::{DomainPort, PortError};
use crate::ports::{
    BridgePort, CallContext, NormalizeRequest, NormalizedCode, NormalizerPort, OrchestrationReceipt,
    OrchestrationRequest, OrchestratorPort, PricedClaim, PricingRequest, RulesEnginePort, SignRequest,
    SignedPayload, SignerPort, SubmissionReceipt, SubmitRequest,
};
use super::http::HttpEndpoint;

/// Workflow orchestrator; the configured URL is the workflow trigger itself
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    endpoint: HttpEndpoint,
}

impl OrchestratorClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            endpoint: HttpEndpoint::new(client, url, "orchestrator"),
        }
    }
}

impl DomainPort for OrchestratorClient {}

#[async_trait]
impl OrchestratorPort for OrchestratorClient {
    async fn start_workflow(
        &self,
        request: &OrchestrationRequest,
        ctx: &CallContext,
    ) -> Result<OrchestrationReceipt, PortError> {
        self.endpoint.post_json("", request, ctx).await
    }
}

/// `POST <base>/normalize`
#[derive(Debug, Clone)]
pub struct NormalizerClient {
    endpoint: HttpEndpoint,
}

impl NormalizerClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            endpoint: HttpEndpoint::new(client, base_url, "normalizer"),
        }
    }
}

impl DomainPort for NormalizerClient {}

#[async_trait]
impl NormalizerPort for NormalizerClient {
    async fn normalize(
        &self,
        request: &NormalizeRequest,
        ctx: &CallContext,
    ) -> Result<NormalizedCode, PortError> {
        self.endpoint.post_json("normalize", request, ctx).await
    }
}

/// `POST <base>/validate`
#[derive(Debug, Clone)]
pub struct RulesEngineClient {
    endpoint: HttpEndpoint,
}

impl RulesEngineClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            endpoint: HttpEndpoint::new(client, base_url, "rules-engine"),
        }
    }
}

impl DomainPort for RulesEngineClient {}

#[async_trait]
impl RulesEnginePort for RulesEngineClient {
    async fn apply_rules(
        &self,
        request: &PricingRequest,
        ctx: &CallContext,
    ) -> Result<PricedClaim, PortError> {
        self.endpoint.post_json("validate", request, ctx).await
    }
}

/// `POST <base>/sign`
#[derive(Debug, Clone)]
pub struct SignerClient {
    endpoint: HttpEndpoint,
}

impl SignerClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            endpoint: HttpEndpoint::new(client, base_url, "signer"),
        }
    }
}

impl DomainPort for SignerClient {}

#[async_trait]
impl SignerPort for SignerClient {
    async fn sign(&self, request: &SignRequest, ctx: &CallContext) -> Result<SignedPayload, PortError> {
        self.endpoint.post_json("sign", request, ctx).await
    }
}

/// `POST <base>/submit-claim`
#[derive(Debug, Clone)]
pub struct BridgeClient {
    endpoint: HttpEndpoint,
}

impl BridgeClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            endpoint: HttpEndpoint::new(client, base_url, "nphies-bridge"),
        }
    }
}

impl DomainPort for BridgeClient {}

#[async_trait]
impl BridgePort for BridgeClient {
    async fn submit(
        &self,
        request: &SubmitRequest,
        ctx: &CallContext,
    ) -> Result<SubmissionReceipt, PortError> {
        self.endpoint.post_json("submit-claim", request, ctx).await
    }
}
