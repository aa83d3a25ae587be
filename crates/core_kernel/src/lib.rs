//! Core Kernel - Foundational types for the claims orchestrator
//!
//! This crate provides the building blocks shared by every other crate:
//! - Claim and run identifiers
//! - Port contracts (errors, health checks, operation metadata)
//! - Configuration error type

pub mod identifiers;
pub mod ports;
pub mod error;

pub use identifiers::{ClaimId, IdentifierError, RunId};
pub use ports::{
    AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, OperationMetadata, PortError,
};
pub use error::CoreError;
