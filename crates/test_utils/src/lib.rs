//! Test Utilities Crate
//!
//! Provides shared test infrastructure, fixtures, and helpers for the
//! claims orchestrator test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built submissions and claims
//! - `builders`: `TestClaimBuilder` for claims at any point of the pipeline
//! - `database`: PostgreSQL test container management
//! - `assertions`: Ledger and progress assertions
//! - `generators`: Property-based and `fake`-backed test data

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
