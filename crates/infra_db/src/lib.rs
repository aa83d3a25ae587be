//! Infrastructure Database Layer
//!
//! PostgreSQL backend for the claim store, built on SQLx.
//!
//! # Architecture
//!
//! The crate implements the domain's `ClaimRepository` port. Each claim is
//! stored as one row: the id, the derived status, the version stamp and
//! timestamps as columns for filtering and ordering, and the whole record as
//! JSONB.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PgClaimRepository};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/claims")).await?;
//! run_migrations(&pool).await?;
//! let repository = PgClaimRepository::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use repositories::PgClaimRepository;
