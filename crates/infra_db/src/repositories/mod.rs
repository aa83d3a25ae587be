//! Repository implementations for domain ports
//!
//! Each repository implements a domain port on top of SQLx and maps between
//! database rows and domain types. Optimistic concurrency is enforced in SQL.

pub mod claims;

pub use claims::PgClaimRepository;
