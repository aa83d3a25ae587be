//! Strongly-typed identifiers
//!
//! Claim identifiers are human-readable (`CLM-<base36 millis>-<6 random>`) because
//! they are handed back to callers as tracking references. Internal identifiers
//! that never leave the service are newtype wrappers around UUIDs.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

const CLAIM_PREFIX: &str = "CLM";
const SUFFIX_LEN: usize = 6;
const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Errors raised when parsing identifiers from untrusted input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier must start with '{expected}-'")]
    MissingPrefix { expected: &'static str },

    #[error("identifier segment '{0}' must be non-empty uppercase base36")]
    InvalidSegment(String),

    #[error("identifier suffix must be exactly 6 characters")]
    InvalidSuffixLength,

    #[error("invalid uuid: {0}")]
    InvalidUuid(String),
}

/// Identifier of a claim, e.g. `CLM-LZ3K9Q2M-7HX0QA`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClaimId(String);

impl ClaimId {
    /// Generates a new identifier from the current time and a random suffix
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();

        Self(format!("{}-{}-{}", CLAIM_PREFIX, to_base36(millis), suffix))
    }

    /// Returns the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identifier prefix for display
    pub fn prefix() -> &'static str {
        CLAIM_PREFIX
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ClaimId {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix("CLM-")
            .ok_or(IdentifierError::MissingPrefix { expected: CLAIM_PREFIX })?;

        let (timestamp, suffix) = body
            .rsplit_once('-')
            .ok_or_else(|| IdentifierError::InvalidSegment(body.to_string()))?;

        if !is_base36_segment(timestamp) {
            return Err(IdentifierError::InvalidSegment(timestamp.to_string()));
        }
        if suffix.len() != SUFFIX_LEN {
            return Err(IdentifierError::InvalidSuffixLength);
        }
        if !is_base36_segment(suffix) {
            return Err(IdentifierError::InvalidSegment(suffix.to_string()));
        }

        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ClaimId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClaimId> for String {
    fn from(id: ClaimId) -> String {
        id.0
    }
}

fn is_base36_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new time-ordered identifier (v7)
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Uuid::parse_str(uuid_str)
                    .map(Self)
                    .map_err(|e| IdentifierError::InvalidUuid(e.to_string()))
            }
        }
    };
}

// One workflow execution of a claim; a retry starts a new run
define_id!(RunId, "RUN");
