//! Tests for claim identifiers

use std::collections::HashSet;
use std::thread;

use proptest::prelude::*;

use core_kernel::{ClaimId, IdentifierError};

fn matches_claim_pattern(s: &str) -> bool {
    let Some(body) = s.strip_prefix("CLM-") else {
        return false;
    };
    let Some((timestamp, suffix)) = body.split_once('-') else {
        return false;
    };
    let upper_alnum = |seg: &str| {
        !seg.is_empty() && seg.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    };
    upper_alnum(timestamp) && suffix.len() == 6 && upper_alnum(suffix)
}

#[test]
fn test_generated_ids_match_public_pattern() {
    for _ in 0..1_000 {
        let id = ClaimId::generate();
        assert!(matches_claim_pattern(id.as_str()), "bad id {}", id);
    }
}

#[test]
fn test_generated_ids_unique_across_threads() {
    let handles: Vec<_> = (0..8)
        .map(|_| thread::spawn(|| (0..500).map(|_| ClaimId::generate()).collect::<Vec<_>>()))
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id.clone()), "duplicate id {}", id);
        }
    }
    assert_eq!(seen.len(), 4_000);
}

#[test]
fn test_lowercase_id_is_rejected() {
    let id = ClaimId::generate().to_string().to_lowercase();
    assert!(matches!(
        id.parse::<ClaimId>(),
        Err(IdentifierError::MissingPrefix { .. })
    ));
}

proptest! {
    #[test]
    fn parse_accepts_exactly_the_public_pattern(s in "CLM-[A-Z0-9]{1,12}-[A-Z0-9]{6}") {
        prop_assert!(s.parse::<ClaimId>().is_ok());
    }

    #[test]
    fn parse_rejects_wrong_suffix_length(
        ts in "[A-Z0-9]{1,10}",
        suffix in "[A-Z0-9]{1,5}|[A-Z0-9]{7,10}",
    ) {
        let candidate = format!("CLM-{}-{}", ts, suffix);
        prop_assert!(candidate.parse::<ClaimId>().is_err());
    }

    #[test]
    fn parse_never_panics(s in "\\PC*") {
        let _ = s.parse::<ClaimId>();
    }
}
