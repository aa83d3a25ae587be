//! Pre-built Test Fixtures
//!
//! Ready-to-use submissions and claims. Values are fixed so assertions can
//! compare against them directly.

use chrono::{DateTime, TimeZone, Utc};
use domain_claims::validation::AttachmentInput;
use domain_claims::{
    AttachmentDescriptor, ClaimSubmission, ClaimType, PatientRef, SubmissionMetadata,
};

/// Fixture for submission payloads
pub struct SubmissionFixtures;

impl SubmissionFixtures {
    /// A submission that passes every validation rule
    pub fn valid() -> ClaimSubmission {
        ClaimSubmission {
            patient_name: Some(StringFixtures::patient_name().to_string()),
            patient_id: Some(StringFixtures::patient_id().to_string()),
            claim_type: Some("professional".to_string()),
            user_email: Some(StringFixtures::user_email().to_string()),
            member_id: Some("MEM-5521".to_string()),
            payer_id: Some("PAYER-BUPA".to_string()),
            provider_id: None,
            facility_id: Some(StringFixtures::facility_id().to_string()),
            service_code: Some("99213".to_string()),
            service_description: Some("Office visit, established patient".to_string()),
            attachment: None,
            malformed_fields: Vec::new(),
        }
    }

    /// Valid submission carrying a small PDF attachment
    pub fn with_attachment() -> ClaimSubmission {
        ClaimSubmission {
            attachment: Some(AttachmentInput {
                file_name: Some("referral.pdf".to_string()),
                content_type: Some("application/pdf".to_string()),
                size_bytes: Some(48_213),
                reference: Some("s3://claims/referral.pdf".to_string()),
            }),
            ..Self::valid()
        }
    }

    /// Submission without a claim type
    pub fn missing_claim_type() -> ClaimSubmission {
        ClaimSubmission {
            claim_type: None,
            ..Self::valid()
        }
    }

    /// Submission with nothing filled in
    pub fn empty() -> ClaimSubmission {
        ClaimSubmission::default()
    }
}

/// Fixture for claim components
pub struct ClaimFixtures;

impl ClaimFixtures {
    pub fn patient() -> PatientRef {
        PatientRef {
            name: StringFixtures::patient_name().to_string(),
            id: StringFixtures::patient_id().to_string(),
        }
    }

    pub fn metadata() -> SubmissionMetadata {
        SubmissionMetadata {
            user_email: StringFixtures::user_email().to_string(),
            member_id: Some("MEM-5521".to_string()),
            payer_id: Some("PAYER-BUPA".to_string()),
            provider_id: None,
            facility_id: Some(StringFixtures::facility_id().to_string()),
            service_code: Some("99213".to_string()),
            service_description: None,
            submitted_at: TemporalFixtures::submitted_at(),
        }
    }

    pub fn attachment() -> AttachmentDescriptor {
        AttachmentDescriptor {
            file_name: "referral.pdf".to_string(),
            content_type: Some("application/pdf".to_string()),
            size_bytes: 48_213,
            reference: None,
        }
    }

    pub fn claim_type() -> ClaimType {
        ClaimType::Professional
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Submission time used by fixtures (Mar 1, 2024 09:30 UTC)
    pub fn submitted_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    /// A creation time older than the default retention window
    pub fn expired() -> DateTime<Utc> {
        Utc::now() - chrono::Duration::hours(25)
    }
}

/// Fixture for string test data
pub struct StringFixtures;

impl StringFixtures {
    pub fn patient_name() -> &'static str {
        "Fatimah Al-Qahtani"
    }

    pub fn patient_id() -> &'static str {
        "1098765432"
    }

    pub fn user_email() -> &'static str {
        "billing@riyadh-clinic.test"
    }

    pub fn facility_id() -> &'static str {
        "FAC-RUH-01"
    }
}
