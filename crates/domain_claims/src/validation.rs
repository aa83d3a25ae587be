//! Ingress validation rules
//!
//! Submissions are checked before anything is persisted. Every violated field
//! contributes exactly one message, so callers can fix all problems in one go.
//!
//! # Rules
//!
//! - `patientName`, `patientId`, `claimType`, `userEmail` are required (non-blank)
//! - `userEmail` must be a syntactically valid address
//! - `claimType` must be one of professional, institutional, pharmacy, vision
//! - an attachment, when present, needs a `fileName` and must fit the size limit
//! - a field sent with the wrong JSON type is reported like any other violation

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::ValidateEmail;

use crate::claim::{AttachmentDescriptor, ClaimType, PatientRef, SubmissionMetadata};

/// Default upper bound for attachment size (10 MiB)
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

const CLAIM_TYPE_MESSAGE: &str =
    "claimType must be one of: professional, institutional, pharmacy, vision";

/// Attachment descriptor as submitted by the client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInput {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: Option<u64>,
    pub reference: Option<String>,
}

/// Raw claim submission, before validation
///
/// Deserialization never fails on a field's JSON type: values of the wrong
/// type are dropped and their field names kept in `malformed_fields`, so the
/// validator reports them together with every other violation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "LenientSubmission")]
pub struct ClaimSubmission {
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub claim_type: Option<String>,
    pub user_email: Option<String>,
    pub member_id: Option<String>,
    pub payer_id: Option<String>,
    pub provider_id: Option<String>,
    pub facility_id: Option<String>,
    pub service_code: Option<String>,
    pub service_description: Option<String>,
    pub attachment: Option<AttachmentInput>,
    /// Fields whose submitted value had the wrong JSON type
    #[serde(skip_serializing)]
    pub malformed_fields: Vec<String>,
}

impl ClaimSubmission {
    fn is_malformed(&self, field: &str) -> bool {
        self.malformed_fields.iter().any(|f| f == field)
    }
}

/// Wire shape accepting any JSON value per field
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LenientSubmission {
    patient_name: Option<Value>,
    patient_id: Option<Value>,
    claim_type: Option<Value>,
    user_email: Option<Value>,
    member_id: Option<Value>,
    payer_id: Option<Value>,
    provider_id: Option<Value>,
    facility_id: Option<Value>,
    service_code: Option<Value>,
    service_description: Option<Value>,
    attachment: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LenientAttachment {
    file_name: Option<Value>,
    content_type: Option<Value>,
    size_bytes: Option<Value>,
    reference: Option<Value>,
}

impl From<LenientSubmission> for ClaimSubmission {
    fn from(raw: LenientSubmission) -> Self {
        let mut malformed = Vec::new();

        let patient_name = text("patientName", raw.patient_name, &mut malformed);
        let patient_id = text("patientId", raw.patient_id, &mut malformed);
        let claim_type = text("claimType", raw.claim_type, &mut malformed);
        let user_email = text("userEmail", raw.user_email, &mut malformed);
        let member_id = text("memberId", raw.member_id, &mut malformed);
        let payer_id = text("payerId", raw.payer_id, &mut malformed);
        let provider_id = text("providerId", raw.provider_id, &mut malformed);
        let facility_id = text("facilityId", raw.facility_id, &mut malformed);
        let service_code = text("serviceCode", raw.service_code, &mut malformed);
        let service_description = text("serviceDescription", raw.service_description, &mut malformed);

        let attachment = match raw.attachment {
            None | Some(Value::Null) => None,
            Some(value @ Value::Object(_)) => match serde_json::from_value::<LenientAttachment>(value) {
                Ok(att) => {
                    let file_name = text("attachment.fileName", att.file_name, &mut malformed);
                    let content_type = text("attachment.contentType", att.content_type, &mut malformed);
                    let reference = text("attachment.reference", att.reference, &mut malformed);
                    let size_bytes = match att.size_bytes {
                        None | Some(Value::Null) => None,
                        Some(Value::Number(n)) if n.as_u64().is_some() => n.as_u64(),
                        Some(_) => {
                            malformed.push("attachment.sizeBytes".to_string());
                            None
                        }
                    };
                    Some(AttachmentInput {
                        file_name,
                        content_type,
                        size_bytes,
                        reference,
                    })
                }
                Err(_) => {
                    malformed.push("attachment".to_string());
                    None
                }
            },
            Some(_) => {
                malformed.push("attachment".to_string());
                None
            }
        };

        ClaimSubmission {
            patient_name,
            patient_id,
            claim_type,
            user_email,
            member_id,
            payer_id,
            provider_id,
            facility_id,
            service_code,
            service_description,
            attachment,
            malformed_fields: malformed,
        }
    }
}

fn text(field: &str, value: Option<Value>, malformed: &mut Vec<String>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(_) => {
            malformed.push(field.to_string());
            None
        }
    }
}

fn type_message(field: &str) -> String {
    match field {
        "claimType" => CLAIM_TYPE_MESSAGE.to_string(),
        "attachment" => "attachment must be an object".to_string(),
        "attachment.sizeBytes" => "attachment.sizeBytes must be a non-negative integer".to_string(),
        other => format!("{} must be a string", other),
    }
}

/// A submission that passed every rule
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSubmission {
    pub patient: PatientRef,
    pub claim_type: ClaimType,
    pub metadata: SubmissionMetadata,
    pub attachment: Option<AttachmentDescriptor>,
}

/// Result of submission validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors, one per violated field
    pub errors: Vec<String>,
}

impl ValidationResult {
    /// Adds an error to the result
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validator for claim submissions
#[derive(Debug, Clone)]
pub struct SubmissionValidator {
    max_attachment_bytes: u64,
}

impl Default for SubmissionValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTACHMENT_BYTES)
    }
}

impl SubmissionValidator {
    pub fn new(max_attachment_bytes: u64) -> Self {
        Self { max_attachment_bytes }
    }

    /// Validates a submission and converts it into domain values
    ///
    /// # Errors
    ///
    /// Returns every violation message when at least one rule fails
    pub fn validate(&self, submission: &ClaimSubmission) -> Result<ValidatedSubmission, Vec<String>> {
        let mut result = ValidationResult::default();

        let patient_name = required(&mut result, submission, "patientName", &submission.patient_name);
        let patient_id = required(&mut result, submission, "patientId", &submission.patient_id);

        let claim_type = required(&mut result, submission, "claimType", &submission.claim_type)
            .and_then(|raw| match raw.parse::<ClaimType>() {
                Ok(claim_type) => Some(claim_type),
                Err(_) => {
                    result.add_error(CLAIM_TYPE_MESSAGE);
                    None
                }
            });

        let user_email = required(&mut result, submission, "userEmail", &submission.user_email).and_then(|email| {
            if email.validate_email() {
                Some(email)
            } else {
                result.add_error("userEmail must be a valid email address");
                None
            }
        });

        for field in [
            "memberId",
            "payerId",
            "providerId",
            "facilityId",
            "serviceCode",
            "serviceDescription",
            "attachment",
        ] {
            if submission.is_malformed(field) {
                result.add_error(type_message(field));
            }
        }

        let attachment = submission
            .attachment
            .as_ref()
            .and_then(|input| self.validate_attachment(&mut result, submission, input));

        match (patient_name, patient_id, claim_type, user_email) {
            (Some(name), Some(id), Some(claim_type), Some(user_email)) if result.is_valid() => {
                Ok(ValidatedSubmission {
                    patient: PatientRef { name, id },
                    claim_type,
                    metadata: SubmissionMetadata {
                        user_email,
                        member_id: optional(&submission.member_id),
                        payer_id: optional(&submission.payer_id),
                        provider_id: optional(&submission.provider_id),
                        facility_id: optional(&submission.facility_id),
                        service_code: optional(&submission.service_code),
                        service_description: optional(&submission.service_description),
                        submitted_at: Utc::now(),
                    },
                    attachment,
                })
            }
            _ => Err(result.errors),
        }
    }

    fn validate_attachment(
        &self,
        result: &mut ValidationResult,
        submission: &ClaimSubmission,
        input: &AttachmentInput,
    ) -> Option<AttachmentDescriptor> {
        let file_name = required(result, submission, "attachment.fileName", &input.file_name);
        for field in ["attachment.contentType", "attachment.reference"] {
            if submission.is_malformed(field) {
                result.add_error(type_message(field));
            }
        }
        if submission.is_malformed("attachment.sizeBytes") {
            result.add_error(type_message("attachment.sizeBytes"));
            return None;
        }

        let size_bytes = input.size_bytes.unwrap_or(0);
        if size_bytes > self.max_attachment_bytes {
            result.add_error(format!(
                "attachment.sizeBytes exceeds maximum of {} bytes",
                self.max_attachment_bytes
            ));
            return None;
        }

        file_name.map(|file_name| AttachmentDescriptor {
            file_name,
            content_type: optional(&input.content_type),
            size_bytes,
            reference: optional(&input.reference),
        })
    }
}

fn required(
    result: &mut ValidationResult,
    submission: &ClaimSubmission,
    field: &str,
    value: &Option<String>,
) -> Option<String> {
    if submission.is_malformed(field) {
        result.add_error(type_message(field));
        return None;
    }
    let value = optional(value);
    if value.is_none() {
        result.add_error(format!("{} is required", field));
    }
    value
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
