use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};

use super::domain::{
    ApplicationForm, ClassLevel, DocumentSlot, EducationRecord, Gender, Program,
};
use super::education::extract_education;
use super::form::{RawFields, UploadedFile};
use super::lookup::{normalize_email, normalize_phone};

pub const DEFAULT_PAYMENT_AMOUNT: &str = "200";
pub const DEFAULT_MAX_FILE_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 6] = ["jpeg", "jpg", "png", "pdf", "doc", "docx"];
const ALLOWED_CONTENT_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Rejections raised before any external call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("missing education fields")]
    MissingEducation,
    #[error("missing required documents: {}", join_slots(.0))]
    MissingDocuments(Vec<DocumentSlot>),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("unsupported file for {slot}: {reason}")]
    UnsupportedFile { slot: String, reason: String },
    #[error("invalid status '{0}' (expected pending/approved/rejected)")]
    InvalidStatus(String),
    #[error("{0} must not be blank")]
    BlankLookupKey(&'static str),
}

fn join_slots(slots: &[DocumentSlot]) -> String {
    slots
        .iter()
        .map(|slot| slot.field_name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Deployment rules applied during intake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakePolicy {
    pub payment_amount: String,
    pub max_file_bytes: usize,
    pub require_email: bool,
    pub unique_email: bool,
}

impl Default for IntakePolicy {
    fn default() -> Self {
        Self {
            payment_amount: DEFAULT_PAYMENT_AMOUNT.to_string(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            require_email: false,
            unique_email: false,
        }
    }
}

impl IntakePolicy {
    /// Upper bound for a whole multipart request: every slot plus a few attachments.
    pub fn max_request_bytes(&self) -> usize {
        self.max_file_bytes
            .saturating_mul(DocumentSlot::ALL.len() + 5)
            .saturating_add(1024 * 1024)
    }
}

/// Validate and normalize the text portion of a submission.
pub fn validate_fields(
    fields: &RawFields,
    policy: &IntakePolicy,
) -> Result<ApplicationForm, ValidationError> {
    let mut missing = Vec::new();
    let mut required = |name: &'static str, aliases: &[&str]| {
        let mut names = vec![name];
        names.extend_from_slice(aliases);
        let value = fields.first_text(&names);
        if value.is_none() {
            missing.push(name);
        }
        value.unwrap_or_default()
    };

    let first_name = required("firstName", &[]);
    let last_name = required("lastName", &[]);
    let father_name = required("fatherName", &[]);
    let guardian_phone = required("guardianPhone", &[]);
    let date_of_birth = required("dateOfBirth", &[]);
    let gender = required("gender", &[]);
    let class_level = required("class", &["classLevel"]);
    let program = required("group", &["program"]);
    let address = required("address", &[]);
    let easypaisa_number = required("easypaisaNumber", &[]);
    let transaction_id = required("transactionId", &[]);
    let email = if policy.require_email {
        Some(required("email", &[]))
    } else {
        fields.text("email")
    };

    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    let metric = extract_education(fields)?;

    let email = email.map(|raw| normalize_email(&raw));
    if let Some(address) = email.as_deref() {
        if !is_plausible_email(address) {
            return Err(invalid("email", "not a valid email address"));
        }
    }

    Ok(ApplicationForm {
        first_name,
        last_name,
        father_name,
        email,
        phone: fields.text("phone").map(|raw| normalize_phone(&raw)),
        guardian_phone: normalize_phone(&guardian_phone),
        date_of_birth: parse_date(&date_of_birth)?,
        gender: gender
            .parse::<Gender>()
            .map_err(|_| invalid("gender", "expected male, female or other"))?,
        class_level: class_level
            .parse::<ClassLevel>()
            .map_err(|_| invalid("class", "expected 1st Year or 2nd Year"))?,
        program: program
            .parse::<Program>()
            .map_err(|_| invalid("group", format!("unknown program '{program}'")))?,
        address,
        city: fields.text("city"),
        state: fields.text("state"),
        zip_code: fields.text("zipCode"),
        education: EducationRecord { metric },
        payment_amount: policy.payment_amount.clone(),
        easypaisa_number: normalize_phone(&easypaisa_number),
        transaction_id,
    })
}

/// All mandatory upload slots must be present; only the migration certificate
/// may be omitted.
pub fn check_documents(files: &BTreeMap<DocumentSlot, UploadedFile>) -> Result<(), ValidationError> {
    let missing: Vec<DocumentSlot> = DocumentSlot::ALL
        .into_iter()
        .filter(|slot| slot.is_required() && !files.contains_key(slot))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingDocuments(missing))
    }
}

/// Size and type checks for a single upload.
pub fn check_file(
    slot: &str,
    file: &UploadedFile,
    policy: &IntakePolicy,
) -> Result<(), ValidationError> {
    let reject = |reason: String| ValidationError::UnsupportedFile {
        slot: slot.to_string(),
        reason,
    };

    if file.bytes.is_empty() {
        return Err(reject("file is empty".to_string()));
    }
    if file.bytes.len() > policy.max_file_bytes {
        return Err(reject(format!(
            "file is {} bytes, limit is {}",
            file.bytes.len(),
            policy.max_file_bytes
        )));
    }

    let extension_allowed = file
        .extension()
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()));
    let content_type = file.effective_content_type();
    let content_type_allowed = ALLOWED_CONTENT_TYPES.contains(&content_type.essence_str());

    if extension_allowed && content_type_allowed {
        Ok(())
    } else {
        Err(reject(format!(
            "only image, PDF, and Word documents are accepted (got {} as {})",
            file.file_name,
            content_type.essence_str()
        )))
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|stamp| stamp.date_naive()))
        .map_err(|_| invalid("dateOfBirth", format!("'{raw}' is not a YYYY-MM-DD date")))
}

fn is_plausible_email(address: &str) -> bool {
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !address.contains(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidField {
        field,
        reason: reason.into(),
    }
}
