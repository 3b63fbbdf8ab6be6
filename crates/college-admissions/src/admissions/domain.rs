use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for stored applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl FromStr for Gender {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Self::Male),
            "female" => Ok(Self::Female),
            "other" => Ok(Self::Other),
            _ => Err(()),
        }
    }
}

/// Intermediate year the applicant is enrolling into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassLevel {
    #[serde(rename = "1st Year")]
    FirstYear,
    #[serde(rename = "2nd Year")]
    SecondYear,
}

impl ClassLevel {
    pub const fn label(self) -> &'static str {
        match self {
            ClassLevel::FirstYear => "1st Year",
            ClassLevel::SecondYear => "2nd Year",
        }
    }
}

impl FromStr for ClassLevel {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1st year" | "first year" | "1st" => Ok(Self::FirstYear),
            "2nd year" | "second year" | "2nd" => Ok(Self::SecondYear),
            _ => Err(()),
        }
    }
}

/// Offered program tracks ("group" on the admission form).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Program {
    #[serde(rename = "FSC Pre-Medical")]
    PreMedical,
    #[serde(rename = "FSC Pre-Engineering")]
    PreEngineering,
    #[serde(rename = "FSC Pre-Computer Science")]
    PreComputerScience,
    #[serde(rename = "Arts")]
    Arts,
}

impl Program {
    pub const ALL: [Program; 4] = [
        Program::PreMedical,
        Program::PreEngineering,
        Program::PreComputerScience,
        Program::Arts,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Program::PreMedical => "FSC Pre-Medical",
            Program::PreEngineering => "FSC Pre-Engineering",
            Program::PreComputerScience => "FSC Pre-Computer Science",
            Program::Arts => "Arts",
        }
    }
}

impl FromStr for Program {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Program::ALL
            .into_iter()
            .find(|program| program.label().eq_ignore_ascii_case(wanted))
            .ok_or(())
    }
}

/// Admission-review state. Any state may move to any other, but only through an
/// explicit administrative update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 3] = [
        ApplicationStatus::Pending,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ApplicationStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.label().eq_ignore_ascii_case(wanted))
            .ok_or(())
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Prior secondary-school result required for admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub year: String,
    pub roll_number: String,
    pub marks: String,
    pub school: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationRecord {
    pub metric: MetricRecord,
}

/// Upload slots accepted on the admission form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentSlot {
    DmcMetric,
    PassportPhoto,
    FatherCnic,
    MigrationCertificate,
    TransactionReceipt,
}

impl DocumentSlot {
    pub const ALL: [DocumentSlot; 5] = [
        DocumentSlot::DmcMetric,
        DocumentSlot::PassportPhoto,
        DocumentSlot::FatherCnic,
        DocumentSlot::MigrationCertificate,
        DocumentSlot::TransactionReceipt,
    ];

    /// Multipart field name carrying the upload.
    pub const fn field_name(self) -> &'static str {
        match self {
            DocumentSlot::DmcMetric => "dmcMetric",
            DocumentSlot::PassportPhoto => "passportPhoto",
            DocumentSlot::FatherCnic => "fatherCNIC",
            DocumentSlot::MigrationCertificate => "migrationCertificate",
            DocumentSlot::TransactionReceipt => "transactionReceipt",
        }
    }

    /// Logical folder on the media host, relative to the configured root.
    pub const fn folder(self) -> &'static str {
        match self {
            DocumentSlot::DmcMetric => "applications/dmc",
            DocumentSlot::PassportPhoto => "applications/photos",
            DocumentSlot::FatherCnic => "applications/cnic",
            DocumentSlot::MigrationCertificate => "applications/migration",
            DocumentSlot::TransactionReceipt => "applications/receipts",
        }
    }

    pub const fn is_required(self) -> bool {
        !matches!(self, DocumentSlot::MigrationCertificate)
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        DocumentSlot::ALL
            .into_iter()
            .find(|slot| slot.field_name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for DocumentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Folder used for the optional attachment list.
pub const ATTACHMENT_FOLDER: &str = "applications/attachments";

/// Public URLs of the uploaded documents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDocuments {
    pub dmc_metric: String,
    pub passport_photo: String,
    #[serde(rename = "fatherCNIC")]
    pub father_cnic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_certificate: Option<String>,
    pub transaction_receipt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl ApplicationDocuments {
    pub(crate) fn set(&mut self, slot: DocumentSlot, url: String) {
        match slot {
            DocumentSlot::DmcMetric => self.dmc_metric = url,
            DocumentSlot::PassportPhoto => self.passport_photo = url,
            DocumentSlot::FatherCnic => self.father_cnic = url,
            DocumentSlot::MigrationCertificate => self.migration_certificate = Some(url),
            DocumentSlot::TransactionReceipt => self.transaction_receipt = url,
        }
    }
}

/// Validated form contents, before any document has been uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationForm {
    pub first_name: String,
    pub last_name: String,
    pub father_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub guardian_phone: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    #[serde(rename = "class")]
    pub class_level: ClassLevel,
    #[serde(rename = "group")]
    pub program: Program,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    pub education: EducationRecord,
    pub payment_amount: String,
    pub easypaisa_number: String,
    pub transaction_id: String,
}

impl ApplicationForm {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Canonical creation payload handed to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    #[serde(flatten)]
    pub form: ApplicationForm,
    pub documents: ApplicationDocuments,
}
