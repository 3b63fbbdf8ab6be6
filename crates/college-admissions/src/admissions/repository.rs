use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicationDocuments, ApplicationForm, ApplicationId, ApplicationStatus, NewApplication,
    Program,
};
use super::lookup::LookupField;

/// Stored application with workflow metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    #[serde(flatten)]
    pub form: ApplicationForm,
    pub documents: ApplicationDocuments,
    pub status: ApplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(rename = "applicationDate")]
    pub submitted_at: DateTime<Utc>,
}

impl ApplicationRecord {
    /// Build the record a store persists for a fresh submission.
    pub fn pending(id: ApplicationId, application: NewApplication, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id,
            form: application.form,
            documents: application.documents,
            status: ApplicationStatus::Pending,
            notes: None,
            submitted_at,
        }
    }

    pub fn status_view(&self) -> StatusView {
        StatusView {
            status: self.status,
            name: self.form.full_name(),
            program: self.form.program,
            payment_amount: self.form.payment_amount.clone(),
            transaction_id: self.form.transaction_id.clone(),
            submitted_date: self.submitted_at,
        }
    }

    pub fn summary(&self) -> ApplicationSummary {
        ApplicationSummary {
            id: self.id.clone(),
            name: self.form.full_name(),
            email: self.form.email.clone(),
            phone: self.form.phone.clone(),
            program: self.form.program,
            class_level: self.form.class_level,
            transaction_id: self.form.transaction_id.clone(),
            status: self.status,
            submitted_at: self.submitted_at,
        }
    }

    /// Whether the record matches `value` on `field`. Email comparison ignores case.
    pub fn matches(&self, field: LookupField, value: &str) -> bool {
        match field {
            LookupField::Email => self
                .form
                .email
                .as_deref()
                .is_some_and(|email| email.to_lowercase() == value.to_lowercase()),
            LookupField::Phone => {
                self.form.phone.as_deref() == Some(value) || self.form.guardian_phone == value
            }
            LookupField::TransactionId => self.form.transaction_id == value,
        }
    }
}

/// Public status answer shared by every lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub status: ApplicationStatus,
    pub name: String,
    pub program: Program,
    pub payment_amount: String,
    pub transaction_id: String,
    pub submitted_date: DateTime<Utc>,
}

/// Result of an administrative status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl From<&ApplicationRecord> for StatusUpdate {
    fn from(record: &ApplicationRecord) -> Self {
        Self {
            application_id: record.id.clone(),
            status: record.status,
            notes: record.notes.clone(),
        }
    }
}

/// Row shown in admin listings and CSV exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    pub id: ApplicationId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub program: Program,
    #[serde(rename = "class")]
    pub class_level: super::domain::ClassLevel,
    pub transaction_id: String,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplicationFilter {
    pub status: Option<ApplicationStatus>,
    pub program: Option<Program>,
}

impl ApplicationFilter {
    pub fn matches(&self, record: &ApplicationRecord) -> bool {
        self.status.map_or(true, |status| record.status == status)
            && self.program.map_or(true, |program| record.form.program == program)
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// One-based page request, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn skip(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationPage {
    pub applications: Vec<ApplicationSummary>,
    pub total: u64,
    pub current_page: u32,
    pub total_pages: u64,
}

impl ApplicationPage {
    pub fn new(applications: Vec<ApplicationSummary>, total: u64, page: PageRequest) -> Self {
        Self {
            applications,
            total,
            current_page: page.page,
            total_pages: total.div_ceil(u64::from(page.limit)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatistics {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
    pub by_program: BTreeMap<String, u64>,
    /// Submissions per calendar month, newest first.
    pub by_month: Vec<MonthlyCount>,
}

/// Months reported in `ApplicationStatistics::by_month`.
pub const MONTHS_REPORTED: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthlyCount {
    pub year: i32,
    pub month: u32,
    pub count: u64,
}

impl ApplicationStatistics {
    pub fn record(&mut self, status: ApplicationStatus, program: Program) {
        self.record_many(status, program, 1);
    }

    pub fn record_many(&mut self, status: ApplicationStatus, program: Program, count: u64) {
        self.total += count;
        match status {
            ApplicationStatus::Pending => self.pending += count,
            ApplicationStatus::Approved => self.approved += count,
            ApplicationStatus::Rejected => self.rejected += count,
        }
        *self.by_program.entry(program.label().to_string()).or_default() += count;
    }

    pub fn record_month(&mut self, year: i32, month: u32, count: u64) {
        match self
            .by_month
            .iter_mut()
            .find(|entry| entry.year == year && entry.month == month)
        {
            Some(entry) => entry.count += count,
            None => self.by_month.push(MonthlyCount { year, month, count }),
        }
    }

    /// Order the monthly series newest first and keep the latest months only.
    pub fn trim_months(&mut self) {
        self.by_month
            .sort_by(|left, right| (right.year, right.month).cmp(&(left.year, left.month)));
        self.by_month.truncate(MONTHS_REPORTED);
    }
}

/// Fields guarded by a store-level uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    TransactionId,
    Email,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueField::TransactionId => f.write_str("transaction id"),
            UniqueField::Email => f.write_str("email"),
        }
    }
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already used")]
    Conflict(UniqueField),
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed stored record: {0}")]
    Malformed(String),
}

/// Document store abstraction so the service can be exercised in isolation.
///
/// Implementations must enforce transaction-id uniqueness (and email
/// uniqueness when configured) atomically at insert time.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn insert(&self, application: NewApplication) -> Result<ApplicationRecord, StoreError>;
    async fn find_by_id(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError>;
    /// Most recently submitted record matching `value` on `field`.
    async fn find_latest(
        &self,
        field: LookupField,
        value: &str,
    ) -> Result<Option<ApplicationRecord>, StoreError>;
    async fn update_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
        notes: Option<String>,
    ) -> Result<ApplicationRecord, StoreError>;
    async fn list(
        &self,
        filter: ApplicationFilter,
        page: PageRequest,
    ) -> Result<ApplicationPage, StoreError>;
    async fn statistics(&self) -> Result<ApplicationStatistics, StoreError>;
}
