use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Datelike, Utc};

use super::domain::{ApplicationId, ApplicationStatus, NewApplication};
use super::lookup::LookupField;
use super::repository::{
    ApplicationFilter, ApplicationPage, ApplicationRecord, ApplicationStatistics,
    ApplicationStore, PageRequest, StoreError, UniqueField,
};

/// Process-local store. Uniqueness checks and the insert happen under one lock,
/// so concurrent duplicate submissions resolve to exactly one record.
#[derive(Debug, Default)]
pub struct InMemoryApplicationStore {
    unique_email: bool,
    sequence: AtomicU64,
    records: Mutex<Vec<ApplicationRecord>>,
}

impl InMemoryApplicationStore {
    pub fn new(unique_email: bool) -> Self {
        Self {
            unique_email,
            ..Self::default()
        }
    }

    /// Seed a record as-is, bypassing normalization. Used to model legacy data.
    pub fn seed(&self, record: ApplicationRecord) {
        self.records
            .lock()
            .expect("store mutex poisoned")
            .push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_id(&self) -> ApplicationId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        ApplicationId(format!("app-{id:06}"))
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn insert(&self, application: NewApplication) -> Result<ApplicationRecord, StoreError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");

        let transaction_id = application.form.transaction_id.as_str();
        if guard
            .iter()
            .any(|record| record.form.transaction_id == transaction_id)
        {
            return Err(StoreError::Conflict(UniqueField::TransactionId));
        }
        if self.unique_email {
            if let Some(email) = application.form.email.as_deref() {
                if guard
                    .iter()
                    .any(|record| record.matches(LookupField::Email, email))
                {
                    return Err(StoreError::Conflict(UniqueField::Email));
                }
            }
        }

        let record = ApplicationRecord::pending(self.next_id(), application, Utc::now());
        guard.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard.iter().find(|record| &record.id == id).cloned())
    }

    async fn find_latest(
        &self,
        field: LookupField,
        value: &str,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|record| record.matches(field, value))
            .max_by_key(|record| record.submitted_at)
            .cloned())
    }

    async fn update_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
        notes: Option<String>,
    ) -> Result<ApplicationRecord, StoreError> {
        let mut guard = self.records.lock().expect("store mutex poisoned");
        let record = guard
            .iter_mut()
            .find(|record| &record.id == id)
            .ok_or(StoreError::NotFound)?;

        record.status = status;
        if let Some(notes) = notes {
            record.notes = Some(notes);
        }
        Ok(record.clone())
    }

    async fn list(
        &self,
        filter: ApplicationFilter,
        page: PageRequest,
    ) -> Result<ApplicationPage, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        let mut matching: Vec<&ApplicationRecord> =
            guard.iter().filter(|record| filter.matches(record)).collect();
        matching.sort_by(|left, right| right.submitted_at.cmp(&left.submitted_at));

        let total = matching.len() as u64;
        let applications = matching
            .into_iter()
            .skip(usize::try_from(page.skip()).unwrap_or(usize::MAX))
            .take(page.limit as usize)
            .map(ApplicationRecord::summary)
            .collect();

        Ok(ApplicationPage::new(applications, total, page))
    }

    async fn statistics(&self) -> Result<ApplicationStatistics, StoreError> {
        let guard = self.records.lock().expect("store mutex poisoned");
        let mut stats = ApplicationStatistics::default();
        for record in guard.iter() {
            stats.record(record.status, record.form.program);
            stats.record_month(record.submitted_at.year(), record.submitted_at.month(), 1);
        }
        stats.trim_months();
        Ok(stats)
    }
}
