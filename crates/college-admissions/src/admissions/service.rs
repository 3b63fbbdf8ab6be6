use std::sync::Arc;

use serde::Serialize;

use super::domain::{
    ApplicationDocuments, ApplicationId, ApplicationStatus, NewApplication, ATTACHMENT_FOLDER,
};
use super::form::{RawSubmission, UploadedFile};
use super::intake::{check_documents, check_file, validate_fields, IntakePolicy, ValidationError};
use super::lookup::{normalize_email, phone_candidates, LookupField};
use super::media::{HostedMedia, MediaError, MediaHost};
use super::repository::{
    ApplicationFilter, ApplicationPage, ApplicationRecord, ApplicationStatistics,
    ApplicationStore, PageRequest, StatusUpdate, StatusView, StoreError, UniqueField,
};
use super::staging::DocumentStager;

/// Service composing intake validation, document uploads, and the store.
pub struct AdmissionService<S, M> {
    store: Arc<S>,
    media: Arc<M>,
    policy: IntakePolicy,
    stager: DocumentStager,
}

/// Answer returned to the applicant after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
}

impl<S, M> AdmissionService<S, M>
where
    S: ApplicationStore + 'static,
    M: MediaHost + 'static,
{
    pub fn new(store: Arc<S>, media: Arc<M>, policy: IntakePolicy, stager: DocumentStager) -> Self {
        Self {
            store,
            media,
            policy,
            stager,
        }
    }

    pub fn policy(&self) -> &IntakePolicy {
        &self.policy
    }

    /// Validate, upload, and persist a new application.
    ///
    /// Nothing leaves the process until the form, the document set, and the
    /// duplicate checks have passed.
    pub async fn submit(
        &self,
        submission: RawSubmission,
    ) -> Result<SubmissionReceipt, AdmissionError> {
        let RawSubmission {
            fields,
            files,
            attachments,
        } = submission;

        let form = validate_fields(&fields, &self.policy)?;
        check_documents(&files)?;
        for (slot, file) in &files {
            check_file(slot.field_name(), file, &self.policy)?;
        }
        for file in &attachments {
            check_file("attachments", file, &self.policy)?;
        }

        if self
            .store
            .find_latest(LookupField::TransactionId, &form.transaction_id)
            .await?
            .is_some()
        {
            return Err(AdmissionError::Conflict(UniqueField::TransactionId));
        }
        if self.policy.unique_email {
            if let Some(email) = form.email.as_deref() {
                if self
                    .store
                    .find_latest(LookupField::Email, email)
                    .await?
                    .is_some()
                {
                    return Err(AdmissionError::Conflict(UniqueField::Email));
                }
            }
        }

        let mut documents = ApplicationDocuments::default();
        let mut uploaded: Vec<HostedMedia> = Vec::new();

        for (slot, file) in &files {
            match self.upload(slot.field_name(), slot.folder(), file).await {
                Ok(media) => {
                    documents.set(*slot, media.url.clone());
                    uploaded.push(media);
                }
                Err(source) => {
                    tracing::error!(slot = %slot, error = %source, "document upload failed");
                    self.discard(&uploaded).await;
                    return Err(AdmissionError::Upload {
                        slot: slot.field_name().to_string(),
                        source,
                    });
                }
            }
        }

        for file in &attachments {
            match self.upload("attachment", ATTACHMENT_FOLDER, file).await {
                Ok(media) => {
                    documents.attachments.push(media.url.clone());
                    uploaded.push(media);
                }
                Err(err) => {
                    tracing::warn!(file = %file.file_name, error = %err, "skipping attachment");
                }
            }
        }

        let record = match self.store.insert(NewApplication { form, documents }).await {
            Ok(record) => record,
            Err(err) => {
                tracing::error!(error = %err, "failed to persist application");
                self.discard(&uploaded).await;
                return Err(err.into());
            }
        };

        tracing::info!(
            application_id = %record.id,
            program = record.form.program.label(),
            documents = uploaded.len(),
            "application submitted"
        );

        Ok(SubmissionReceipt {
            application_id: record.id,
            status: record.status,
        })
    }

    pub async fn status_by_id(&self, id: &str) -> Result<StatusView, AdmissionError> {
        let record = self.get(id).await?;
        Ok(record.status_view())
    }

    pub async fn status_by_email(&self, email: &str) -> Result<StatusView, AdmissionError> {
        let email = require_key("email", email)?;
        self.latest(LookupField::Email, &normalize_email(&email)).await
    }

    /// Try the normalized phone first, then the key as typed.
    pub async fn status_by_phone(&self, phone: &str) -> Result<StatusView, AdmissionError> {
        let phone = require_key("phone", phone)?;
        for candidate in phone_candidates(&phone) {
            if let Some(record) = self
                .store
                .find_latest(LookupField::Phone, &candidate)
                .await?
            {
                return Ok(record.status_view());
            }
        }
        Err(AdmissionError::NotFound)
    }

    pub async fn status_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<StatusView, AdmissionError> {
        let transaction_id = require_key("transactionId", transaction_id)?;
        self.latest(LookupField::TransactionId, &transaction_id).await
    }

    /// Set the review status of an application. Provided notes replace the
    /// stored ones; blank or absent notes leave them untouched.
    pub async fn update_status(
        &self,
        id: &str,
        status: &str,
        notes: Option<String>,
    ) -> Result<StatusUpdate, AdmissionError> {
        let id = require_key("id", id)?;
        let status: ApplicationStatus = status
            .parse()
            .map_err(|_| ValidationError::InvalidStatus(status.trim().to_string()))?;
        let notes = notes
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty());

        let record = self
            .store
            .update_status(&ApplicationId(id), status, notes)
            .await?;

        tracing::info!(application_id = %record.id, status = %record.status, "status updated");
        Ok(StatusUpdate::from(&record))
    }

    pub async fn get(&self, id: &str) -> Result<ApplicationRecord, AdmissionError> {
        let id = require_key("id", id)?;
        self.store
            .find_by_id(&ApplicationId(id))
            .await?
            .ok_or(AdmissionError::NotFound)
    }

    pub async fn list(
        &self,
        filter: ApplicationFilter,
        page: PageRequest,
    ) -> Result<ApplicationPage, AdmissionError> {
        Ok(self.store.list(filter, page).await?)
    }

    pub async fn statistics(&self) -> Result<ApplicationStatistics, AdmissionError> {
        Ok(self.store.statistics().await?)
    }

    async fn latest(&self, field: LookupField, value: &str) -> Result<StatusView, AdmissionError> {
        self.store
            .find_latest(field, value)
            .await?
            .map(|record| record.status_view())
            .ok_or(AdmissionError::NotFound)
    }

    /// Stage then upload one file. The staged copy is removed when this returns.
    async fn upload(
        &self,
        label: &str,
        folder: &str,
        file: &UploadedFile,
    ) -> Result<HostedMedia, MediaError> {
        let staged = self.stager.stage(label, file).await?;
        self.media.upload(&staged, folder).await
    }

    /// Best-effort removal of media uploaded for a submission that was not stored.
    async fn discard(&self, uploaded: &[HostedMedia]) {
        for media in uploaded {
            if let Err(err) = self.media.delete(media).await {
                tracing::warn!(
                    public_id = %media.public_id,
                    error = %err,
                    "failed to remove orphaned upload"
                );
            }
        }
    }
}

fn require_key(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankLookupKey(field));
    }
    Ok(trimmed.to_string())
}

/// Error raised by the admission service.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} already used")]
    Conflict(UniqueField),
    #[error("application not found")]
    NotFound,
    #[error("upload of {slot} failed: {source}")]
    Upload { slot: String, source: MediaError },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AdmissionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(field) => AdmissionError::Conflict(field),
            StoreError::NotFound => AdmissionError::NotFound,
            other => AdmissionError::Store(other),
        }
    }
}
