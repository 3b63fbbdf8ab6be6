use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, Request};
use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use tempfile::TempDir;

use crate::admissions::domain::{
    ApplicationDocuments, ApplicationForm, ApplicationId, ApplicationStatus, ClassLevel,
    DocumentSlot, EducationRecord, Gender, MetricRecord, NewApplication, Program,
};
use crate::admissions::form::{RawFields, RawSubmission, UploadedFile};
use crate::admissions::intake::IntakePolicy;
use crate::admissions::lookup::LookupField;
use crate::admissions::media::{HostedMedia, InMemoryMediaHost, MediaError, MediaHost};
use crate::admissions::memory::InMemoryApplicationStore;
use crate::admissions::repository::{
    ApplicationFilter, ApplicationPage, ApplicationRecord, ApplicationStatistics,
    ApplicationStore, PageRequest, StoreError,
};
use crate::admissions::staging::{DocumentStager, StagedDocument};
use crate::admissions::AdmissionService;

pub(super) const BOUNDARY: &str = "admissions-test-boundary";

pub(super) fn raw_fields() -> RawFields {
    let mut fields = RawFields::new();
    fields.push_text("firstName", "Ayesha");
    fields.push_text("lastName", "Khan");
    fields.push_text("fatherName", "Imran Khan");
    fields.push_text("email", "Ayesha.Khan@Example.com ");
    fields.push_text("phone", "+92 300-1234567");
    fields.push_text("guardianPhone", "0300 7654321");
    fields.push_text("dateOfBirth", "2008-03-14");
    fields.push_text("gender", "female");
    fields.push_text("class", "1st Year");
    fields.push_text("group", "FSC Pre-Medical");
    fields.push_text("address", "12 Mall Road");
    fields.push_text("city", "Lahore");
    fields.push_text("education[metric][year]", "2023");
    fields.push_text("education[metric][rollNumber]", "445566");
    fields.push_text("education[metric][marks]", "987");
    fields.push_text("education[metric][school]", "Government High School");
    fields.push_text("paymentAmount", "1");
    fields.push_text("easypaisaNumber", "0345-1112223");
    fields.push_text("transactionId", "TX1");
    fields
}

pub(super) fn png(name: &str) -> UploadedFile {
    UploadedFile::new(name, Some("image/png"), Bytes::from_static(b"\x89PNG\r\n\x1a\n"))
}

pub(super) fn pdf(name: &str) -> UploadedFile {
    UploadedFile::new(name, Some("application/pdf"), Bytes::from_static(b"%PDF-1.7"))
}

pub(super) fn complete_submission() -> RawSubmission {
    submission_with(raw_fields())
}

pub(super) fn submission_with(fields: RawFields) -> RawSubmission {
    RawSubmission::new(fields)
        .with_file(DocumentSlot::DmcMetric, pdf("dmc.pdf"))
        .with_file(DocumentSlot::PassportPhoto, png("photo.png"))
        .with_file(DocumentSlot::FatherCnic, png("cnic.png"))
        .with_file(DocumentSlot::TransactionReceipt, png("receipt.png"))
}

pub(super) fn submission_for(transaction_id: &str) -> RawSubmission {
    let mut fields = raw_fields();
    fields.insert("transactionId", Value::String(transaction_id.to_string()));
    submission_with(fields)
}

pub(super) struct Harness<S, M> {
    pub(super) service: Arc<AdmissionService<S, M>>,
    pub(super) store: Arc<S>,
    pub(super) media: Arc<M>,
    pub(super) staging: TempDir,
}

impl<S, M> Harness<S, M> {
    /// Files currently left in the staging directory.
    pub(super) fn staged_files(&self) -> usize {
        match std::fs::read_dir(self.staging.path()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

pub(super) fn harness_with<S, M>(store: S, media: M, policy: IntakePolicy) -> Harness<S, M>
where
    S: ApplicationStore + 'static,
    M: MediaHost + 'static,
{
    let staging = tempfile::tempdir().expect("staging dir");
    let store = Arc::new(store);
    let media = Arc::new(media);
    let service = Arc::new(AdmissionService::new(
        store.clone(),
        media.clone(),
        policy,
        DocumentStager::new(staging.path()),
    ));
    Harness {
        service,
        store,
        media,
        staging,
    }
}

pub(super) fn build_harness() -> Harness<InMemoryApplicationStore, InMemoryMediaHost> {
    harness_with(
        InMemoryApplicationStore::default(),
        InMemoryMediaHost::default(),
        IntakePolicy::default(),
    )
}

pub(super) fn application_form(transaction_id: &str) -> ApplicationForm {
    ApplicationForm {
        first_name: "Bilal".to_string(),
        last_name: "Ahmed".to_string(),
        father_name: "Rashid Ahmed".to_string(),
        email: Some("bilal@example.com".to_string()),
        phone: Some("03001234567".to_string()),
        guardian_phone: "03007654321".to_string(),
        date_of_birth: NaiveDate::from_ymd_opt(2007, 9, 1).expect("valid date"),
        gender: Gender::Male,
        class_level: ClassLevel::SecondYear,
        program: Program::PreEngineering,
        address: "4 Canal View".to_string(),
        city: None,
        state: None,
        zip_code: None,
        education: EducationRecord {
            metric: MetricRecord {
                year: "2022".to_string(),
                roll_number: "1001".to_string(),
                marks: "1010".to_string(),
                school: "City School".to_string(),
            },
        },
        payment_amount: "200".to_string(),
        easypaisa_number: "03450000000".to_string(),
        transaction_id: transaction_id.to_string(),
    }
}

pub(super) fn stored_record(
    id: &str,
    form: ApplicationForm,
    submitted_at: DateTime<Utc>,
) -> ApplicationRecord {
    ApplicationRecord::pending(
        ApplicationId(id.to_string()),
        NewApplication {
            form,
            documents: ApplicationDocuments::default(),
        },
        submitted_at,
    )
}

pub(super) fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, 10, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Media host that fails uploads into one folder and records deletions.
#[derive(Default)]
pub(super) struct FailingMediaHost {
    pub(super) inner: InMemoryMediaHost,
    pub(super) failing_folder: String,
    pub(super) fail_deletes: bool,
    deleted: Mutex<Vec<String>>,
}

impl FailingMediaHost {
    pub(super) fn failing(folder: &str) -> Self {
        Self {
            failing_folder: folder.to_string(),
            ..Self::default()
        }
    }

    pub(super) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("media mutex poisoned").clone()
    }
}

#[async_trait]
impl MediaHost for FailingMediaHost {
    async fn upload(&self, document: &StagedDocument, folder: &str) -> Result<HostedMedia, MediaError> {
        if folder == self.failing_folder {
            return Err(MediaError::Transport("connection reset".to_string()));
        }
        self.inner.upload(document, folder).await
    }

    async fn delete(&self, media: &HostedMedia) -> Result<(), MediaError> {
        self.deleted
            .lock()
            .expect("media mutex poisoned")
            .push(media.public_id.clone());
        if self.fail_deletes {
            return Err(MediaError::Transport("connection reset".to_string()));
        }
        self.inner.delete(media).await
    }
}

pub(super) struct UnavailableStore;

#[async_trait]
impl ApplicationStore for UnavailableStore {
    async fn insert(&self, _application: NewApplication) -> Result<ApplicationRecord, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    async fn find_by_id(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    async fn find_latest(
        &self,
        _field: LookupField,
        _value: &str,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    async fn update_status(
        &self,
        _id: &ApplicationId,
        _status: ApplicationStatus,
        _notes: Option<String>,
    ) -> Result<ApplicationRecord, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    async fn list(
        &self,
        _filter: ApplicationFilter,
        _page: PageRequest,
    ) -> Result<ApplicationPage, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    async fn statistics(&self) -> Result<ApplicationStatistics, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

/// Store whose pre-check finds nothing but whose insert loses the
/// uniqueness race, as a concurrent duplicate would.
#[derive(Default)]
pub(super) struct RacingStore {
    pub(super) inner: InMemoryApplicationStore,
}

#[async_trait]
impl ApplicationStore for RacingStore {
    async fn insert(&self, _application: NewApplication) -> Result<ApplicationRecord, StoreError> {
        Err(StoreError::Conflict(
            crate::admissions::repository::UniqueField::TransactionId,
        ))
    }

    async fn find_by_id(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError> {
        self.inner.find_by_id(id).await
    }

    async fn find_latest(
        &self,
        field: LookupField,
        value: &str,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        self.inner.find_latest(field, value).await
    }

    async fn update_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
        notes: Option<String>,
    ) -> Result<ApplicationRecord, StoreError> {
        self.inner.update_status(id, status, notes).await
    }

    async fn list(
        &self,
        filter: ApplicationFilter,
        page: PageRequest,
    ) -> Result<ApplicationPage, StoreError> {
        self.inner.list(filter, page).await
    }

    async fn statistics(&self) -> Result<ApplicationStatistics, StoreError> {
        self.inner.statistics().await
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Encode text fields and files as a `multipart/form-data` request.
pub(super) fn multipart_request(
    uri: &str,
    fields: &[(&str, &str)],
    files: &[(&str, &UploadedFile)],
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for (name, file) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{}\"\r\n",
                file.file_name
            )
            .as_bytes(),
        );
        if let Some(content_type) = file.content_type.as_deref() {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&file.bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request builds")
}

/// Text fields of [`raw_fields`] in submission order.
pub(super) fn form_pairs() -> Vec<(&'static str, &'static str)> {
    vec![
        ("firstName", "Ayesha"),
        ("lastName", "Khan"),
        ("fatherName", "Imran Khan"),
        ("email", "ayesha.khan@example.com"),
        ("phone", "+92 300-1234567"),
        ("guardianPhone", "0300 7654321"),
        ("dateOfBirth", "2008-03-14"),
        ("gender", "female"),
        ("class", "1st Year"),
        ("group", "FSC Pre-Medical"),
        ("address", "12 Mall Road"),
        ("education[metric][year]", "2023"),
        ("education[metric][rollNumber]", "445566"),
        ("education[metric][marks]", "987"),
        ("education[metric][school]", "Government High School"),
        ("easypaisaNumber", "0345-1112223"),
        ("transactionId", "TX1"),
    ]
}
