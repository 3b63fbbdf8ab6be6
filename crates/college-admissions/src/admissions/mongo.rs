//! MongoDB-backed application store.

use std::future::IntoFuture;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicationDocuments, ApplicationForm, ApplicationId, ApplicationStatus, ClassLevel,
    EducationRecord, Gender, NewApplication, Program,
};
use super::intake::DEFAULT_PAYMENT_AMOUNT;
use super::lookup::LookupField;
use super::repository::{
    ApplicationFilter, ApplicationPage, ApplicationRecord, ApplicationStatistics,
    ApplicationStore, PageRequest, StoreError, UniqueField, MONTHS_REPORTED,
};

const COLLECTION: &str = "applications";
const DUPLICATE_KEY: i32 = 11000;
const TRANSACTION_INDEX: &str = "transactionId_unique";
const EMAIL_INDEX: &str = "email_unique";

/// Connection settings for the MongoDB store.
#[derive(Debug, Clone)]
pub struct MongoSettings {
    pub uri: String,
    pub database: String,
    pub timeout: Duration,
    pub unique_email: bool,
}

/// BSON shape of an application document. Matches records written by the
/// earlier intake site: `_id` may be an ObjectId or a string, `dateOfBirth` a
/// date or a `YYYY-MM-DD` string, and the payment receipt sits at top level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredApplication {
    #[serde(rename = "_id")]
    id: Bson,
    first_name: String,
    last_name: String,
    father_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
    guardian_phone: String,
    date_of_birth: Bson,
    gender: Gender,
    class: ClassLevel,
    group: Program,
    address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zip_code: Option<String>,
    education: EducationRecord,
    #[serde(default)]
    documents: StoredDocuments,
    #[serde(default = "default_payment_amount")]
    payment_amount: String,
    easypaisa_number: String,
    transaction_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction_receipt: Option<String>,
    #[serde(default = "default_status")]
    status: ApplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    application_date: Option<BsonDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<BsonDateTime>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDocuments {
    #[serde(default)]
    dmc_metric: String,
    #[serde(default)]
    passport_photo: String,
    #[serde(default, rename = "fatherCNIC")]
    father_cnic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    migration_certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transaction_receipt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<String>,
}

fn default_payment_amount() -> String {
    DEFAULT_PAYMENT_AMOUNT.to_string()
}

fn default_status() -> ApplicationStatus {
    ApplicationStatus::Pending
}

fn bson_datetime(at: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(at.timestamp_millis())
}

fn chrono_datetime(at: BsonDateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis())
}

fn birth_date(value: &Bson) -> Option<NaiveDate> {
    match value {
        Bson::DateTime(at) => chrono_datetime(*at).map(|at| at.date_naive()),
        Bson::String(raw) => NaiveDate::parse_from_str(raw.trim().get(..10)?, "%Y-%m-%d").ok(),
        _ => None,
    }
}

impl StoredApplication {
    fn from_record(id: Bson, record: ApplicationRecord) -> Self {
        let ApplicationRecord {
            form,
            documents,
            status,
            notes,
            submitted_at,
            ..
        } = record;
        let submitted_at = bson_datetime(submitted_at);

        Self {
            id,
            first_name: form.first_name,
            last_name: form.last_name,
            father_name: form.father_name,
            email: form.email,
            phone: form.phone,
            guardian_phone: form.guardian_phone,
            date_of_birth: Bson::DateTime(bson_datetime(
                form.date_of_birth.and_time(NaiveTime::MIN).and_utc(),
            )),
            gender: form.gender,
            class: form.class_level,
            group: form.program,
            address: form.address,
            city: form.city,
            state: form.state,
            zip_code: form.zip_code,
            education: form.education,
            documents: StoredDocuments {
                dmc_metric: documents.dmc_metric,
                passport_photo: documents.passport_photo,
                father_cnic: documents.father_cnic,
                migration_certificate: documents.migration_certificate,
                transaction_receipt: None,
                attachments: documents.attachments,
            },
            payment_amount: form.payment_amount,
            easypaisa_number: form.easypaisa_number,
            transaction_id: form.transaction_id,
            transaction_receipt: Some(documents.transaction_receipt),
            status,
            notes,
            application_date: Some(submitted_at),
            created_at: Some(submitted_at),
        }
    }
}

impl TryFrom<StoredApplication> for ApplicationRecord {
    type Error = StoreError;

    fn try_from(stored: StoredApplication) -> Result<Self, Self::Error> {
        let id = match &stored.id {
            Bson::ObjectId(oid) => oid.to_hex(),
            Bson::String(raw) => raw.clone(),
            other => {
                return Err(StoreError::Malformed(format!(
                    "unsupported _id type {:?}",
                    other.element_type()
                )))
            }
        };
        let date_of_birth = birth_date(&stored.date_of_birth).ok_or_else(|| {
            StoreError::Malformed(format!("application {id} has an unreadable dateOfBirth"))
        })?;
        let submitted_at = stored
            .application_date
            .or(stored.created_at)
            .or(match &stored.id {
                Bson::ObjectId(oid) => Some(oid.timestamp()),
                _ => None,
            })
            .and_then(chrono_datetime)
            .ok_or_else(|| {
                StoreError::Malformed(format!("application {id} has no submission date"))
            })?;

        let transaction_receipt = stored
            .transaction_receipt
            .or(stored.documents.transaction_receipt)
            .unwrap_or_default();

        Ok(Self {
            id: ApplicationId(id),
            form: ApplicationForm {
                first_name: stored.first_name,
                last_name: stored.last_name,
                father_name: stored.father_name,
                email: stored.email,
                phone: stored.phone,
                guardian_phone: stored.guardian_phone,
                date_of_birth,
                gender: stored.gender,
                class_level: stored.class,
                program: stored.group,
                address: stored.address,
                city: stored.city,
                state: stored.state,
                zip_code: stored.zip_code,
                education: stored.education,
                payment_amount: stored.payment_amount,
                easypaisa_number: stored.easypaisa_number,
                transaction_id: stored.transaction_id,
            },
            documents: ApplicationDocuments {
                dmc_metric: stored.documents.dmc_metric,
                passport_photo: stored.documents.passport_photo,
                father_cnic: stored.documents.father_cnic,
                migration_certificate: stored.documents.migration_certificate,
                transaction_receipt,
                attachments: stored.documents.attachments,
            },
            status: stored.status,
            notes: stored.notes,
            submitted_at,
        })
    }
}

/// Ids issued by this store and by the earlier site are ObjectIds; older
/// imports may carry the hex string itself.
fn id_filter(id: &ApplicationId) -> Document {
    match ObjectId::parse_str(&id.0) {
        Ok(oid) => doc! { "_id": { "$in": [oid, id.0.as_str()] } },
        Err(_) => doc! { "_id": id.0.as_str() },
    }
}

pub struct MongoApplicationStore {
    collection: Collection<StoredApplication>,
    timeout: Duration,
}

impl std::fmt::Debug for MongoApplicationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoApplicationStore")
            .field("collection", &self.collection.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl MongoApplicationStore {
    /// Connect and make sure the uniqueness indexes exist before serving writes.
    pub async fn connect(settings: &MongoSettings) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(&settings.uri)
            .await
            .map_err(map_error)?;
        options.app_name = Some("college-admissions".to_string());
        options.connect_timeout = Some(settings.timeout);
        options.server_selection_timeout = Some(settings.timeout);

        let client = Client::with_options(options).map_err(map_error)?;
        let collection = client
            .database(&settings.database)
            .collection::<StoredApplication>(COLLECTION);

        let store = Self {
            collection,
            timeout: settings.timeout,
        };
        store.ensure_indexes(settings.unique_email).await?;
        Ok(store)
    }

    async fn ensure_indexes(&self, unique_email: bool) -> Result<(), StoreError> {
        let mut indexes = vec![
            IndexModel::builder()
                .keys(doc! { "transactionId": 1 })
                .options(
                    IndexOptions::builder()
                        .unique(true)
                        .name(TRANSACTION_INDEX.to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "status": 1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "applicationDate": -1 })
                .build(),
        ];
        if unique_email {
            indexes.push(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .name(EMAIL_INDEX.to_string())
                            .partial_filter_expression(doc! { "email": { "$type": "string" } })
                            .build(),
                    )
                    .build(),
            );
        }

        self.bounded(self.collection.create_indexes(indexes)).await?;
        Ok(())
    }

    /// Await a driver call, giving up after the configured timeout.
    async fn bounded<F, T>(&self, operation: F) -> Result<T, StoreError>
    where
        F: IntoFuture<Output = mongodb::error::Result<T>> + Send,
        F::IntoFuture: Send,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(result) => result.map_err(map_error),
            Err(_) => Err(StoreError::Unavailable(format!(
                "operation timed out after {:?}",
                self.timeout
            ))),
        }
    }

    async fn collect(
        &self,
        mut cursor: mongodb::Cursor<StoredApplication>,
    ) -> Result<Vec<ApplicationRecord>, StoreError> {
        let mut records = Vec::new();
        while self.bounded(cursor.advance()).await? {
            let stored = cursor.deserialize_current().map_err(map_error)?;
            records.push(ApplicationRecord::try_from(stored)?);
        }
        Ok(records)
    }
}

fn map_error(err: mongodb::error::Error) -> StoreError {
    if let ErrorKind::Write(WriteFailure::WriteError(write_error)) = err.kind.as_ref() {
        if write_error.code == DUPLICATE_KEY {
            let field = if write_error.message.contains(EMAIL_INDEX) {
                UniqueField::Email
            } else {
                UniqueField::TransactionId
            };
            return StoreError::Conflict(field);
        }
    }
    StoreError::Unavailable(err.to_string())
}

fn lookup_filter(field: LookupField, value: &str) -> Document {
    match field {
        LookupField::Email => doc! {
            "email": { "$regex": format!("^{}$", escape_regex(value)), "$options": "i" }
        },
        LookupField::Phone => doc! {
            "$or": [ { "phone": value }, { "guardianPhone": value } ]
        },
        LookupField::TransactionId => doc! { "transactionId": value },
    }
}

fn listing_filter(filter: ApplicationFilter) -> Document {
    let mut query = Document::new();
    if let Some(status) = filter.status {
        query.insert("status", status.label());
    }
    if let Some(program) = filter.program {
        query.insert("group", program.label());
    }
    query
}

fn escape_regex(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(
            ch,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        ) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl ApplicationStore for MongoApplicationStore {
    async fn insert(&self, application: NewApplication) -> Result<ApplicationRecord, StoreError> {
        let oid = ObjectId::new();
        let record =
            ApplicationRecord::pending(ApplicationId(oid.to_hex()), application, Utc::now());
        let stored = StoredApplication::from_record(Bson::ObjectId(oid), record.clone());
        self.bounded(self.collection.insert_one(stored)).await?;
        Ok(record)
    }

    async fn find_by_id(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError> {
        let found = self
            .bounded(self.collection.find_one(id_filter(id)))
            .await?;
        found.map(ApplicationRecord::try_from).transpose()
    }

    async fn find_latest(
        &self,
        field: LookupField,
        value: &str,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        let found = self
            .bounded(
                self.collection
                    .find_one(lookup_filter(field, value))
                    .sort(doc! { "applicationDate": -1 }),
            )
            .await?;
        found.map(ApplicationRecord::try_from).transpose()
    }

    async fn update_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
        notes: Option<String>,
    ) -> Result<ApplicationRecord, StoreError> {
        let mut changes = doc! { "status": status.label() };
        if let Some(notes) = notes {
            changes.insert("notes", notes);
        }

        let updated = self
            .bounded(
                self.collection
                    .find_one_and_update(id_filter(id), doc! { "$set": changes })
                    .return_document(ReturnDocument::After),
            )
            .await?;
        updated
            .map(ApplicationRecord::try_from)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn list(
        &self,
        filter: ApplicationFilter,
        page: PageRequest,
    ) -> Result<ApplicationPage, StoreError> {
        let query = listing_filter(filter);
        let total = self
            .bounded(self.collection.count_documents(query.clone()))
            .await?;
        let cursor = self
            .bounded(
                self.collection
                    .find(query)
                    .sort(doc! { "applicationDate": -1 })
                    .skip(page.skip())
                    .limit(i64::from(page.limit)),
            )
            .await?;
        let records = self.collect(cursor).await?;
        let applications = records.iter().map(ApplicationRecord::summary).collect();

        Ok(ApplicationPage::new(applications, total, page))
    }

    async fn statistics(&self) -> Result<ApplicationStatistics, StoreError> {
        let pipeline = vec![doc! {
            "$group": {
                "_id": { "status": "$status", "group": "$group" },
                "count": { "$sum": 1 }
            }
        }];
        let mut cursor = self.bounded(self.collection.aggregate(pipeline)).await?;

        let mut stats = ApplicationStatistics::default();
        while self.bounded(cursor.advance()).await? {
            let row = cursor.deserialize_current().map_err(map_error)?;
            let Ok(key) = row.get_document("_id") else {
                continue;
            };
            let status = key.get_str("status").ok().and_then(|raw| raw.parse().ok());
            let program = key.get_str("group").ok().and_then(|raw| raw.parse().ok());

            if let (Some(status), Some(program)) = (status, program) {
                stats.record_many(status, program, row_count(&row));
            }
        }

        let mut cursor = self
            .bounded(self.collection.aggregate(monthly_pipeline()))
            .await?;
        while self.bounded(cursor.advance()).await? {
            let row = cursor.deserialize_current().map_err(map_error)?;
            let Ok(key) = row.get_document("_id") else {
                continue;
            };
            let (Ok(year), Ok(month)) = (key.get_i32("year"), key.get_i32("month")) else {
                continue;
            };
            if let Ok(month) = u32::try_from(month) {
                stats.record_month(year, month, row_count(&row));
            }
        }
        stats.trim_months();

        Ok(stats)
    }
}

/// Submissions grouped by calendar month of `applicationDate` (falling back to
/// `createdAt`), newest first.
fn monthly_pipeline() -> Vec<Document> {
    let submitted = doc! { "$ifNull": ["$applicationDate", "$createdAt"] };
    vec![
        doc! { "$match": { "$expr": { "$eq": [{ "$type": submitted.clone() }, "date"] } } },
        doc! {
            "$group": {
                "_id": {
                    "year": { "$year": submitted.clone() },
                    "month": { "$month": submitted }
                },
                "count": { "$sum": 1 }
            }
        },
        doc! { "$sort": { "_id.year": -1, "_id.month": -1 } },
        doc! { "$limit": (MONTHS_REPORTED as i64) },
    ]
}

fn row_count(row: &Document) -> u64 {
    let count = row
        .get_i32("count")
        .map(i64::from)
        .or_else(|_| row.get_i64("count"))
        .unwrap_or(0);
    u64::try_from(count).unwrap_or(0)
}
