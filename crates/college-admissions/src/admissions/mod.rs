//! College application intake, status lookup, and review.
//!
//! Submissions arrive as raw multipart fields plus uploaded files. They are
//! validated and normalized, checked for duplicates, their documents pushed to
//! a media host, and the canonical record persisted through an
//! [`ApplicationStore`]. Both external systems sit behind traits so the
//! service can run against in-memory doubles.

pub mod cloudinary;
pub mod domain;
pub mod education;
pub mod export;
pub mod form;
pub mod intake;
pub mod lookup;
pub mod media;
pub mod memory;
pub mod mongo;
pub mod repository;
pub mod router;
pub mod service;
pub mod staging;

#[cfg(test)]
mod tests;

pub use cloudinary::{CloudinaryClient, CloudinarySettings};
pub use domain::{
    ApplicationDocuments, ApplicationForm, ApplicationId, ApplicationStatus, ClassLevel,
    DocumentSlot, EducationRecord, Gender, MetricRecord, NewApplication, Program,
};
pub use education::{extract_education, extract_metric};
pub use export::{export_applications, write_summaries, ExportError};
pub use form::{RawFields, RawSubmission, UploadedFile};
pub use intake::{check_documents, check_file, validate_fields, IntakePolicy, ValidationError};
pub use lookup::{normalize_email, normalize_phone, phone_candidates, LookupField};
pub use media::{HostedMedia, InMemoryMediaHost, MediaError, MediaHost};
pub use memory::InMemoryApplicationStore;
pub use mongo::{MongoApplicationStore, MongoSettings};
pub use repository::{
    ApplicationFilter, ApplicationPage, ApplicationRecord, ApplicationStatistics,
    ApplicationStore, ApplicationSummary, MonthlyCount, PageRequest, StatusUpdate, StatusView,
    StoreError, UniqueField, MONTHS_REPORTED,
};
pub use router::admission_router;
pub use service::{AdmissionError, AdmissionService, SubmissionReceipt};
pub use staging::{DocumentStager, StagedDocument};
