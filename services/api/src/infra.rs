use async_trait::async_trait;
use college_admissions::admissions::{
    AdmissionService, ApplicationFilter, ApplicationId, ApplicationPage, ApplicationRecord,
    ApplicationStatistics, ApplicationStatus, ApplicationStore, CloudinaryClient, DocumentStager,
    HostedMedia, InMemoryApplicationStore, InMemoryMediaHost, LookupField, MediaError, MediaHost,
    MongoApplicationStore, NewApplication, PageRequest, StagedDocument, StoreError,
};
use college_admissions::config::{AppConfig, StoreBackend};
use college_admissions::error::AppError;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Admissions = AdmissionService<AppStore, AppMedia>;

/// Store selected at startup from `STORE_BACKEND`.
pub(crate) enum AppStore {
    Memory(InMemoryApplicationStore),
    Mongo(MongoApplicationStore),
}

#[async_trait]
impl ApplicationStore for AppStore {
    async fn insert(&self, application: NewApplication) -> Result<ApplicationRecord, StoreError> {
        match self {
            AppStore::Memory(store) => store.insert(application).await,
            AppStore::Mongo(store) => store.insert(application).await,
        }
    }

    async fn find_by_id(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError> {
        match self {
            AppStore::Memory(store) => store.find_by_id(id).await,
            AppStore::Mongo(store) => store.find_by_id(id).await,
        }
    }

    async fn find_latest(
        &self,
        field: LookupField,
        value: &str,
    ) -> Result<Option<ApplicationRecord>, StoreError> {
        match self {
            AppStore::Memory(store) => store.find_latest(field, value).await,
            AppStore::Mongo(store) => store.find_latest(field, value).await,
        }
    }

    async fn update_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
        notes: Option<String>,
    ) -> Result<ApplicationRecord, StoreError> {
        match self {
            AppStore::Memory(store) => store.update_status(id, status, notes).await,
            AppStore::Mongo(store) => store.update_status(id, status, notes).await,
        }
    }

    async fn list(
        &self,
        filter: ApplicationFilter,
        page: PageRequest,
    ) -> Result<ApplicationPage, StoreError> {
        match self {
            AppStore::Memory(store) => store.list(filter, page).await,
            AppStore::Mongo(store) => store.list(filter, page).await,
        }
    }

    async fn statistics(&self) -> Result<ApplicationStatistics, StoreError> {
        match self {
            AppStore::Memory(store) => store.statistics().await,
            AppStore::Mongo(store) => store.statistics().await,
        }
    }
}

/// Media host selected at startup from the Cloudinary credentials.
pub(crate) enum AppMedia {
    Memory(InMemoryMediaHost),
    Cloudinary(CloudinaryClient),
}

#[async_trait]
impl MediaHost for AppMedia {
    async fn upload(&self, document: &StagedDocument, folder: &str) -> Result<HostedMedia, MediaError> {
        match self {
            AppMedia::Memory(host) => host.upload(document, folder).await,
            AppMedia::Cloudinary(host) => host.upload(document, folder).await,
        }
    }

    async fn delete(&self, media: &HostedMedia) -> Result<(), MediaError> {
        match self {
            AppMedia::Memory(host) => host.delete(media).await,
            AppMedia::Cloudinary(host) => host.delete(media).await,
        }
    }
}

pub(crate) async fn build_store(config: &AppConfig) -> Result<AppStore, AppError> {
    match config.store.backend {
        StoreBackend::Memory => {
            warn!("using in-memory application store; records are lost on restart");
            Ok(AppStore::Memory(InMemoryApplicationStore::new(
                config.intake.unique_email,
            )))
        }
        StoreBackend::Mongo => {
            let settings = config.store.mongo_settings(config.intake.unique_email)?;
            let store = MongoApplicationStore::connect(&settings).await?;
            info!(database = %settings.database, "connected to application store");
            Ok(AppStore::Mongo(store))
        }
    }
}

pub(crate) fn build_media(config: &AppConfig) -> Result<AppMedia, AppError> {
    match config.media.cloudinary.clone() {
        Some(settings) => Ok(AppMedia::Cloudinary(CloudinaryClient::new(settings)?)),
        None => {
            warn!("cloudinary credentials not set; documents are kept in memory");
            Ok(AppMedia::Memory(InMemoryMediaHost::default()))
        }
    }
}

pub(crate) async fn build_service(config: &AppConfig) -> Result<Arc<Admissions>, AppError> {
    let store = build_store(config).await?;
    let media = build_media(config)?;
    Ok(Arc::new(AdmissionService::new(
        Arc::new(store),
        Arc::new(media),
        config.intake.policy(),
        DocumentStager::new(config.intake.staging_dir.clone()),
    )))
}
