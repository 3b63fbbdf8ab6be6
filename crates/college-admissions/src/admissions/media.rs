use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::staging::StagedDocument;

/// A document stored on the media host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedMedia {
    pub url: String,
    pub public_id: String,
    pub resource_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media not found: {0}")]
    NotFound(String),
    #[error("media host rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("media host unreachable: {0}")]
    Transport(String),
    #[error("failed to read staged document: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound media storage used for application documents.
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Upload a staged document into `folder`, returning its public location.
    async fn upload(&self, document: &StagedDocument, folder: &str) -> Result<HostedMedia, MediaError>;
    async fn delete(&self, media: &HostedMedia) -> Result<(), MediaError>;
}

/// Media host keeping uploads in process memory. Used when no external host is
/// configured outside production, and by tests.
#[derive(Debug, Default)]
pub struct InMemoryMediaHost {
    sequence: AtomicU64,
    stored: Mutex<Vec<(HostedMedia, Vec<u8>)>>,
}

impl InMemoryMediaHost {
    pub fn stored(&self) -> Vec<HostedMedia> {
        self.stored
            .lock()
            .expect("media mutex poisoned")
            .iter()
            .map(|(media, _)| media.clone())
            .collect()
    }

    pub fn contents(&self, public_id: &str) -> Option<Vec<u8>> {
        self.stored
            .lock()
            .expect("media mutex poisoned")
            .iter()
            .find(|(media, _)| media.public_id == public_id)
            .map(|(_, bytes)| bytes.clone())
    }
}

#[async_trait]
impl MediaHost for InMemoryMediaHost {
    async fn upload(&self, document: &StagedDocument, folder: &str) -> Result<HostedMedia, MediaError> {
        let bytes = tokio::fs::read(document.path()).await?;
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let public_id = format!("{folder}/{id:06}");
        let resource_type = if document.is_image() { "image" } else { "raw" };
        let media = HostedMedia {
            url: format!("memory://{public_id}/{}", document.original_name),
            public_id,
            resource_type: resource_type.to_string(),
        };

        self.stored
            .lock()
            .expect("media mutex poisoned")
            .push((media.clone(), bytes));
        Ok(media)
    }

    async fn delete(&self, media: &HostedMedia) -> Result<(), MediaError> {
        let mut guard = self.stored.lock().expect("media mutex poisoned");
        let before = guard.len();
        guard.retain(|(stored, _)| stored.public_id != media.public_id);
        if guard.len() == before {
            return Err(MediaError::NotFound(media.public_id.clone()));
        }
        Ok(())
    }
}
