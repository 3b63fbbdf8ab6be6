use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::media::{HostedMedia, MediaError, MediaHost};
use super::staging::StagedDocument;

pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Credentials and placement for the Cloudinary account.
#[derive(Debug, Clone)]
pub struct CloudinarySettings {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub root_folder: String,
    pub timeout: Duration,
    /// REST root the cloud name is appended to, normally [`DEFAULT_API_BASE`].
    pub api_base: String,
}

/// Signed-upload client for the Cloudinary REST API.
pub struct CloudinaryClient {
    settings: CloudinarySettings,
    http: reqwest::Client,
    api_base: String,
}

impl std::fmt::Debug for CloudinaryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryClient")
            .field("cloud_name", &self.settings.cloud_name)
            .field("root_folder", &self.settings.root_folder)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    resource_type: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl CloudinaryClient {
    pub fn new(settings: CloudinarySettings) -> Result<Self, MediaError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| MediaError::Transport(err.to_string()))?;

        let api_base = settings.api_base.trim_end_matches('/').to_string();
        Ok(Self {
            settings,
            http,
            api_base,
        })
    }

    fn endpoint(&self, resource_type: &str, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.api_base, self.settings.cloud_name, resource_type, action
        )
    }

    fn qualified_folder(&self, folder: &str) -> String {
        let root = self.settings.root_folder.trim_matches('/');
        let folder = folder.trim_matches('/');
        match (root.is_empty(), folder.is_empty()) {
            (true, _) => folder.to_string(),
            (false, true) => root.to_string(),
            (false, false) => format!("{root}/{folder}"),
        }
    }

    fn sign(&self, params: &[(&str, &str)]) -> String {
        signature(params, &self.settings.api_secret)
    }

    fn map_transport(err: reqwest::Error) -> MediaError {
        MediaError::Transport(err.to_string())
    }

    async fn rejected(response: reqwest::Response) -> MediaError {
        let status = response.status().as_u16();
        let message = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope.error.message,
            Err(_) => "unreadable error body".to_string(),
        };
        MediaError::Rejected { status, message }
    }
}

/// Cloudinary request signature: parameters sorted by name, joined as a query
/// string, with the API secret appended, hashed with SHA-256.
pub(crate) fn signature(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|left, right| left.0.cmp(right.0));
    let joined = sorted
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl MediaHost for CloudinaryClient {
    async fn upload(&self, document: &StagedDocument, folder: &str) -> Result<HostedMedia, MediaError> {
        let bytes = tokio::fs::read(document.path()).await?;
        let folder = self.qualified_folder(folder);
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("folder", folder.as_str()), ("timestamp", timestamp.as_str())]);
        let resource_type = if document.is_image() { "image" } else { "raw" };

        let part = Part::bytes(bytes)
            .file_name(document.original_name.clone())
            .mime_str(document.content_type.essence_str())
            .map_err(Self::map_transport)?;
        let form = Form::new()
            .part("file", part)
            .text("api_key", self.settings.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .http
            .post(self.endpoint(resource_type, "upload"))
            .multipart(form)
            .send()
            .await
            .map_err(Self::map_transport)?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let body: UploadResponse = response.json().await.map_err(Self::map_transport)?;
        Ok(HostedMedia {
            url: body.secure_url,
            public_id: body.public_id,
            resource_type: body.resource_type,
        })
    }

    async fn delete(&self, media: &HostedMedia) -> Result<(), MediaError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("public_id", media.public_id.as_str()),
            ("timestamp", timestamp.as_str()),
        ]);
        let params = [
            ("public_id", media.public_id.as_str()),
            ("timestamp", timestamp.as_str()),
            ("api_key", self.settings.api_key.as_str()),
            ("signature", signature.as_str()),
            ("signature_algorithm", "sha256"),
        ];

        let response = self
            .http
            .post(self.endpoint(&media.resource_type, "destroy"))
            .form(&params)
            .send()
            .await
            .map_err(Self::map_transport)?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let body: DestroyResponse = response.json().await.map_err(Self::map_transport)?;
        match body.result.as_str() {
            "ok" => Ok(()),
            "not found" => Err(MediaError::NotFound(media.public_id.clone())),
            other => Err(MediaError::Rejected {
                status: 200,
                message: format!("unexpected destroy result '{other}'"),
            }),
        }
    }
}
