use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::form::UploadedFile;

/// Writes uploads to a scratch directory before they are sent to the media host.
#[derive(Debug, Clone)]
pub struct DocumentStager {
    dir: PathBuf,
}

impl DocumentStager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stage `file` into the scratch directory. The temp file is removed when
    /// the returned handle is dropped, whether or not the upload succeeded.
    pub async fn stage(&self, label: &str, file: &UploadedFile) -> std::io::Result<StagedDocument> {
        let dir = self.dir.clone();
        let prefix = format!("{label}-");
        let suffix = file
            .extension()
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let bytes = file.bytes.clone();

        let temp = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
            std::fs::create_dir_all(&dir)?;
            let mut temp = tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(&suffix)
                .tempfile_in(&dir)?;
            temp.write_all(&bytes)?;
            temp.flush()?;
            Ok(temp)
        })
        .await
        .map_err(std::io::Error::other)??;

        Ok(StagedDocument {
            temp,
            original_name: file.file_name.clone(),
            content_type: file.effective_content_type(),
        })
    }
}

/// A staged upload on local disk.
#[derive(Debug)]
pub struct StagedDocument {
    temp: NamedTempFile,
    pub original_name: String,
    pub content_type: mime::Mime,
}

impl StagedDocument {
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn is_image(&self) -> bool {
        self.content_type.type_() == mime::IMAGE
    }
}
