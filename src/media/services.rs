use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::StorageClient;

/// A file spooled to local disk while a request is in flight.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    pub content_type: String,
}

/// Object stored on the media host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub key: String,
    pub url: String,
}

/// Pushes local files to the media host. Built once at startup around the
/// injected storage client.
#[derive(Clone)]
pub struct MediaUploader {
    storage: Arc<dyn StorageClient>,
    prefix: String,
}

impl MediaUploader {
    pub fn new(storage: Arc<dyn StorageClient>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into().trim_matches('/').to_string(),
        }
    }

    /// Uploads `file` under `<prefix>/<folder>/` and returns its public URL.
    /// The local file is removed once the attempt finishes, whatever the outcome.
    pub async fn upload(&self, file: &LocalFile, folder: &str) -> anyhow::Result<UploadedMedia> {
        let result = self.push(file, folder).await;
        if let Err(e) = &result {
            warn!(error = %e, path = %file.path.display(), "media upload failed");
        }
        discard(file).await;
        result
    }

    async fn push(&self, file: &LocalFile, folder: &str) -> anyhow::Result<UploadedMedia> {
        let body = tokio::fs::read(&file.path)
            .await
            .with_context(|| format!("read {}", file.path.display()))?;
        let ext = ext_from_mime(&file.content_type)
            .or_else(|| file.path.extension().and_then(|e| e.to_str()))
            .unwrap_or("bin");
        let key = format!("{}/{}/{}.{}", self.prefix, folder, Uuid::new_v4(), ext);
        self.storage
            .put_object(&key, Bytes::from(body), &file.content_type)
            .await
            .with_context(|| format!("put_object {}", key))?;
        let url = self.storage.public_url(&key);
        debug!(%key, "media uploaded");
        Ok(UploadedMedia { key, url })
    }

    pub async fn remove(&self, media: &UploadedMedia) -> anyhow::Result<()> {
        self.storage
            .delete_object(&media.key)
            .await
            .with_context(|| format!("delete_object {}", media.key))
    }
}

/// Writes an uploaded body into `dir` under a random name.
pub async fn spool_to_disk(
    dir: &Path,
    body: Bytes,
    content_type: &str,
    file_name: Option<&str>,
) -> anyhow::Result<LocalFile> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create upload dir {}", dir.display()))?;
    let ext = ext_from_mime(content_type)
        .or_else(|| {
            file_name
                .and_then(|n| Path::new(n).extension())
                .and_then(|e| e.to_str())
        })
        .unwrap_or("bin");
    let path = dir.join(format!("{}.{}", Uuid::new_v4(), ext));
    tokio::fs::write(&path, &body)
        .await
        .with_context(|| format!("write {}", path.display()))?;
    Ok(LocalFile {
        path,
        content_type: content_type.to_string(),
    })
}

/// Removes a spooled file. Already-removed files are fine.
pub async fn discard(file: &LocalFile) {
    match tokio::fs::remove_file(&file.path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(error = %e, path = %file.path.display(), "failed to remove temp file"),
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod media_tests {
    use super::*;
    use crate::storage::fake::FakeStorage;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("userauth-media-{}", Uuid::new_v4()))
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn upload_returns_public_url_and_removes_local_file() {
        let storage = Arc::new(FakeStorage::default());
        let uploader = MediaUploader::new(storage.clone(), "/users/");
        let file = spool_to_disk(&temp_dir(), Bytes::from_static(b"png"), "image/png", None)
            .await
            .unwrap();

        let media = uploader.upload(&file, "avatars").await.unwrap();

        assert!(media.key.starts_with("users/avatars/"));
        assert!(media.key.ends_with(".png"));
        assert_eq!(media.url, format!("https://fake.local/{}", media.key));
        assert_eq!(storage.keys(), vec![media.key.clone()]);
        assert!(!file.path.exists());
    }

    #[tokio::test]
    async fn failed_upload_deletes_local_file() {
        let uploader = MediaUploader::new(Arc::new(FakeStorage::failing()), "users");
        let file = spool_to_disk(&temp_dir(), Bytes::from_static(b"x"), "image/jpeg", None)
            .await
            .unwrap();
        assert!(file.path.exists());

        let err = uploader.upload(&file, "avatars").await.unwrap_err();

        assert!(err.to_string().contains("put_object"));
        assert!(!file.path.exists());
    }

    #[tokio::test]
    async fn spool_uses_file_name_extension_for_unknown_mime() {
        let file = spool_to_disk(
            &temp_dir(),
            Bytes::from_static(b"x"),
            "application/octet-stream",
            Some("me.tiff"),
        )
        .await
        .unwrap();
        assert_eq!(file.path.extension().and_then(|e| e.to_str()), Some("tiff"));
        discard(&file).await;
        discard(&file).await;
        assert!(!file.path.exists());
    }

    #[tokio::test]
    async fn remove_deletes_object() {
        let storage = Arc::new(FakeStorage::default());
        let uploader = MediaUploader::new(storage.clone(), "users");
        let file = spool_to_disk(&temp_dir(), Bytes::from_static(b"x"), "image/png", None)
            .await
            .unwrap();
        let media = uploader.upload(&file, "covers").await.unwrap();
        uploader.remove(&media).await.unwrap();
        assert!(storage.keys().is_empty());
    }
}
