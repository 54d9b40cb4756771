use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mime_guess::{Mime, mime};
use tracing::{info, warn};

use crate::config::BlobConfig;
use crate::errors::{FeedbackError, FeedbackResult};

/// Storage for faculty images.
/// Real implementation: `LocalBlobStore`. Tests substitute failing stores.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the bytes and return the public URL they are served at.
    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> FeedbackResult<String>;

    /// Remove a blob previously returned by `upload`.
    async fn delete(&self, url: &str) -> FeedbackResult<()>;
}

/// Resolve the upload's media type and require it to be `image/*`.
///
/// A declared content type wins unless it is missing or the generic
/// `application/octet-stream`, in which case the type is guessed from the
/// file name.
pub fn image_mime(file_name: &str, declared: Option<&str>) -> FeedbackResult<Mime> {
    let mime = declared
        .and_then(|d| d.parse::<Mime>().ok())
        .filter(|m| *m != mime::APPLICATION_OCTET_STREAM)
        .or_else(|| mime_guess::from_path(file_name).first());
    match mime {
        Some(m) if m.type_() == mime::IMAGE => Ok(m),
        _ => Err(FeedbackError::validation("image must be an image file")),
    }
}

/// Files under a root directory, served by the HTTP layer at `public_path`.
pub struct LocalBlobStore {
    root: PathBuf,
    public_path: String,
}

impl LocalBlobStore {
    pub fn new(config: &BlobConfig) -> Self {
        Self {
            root: config.root.clone(),
            public_path: config.public_path.trim_end_matches('/').to_string(),
        }
    }

    /// Map a public URL back to a file under `root`. Only bare file names
    /// directly under the public path are accepted.
    fn path_for_url(&self, url: &str) -> FeedbackResult<PathBuf> {
        let name = url
            .strip_prefix(&self.public_path)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty() && !name.contains('/') && !name.contains(".."))
            .ok_or_else(|| FeedbackError::Blob(format!("Not a local blob URL: {}", url)))?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> FeedbackResult<String> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_lowercase)
            .unwrap_or_else(|| "bin".to_string());
        let name = format!("{}.{}", uuid::Uuid::new_v4(), extension);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| FeedbackError::Blob(format!("Failed to create blob directory: {}", e)))?;
        tokio::fs::write(self.root.join(&name), &bytes)
            .await
            .map_err(|e| FeedbackError::Blob(format!("Failed to write blob: {}", e)))?;

        let url = format!("{}/{}", self.public_path, name);
        info!(url = %url, size = bytes.len(), "Stored blob");
        Ok(url)
    }

    async fn delete(&self, url: &str) -> FeedbackResult<()> {
        let path = self.path_for_url(url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(url = %url, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(url = %url, "Blob already absent");
                Ok(())
            }
            Err(e) => Err(FeedbackError::Blob(format!("Failed to delete blob: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LocalBlobStore {
        LocalBlobStore::new(&BlobConfig {
            root: dir.path().to_path_buf(),
            public_path: "/blobs/".into(),
        })
    }

    #[test]
    fn test_image_mime_accepts_images() {
        assert_eq!(image_mime("face.png", None).unwrap(), mime::IMAGE_PNG);
        assert_eq!(image_mime("face", Some("image/jpeg")).unwrap(), mime::IMAGE_JPEG);
        assert_eq!(
            image_mime("face.jpg", Some("application/octet-stream")).unwrap(),
            mime::IMAGE_JPEG
        );
    }

    #[test]
    fn test_image_mime_rejects_other_types() {
        assert!(image_mime("cv.pdf", None).is_err());
        assert!(image_mime("face.png", Some("text/plain")).is_err());
        assert!(image_mime("noext", None).is_err());
    }

    #[tokio::test]
    async fn test_upload_then_delete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let url = store.upload(b"png-bytes".to_vec(), "Face.PNG").await.unwrap();
        assert!(url.starts_with("/blobs/"));
        assert!(url.ends_with(".png"));

        let path = store.path_for_url(&url).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"png-bytes");

        store.delete(&url).await.unwrap();
        assert!(!path.exists());
        // Deleting again is not an error.
        store.delete(&url).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_rejects_foreign_urls() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for url in ["https://cdn.example.com/x.png", "/blobs/../secret", "/blobs/", "/blobs/a/b.png"] {
            assert!(matches!(store.delete(url).await, Err(FeedbackError::Blob(_))), "{url}");
        }
    }
}
