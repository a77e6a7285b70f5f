//! Registry of generated product images.
//!
//! Image files live in one directory next to a `metadata.json` array that
//! describes them. Every read-modify-write of the metadata goes through the
//! registry's lock, and the file is replaced by renaming a temp file so a
//! reader never sees a half-written array.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

const METADATA_FILE: &str = "metadata.json";
/// Public URL prefix the files are served under.
pub const PUBLIC_PREFIX: &str = "/api/static/generated-images";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Image registry I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The metadata file exists but does not hold a JSON array of entries.
    #[error("Image metadata is corrupt: {0}")]
    Corrupt(String),
}

/// One generated image as stored in the metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub file_name: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub local_url: String,
}

/// A listed image, with its public URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedImage {
    #[serde(flatten)]
    pub image: GeneratedImage,
    pub url: String,
}

fn public_url(file_name: &str) -> String {
    format!("{PUBLIC_PREFIX}/{file_name}")
}

/// `product_<YYYYmmdd_HHMMSS>_<8 hex>.png`
fn file_name_for(now: DateTime<Utc>) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!(
        "product_{}_{}.png",
        now.format("%Y%m%d_%H%M%S"),
        id.get(..8).unwrap_or(&id)
    )
}

#[derive(Debug)]
pub struct ImageRegistry {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl ImageRegistry {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Directory holding the image files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    async fn load(&self) -> Result<Vec<GeneratedImage>, RegistryError> {
        match tokio::fs::read(self.metadata_path()).await {
            Ok(bytes) if bytes.trim_ascii().is_empty() => Ok(Vec::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| RegistryError::Corrupt(e.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, entries: &[GeneratedImage]) -> Result<(), RegistryError> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| RegistryError::Corrupt(e.to_string()))?;
        let tmp = self
            .dir
            .join(format!(".{METADATA_FILE}.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, self.metadata_path()).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Entries whose image file still exists, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the metadata cannot be read or is corrupt.
    pub async fn list(&self) -> Result<Vec<ListedImage>, RegistryError> {
        let entries = {
            let _guard = self.lock.lock().await;
            self.load().await?
        };

        let mut listed = Vec::with_capacity(entries.len());
        for mut image in entries {
            if !tokio::fs::try_exists(self.dir.join(&image.file_name))
                .await
                .unwrap_or(false)
            {
                continue;
            }
            let url = public_url(&image.file_name);
            image.local_url.clone_from(&url);
            listed.push(ListedImage { image, url });
        }
        Ok(listed)
    }

    /// Write a produced image and append its metadata entry.
    ///
    /// # Errors
    ///
    /// Returns error if the file or the metadata cannot be written, or the
    /// existing metadata is corrupt (it is left untouched).
    pub async fn record(&self, bytes: &[u8], prompt: &str) -> Result<GeneratedImage, RegistryError> {
        let _guard = self.lock.lock().await;
        // Unreadable metadata fails the call before any image lands on disk.
        let mut entries = self.load().await?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let now = Utc::now();
        let file_name = file_name_for(now);
        tokio::fs::write(self.dir.join(&file_name), bytes).await?;

        let image = GeneratedImage {
            local_url: public_url(&file_name),
            file_name,
            prompt: prompt.to_string(),
            timestamp: now.to_rfc3339(),
        };
        entries.push(image.clone());
        self.store(&entries).await?;
        tracing::info!(file_name = %image.file_name, entries = entries.len(), "Generated image recorded");
        Ok(image)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_metadata_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ImageRegistry::new(dir.path());
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ImageRegistry::new(dir.path().join("generated"));

        let image = registry.record(b"png", "collar de plata").await.unwrap();
        assert!(image.file_name.starts_with("product_"));
        assert!(
            std::path::Path::new(&image.file_name)
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        );

        let listed = registry.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].image.prompt, "collar de plata");
        assert_eq!(listed[0].url, format!("/api/static/generated-images/{}", image.file_name));
        assert_eq!(listed[0].url, listed[0].image.local_url);

        let json = serde_json::to_value(&listed[0]).unwrap();
        assert!(json.get("fileName").is_some());
        assert!(json.get("localUrl").is_some());
    }

    #[tokio::test]
    async fn test_list_skips_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ImageRegistry::new(dir.path());
        let kept = registry.record(b"a", "uno").await.unwrap();
        let gone = registry.record(b"b", "dos").await.unwrap();
        std::fs::remove_file(dir.path().join(&gone.file_name)).unwrap();

        let listed = registry.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].image.file_name, kept.file_name);
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), b"{not json").unwrap();
        let registry = ImageRegistry::new(dir.path());

        assert!(matches!(registry.list().await, Err(RegistryError::Corrupt(_))));
        assert!(matches!(
            registry.record(b"png", "x").await,
            Err(RegistryError::Corrupt(_))
        ));
        let raw = std::fs::read(dir.path().join(METADATA_FILE)).unwrap();
        assert_eq!(raw, b"{not json");
        let stray = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("product_"))
            .count();
        assert_eq!(stray, 0);
    }

    #[tokio::test]
    async fn test_concurrent_records_keep_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ImageRegistry::new(dir.path()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.record(b"png", &format!("prompt {i}")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let listed = registry.list().await.unwrap();
        assert_eq!(listed.len(), 16);
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .ends_with(".tmp")
            })
            .count();
        assert_eq!(leftovers, 0);
    }
}
