//! Local filesystem storage backend.

use super::{ByteStream, StorageBackend, StorageError, StorageObject};
use actix_web::web::{self, Bytes};
use async_trait::async_trait;
use futures::stream;
use std::fs;
use std::path::PathBuf;

/// Local filesystem storage backend.
pub struct LocalStorage {
    /// Base path for file storage
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend.
    ///
    /// The `base_path` directory will be created if it doesn't exist.
    pub fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path)?;
        log::info!("LocalStorage initialized at {:?}", base_path);
        Ok(Self { base_path })
    }

    /// Get the full path for a file, including prefix directories.
    fn get_file_path(&self, filename: &str) -> PathBuf {
        if filename.len() < 4 {
            // Fallback for short filenames
            self.base_path.join(filename)
        } else {
            let prefix1 = &filename[0..2];
            let prefix2 = &filename[2..4];
            self.base_path.join(prefix1).join(prefix2).join(filename)
        }
    }

    /// Get MIME type from filename extension.
    fn get_mime_type(filename: &str) -> Option<String> {
        let ext = filename.rsplit('.').next()?;
        let mime = match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            _ => "application/octet-stream",
        };
        Some(mime.to_string())
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn put_object(&self, data: Vec<u8>, filename: &str) -> Result<(), StorageError> {
        let path = self.get_file_path(filename);
        log::info!("LocalStorage: put_object: {:?}", path);

        // Use web::block for blocking file operations
        web::block(move || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, data)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<StorageObject, StorageError> {
        let path = self.get_file_path(key);
        log::debug!("LocalStorage: get_object: {:?}", path);

        let key_owned = key.to_string();
        let path_clone = path.clone();

        let result = web::block(move || -> Result<(Vec<u8>, std::fs::Metadata), StorageError> {
            let metadata = fs::metadata(&path_clone)?;
            let buffer = fs::read(&path_clone)?;
            Ok((buffer, metadata))
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        let (buffer, metadata) = result;
        let content_length = buffer.len() as i64;

        // Modification time doubles as ETag and Last-Modified
        let modified = metadata.modified().ok();
        let e_tag = modified.map(|t: std::time::SystemTime| {
            let duration = t.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
            format!("\"{}\"", duration.as_secs())
        });
        let last_modified = modified.map(|t: std::time::SystemTime| {
            let datetime: chrono::DateTime<chrono::Utc> = t.into();
            datetime.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
        });

        let content_type = Self::get_mime_type(&key_owned);

        let body: ByteStream = Box::pin(stream::once(async move { Ok(Bytes::from(buffer)) }));

        Ok(StorageObject {
            body,
            content_length: Some(content_length),
            content_type,
            e_tag,
            last_modified,
        })
    }

    async fn delete_object(&self, filename: &str) -> Result<(), StorageError> {
        let path = self.get_file_path(filename);
        log::info!("LocalStorage: delete_object: {:?}", path);

        web::block(move || match fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))??;

        Ok(())
    }

    async fn exists(&self, filename: &str) -> Result<bool, StorageError> {
        let path = self.get_file_path(filename);
        Ok(path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_path_prefixing() {
        let storage = LocalStorage::new(std::env::temp_dir().join("bboard-storage-test")).unwrap();
        let path = storage.get_file_path("abcdef123.jpg");
        assert!(path.ends_with("ab/cd/abcdef123.jpg"));
        let short = storage.get_file_path("a.j");
        assert!(short.ends_with("a.j"));
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(
            LocalStorage::get_mime_type("x.JPG"),
            Some("image/jpeg".to_string())
        );
        assert_eq!(
            LocalStorage::get_mime_type("x.png"),
            Some("image/png".to_string())
        );
        assert_eq!(
            LocalStorage::get_mime_type("x.bin"),
            Some("application/octet-stream".to_string())
        );
    }
}
