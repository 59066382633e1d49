//! Upload handling.
//!
//! Reads multipart forms, validates image payloads by magic bytes, and
//! hands the bytes to the configured [`StorageBackend`]. Stored files are
//! named by their blake3 content hash so duplicate uploads coalesce.

use crate::app_config;
use crate::storage::{local::LocalStorage, s3::S3Storage, StorageBackend, StorageError};
use actix_multipart::Multipart;
use actix_web::error;
use futures::{StreamExt, TryStreamExt};
use once_cell::sync::OnceCell;
use rusoto_core::Region;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

static STORAGE: OnceCell<Arc<dyn StorageBackend>> = OnceCell::new();

/// Build the storage backend from configuration. Called once at startup.
pub fn init() -> Result<(), StorageError> {
    let config = app_config::storage();
    let backend: Arc<dyn StorageBackend> = match config.backend.as_str() {
        "s3" => {
            let region = Region::Custom {
                name: config.s3_region.clone(),
                endpoint: config.s3_endpoint.clone(),
            };
            Arc::new(S3Storage::new(region, config.s3_bucket.clone()))
        }
        _ => Arc::new(LocalStorage::new(PathBuf::from(&config.local_path))?),
    };

    if STORAGE.set(backend).is_err() {
        log::warn!("filesystem::init() called more than once");
    }
    Ok(())
}

pub fn get_storage() -> &'static Arc<dyn StorageBackend> {
    STORAGE.get().expect("storage backend not initialized")
}

/// One uploaded file from a multipart form.
pub struct UploadPayload {
    /// Name of the form field this file arrived under.
    pub field: String,
    pub original_filename: String,
    pub data: Vec<u8>,
}

/// A parsed multipart form: text fields plus file payloads.
#[derive(Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadPayload>,
}

impl MultipartForm {
    pub fn field(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

/// Drain a multipart request into memory, enforcing the configured size cap.
///
/// Empty file fields (a file input left blank) are skipped rather than
/// treated as zero-byte uploads.
pub async fn read_multipart_form(mut payload: Multipart) -> Result<MultipartForm, error::Error> {
    let max_bytes = app_config::limits().max_upload_size_mb * 1024 * 1024;
    let mut form = MultipartForm::default();
    let mut total: usize = 0;

    while let Ok(Some(mut field)) = payload.try_next().await {
        let field_name = field
            .content_disposition()
            .get_name()
            .unwrap_or("")
            .to_string();
        let filename = field
            .content_disposition()
            .get_filename()
            .map(str::to_string);

        let mut data: Vec<u8> = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| {
                log::warn!("multipart read error: {}", e);
                error::ErrorBadRequest("Malformed upload.")
            })?;
            total += chunk.len();
            if total > max_bytes {
                return Err(error::ErrorPayloadTooLarge("Upload too large."));
            }
            data.extend_from_slice(&chunk);
        }

        match filename {
            Some(original_filename) => {
                if data.is_empty() {
                    continue;
                }
                form.files.push(UploadPayload {
                    field: field_name,
                    original_filename,
                    data,
                });
            }
            None => {
                let value = String::from_utf8(data)
                    .map_err(|_| error::ErrorBadRequest("Form fields must be UTF-8."))?;
                form.fields.insert(field_name, value);
            }
        }
    }

    Ok(form)
}

/// Sniff the payload's magic bytes and return the canonical extension for
/// accepted image formats.
pub fn validate_image(data: &[u8]) -> Option<&'static str> {
    if data.len() < 12 {
        return None;
    }
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("png")
    } else if data.starts_with(b"GIF8") {
        Some("gif")
    } else if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

/// Validate and persist an uploaded image, returning its stored filename.
pub async fn store_image(data: Vec<u8>) -> Result<String, error::Error> {
    let ext = validate_image(&data)
        .ok_or_else(|| error::ErrorBadRequest("Only JPEG, PNG, GIF and WebP images are accepted."))?;

    let hash = blake3::hash(&data);
    let filename = format!("{}.{}", hash.to_hex(), ext);

    let storage = get_storage();

    // Content-addressed names: a duplicate upload is already stored.
    match storage.exists(&filename).await {
        Ok(true) => return Ok(filename),
        Ok(false) => {}
        Err(e) => log::warn!("exists check failed for {}: {}", filename, e),
    }

    storage
        .put_object(data, &filename)
        .await
        .map_err(|e| {
            log::error!("failed to store upload: {}", e);
            error::ErrorInternalServerError("Could not store the uploaded image.")
        })?;

    Ok(filename)
}

/// Best-effort removal of a stored image. Failures are logged, not surfaced:
/// a dangling media file is preferable to a failed delete of the record.
pub async fn delete_image(filename: &str) {
    if let Err(e) = get_storage().delete_object(filename).await {
        log::warn!("failed to delete stored image {}: {}", filename, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_image_magic_bytes() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
        jpeg.extend_from_slice(&[0u8; 16]);
        assert_eq!(validate_image(&jpeg), Some("jpg"));

        let mut png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        png.extend_from_slice(&[0u8; 16]);
        assert_eq!(validate_image(&png), Some("png"));

        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&[0u8; 16]);
        assert_eq!(validate_image(&gif), Some("gif"));

        let mut webp = b"RIFF\x00\x00\x00\x00WEBP".to_vec();
        webp.extend_from_slice(&[0u8; 16]);
        assert_eq!(validate_image(&webp), Some("webp"));
    }

    #[test]
    fn test_validate_image_rejects_other_content() {
        assert_eq!(validate_image(b"<html><body>hi</body></html>"), None);
        assert_eq!(validate_image(b"%PDF-1.4 something"), None);
        assert_eq!(validate_image(b""), None);
        assert_eq!(validate_image(&[0xFF, 0xD8]), None);
    }
}
