//! Serves uploaded listing images from the storage backend.

use crate::filesystem::get_storage;
use crate::storage::StorageError;
use actix_web::{error, get, http::header, web, Error, HttpResponse, Responder};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_media);
}

#[get("/media/{filename}")]
pub async fn view_media(path: web::Path<String>) -> Result<impl Responder, Error> {
    let filename = path.into_inner();

    // Stored filenames are content hashes plus an extension; anything else
    // is not ours to serve.
    if filename.contains('/') || filename.contains("..") || filename.is_empty() {
        return Err(error::ErrorNotFound("No such file."));
    }

    let object = match get_storage().get_object(&filename).await {
        Ok(object) => object,
        Err(StorageError::NotFound(_)) => {
            return Err(error::ErrorNotFound("No such file."));
        }
        Err(e) => {
            log::error!("view_media: {}", e);
            return Err(error::ErrorInternalServerError("Couldn't read file"));
        }
    };

    let mut builder = HttpResponse::Ok();

    if let Some(content_type) = &object.content_type {
        builder.content_type(content_type.as_str());
    }
    if let Some(e_tag) = &object.e_tag {
        builder.insert_header((header::ETAG, e_tag.as_str()));
    }
    if let Some(last_modified) = &object.last_modified {
        builder.insert_header((header::LAST_MODIFIED, last_modified.as_str()));
    }
    // Content-addressed files never change; cache them hard.
    builder.insert_header((header::CACHE_CONTROL, "public, max-age=604800, immutable"));

    Ok(builder.streaming(object.body))
}
