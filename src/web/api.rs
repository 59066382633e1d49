//! Minimal JSON read API for listings and comments.
//!
//! Mirrors the HTML site's visibility rules: only active listings and
//! active comments are served. Comment creation requires a signed-in user.

use crate::constants::FRONT_PAGE_LISTINGS;
use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::orm::{additional_images, comments, listings};
use crate::web::listing::{active_comments, hydrate_listings};
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use chrono::Utc;
use sea_orm::{entity::*, query::*};
use serde::{Deserialize, Serialize};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(api_listings)
        .service(api_listing_detail)
        .service(api_comments_get)
        .service(api_comments_post);
}

#[derive(Serialize)]
struct ApiListing {
    id: i32,
    title: String,
    content: String,
    price: f64,
    contacts: String,
    image: Option<String>,
    sub_category_id: i32,
    sub_category: String,
    author: String,
    created_at: String,
}

#[derive(Serialize)]
struct ApiListingDetail {
    #[serde(flatten)]
    listing: ApiListing,
    additional_images: Vec<String>,
}

#[derive(Serialize)]
struct ApiComment {
    id: i32,
    author: String,
    content: String,
    created_at: String,
}

fn format_timestamp(ts: chrono::NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// GET /api/bbs - the latest active listings, newest first.
#[get("/api/bbs")]
pub async fn api_listings() -> Result<impl Responder, Error> {
    let db = get_db_pool();

    let models = listings::Entity::find()
        .filter(listings::Column::IsActive.eq(true))
        .order_by_desc(listings::Column::CreatedAt)
        .order_by_desc(listings::Column::Id)
        .limit(FRONT_PAGE_LISTINGS)
        .all(db)
        .await
        .map_err(|e| {
            log::error!("api_listings: {}", e);
            error::ErrorInternalServerError("Couldn't load listings")
        })?;

    let views = hydrate_listings(db, models).await.map_err(|e| {
        log::error!("api_listings: {}", e);
        error::ErrorInternalServerError("Couldn't load listings")
    })?;

    let body: Vec<ApiListing> = views
        .into_iter()
        .map(|v| ApiListing {
            id: v.id,
            title: v.title,
            content: v.content,
            price: v.price,
            contacts: v.contacts,
            image: v.image,
            sub_category_id: v.sub_category_id,
            sub_category: v.sub_category,
            author: v.author,
            created_at: format_timestamp(v.created_at),
        })
        .collect();

    Ok(web::Json(body))
}

/// GET /api/bbs/{id} - one active listing with its extra images.
#[get("/api/bbs/{id}")]
pub async fn api_listing_detail(path: web::Path<i32>) -> Result<impl Responder, Error> {
    let listing_id = path.into_inner();
    let db = get_db_pool();

    let model = listings::Entity::find_by_id(listing_id)
        .filter(listings::Column::IsActive.eq(true))
        .one(db)
        .await
        .map_err(|e| {
            log::error!("api_listing_detail: {}", e);
            error::ErrorInternalServerError("Couldn't load listing")
        })?
        .ok_or_else(|| error::ErrorNotFound("No such listing."))?;

    let additional = additional_images::Entity::find()
        .filter(additional_images::Column::ListingId.eq(listing_id))
        .order_by_asc(additional_images::Column::Id)
        .all(db)
        .await
        .map_err(|e| {
            log::error!("api_listing_detail: {}", e);
            error::ErrorInternalServerError("Couldn't load listing")
        })?;

    let mut views = hydrate_listings(db, vec![model]).await.map_err(|e| {
        log::error!("api_listing_detail: {}", e);
        error::ErrorInternalServerError("Couldn't load listing")
    })?;
    let v = views.remove(0);

    Ok(web::Json(ApiListingDetail {
        listing: ApiListing {
            id: v.id,
            title: v.title,
            content: v.content,
            price: v.price,
            contacts: v.contacts,
            image: v.image,
            sub_category_id: v.sub_category_id,
            sub_category: v.sub_category,
            author: v.author,
            created_at: format_timestamp(v.created_at),
        },
        additional_images: additional.into_iter().map(|a| a.image).collect(),
    }))
}

/// GET /api/bbs/{id}/comments - visible comments, oldest first.
#[get("/api/bbs/{id}/comments")]
pub async fn api_comments_get(path: web::Path<i32>) -> Result<impl Responder, Error> {
    let listing_id = path.into_inner();
    let db = get_db_pool();

    // 404 for inactive and unknown listings alike.
    listings::Entity::find_by_id(listing_id)
        .filter(listings::Column::IsActive.eq(true))
        .one(db)
        .await
        .map_err(|e| {
            log::error!("api_comments_get: {}", e);
            error::ErrorInternalServerError("Couldn't load comments")
        })?
        .ok_or_else(|| error::ErrorNotFound("No such listing."))?;

    let models = active_comments(db, listing_id).await.map_err(|e| {
        log::error!("api_comments_get: {}", e);
        error::ErrorInternalServerError("Couldn't load comments")
    })?;

    let body: Vec<ApiComment> = models
        .into_iter()
        .map(|c| ApiComment {
            id: c.id,
            author: c.author,
            content: c.content,
            created_at: format_timestamp(c.created_at),
        })
        .collect();

    Ok(web::Json(body))
}

#[derive(Deserialize)]
pub struct ApiCommentForm {
    content: String,
}

/// POST /api/bbs/{id}/comments - add a comment as the signed-in user.
#[post("/api/bbs/{id}/comments")]
pub async fn api_comments_post(
    client: ClientCtx,
    path: web::Path<i32>,
    body: web::Json<ApiCommentForm>,
) -> Result<impl Responder, Error> {
    let listing_id = path.into_inner();

    let user = client
        .get_user()
        .ok_or_else(|| error::ErrorUnauthorized("Authentication required"))?;

    let content = body.content.trim();
    if content.is_empty() || content.len() > crate::app_config::limits().max_comment_length {
        return Err(error::ErrorBadRequest("Invalid comment content"));
    }

    if let Err(e) = crate::rate_limit::check_comment_rate_limit(&format!("user:{}", user.id)) {
        return Err(error::ErrorTooManyRequests(format!(
            "Too many comments. Please wait {} seconds.",
            e.retry_after_seconds
        )));
    }

    let db = get_db_pool();

    listings::Entity::find_by_id(listing_id)
        .filter(listings::Column::IsActive.eq(true))
        .one(db)
        .await
        .map_err(|e| {
            log::error!("api_comments_post: {}", e);
            error::ErrorInternalServerError("Couldn't save comment")
        })?
        .ok_or_else(|| error::ErrorNotFound("No such listing."))?;

    let comment = comments::ActiveModel {
        listing_id: Set(listing_id),
        author: Set(user.username.clone()),
        content: Set(content.to_owned()),
        is_active: Set(true),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| {
        log::error!("api_comments_post: {}", e);
        error::ErrorInternalServerError("Couldn't save comment")
    })?;

    Ok(HttpResponse::Created().json(ApiComment {
        id: comment.id,
        author: comment.author,
        content: comment.content,
        created_at: format_timestamp(comment.created_at),
    }))
}
