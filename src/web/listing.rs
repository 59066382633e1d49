//! Listing detail pages, comments, and the owner-facing add/change/delete
//! flows.

use crate::app_config;
use crate::constants::MAX_ADDITIONAL_IMAGES;
use crate::db::get_db_pool;
use crate::filesystem::{self, MultipartForm};
use crate::middleware::{csrf, ClientCtx};
use crate::orm::{additional_images, comments, listings, sub_categories, users};
use actix_multipart::Multipart;
use actix_web::{error, get, post, web, Error, HttpRequest, HttpResponse, Responder};
use askama_actix::{Template, TemplateToResponse};
use chrono::Utc;
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr, TransactionTrait};
use std::collections::HashMap;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_listing_add)
        .service(post_listing_add)
        .service(view_listing_change)
        .service(post_listing_change)
        .service(post_listing_delete)
        .service(view_detail)
        .service(post_comment)
        .service(view_detail_in_category);
}

/// A listing joined with its author and sub-category names for display.
#[derive(Clone, Debug)]
pub struct ListingView {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub price: f64,
    pub contacts: String,
    pub image: Option<String>,
    pub sub_category_id: i32,
    pub sub_category: String,
    pub author: String,
    pub is_active: bool,
    pub created_at: chrono::NaiveDateTime,
}

impl ListingView {
    pub fn price_display(&self) -> String {
        format!("{:.2}", self.price)
    }

    pub fn created_display(&self) -> String {
        self.created_at.format("%Y-%m-%d %H:%M").to_string()
    }

    pub fn url(&self) -> String {
        format!("/categories/{}/{}", self.sub_category_id, self.id)
    }
}

/// Resolve author and sub-category names for a page of listings with two
/// batched lookups instead of a query per row.
pub async fn hydrate_listings(
    db: &DatabaseConnection,
    models: Vec<listings::Model>,
) -> Result<Vec<ListingView>, DbErr> {
    if models.is_empty() {
        return Ok(Vec::new());
    }

    let mut user_ids: Vec<i32> = models.iter().map(|m| m.user_id).collect();
    user_ids.sort_unstable();
    user_ids.dedup();

    let mut sub_ids: Vec<i32> = models.iter().map(|m| m.sub_category_id).collect();
    sub_ids.sort_unstable();
    sub_ids.dedup();

    let authors: HashMap<i32, String> = users::Entity::find()
        .filter(users::Column::Id.is_in(user_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();

    let subs: HashMap<i32, String> = sub_categories::Entity::find()
        .filter(sub_categories::Column::Id.is_in(sub_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();

    Ok(models
        .into_iter()
        .map(|m| ListingView {
            author: authors
                .get(&m.user_id)
                .cloned()
                .unwrap_or_else(|| "unknown".to_owned()),
            sub_category: subs
                .get(&m.sub_category_id)
                .cloned()
                .unwrap_or_else(|| "unknown".to_owned()),
            id: m.id,
            title: m.title,
            content: m.content,
            price: m.price,
            contacts: m.contacts,
            image: m.image,
            sub_category_id: m.sub_category_id,
            is_active: m.is_active,
            created_at: m.created_at,
        })
        .collect())
}

#[derive(Clone, Debug)]
pub struct CommentView {
    pub author: String,
    pub content: String,
    pub created_at: chrono::NaiveDateTime,
}

impl CommentView {
    pub fn created_display(&self) -> String {
        self.created_at.format("%Y-%m-%d %H:%M").to_string()
    }
}

/// Visible comments for a listing, oldest first.
pub async fn active_comments(
    db: &DatabaseConnection,
    listing_id: i32,
) -> Result<Vec<comments::Model>, DbErr> {
    comments::Entity::find()
        .filter(comments::Column::ListingId.eq(listing_id))
        .filter(comments::Column::IsActive.eq(true))
        .order_by_asc(comments::Column::CreatedAt)
        .order_by_asc(comments::Column::Id)
        .all(db)
        .await
}

#[derive(Template)]
#[template(path = "detail.html")]
struct DetailTemplate {
    client: ClientCtx,
    listing: ListingView,
    additional_images: Vec<String>,
    comments: Vec<CommentView>,
    captcha_site_key: Option<&'static str>,
    captcha_is_hcaptcha: bool,
    message: Option<String>,
    error: Option<String>,
}

/// Render the public detail page for an active listing, or 404.
async fn render_detail(
    client: ClientCtx,
    listing_id: i32,
    message: Option<String>,
    form_error: Option<String>,
) -> Result<HttpResponse, Error> {
    let db = get_db_pool();

    let model = listings::Entity::find_by_id(listing_id)
        .filter(listings::Column::IsActive.eq(true))
        .one(db)
        .await
        .map_err(|e| {
            log::error!("render_detail: {}", e);
            error::ErrorInternalServerError("Couldn't load listing")
        })?
        .ok_or_else(|| error::ErrorNotFound("No such listing."))?;

    let additional = additional_images::Entity::find()
        .filter(additional_images::Column::ListingId.eq(listing_id))
        .order_by_asc(additional_images::Column::Id)
        .all(db)
        .await
        .map_err(|e| {
            log::error!("render_detail: {}", e);
            error::ErrorInternalServerError("Couldn't load listing")
        })?;

    let comment_models = active_comments(db, listing_id).await.map_err(|e| {
        log::error!("render_detail: {}", e);
        error::ErrorInternalServerError("Couldn't load listing")
    })?;

    let mut views = hydrate_listings(db, vec![model]).await.map_err(|e| {
        log::error!("render_detail: {}", e);
        error::ErrorInternalServerError("Couldn't load listing")
    })?;
    let listing = views.remove(0);

    Ok(DetailTemplate {
        client,
        listing,
        additional_images: additional.into_iter().map(|a| a.image).collect(),
        comments: comment_models
            .into_iter()
            .map(|c| CommentView {
                author: c.author,
                content: c.content,
                created_at: c.created_at,
            })
            .collect(),
        captcha_site_key: crate::captcha::get_site_key(),
        captcha_is_hcaptcha: matches!(crate::captcha::get_provider_name(), Some("hcaptcha")),
        message,
        error: form_error,
    }
    .to_response())
}

#[get("/detail/{id}")]
pub async fn view_detail(client: ClientCtx, path: web::Path<i32>) -> Result<impl Responder, Error> {
    render_detail(client, path.into_inner(), None, None).await
}

/// Category-scoped detail URL. 404s when the listing is not in the named
/// category so stale links don't silently show the wrong breadcrumb.
#[get("/categories/{category_id}/{id}")]
pub async fn view_detail_in_category(
    client: ClientCtx,
    path: web::Path<(i32, i32)>,
) -> Result<impl Responder, Error> {
    let (category_id, listing_id) = path.into_inner();
    let db = get_db_pool();

    let listing = listings::Entity::find_by_id(listing_id)
        .filter(listings::Column::IsActive.eq(true))
        .one(db)
        .await
        .map_err(|e| {
            log::error!("view_detail_in_category: {}", e);
            error::ErrorInternalServerError("Couldn't load listing")
        })?
        .ok_or_else(|| error::ErrorNotFound("No such listing."))?;

    if listing.sub_category_id != category_id {
        return Err(error::ErrorNotFound("No such listing."));
    }

    render_detail(client, listing_id, None, None).await
}

#[derive(serde::Deserialize)]
pub struct CommentFormData {
    author: Option<String>,
    content: String,
    csrf_token: String,
    #[serde(rename = "h-captcha-response")]
    hcaptcha_response: Option<String>,
    #[serde(rename = "cf-turnstile-response")]
    turnstile_response: Option<String>,
}

#[post("/detail/{id}/comment")]
pub async fn post_comment(
    client: ClientCtx,
    req: HttpRequest,
    cookies: actix_session::Session,
    path: web::Path<i32>,
    form: web::Form<CommentFormData>,
) -> Result<impl Responder, Error> {
    let listing_id = path.into_inner();

    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    let ip = crate::ip::client_ip_or_unknown(&req);
    let limiter_key = match client.get_id() {
        Some(user_id) => format!("user:{}", user_id),
        None => format!("ip:{}", ip),
    };
    if let Err(e) = crate::rate_limit::check_comment_rate_limit(&limiter_key) {
        return Err(error::ErrorTooManyRequests(format!(
            "Too many comments. Please wait {} seconds.",
            e.retry_after_seconds
        )));
    }

    // Guests prove humanity; members are identified by their account.
    let author = match client.get_user() {
        Some(user) => user.username.clone(),
        None => {
            if crate::captcha::is_enabled() {
                let captcha_response = form
                    .hcaptcha_response
                    .as_deref()
                    .or(form.turnstile_response.as_deref())
                    .unwrap_or("");

                if let Err(e) = crate::captcha::verify(captcha_response, Some(&ip)).await {
                    log::debug!("comment captcha rejected: {}", e);
                    return render_detail(
                        client,
                        listing_id,
                        None,
                        Some("CAPTCHA verification failed. Please try again.".to_owned()),
                    )
                    .await;
                }
            }

            let author = form
                .author
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .to_owned();
            if author.is_empty() || author.len() > 255 {
                return render_detail(
                    client,
                    listing_id,
                    None,
                    Some("Please provide your name.".to_owned()),
                )
                .await;
            }
            author
        }
    };

    let content = form.content.trim();
    if content.is_empty() || content.len() > app_config::limits().max_comment_length {
        return render_detail(
            client,
            listing_id,
            None,
            Some("Comments must not be empty or oversized.".to_owned()),
        )
        .await;
    }

    let db = get_db_pool();

    // 404 before writing anything if the listing isn't publicly visible.
    listings::Entity::find_by_id(listing_id)
        .filter(listings::Column::IsActive.eq(true))
        .one(db)
        .await
        .map_err(|e| {
            log::error!("post_comment: {}", e);
            error::ErrorInternalServerError("Couldn't save comment")
        })?
        .ok_or_else(|| error::ErrorNotFound("No such listing."))?;

    comments::ActiveModel {
        listing_id: Set(listing_id),
        author: Set(author),
        content: Set(content.to_owned()),
        is_active: Set(true),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| {
        log::error!("post_comment: {}", e);
        error::ErrorInternalServerError("Couldn't save comment")
    })?;

    render_detail(client, listing_id, Some("Comment added.".to_owned()), None).await
}

#[derive(Template)]
#[template(path = "listing_form.html")]
struct ListingFormTemplate {
    client: ClientCtx,
    action: String,
    is_edit: bool,
    title: String,
    content: String,
    price: String,
    contacts: String,
    sub_category_id: i32,
    error: Option<String>,
}

/// Validated text fields shared by the add and change forms.
pub struct ListingFields {
    pub sub_category_id: i32,
    pub title: String,
    pub content: String,
    pub price: f64,
    pub contacts: String,
}

async fn parse_listing_fields(form: &MultipartForm) -> Result<ListingFields, Error> {
    let title = form.field("title").trim().to_owned();
    if title.is_empty() || title.len() > 255 {
        return Err(error::ErrorBadRequest(
            "Title is required and must be under 255 characters.",
        ));
    }

    let content = form.field("content").trim().to_owned();
    if content.is_empty() || content.len() > app_config::limits().max_listing_length {
        return Err(error::ErrorBadRequest(
            "Description is required and must not be oversized.",
        ));
    }

    let price: f64 = form
        .field("price")
        .trim()
        .parse()
        .map_err(|_| error::ErrorBadRequest("Price must be a number."))?;
    if !price.is_finite() || price < 0.0 {
        return Err(error::ErrorBadRequest("Price must not be negative."));
    }

    let sub_category_id: i32 = form
        .field("sub_category_id")
        .trim()
        .parse()
        .map_err(|_| error::ErrorBadRequest("Choose a category."))?;

    let db = get_db_pool();
    sub_categories::Entity::find_by_id(sub_category_id)
        .one(db)
        .await
        .map_err(|e| {
            log::error!("parse_listing_fields: {}", e);
            error::ErrorInternalServerError("Couldn't save listing")
        })?
        .ok_or_else(|| error::ErrorBadRequest("Choose a category."))?;

    Ok(ListingFields {
        sub_category_id,
        title,
        content,
        price,
        contacts: form.field("contacts").trim().to_owned(),
    })
}

/// Validate every uploaded image up front, before anything is stored, so a
/// bad file late in the form can't leave earlier uploads stranded.
fn split_images(form: &MultipartForm) -> Result<(Option<&Vec<u8>>, Vec<&Vec<u8>>), Error> {
    let mut main: Option<&Vec<u8>> = None;
    let mut additional: Vec<&Vec<u8>> = Vec::new();

    for file in &form.files {
        if filesystem::validate_image(&file.data).is_none() {
            log::debug!("rejected upload {:?}: unrecognized format", file.original_filename);
            return Err(error::ErrorBadRequest(
                "Only JPEG, PNG, GIF and WebP images are accepted.",
            ));
        }
        match file.field.as_str() {
            "image" => main = Some(&file.data),
            "additional_images" => additional.push(&file.data),
            _ => {}
        }
    }

    if additional.len() > MAX_ADDITIONAL_IMAGES {
        return Err(error::ErrorBadRequest(format!(
            "At most {} additional images are allowed.",
            MAX_ADDITIONAL_IMAGES
        )));
    }

    Ok((main, additional))
}

#[get("/accounts/profile/add")]
pub async fn view_listing_add(client: ClientCtx) -> Result<impl Responder, Error> {
    client.require_login()?;
    Ok(ListingFormTemplate {
        client,
        action: "/accounts/profile/add".to_owned(),
        is_edit: false,
        title: String::new(),
        content: String::new(),
        price: String::new(),
        contacts: String::new(),
        sub_category_id: 0,
        error: None,
    }
    .to_response())
}

#[post("/accounts/profile/add")]
pub async fn post_listing_add(
    client: ClientCtx,
    cookies: actix_session::Session,
    payload: Multipart,
) -> Result<impl Responder, Error> {
    let user_id = client.require_login()?;

    let form = filesystem::read_multipart_form(payload).await?;
    csrf::validate_csrf_token(&cookies, form.field("csrf_token"))?;

    let fields = parse_listing_fields(&form).await?;
    let (main_image, additional) = split_images(&form)?;

    // Store images first; records and files then commit together.
    let mut stored: Vec<String> = Vec::new();
    let main_filename = match main_image {
        Some(data) => {
            let filename = filesystem::store_image(data.clone()).await?;
            stored.push(filename.clone());
            Some(filename)
        }
        None => None,
    };
    let mut additional_filenames = Vec::with_capacity(additional.len());
    for data in additional {
        let filename = filesystem::store_image(data.clone()).await?;
        stored.push(filename.clone());
        additional_filenames.push(filename);
    }

    let db = get_db_pool();
    let result = insert_listing(db, user_id, &fields, main_filename, &additional_filenames).await;

    match result {
        Ok(listing_id) => {
            log::info!("user {} created listing {}", user_id, listing_id);
            Ok(HttpResponse::SeeOther()
                .append_header(("Location", "/accounts/profile"))
                .finish())
        }
        Err(e) => {
            log::error!("post_listing_add: {}", e);
            for filename in &stored {
                discard_if_unreferenced(db, filename).await;
            }
            Err(error::ErrorInternalServerError("Couldn't save listing"))
        }
    }
}

/// Best-effort cleanup of a stored file that may have just lost its last
/// reference. A shared file (identical bytes uploaded for another listing)
/// is left alone.
async fn discard_if_unreferenced(db: &DatabaseConnection, filename: &str) {
    match image_in_use(db, filename).await {
        Ok(false) => filesystem::delete_image(filename).await,
        Ok(true) => {}
        Err(e) => log::warn!("reference check failed for {}: {}", filename, e),
    }
}

/// Insert the listing row and all of its image rows in one transaction, so
/// a failure partway through never leaves images without a listing or a
/// listing missing its images.
pub async fn insert_listing(
    db: &DatabaseConnection,
    user_id: i32,
    fields: &ListingFields,
    main_image: Option<String>,
    additional: &[String],
) -> Result<i32, DbErr> {
    let txn = db.begin().await?;

    let listing = listings::ActiveModel {
        sub_category_id: Set(fields.sub_category_id),
        user_id: Set(user_id),
        title: Set(fields.title.clone()),
        content: Set(fields.content.clone()),
        price: Set(fields.price),
        contacts: Set(fields.contacts.clone()),
        image: Set(main_image),
        is_active: Set(true),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    };
    let result = listings::Entity::insert(listing).exec(&txn).await?;
    let listing_id = result.last_insert_id;

    for filename in additional {
        additional_images::Entity::insert(additional_images::ActiveModel {
            listing_id: Set(listing_id),
            image: Set(filename.clone()),
            ..Default::default()
        })
        .exec(&txn)
        .await?;
    }

    txn.commit().await?;
    Ok(listing_id)
}

/// Load a listing and check the client owns it.
async fn find_owned_listing(
    client: &ClientCtx,
    listing_id: i32,
) -> Result<listings::Model, Error> {
    let db = get_db_pool();
    let listing = listings::Entity::find_by_id(listing_id)
        .one(db)
        .await
        .map_err(|e| {
            log::error!("find_owned_listing: {}", e);
            error::ErrorInternalServerError("Couldn't load listing")
        })?
        .ok_or_else(|| error::ErrorNotFound("No such listing."))?;

    client.require_ownership(listing.user_id)?;
    Ok(listing)
}

#[get("/accounts/profile/change/{id}")]
pub async fn view_listing_change(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let listing = find_owned_listing(&client, path.into_inner()).await?;

    Ok(ListingFormTemplate {
        client,
        action: format!("/accounts/profile/change/{}", listing.id),
        is_edit: true,
        title: listing.title,
        content: listing.content,
        price: format!("{:.2}", listing.price),
        contacts: listing.contacts,
        sub_category_id: listing.sub_category_id,
        error: None,
    }
    .to_response())
}

#[post("/accounts/profile/change/{id}")]
pub async fn post_listing_change(
    client: ClientCtx,
    cookies: actix_session::Session,
    path: web::Path<i32>,
    payload: Multipart,
) -> Result<impl Responder, Error> {
    let listing = find_owned_listing(&client, path.into_inner()).await?;

    let form = filesystem::read_multipart_form(payload).await?;
    csrf::validate_csrf_token(&cookies, form.field("csrf_token"))?;

    let fields = parse_listing_fields(&form).await?;
    let (main_image, additional) = split_images(&form)?;

    let db = get_db_pool();

    let existing_additional = additional_images::Entity::find()
        .filter(additional_images::Column::ListingId.eq(listing.id))
        .count(db)
        .await
        .map_err(|e| {
            log::error!("post_listing_change: {}", e);
            error::ErrorInternalServerError("Couldn't save listing")
        })?;
    if existing_additional + additional.len() > MAX_ADDITIONAL_IMAGES {
        return Err(error::ErrorBadRequest(format!(
            "At most {} additional images are allowed.",
            MAX_ADDITIONAL_IMAGES
        )));
    }

    let old_main = listing.image.clone();
    let listing_id = listing.id;

    let new_main = match main_image {
        Some(data) => Some(filesystem::store_image(data.clone()).await?),
        None => None,
    };
    let mut additional_filenames = Vec::with_capacity(additional.len());
    for data in additional {
        additional_filenames.push(filesystem::store_image(data.clone()).await?);
    }

    let update = async {
        let txn = db.begin().await?;

        let mut active: listings::ActiveModel = listing.into();
        active.sub_category_id = Set(fields.sub_category_id);
        active.title = Set(fields.title.clone());
        active.content = Set(fields.content.clone());
        active.price = Set(fields.price);
        active.contacts = Set(fields.contacts.clone());
        if let Some(filename) = &new_main {
            active.image = Set(Some(filename.clone()));
        }
        active.update(&txn).await?;

        for filename in &additional_filenames {
            additional_images::Entity::insert(additional_images::ActiveModel {
                listing_id: Set(listing_id),
                image: Set(filename.clone()),
                ..Default::default()
            })
            .exec(&txn)
            .await?;
        }

        txn.commit().await
    };

    if let Err(e) = update.await {
        log::error!("post_listing_change: {}", e);
        if let Some(filename) = &new_main {
            discard_if_unreferenced(db, filename).await;
        }
        for filename in &additional_filenames {
            discard_if_unreferenced(db, filename).await;
        }
        return Err(error::ErrorInternalServerError("Couldn't save listing"));
    }

    // The replaced main photo may now be orphaned. Content addressing
    // means re-uploading the same bytes yields the same filename, so only
    // a genuinely different file can have lost its last reference.
    if let (Some(new), Some(old)) = (&new_main, &old_main) {
        if new != old {
            discard_if_unreferenced(db, old).await;
        }
    }

    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/accounts/profile"))
        .finish())
}

#[derive(serde::Deserialize)]
pub struct DeleteFormData {
    csrf_token: String,
}

#[post("/accounts/profile/delete/{id}")]
pub async fn post_listing_delete(
    client: ClientCtx,
    cookies: actix_session::Session,
    path: web::Path<i32>,
    form: web::Form<DeleteFormData>,
) -> Result<impl Responder, Error> {
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    let listing = find_owned_listing(&client, path.into_inner()).await?;
    let db = get_db_pool();

    let images = delete_listing(db, listing).await.map_err(|e| {
        log::error!("post_listing_delete: {}", e);
        error::ErrorInternalServerError("Couldn't delete listing")
    })?;

    // Records are gone; stored files are cleaned best-effort afterwards.
    for filename in &images {
        filesystem::delete_image(filename).await;
    }

    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/accounts/profile"))
        .finish())
}

/// Whether any listing row still references a stored filename. Files are
/// content-addressed, so identical uploads share one file and it must not
/// be removed while any row points at it.
pub async fn image_in_use(db: &DatabaseConnection, filename: &str) -> Result<bool, DbErr> {
    let as_main = listings::Entity::find()
        .filter(listings::Column::Image.eq(filename))
        .count(db)
        .await?;
    if as_main > 0 {
        return Ok(true);
    }

    let as_additional = additional_images::Entity::find()
        .filter(additional_images::Column::Image.eq(filename))
        .count(db)
        .await?;
    Ok(as_additional > 0)
}

/// Remove a listing with its comments and image records in one transaction.
/// Returns the stored filenames no longer referenced by any listing, which
/// are now safe to delete from storage.
pub async fn delete_listing(
    db: &DatabaseConnection,
    listing: listings::Model,
) -> Result<Vec<String>, DbErr> {
    let additional = additional_images::Entity::find()
        .filter(additional_images::Column::ListingId.eq(listing.id))
        .all(db)
        .await?;

    let mut filenames: Vec<String> = additional.iter().map(|a| a.image.clone()).collect();
    if let Some(main) = &listing.image {
        filenames.push(main.clone());
    }

    let txn = db.begin().await?;

    comments::Entity::delete_many()
        .filter(comments::Column::ListingId.eq(listing.id))
        .exec(&txn)
        .await?;

    additional_images::Entity::delete_many()
        .filter(additional_images::Column::ListingId.eq(listing.id))
        .exec(&txn)
        .await?;

    listings::Entity::delete_many()
        .filter(listings::Column::Id.eq(listing.id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    filenames.sort();
    filenames.dedup();
    let mut orphaned = Vec::with_capacity(filenames.len());
    for filename in filenames {
        if !image_in_use(db, &filename).await? {
            orphaned.push(filename);
        }
    }
    Ok(orphaned)
}
