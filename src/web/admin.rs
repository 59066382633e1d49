//! Staff-only moderation and maintenance pages.

use crate::db::get_db_pool;
use crate::middleware::{csrf, ClientCtx};
use crate::orm::{comments, listings, sub_categories, super_categories, users};
use crate::signer;
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use askama_actix::{Template, TemplateToResponse};
use chrono::{Duration, Utc};
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr};
use serde::Deserialize;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_dashboard)
        .service(view_users)
        .service(post_send_activation)
        .service(view_comments)
        .service(post_comment_moderate)
        .service(post_listing_moderate)
        .service(view_categories)
        .service(post_super_category_create)
        .service(post_super_category_delete)
        .service(post_sub_category_create)
        .service(post_sub_category_delete);
}

fn db_error(context: &'static str) -> impl Fn(sea_orm::DbErr) -> Error {
    move |e| {
        log::error!("{}: {}", context, e);
        error::ErrorInternalServerError("Database error")
    }
}

#[derive(Template)]
#[template(path = "admin/dashboard.html")]
struct DashboardTemplate {
    client: ClientCtx,
    user_count: usize,
    pending_activation: usize,
    listing_count: usize,
    hidden_comments: usize,
    recent_listings: Vec<listings::Model>,
}

#[get("/admin")]
pub async fn view_dashboard(client: ClientCtx) -> Result<impl Responder, Error> {
    client.require_staff()?;
    let db = get_db_pool();

    let user_count = users::Entity::find()
        .count(db)
        .await
        .map_err(db_error("view_dashboard"))?;
    let pending_activation = users::Entity::find()
        .filter(users::Column::IsActivated.eq(false))
        .count(db)
        .await
        .map_err(db_error("view_dashboard"))?;
    let listing_count = listings::Entity::find()
        .count(db)
        .await
        .map_err(db_error("view_dashboard"))?;
    let hidden_comments = comments::Entity::find()
        .filter(comments::Column::IsActive.eq(false))
        .count(db)
        .await
        .map_err(db_error("view_dashboard"))?;
    let recent_listings = listings::Entity::find()
        .order_by_desc(listings::Column::CreatedAt)
        .order_by_desc(listings::Column::Id)
        .limit(20)
        .all(db)
        .await
        .map_err(db_error("view_dashboard"))?;

    Ok(DashboardTemplate {
        client,
        user_count,
        pending_activation,
        listing_count,
        hidden_comments,
        recent_listings,
    }
    .to_response())
}

#[derive(Template)]
#[template(path = "admin/users.html")]
struct UsersTemplate {
    client: ClientCtx,
    users: Vec<users::Model>,
    filter: String,
}

#[derive(Deserialize)]
pub struct UsersQuery {
    filter: Option<String>,
}

/// GET /admin/users - user list with activation-state buckets.
///
/// `filter` is one of:
/// - `activated`: accounts that completed activation
/// - `threedays`: unactivated accounts older than three days
/// - `week`: unactivated accounts older than a week
#[get("/admin/users")]
pub async fn view_users(
    client: ClientCtx,
    query: web::Query<UsersQuery>,
) -> Result<impl Responder, Error> {
    client.require_staff()?;
    let db = get_db_pool();

    let filter = query.filter.clone().unwrap_or_default();
    let mut select = users::Entity::find();

    match filter.as_str() {
        "activated" => {
            select = select.filter(users::Column::IsActivated.eq(true));
        }
        "threedays" => {
            let cutoff = Utc::now().naive_utc() - Duration::days(3);
            select = select
                .filter(users::Column::IsActivated.eq(false))
                .filter(users::Column::CreatedAt.lt(cutoff));
        }
        "week" => {
            let cutoff = Utc::now().naive_utc() - Duration::weeks(1);
            select = select
                .filter(users::Column::IsActivated.eq(false))
                .filter(users::Column::CreatedAt.lt(cutoff));
        }
        _ => {}
    }

    let users = select
        .order_by_asc(users::Column::Id)
        .all(db)
        .await
        .map_err(db_error("view_users"))?;

    Ok(UsersTemplate {
        client,
        users,
        filter,
    }
    .to_response())
}

#[derive(Deserialize)]
pub struct CsrfOnlyForm {
    csrf_token: String,
}

/// POST /admin/users/{id}/send-activation - re-send the activation email.
#[post("/admin/users/{id}/send-activation")]
pub async fn post_send_activation(
    client: ClientCtx,
    cookies: actix_session::Session,
    path: web::Path<i32>,
    form: web::Form<CsrfOnlyForm>,
) -> Result<impl Responder, Error> {
    client.require_staff()?;
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    let db = get_db_pool();
    let user = users::Entity::find_by_id(path.into_inner())
        .one(db)
        .await
        .map_err(db_error("post_send_activation"))?
        .ok_or_else(|| error::ErrorNotFound("No such user."))?;

    if user.is_activated {
        return Err(error::ErrorBadRequest("User is already activated."));
    }

    let sign = signer::sign(&user.username);
    let base_url = crate::app_config::site().base_url.clone();

    if let Err(e) =
        crate::email::templates::send_activation_email(&user.email, &user.username, &sign, &base_url)
            .await
    {
        log::error!("post_send_activation: {}", e);
        return Err(error::ErrorInternalServerError(
            "Couldn't send activation email",
        ));
    }

    log::info!("activation email re-sent to user {}", user.id);
    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/admin/users"))
        .finish())
}

#[derive(Template)]
#[template(path = "admin/comments.html")]
struct CommentsTemplate {
    client: ClientCtx,
    comments: Vec<comments::Model>,
}

/// GET /admin/comments - every comment, newest first, for moderation.
#[get("/admin/comments")]
pub async fn view_comments(client: ClientCtx) -> Result<impl Responder, Error> {
    client.require_staff()?;
    let db = get_db_pool();

    let comments = comments::Entity::find()
        .order_by_desc(comments::Column::CreatedAt)
        .order_by_desc(comments::Column::Id)
        .all(db)
        .await
        .map_err(db_error("view_comments"))?;

    Ok(CommentsTemplate { client, comments }.to_response())
}

/// POST /admin/comments/{id}/{action} where action is activate, deactivate
/// or delete.
#[post("/admin/comments/{id}/{action}")]
pub async fn post_comment_moderate(
    client: ClientCtx,
    cookies: actix_session::Session,
    path: web::Path<(i32, String)>,
    form: web::Form<CsrfOnlyForm>,
) -> Result<impl Responder, Error> {
    client.require_staff()?;
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    let (comment_id, action) = path.into_inner();
    let db = get_db_pool();

    let comment = comments::Entity::find_by_id(comment_id)
        .one(db)
        .await
        .map_err(db_error("post_comment_moderate"))?
        .ok_or_else(|| error::ErrorNotFound("No such comment."))?;

    match action.as_str() {
        "activate" | "deactivate" => {
            let mut active: comments::ActiveModel = comment.into();
            active.is_active = Set(action == "activate");
            active
                .update(db)
                .await
                .map_err(db_error("post_comment_moderate"))?;
        }
        "delete" => {
            comments::Entity::delete_many()
                .filter(comments::Column::Id.eq(comment_id))
                .exec(db)
                .await
                .map_err(db_error("post_comment_moderate"))?;
        }
        _ => return Err(error::ErrorNotFound("Unknown action.")),
    }

    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/admin/comments"))
        .finish())
}

/// POST /admin/listings/{id}/{action} where action is activate or
/// deactivate. Deactivated listings disappear from the public site but
/// stay visible to their owner.
#[post("/admin/listings/{id}/{action}")]
pub async fn post_listing_moderate(
    client: ClientCtx,
    cookies: actix_session::Session,
    path: web::Path<(i32, String)>,
    form: web::Form<CsrfOnlyForm>,
) -> Result<impl Responder, Error> {
    client.require_staff()?;
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    let (listing_id, action) = path.into_inner();
    let is_active = match action.as_str() {
        "activate" => true,
        "deactivate" => false,
        _ => return Err(error::ErrorNotFound("Unknown action.")),
    };

    let db = get_db_pool();
    let listing = listings::Entity::find_by_id(listing_id)
        .one(db)
        .await
        .map_err(db_error("post_listing_moderate"))?
        .ok_or_else(|| error::ErrorNotFound("No such listing."))?;

    let mut active: listings::ActiveModel = listing.into();
    active.is_active = Set(is_active);
    active
        .update(db)
        .await
        .map_err(db_error("post_listing_moderate"))?;

    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/admin"))
        .finish())
}

#[derive(Template)]
#[template(path = "admin/categories.html")]
struct CategoriesTemplate {
    client: ClientCtx,
    super_categories: Vec<super_categories::Model>,
    sub_categories: Vec<sub_categories::Model>,
}

#[get("/admin/categories")]
pub async fn view_categories(client: ClientCtx) -> Result<impl Responder, Error> {
    client.require_staff()?;
    let db = get_db_pool();

    let super_categories = super_categories::Entity::find()
        .order_by_asc(super_categories::Column::DisplayOrder)
        .order_by_asc(super_categories::Column::Id)
        .all(db)
        .await
        .map_err(db_error("view_categories"))?;

    let sub_categories = sub_categories::Entity::find()
        .order_by_asc(sub_categories::Column::DisplayOrder)
        .order_by_asc(sub_categories::Column::Id)
        .all(db)
        .await
        .map_err(db_error("view_categories"))?;

    Ok(CategoriesTemplate {
        client,
        super_categories,
        sub_categories,
    }
    .to_response())
}

#[derive(Deserialize)]
pub struct SuperCategoryForm {
    name: String,
    display_order: Option<i32>,
    csrf_token: String,
}

#[post("/admin/categories/super")]
pub async fn post_super_category_create(
    client: ClientCtx,
    cookies: actix_session::Session,
    form: web::Form<SuperCategoryForm>,
) -> Result<impl Responder, Error> {
    client.require_staff()?;
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    let name = form.name.trim().to_owned();
    if name.is_empty() || name.len() > 255 {
        return Err(error::ErrorBadRequest("Category name is required."));
    }

    create_super_category(get_db_pool(), &name, form.display_order.unwrap_or(0))
        .await
        .map_err(db_error("post_super_category_create"))?
        .ok_or_else(|| error::ErrorBadRequest("A category with that name already exists."))?;

    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/admin/categories"))
        .finish())
}

/// Insert a super-category unless the name is already taken.
pub async fn create_super_category(
    db: &DatabaseConnection,
    name: &str,
    display_order: i32,
) -> Result<Option<super_categories::Model>, DbErr> {
    let taken = super_categories::Entity::find()
        .filter(super_categories::Column::Name.eq(name))
        .count(db)
        .await?;
    if taken > 0 {
        return Ok(None);
    }

    let model = super_categories::ActiveModel {
        name: Set(name.to_owned()),
        display_order: Set(display_order),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(Some(model))
}

/// Deleting a super-category requires it to be empty.
#[post("/admin/categories/super/{id}/delete")]
pub async fn post_super_category_delete(
    client: ClientCtx,
    cookies: actix_session::Session,
    path: web::Path<i32>,
    form: web::Form<CsrfOnlyForm>,
) -> Result<impl Responder, Error> {
    client.require_staff()?;
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    let super_id = path.into_inner();
    let db = get_db_pool();

    let children = sub_categories::Entity::find()
        .filter(sub_categories::Column::SuperCategoryId.eq(super_id))
        .count(db)
        .await
        .map_err(db_error("post_super_category_delete"))?;
    if children > 0 {
        return Err(error::ErrorBadRequest(
            "Remove the sub-categories under this category first.",
        ));
    }

    super_categories::Entity::delete_many()
        .filter(super_categories::Column::Id.eq(super_id))
        .exec(db)
        .await
        .map_err(db_error("post_super_category_delete"))?;

    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/admin/categories"))
        .finish())
}

#[derive(Deserialize)]
pub struct SubCategoryForm {
    name: String,
    super_category_id: i32,
    display_order: Option<i32>,
    csrf_token: String,
}

#[post("/admin/categories/sub")]
pub async fn post_sub_category_create(
    client: ClientCtx,
    cookies: actix_session::Session,
    form: web::Form<SubCategoryForm>,
) -> Result<impl Responder, Error> {
    client.require_staff()?;
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    let name = form.name.trim().to_owned();
    if name.is_empty() || name.len() > 255 {
        return Err(error::ErrorBadRequest("Category name is required."));
    }

    let db = get_db_pool();
    super_categories::Entity::find_by_id(form.super_category_id)
        .one(db)
        .await
        .map_err(db_error("post_sub_category_create"))?
        .ok_or_else(|| error::ErrorBadRequest("No such super-category."))?;

    create_sub_category(db, form.super_category_id, &name, form.display_order.unwrap_or(0))
        .await
        .map_err(db_error("post_sub_category_create"))?
        .ok_or_else(|| {
            error::ErrorBadRequest("A sub-category with that name already exists here.")
        })?;

    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/admin/categories"))
        .finish())
}

/// Insert a sub-category unless the parent already has one by that name.
/// The same name under a different parent is allowed.
pub async fn create_sub_category(
    db: &DatabaseConnection,
    super_category_id: i32,
    name: &str,
    display_order: i32,
) -> Result<Option<sub_categories::Model>, DbErr> {
    let taken = sub_categories::Entity::find()
        .filter(sub_categories::Column::SuperCategoryId.eq(super_category_id))
        .filter(sub_categories::Column::Name.eq(name))
        .count(db)
        .await?;
    if taken > 0 {
        return Ok(None);
    }

    let model = sub_categories::ActiveModel {
        super_category_id: Set(super_category_id),
        name: Set(name.to_owned()),
        display_order: Set(display_order),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(Some(model))
}

/// Deleting a sub-category requires it to have no listings.
#[post("/admin/categories/sub/{id}/delete")]
pub async fn post_sub_category_delete(
    client: ClientCtx,
    cookies: actix_session::Session,
    path: web::Path<i32>,
    form: web::Form<CsrfOnlyForm>,
) -> Result<impl Responder, Error> {
    client.require_staff()?;
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    let sub_id = path.into_inner();
    let db = get_db_pool();

    let in_use = listings::Entity::find()
        .filter(listings::Column::SubCategoryId.eq(sub_id))
        .count(db)
        .await
        .map_err(db_error("post_sub_category_delete"))?;
    if in_use > 0 {
        return Err(error::ErrorBadRequest(
            "This category still has listings.",
        ));
    }

    sub_categories::Entity::delete_many()
        .filter(sub_categories::Column::Id.eq(sub_id))
        .exec(db)
        .await
        .map_err(db_error("post_sub_category_delete"))?;

    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/admin/categories"))
        .finish())
}
