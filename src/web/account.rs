//! The signed-in user's profile area: their listings, profile edits,
//! password change, and account deletion.

use crate::db::get_db_pool;
use crate::middleware::{csrf, ClientCtx};
use crate::orm::{listings, users};
use crate::session::{get_argon2, hash_password, invalidate_user_sessions};
use crate::user::Profile;
use crate::web::listing::{delete_listing, hydrate_listings, ListingView};
use actix_web::{error, get, post, web, Error, HttpResponse, Responder};
use argon2::password_hash::{PasswordHash, PasswordVerifier};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::{entity::*, query::*};
use serde::Deserialize;
use validator::Validate;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_profile_change)
        .service(post_profile_change)
        .service(view_password_change)
        .service(post_password_change)
        .service(view_account_delete)
        .service(post_account_delete)
        .service(view_profile_listing)
        .service(view_profile);
}

#[derive(Template)]
#[template(path = "profile.html")]
struct ProfileTemplate {
    client: ClientCtx,
    profile: Profile,
    listings: Vec<ListingView>,
}

/// All of the client's own listings, including deactivated ones.
async fn own_listings(user_id: i32) -> Result<Vec<ListingView>, Error> {
    let db = get_db_pool();
    let models = listings::Entity::find()
        .filter(listings::Column::UserId.eq(user_id))
        .order_by_desc(listings::Column::CreatedAt)
        .order_by_desc(listings::Column::Id)
        .all(db)
        .await
        .map_err(|e| {
            log::error!("own_listings: {}", e);
            error::ErrorInternalServerError("Couldn't load listings")
        })?;

    hydrate_listings(db, models).await.map_err(|e| {
        log::error!("own_listings: {}", e);
        error::ErrorInternalServerError("Couldn't load listings")
    })
}

#[get("/accounts/profile")]
pub async fn view_profile(client: ClientCtx) -> Result<impl Responder, Error> {
    let user_id = client.require_login()?;
    let profile = client
        .get_user()
        .cloned()
        .ok_or_else(|| error::ErrorUnauthorized("Login required"))?;

    let listings = own_listings(user_id).await?;

    Ok(ProfileTemplate {
        client,
        profile,
        listings,
    }
    .to_response())
}

#[derive(Template)]
#[template(path = "profile_listing_detail.html")]
struct ProfileListingTemplate {
    client: ClientCtx,
    listing: ListingView,
}

/// Owner's view of a single listing, visible even when deactivated.
#[get("/accounts/profile/{id}")]
pub async fn view_profile_listing(
    client: ClientCtx,
    path: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let db = get_db_pool();
    let listing = listings::Entity::find_by_id(path.into_inner())
        .one(db)
        .await
        .map_err(|e| {
            log::error!("view_profile_listing: {}", e);
            error::ErrorInternalServerError("Couldn't load listing")
        })?
        .ok_or_else(|| error::ErrorNotFound("No such listing."))?;

    client.require_ownership(listing.user_id)?;

    let mut views = hydrate_listings(db, vec![listing]).await.map_err(|e| {
        log::error!("view_profile_listing: {}", e);
        error::ErrorInternalServerError("Couldn't load listing")
    })?;

    Ok(ProfileListingTemplate {
        client,
        listing: views.remove(0),
    }
    .to_response())
}

#[derive(Template)]
#[template(path = "change_user_info.html")]
struct ChangeUserInfoTemplate {
    client: ClientCtx,
    profile: Profile,
    error: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct ChangeUserInfoForm {
    #[validate(length(min = 1, max = 255))]
    username: String,
    #[validate(email)]
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    send_messages: Option<String>,
    csrf_token: String,
}

#[get("/accounts/profile/change")]
pub async fn view_profile_change(client: ClientCtx) -> Result<impl Responder, Error> {
    client.require_login()?;
    let profile = client
        .get_user()
        .cloned()
        .ok_or_else(|| error::ErrorUnauthorized("Login required"))?;

    Ok(ChangeUserInfoTemplate {
        client,
        profile,
        error: None,
    }
    .to_response())
}

#[post("/accounts/profile/change")]
pub async fn post_profile_change(
    client: ClientCtx,
    cookies: actix_session::Session,
    form: web::Form<ChangeUserInfoForm>,
) -> Result<impl Responder, Error> {
    let user_id = client.require_login()?;
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    form.validate().map_err(|e| {
        log::debug!("profile change validation failed: {}", e);
        error::ErrorBadRequest("Invalid profile data")
    })?;

    let username = form.username.trim().to_owned();
    if username.contains('.') {
        return Err(error::ErrorBadRequest("Usernames may not contain dots."));
    }
    let email = form.email.trim().to_lowercase();

    let db = get_db_pool();

    // Reject collisions with other accounts.
    let taken = users::Entity::find()
        .filter(users::Column::Id.ne(user_id))
        .filter(
            Condition::any()
                .add(users::Column::Username.eq(username.clone()))
                .add(users::Column::Email.eq(email.clone())),
        )
        .one(db)
        .await
        .map_err(|e| {
            log::error!("post_profile_change: {}", e);
            error::ErrorInternalServerError("Couldn't update profile")
        })?;
    if taken.is_some() {
        return Err(error::ErrorBadRequest(
            "That username or email is already in use.",
        ));
    }

    let mut user: users::ActiveModel = users::Entity::find_by_id(user_id)
        .one(db)
        .await
        .map_err(|e| {
            log::error!("post_profile_change: {}", e);
            error::ErrorInternalServerError("Couldn't update profile")
        })?
        .ok_or_else(|| error::ErrorNotFound("User not found"))?
        .into();

    user.username = Set(username);
    user.email = Set(email);
    user.first_name = Set(form
        .first_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned));
    user.last_name = Set(form
        .last_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned));
    user.send_messages = Set(form.send_messages.is_some());

    user.update(db).await.map_err(|e| {
        log::error!("post_profile_change: {}", e);
        error::ErrorInternalServerError("Couldn't update profile")
    })?;

    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/accounts/profile"))
        .finish())
}

#[derive(Template)]
#[template(path = "password_change.html")]
struct PasswordChangeTemplate {
    client: ClientCtx,
    error: Option<String>,
}

#[derive(Deserialize, Validate)]
pub struct PasswordChangeForm {
    old_password: String,
    #[validate(length(min = 8, max = 1000))]
    password: String,
    #[validate(length(min = 8, max = 1000))]
    password_confirm: String,
    csrf_token: String,
}

#[get("/accounts/password/change")]
pub async fn view_password_change(client: ClientCtx) -> Result<impl Responder, Error> {
    client.require_login()?;
    Ok(PasswordChangeTemplate {
        client,
        error: None,
    }
    .to_response())
}

#[post("/accounts/password/change")]
pub async fn post_password_change(
    client: ClientCtx,
    cookies: actix_session::Session,
    form: web::Form<PasswordChangeForm>,
) -> Result<impl Responder, Error> {
    let user_id = client.require_login()?;
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    form.validate().map_err(|e| {
        log::debug!("password change validation failed: {}", e);
        error::ErrorBadRequest("Invalid password")
    })?;

    if form.password != form.password_confirm {
        return Ok(PasswordChangeTemplate {
            client,
            error: Some("Passwords do not match.".to_owned()),
        }
        .to_response());
    }

    let db = get_db_pool();
    let user = users::Entity::find_by_id(user_id)
        .one(db)
        .await
        .map_err(|e| {
            log::error!("post_password_change: {}", e);
            error::ErrorInternalServerError("Couldn't change password")
        })?
        .ok_or_else(|| error::ErrorNotFound("User not found"))?;

    let parsed_hash = PasswordHash::new(&user.password).map_err(|e| {
        log::error!("unparseable password hash for user {}: {}", user_id, e);
        error::ErrorInternalServerError("Couldn't change password")
    })?;
    if get_argon2()
        .verify_password(form.old_password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Ok(PasswordChangeTemplate {
            client,
            error: Some("Current password is incorrect.".to_owned()),
        }
        .to_response());
    }

    let password_hash = hash_password(&form.password).map_err(|e| {
        log::error!("Failed to hash password: {}", e);
        error::ErrorInternalServerError("Couldn't change password")
    })?;

    let mut active: users::ActiveModel = user.into();
    active.password = Set(password_hash);
    active.update(db).await.map_err(|e| {
        log::error!("post_password_change: {}", e);
        error::ErrorInternalServerError("Couldn't change password")
    })?;

    // Other devices must sign in again with the new password.
    if let Err(e) = invalidate_user_sessions(db, user_id).await {
        log::error!("failed to invalidate sessions after password change: {}", e);
    }
    cookies.remove("token");

    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/login?reset=success"))
        .finish())
}

#[derive(Template)]
#[template(path = "delete_user.html")]
struct DeleteUserTemplate {
    client: ClientCtx,
}

#[derive(Deserialize)]
pub struct DeleteUserForm {
    csrf_token: String,
}

#[get("/accounts/profile/delete")]
pub async fn view_account_delete(client: ClientCtx) -> Result<impl Responder, Error> {
    client.require_login()?;
    Ok(DeleteUserTemplate { client }.to_response())
}

#[post("/accounts/profile/delete")]
pub async fn post_account_delete(
    client: ClientCtx,
    cookies: actix_session::Session,
    form: web::Form<DeleteUserForm>,
) -> Result<impl Responder, Error> {
    let user_id = client.require_login()?;
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    let db = get_db_pool();

    // The user's listings go first, along with their stored images.
    let owned = listings::Entity::find()
        .filter(listings::Column::UserId.eq(user_id))
        .all(db)
        .await
        .map_err(|e| {
            log::error!("post_account_delete: {}", e);
            error::ErrorInternalServerError("Couldn't delete account")
        })?;

    let mut filenames = Vec::new();
    for listing in owned {
        let mut images = delete_listing(db, listing).await.map_err(|e| {
            log::error!("post_account_delete: {}", e);
            error::ErrorInternalServerError("Couldn't delete account")
        })?;
        filenames.append(&mut images);
    }

    if let Err(e) = invalidate_user_sessions(db, user_id).await {
        log::error!("post_account_delete: invalidate sessions {}", e);
    }

    users::Entity::delete_many()
        .filter(users::Column::Id.eq(user_id))
        .exec(db)
        .await
        .map_err(|e| {
            log::error!("post_account_delete: {}", e);
            error::ErrorInternalServerError("Couldn't delete account")
        })?;

    for filename in &filenames {
        crate::filesystem::delete_image(filename).await;
    }

    cookies.remove("token");
    log::info!("account deleted: user_id={}", user_id);

    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/"))
        .finish())
}
