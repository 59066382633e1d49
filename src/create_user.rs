//! User registration.
//!
//! New accounts start deactivated; the user gets an email carrying a
//! signed activation link and cannot sign in until they follow it.

use crate::db::get_db_pool;
use crate::middleware::{csrf, ClientCtx};
use crate::orm::users;
use crate::session::hash_password;
use crate::signer;
use actix_web::{error, get, post, web, Error, HttpRequest, Responder};
use askama_actix::{Template, TemplateToResponse};
use chrono::Utc;
use sea_orm::{entity::*, query::*};
use serde::Deserialize;
use validator::Validate;

#[derive(Template)]
#[template(path = "create_user.html")]
struct CreateUserTemplate {
    client: ClientCtx,
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "register_done.html")]
struct RegisterDoneTemplate {
    client: ClientCtx,
    email: String,
}

#[derive(Deserialize, Validate)]
pub struct FormData {
    #[validate(length(min = 1, max = 255))]
    username: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 8, max = 1000))]
    password: String,
    #[validate(length(min = 8, max = 1000))]
    password2: String,
    first_name: Option<String>,
    last_name: Option<String>,
    send_messages: Option<String>,
    csrf_token: String,
}

#[get("/register")]
pub async fn create_user_get(client: ClientCtx) -> impl Responder {
    CreateUserTemplate {
        client,
        error: None,
    }
    .to_response()
}

#[post("/register")]
pub async fn create_user_post(
    client: ClientCtx,
    req: HttpRequest,
    cookies: actix_session::Session,
    form: web::Form<FormData>,
) -> Result<impl Responder, Error> {
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    // Rate limiting - prevent registration spam
    let ip = crate::ip::client_ip_or_unknown(&req);
    if let Err(e) = crate::rate_limit::check_registration_rate_limit(&ip) {
        log::warn!("Rate limit exceeded for registration: ip={}", ip);
        return Err(error::ErrorTooManyRequests(format!(
            "Too many registration attempts. Please wait {} seconds.",
            e.retry_after_seconds
        )));
    }

    // Validate form input
    form.validate().map_err(|e| {
        log::debug!("User registration validation failed: {}", e);
        error::ErrorBadRequest("Invalid registration data")
    })?;

    let username = form.username.trim().to_owned();
    // The activation link signs the username; a dot would be ambiguous
    // against the signature separator.
    if username.contains('.') {
        return Ok(CreateUserTemplate {
            client,
            error: Some("Usernames may not contain dots.".to_owned()),
        }
        .to_response());
    }

    if form.password != form.password2 {
        return Ok(CreateUserTemplate {
            client,
            error: Some("Passwords do not match.".to_owned()),
        }
        .to_response());
    }

    let email = form.email.trim().to_lowercase();
    let db = get_db_pool();

    let taken = users::Entity::find()
        .filter(
            Condition::any()
                .add(users::Column::Username.eq(username.clone()))
                .add(users::Column::Email.eq(email.clone())),
        )
        .one(db)
        .await
        .map_err(|e| {
            log::error!("create_user_post: {}", e);
            error::ErrorInternalServerError("Failed to create user")
        })?;
    if taken.is_some() {
        return Ok(CreateUserTemplate {
            client,
            error: Some("That username or email is already in use.".to_owned()),
        }
        .to_response());
    }

    let password_hash = hash_password(&form.password).map_err(|e| {
        log::error!("Failed to hash password: {}", e);
        error::ErrorInternalServerError("Failed to create user")
    })?;

    let user = users::ActiveModel {
        username: Set(username.clone()),
        password: Set(password_hash),
        email: Set(email.clone()),
        first_name: Set(form
            .first_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)),
        last_name: Set(form
            .last_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)),
        is_active: Set(false),
        is_activated: Set(false),
        is_staff: Set(false),
        send_messages: Set(form.send_messages.is_some()),
        failed_login_attempts: Set(0),
        locked_until: Set(None),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    };

    let result = users::Entity::insert(user).exec(db).await.map_err(|e| {
        log::error!("Failed to create user: {}", e);
        error::ErrorInternalServerError("Failed to create user")
    })?;
    let user_id = result.last_insert_id;

    // Send the activation link
    let sign = signer::sign(&username);
    let base_url = crate::app_config::site().base_url.clone();

    if let Err(e) =
        crate::email::templates::send_activation_email(&email, &username, &sign, &base_url).await
    {
        log::error!("Failed to send activation email: {}", e);
        // Don't fail registration - staff can re-send the link
    }

    log::info!("New user registered: {} (user_id: {})", username, user_id);

    Ok(RegisterDoneTemplate { client, email }.to_response())
}
