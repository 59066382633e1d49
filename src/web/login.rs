use crate::app_config;
use crate::db::get_db_pool;
use crate::middleware::{csrf, ClientCtx};
use crate::orm::users;
use crate::session;
use crate::session::get_argon2;
use actix_web::{error, get, post, web, Error, HttpRequest, HttpResponse, Responder};
use argon2::password_hash::{PasswordHash, PasswordVerifier};
use askama_actix::{Template, TemplateToResponse};
use chrono::Utc;
use sea_orm::{entity::*, query::*, DbErr};
use serde::Deserialize;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(post_login).service(view_login);
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub client: ClientCtx,
    pub error: Option<String>,
    pub notice: Option<String>,
}

#[derive(Deserialize)]
pub struct FormData {
    username: String,
    password: String,
    csrf_token: String,
}

#[derive(Debug, PartialEq)]
pub enum LoginResult {
    Success(i32),
    BadCredentials,
    NotActivated,
    AccountLocked,
}

/// Verify credentials and apply the failed-attempt lockout policy.
pub async fn login(name: &str, pass: &str) -> Result<LoginResult, DbErr> {
    let security = app_config::security();
    let db = get_db_pool();

    let user = match users::Entity::find()
        .filter(users::Column::Username.eq(name))
        .one(db)
        .await?
    {
        Some(user) => user,
        None => return Ok(LoginResult::BadCredentials),
    };

    // Check if account is locked
    if let Some(locked_until) = user.locked_until {
        if locked_until > Utc::now().naive_utc() {
            return Ok(LoginResult::AccountLocked);
        } else {
            // Lock has expired, reset failed attempts
            let mut active_user: users::ActiveModel = user.clone().into();
            active_user.failed_login_attempts = Set(0);
            active_user.locked_until = Set(None);
            active_user.update(db).await?;
        }
    }

    let parsed_hash = match PasswordHash::new(&user.password) {
        Ok(hash) => hash,
        Err(e) => {
            log::error!("unparseable password hash for user {}: {}", user.id, e);
            return Ok(LoginResult::BadCredentials);
        }
    };

    if get_argon2()
        .verify_password(pass.as_bytes(), &parsed_hash)
        .is_err()
    {
        // Increment failed login attempts
        let mut active_user: users::ActiveModel = user.clone().into();
        let new_attempts = user.failed_login_attempts + 1;
        active_user.failed_login_attempts = Set(new_attempts);

        // Lock account if max attempts reached
        if new_attempts >= security.max_failed_logins as i32 {
            let lock_until = Utc::now().naive_utc()
                + chrono::Duration::minutes(security.lockout_duration_minutes as i64);
            active_user.locked_until = Set(Some(lock_until));
            log::warn!(
                "Account locked due to {} failed login attempts: user_id={}",
                new_attempts,
                user.id
            );
        }

        active_user.update(db).await?;
        return Ok(LoginResult::BadCredentials);
    }

    // Password is right, but an unactivated account can't sign in yet.
    if !user.is_active || !user.is_activated {
        return Ok(LoginResult::NotActivated);
    }

    // Reset failed login attempts on successful login
    if user.failed_login_attempts > 0 || user.locked_until.is_some() {
        let user_id = user.id;
        let mut active_user: users::ActiveModel = user.into();
        active_user.failed_login_attempts = Set(0);
        active_user.locked_until = Set(None);
        active_user.update(db).await?;
        return Ok(LoginResult::Success(user_id));
    }

    Ok(LoginResult::Success(user.id))
}

#[post("/login")]
pub async fn post_login(
    client: ClientCtx,
    req: HttpRequest,
    cookies: actix_session::Session,
    form: web::Form<FormData>,
) -> Result<impl Responder, Error> {
    csrf::validate_csrf_token(&cookies, &form.csrf_token)?;

    let ip = crate::ip::client_ip_or_unknown(&req);
    if let Err(e) = crate::rate_limit::check_login_rate_limit(&ip) {
        log::warn!("Rate limit exceeded for login: ip={}", ip);
        return Err(error::ErrorTooManyRequests(format!(
            "Too many login attempts. Please wait {} seconds.",
            e.retry_after_seconds
        )));
    }

    let result = login(&form.username, &form.password).await.map_err(|e| {
        log::error!("post_login: {}", e);
        error::ErrorInternalServerError("DB error")
    })?;

    let user_id = match result {
        LoginResult::Success(user_id) => user_id,
        LoginResult::AccountLocked => {
            log::warn!("Login attempt on locked account: {}", form.username);
            return Ok(LoginTemplate {
                client,
                error: Some(
                    "Account locked due to too many failed login attempts. Please try again later."
                        .to_owned(),
                ),
                notice: None,
            }
            .to_response());
        }
        LoginResult::NotActivated => {
            return Ok(LoginTemplate {
                client,
                error: Some(
                    "This account has not been activated yet. Check your email for the activation link."
                        .to_owned(),
                ),
                notice: None,
            }
            .to_response());
        }
        LoginResult::BadCredentials => {
            log::debug!("login failure for {}", form.username);
            // Use generic message to avoid username enumeration
            return Ok(LoginTemplate {
                client,
                error: Some("Invalid username or password.".to_owned()),
                notice: None,
            }
            .to_response());
        }
    };

    let db = get_db_pool();
    let uuid = session::create_session(db, user_id)
        .await
        .map_err(|e| {
            log::error!("post_login: create_session {}", e);
            error::ErrorInternalServerError("DB error")
        })?
        .to_string();

    cookies
        .insert("token", uuid)
        .map_err(|_| error::ErrorInternalServerError("middleware error"))?;

    Ok(HttpResponse::SeeOther()
        .append_header(("Location", "/accounts/profile"))
        .finish())
}

#[derive(Deserialize)]
pub struct LoginQuery {
    reset: Option<String>,
}

#[get("/login")]
pub async fn view_login(
    client: ClientCtx,
    query: web::Query<LoginQuery>,
) -> Result<impl Responder, Error> {
    let notice = match query.reset.as_deref() {
        Some("success") => Some("Your password has been reset. Sign in with the new one.".to_owned()),
        _ => None,
    };

    Ok(LoginTemplate {
        client,
        error: None,
        notice,
    }
    .to_response())
}
