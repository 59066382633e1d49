//! Account activation via signed email links.
//!
//! The activation link carries the username signed with the site key; no
//! server-side token is stored. Following the link flips the account's
//! activation flags, and doing so twice is harmless.

use crate::db::get_db_pool;
use crate::middleware::ClientCtx;
use crate::orm::users;
use crate::signer;
use actix_web::{error, get, web, Error, Responder};
use askama_actix::{Template, TemplateToResponse};
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr};

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(view_activate);
}

#[derive(Debug, PartialEq)]
pub enum ActivationOutcome {
    /// Flags were flipped by this request.
    Activated,
    /// The account was already active; nothing changed.
    AlreadyActive,
    /// No account with that username.
    UnknownUser,
}

/// Activate the named account. Idempotent.
pub async fn activate_user(
    db: &DatabaseConnection,
    username: &str,
) -> Result<ActivationOutcome, DbErr> {
    let user = match users::Entity::find()
        .filter(users::Column::Username.eq(username))
        .one(db)
        .await?
    {
        Some(user) => user,
        None => return Ok(ActivationOutcome::UnknownUser),
    };

    if user.is_active && user.is_activated {
        return Ok(ActivationOutcome::AlreadyActive);
    }

    let mut active: users::ActiveModel = user.into();
    active.is_active = Set(true);
    active.is_activated = Set(true);
    active.update(db).await?;

    Ok(ActivationOutcome::Activated)
}

#[derive(Template)]
#[template(path = "activation.html")]
struct ActivationTemplate {
    client: ClientCtx,
    success: bool,
    message: String,
}

#[get("/register/activate/{sign}")]
pub async fn view_activate(
    client: ClientCtx,
    path: web::Path<String>,
) -> Result<impl Responder, Error> {
    let sign = path.into_inner();

    let username = match signer::unsign(&sign) {
        Ok(username) => username,
        Err(_) => {
            log::debug!("activation link with bad signature");
            return Ok(ActivationTemplate {
                client,
                success: false,
                message: "This activation link is invalid.".to_owned(),
            }
            .to_response());
        }
    };

    let db = get_db_pool();
    match activate_user(db, &username).await {
        Ok(ActivationOutcome::Activated) => {
            log::info!("account activated: {}", username);
            Ok(ActivationTemplate {
                client,
                success: true,
                message: "Your account is now active. You can sign in.".to_owned(),
            }
            .to_response())
        }
        Ok(ActivationOutcome::AlreadyActive) => Ok(ActivationTemplate {
            client,
            success: true,
            message: "Your account was already activated. You can sign in.".to_owned(),
        }
        .to_response()),
        Ok(ActivationOutcome::UnknownUser) => Err(error::ErrorNotFound("No such user.")),
        Err(e) => {
            log::error!("view_activate: {}", e);
            Err(error::ErrorInternalServerError("Couldn't activate account"))
        }
    }
}
