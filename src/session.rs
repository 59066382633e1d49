//! Login sessions and password hashing.
//!
//! Sessions are rows in the `sessions` table keyed by a UUID token. The
//! cookie session only carries the token; everything else is looked up per
//! request by the client context middleware.

use crate::constants::SESSION_LIFETIME_DAYS;
use crate::db::get_db_pool;
use crate::orm::sessions;
use crate::user::Profile;
use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use sea_orm::{entity::*, query::*, ConnectionTrait, DbErr};
use uuid::Uuid;

static ARGON2: Lazy<Argon2<'static>> = Lazy::new(Argon2::default);

/// Initialize module globals so unit tests can run without a server.
pub fn init() {
    Lazy::force(&ARGON2);
}

pub fn get_argon2() -> &'static Argon2<'static> {
    &ARGON2
}

/// Hash a password with a fresh salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    Ok(get_argon2()
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

/// Create a new login session for a user and return its token.
pub async fn create_session<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<Uuid, DbErr> {
    let token = Uuid::new_v4();
    let now = Utc::now().naive_utc();

    sessions::Entity::insert(sessions::ActiveModel {
        token: Set(token.to_string()),
        user_id: Set(user_id),
        created_at: Set(now),
        expires_at: Set(now + Duration::days(SESSION_LIFETIME_DAYS)),
    })
    .exec(db)
    .await?;

    Ok(token)
}

/// Delete one session by token.
pub async fn remove_session<C: ConnectionTrait>(db: &C, token: Uuid) -> Result<(), DbErr> {
    sessions::Entity::delete_many()
        .filter(sessions::Column::Token.eq(token.to_string()))
        .exec(db)
        .await?;
    Ok(())
}

/// Delete every session a user holds, e.g. after a password reset.
pub async fn invalidate_user_sessions<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<(), DbErr> {
    sessions::Entity::delete_many()
        .filter(sessions::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Resolve the cookie session to a user profile, if any.
///
/// Returns None for guests, expired sessions, and garbage tokens; those are
/// all just "not logged in" as far as request handling is concerned.
pub async fn authenticate_client_by_session(cookies: &actix_session::Session) -> Option<Profile> {
    let token = match cookies.get::<String>("token") {
        Ok(Some(token)) => token,
        Ok(None) => return None,
        Err(e) => {
            log::debug!("authenticate_client_by_session: cookies.get() {}", e);
            return None;
        }
    };

    let token = match Uuid::parse_str(&token) {
        Ok(token) => token,
        Err(e) => {
            log::debug!("authenticate_client_by_session: parse_str() {}", e);
            return None;
        }
    };

    let db = get_db_pool();
    let session = match sessions::Entity::find_by_id(token.to_string()).one(db).await {
        Ok(Some(session)) => session,
        Ok(None) => return None,
        Err(e) => {
            log::error!("authenticate_client_by_session: {}", e);
            return None;
        }
    };

    if session.expires_at < Utc::now().naive_utc() {
        // Expired rows are cleaned opportunistically here rather than by a
        // background task.
        if let Err(e) = remove_session(db, token).await {
            log::warn!("failed to remove expired session: {}", e);
        }
        return None;
    }

    match Profile::get_by_id(db, session.user_id).await {
        Ok(profile) => profile,
        Err(e) => {
            log::error!("authenticate_client_by_session: profile lookup {}", e);
            None
        }
    }
}
