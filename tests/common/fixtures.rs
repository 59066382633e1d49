//! Test fixtures for creating test data
#![allow(dead_code)]

use chrono::Utc;
use sea_orm::{entity::*, ActiveValue::Set, DatabaseConnection, DbErr};

/// Test user fixture
pub struct TestUser {
    pub id: i32,
    pub username: String,
    pub password: String, // Plain text password for testing
}

/// Create an activated test user with known credentials
pub async fn create_test_user(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<TestUser, DbErr> {
    use bboard::orm::users;

    let password_hash = bboard::session::hash_password(password)
        .map_err(|e| DbErr::Custom(format!("Password hashing failed: {}", e)))?;

    let user = users::ActiveModel {
        username: Set(username.to_string()),
        password: Set(password_hash),
        email: Set(format!("{}@test.com", username)),
        first_name: Set(None),
        last_name: Set(None),
        is_active: Set(true),
        is_activated: Set(true),
        is_staff: Set(false),
        send_messages: Set(true),
        failed_login_attempts: Set(0),
        locked_until: Set(None),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    };
    let user_model = user.insert(db).await?;

    Ok(TestUser {
        id: user_model.id,
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Create a user who registered but has not followed the activation link
pub async fn create_inactive_user(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<TestUser, DbErr> {
    use bboard::orm::users;

    let password_hash = bboard::session::hash_password(password)
        .map_err(|e| DbErr::Custom(format!("Password hashing failed: {}", e)))?;

    let user = users::ActiveModel {
        username: Set(username.to_string()),
        password: Set(password_hash),
        email: Set(format!("{}@test.com", username)),
        first_name: Set(None),
        last_name: Set(None),
        is_active: Set(false),
        is_activated: Set(false),
        is_staff: Set(false),
        send_messages: Set(true),
        failed_login_attempts: Set(0),
        locked_until: Set(None),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    };
    let user_model = user.insert(db).await?;

    Ok(TestUser {
        id: user_model.id,
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Create a super-category with one sub-category under it.
/// Returns (super_category, sub_category).
pub async fn create_test_category(
    db: &DatabaseConnection,
    super_name: &str,
    sub_name: &str,
) -> Result<
    (
        bboard::orm::super_categories::Model,
        bboard::orm::sub_categories::Model,
    ),
    DbErr,
> {
    use bboard::orm::{sub_categories, super_categories};

    let super_category = super_categories::ActiveModel {
        name: Set(super_name.to_string()),
        display_order: Set(0),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let sub_category = sub_categories::ActiveModel {
        super_category_id: Set(super_category.id),
        name: Set(sub_name.to_string()),
        display_order: Set(0),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok((super_category, sub_category))
}

/// Create an active listing with default price and contacts
pub async fn create_test_listing(
    db: &DatabaseConnection,
    sub_category_id: i32,
    user_id: i32,
    title: &str,
    content: &str,
) -> Result<bboard::orm::listings::Model, DbErr> {
    use bboard::orm::listings;

    listings::ActiveModel {
        sub_category_id: Set(sub_category_id),
        user_id: Set(user_id),
        title: Set(title.to_string()),
        content: Set(content.to_string()),
        price: Set(100.0),
        contacts: Set("555-0100".to_string()),
        image: Set(None),
        is_active: Set(true),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Create a comment on a listing
pub async fn create_test_comment(
    db: &DatabaseConnection,
    listing_id: i32,
    author: &str,
    content: &str,
) -> Result<bboard::orm::comments::Model, DbErr> {
    use bboard::orm::comments;

    comments::ActiveModel {
        listing_id: Set(listing_id),
        author: Set(author.to_string()),
        content: Set(content.to_string()),
        is_active: Set(true),
        created_at: Set(Utc::now().naive_utc()),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Get user's current failed login attempts count
pub async fn get_failed_attempts(db: &DatabaseConnection, user_id: i32) -> Result<i32, DbErr> {
    use bboard::orm::users;

    let user = users::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound("User not found".to_string()))?;

    Ok(user.failed_login_attempts)
}

/// Check if user account is currently locked
pub async fn is_user_locked(db: &DatabaseConnection, user_id: i32) -> Result<bool, DbErr> {
    use bboard::orm::users;

    let user = users::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound("User not found".to_string()))?;

    if let Some(locked_until) = user.locked_until {
        Ok(locked_until > Utc::now().naive_utc())
    } else {
        Ok(false)
    }
}
