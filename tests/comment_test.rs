/// Integration tests for comment visibility and moderation flags

mod common;
use serial_test::serial;

use common::*;
use bboard::orm::comments;
use bboard::web::listing::active_comments;
use sea_orm::{entity::*, ActiveValue::Set};

#[actix_rt::test]
#[serial]
async fn test_active_comments_ordered_oldest_first() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let user = create_test_user(&db, "seller", "password123")
        .await
        .expect("Failed to create test user");
    let (_, sub) = create_test_category(&db, "Misc", "Stuff")
        .await
        .expect("Failed to create category");
    let listing = create_test_listing(&db, sub.id, user.id, "Desk", "Solid oak")
        .await
        .expect("Failed to create listing");

    create_test_comment(&db, listing.id, "first", "Earliest")
        .await
        .expect("Failed to create comment");
    create_test_comment(&db, listing.id, "second", "Latest")
        .await
        .expect("Failed to create comment");

    let visible = active_comments(&db, listing.id).await.expect("Query failed");
    assert_eq!(visible.len(), 2);
    assert_eq!(visible[0].author, "first");
    assert_eq!(visible[1].author, "second");

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_deactivated_comment_is_hidden() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let user = create_test_user(&db, "seller", "password123")
        .await
        .expect("Failed to create test user");
    let (_, sub) = create_test_category(&db, "Misc", "Stuff")
        .await
        .expect("Failed to create category");
    let listing = create_test_listing(&db, sub.id, user.id, "Desk", "Solid oak")
        .await
        .expect("Failed to create listing");

    let keeper = create_test_comment(&db, listing.id, "guest", "Looks great")
        .await
        .expect("Failed to create comment");
    let spam = create_test_comment(&db, listing.id, "spammer", "Buy pills")
        .await
        .expect("Failed to create comment");

    // Staff hides the spam comment.
    let mut active: comments::ActiveModel = spam.into();
    active.is_active = Set(false);
    active.update(&db).await.expect("Failed to hide comment");

    let visible = active_comments(&db, listing.id).await.expect("Query failed");
    assert_eq!(visible.len(), 1, "Hidden comments must not be listed");
    assert_eq!(visible[0].id, keeper.id);

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_hidden_comment_can_be_restored() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let user = create_test_user(&db, "seller", "password123")
        .await
        .expect("Failed to create test user");
    let (_, sub) = create_test_category(&db, "Misc", "Stuff")
        .await
        .expect("Failed to create category");
    let listing = create_test_listing(&db, sub.id, user.id, "Desk", "Solid oak")
        .await
        .expect("Failed to create listing");

    let comment = create_test_comment(&db, listing.id, "guest", "False alarm")
        .await
        .expect("Failed to create comment");

    let mut hide: comments::ActiveModel = comment.clone().into();
    hide.is_active = Set(false);
    let hidden = hide.update(&db).await.expect("Failed to hide comment");

    let mut show: comments::ActiveModel = hidden.into();
    show.is_active = Set(true);
    show.update(&db).await.expect("Failed to restore comment");

    let visible = active_comments(&db, listing.id).await.expect("Query failed");
    assert_eq!(visible.len(), 1, "Restored comment should be visible again");
    assert_eq!(visible[0].id, comment.id);

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}
