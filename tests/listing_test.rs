/// Integration tests for listing creation and removal, including the
/// cascade over comments and image records

mod common;
use serial_test::serial;

use common::*;
use bboard::orm::{additional_images, comments, listings};
use bboard::web::listing::{active_comments, delete_listing, insert_listing, ListingFields};
use sea_orm::{entity::*, query::*, ActiveValue::Set};

async fn attach_image(
    db: &sea_orm::DatabaseConnection,
    listing_id: i32,
    filename: &str,
) -> additional_images::Model {
    additional_images::ActiveModel {
        listing_id: Set(listing_id),
        image: Set(filename.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to attach image")
}

#[actix_rt::test]
#[serial]
async fn test_delete_listing_removes_comments_and_images() {
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

    let listing = create_test_listing(&db, sub.id, user.id, "Old sofa", "Comes as is")
        .await
        .expect("Failed to create listing");
    attach_image(&db, listing.id, "1f3870be274f6c49b3e31a0c6728957f.jpg").await;
    attach_image(&db, listing.id, "8277e0910d750195b448797616e091ad.jpg").await;
    create_test_comment(&db, listing.id, "guest", "Is it still available?")
        .await
        .expect("Failed to create comment");

    let filenames = delete_listing(&db, listing.clone())
        .await
        .expect("Delete failed");

    assert_eq!(filenames.len(), 2, "Both stored files should be reported");
    assert!(filenames.contains(&"1f3870be274f6c49b3e31a0c6728957f.jpg".to_string()));

    let remaining = listings::Entity::find_by_id(listing.id)
        .one(&db)
        .await
        .expect("Query failed");
    assert!(remaining.is_none(), "Listing row should be gone");

    let images = additional_images::Entity::find()
        .filter(additional_images::Column::ListingId.eq(listing.id))
        .count(&db)
        .await
        .expect("Query failed");
    assert_eq!(images, 0, "Image records should be gone");

    let comments = comments::Entity::find()
        .filter(comments::Column::ListingId.eq(listing.id))
        .count(&db)
        .await
        .expect("Query failed");
    assert_eq!(comments, 0, "Comments should be gone");

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_delete_listing_reports_main_image_too() {
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

    let listing = create_test_listing(&db, sub.id, user.id, "Lamp", "Warm light")
        .await
        .expect("Failed to create listing");
    let mut active: listings::ActiveModel = listing.into();
    active.image = Set(Some("9d5ed678fe57bcca610140957afab571.jpg".to_string()));
    let listing = active.update(&db).await.expect("Failed to set main image");

    let filenames = delete_listing(&db, listing)
        .await
        .expect("Delete failed");

    assert_eq!(filenames, vec!["9d5ed678fe57bcca610140957afab571.jpg".to_string()]);

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_insert_listing_with_two_images() {
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

    let fields = ListingFields {
        sub_category_id: sub.id,
        title: "Garden bench".to_string(),
        content: "Weathered but solid".to_string(),
        price: 40.0,
        contacts: "555-0100".to_string(),
    };
    let extra = vec![
        "1f3870be274f6c49b3e31a0c6728957f.jpg".to_string(),
        "8277e0910d750195b448797616e091ad.jpg".to_string(),
    ];

    let listing_id = insert_listing(&db, user.id, &fields, None, &extra)
        .await
        .expect("Insert failed");

    let listing = listings::Entity::find_by_id(listing_id)
        .one(&db)
        .await
        .expect("Query failed")
        .expect("Listing row should exist");
    assert_eq!(listing.user_id, user.id, "Listing belongs to its author");
    assert_eq!(listing.title, "Garden bench");
    assert!(listing.is_active);

    let images = additional_images::Entity::find()
        .filter(additional_images::Column::ListingId.eq(listing_id))
        .all(&db)
        .await
        .expect("Query failed");
    assert_eq!(images.len(), 2, "Both image records relate to the listing");
    assert!(images.iter().any(|i| i.image == extra[0]));
    assert!(images.iter().any(|i| i.image == extra[1]));

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_delete_listing_keeps_files_shared_with_other_listings() {
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

    // Identical uploads share one content-addressed file.
    let shared = "1f3870be274f6c49b3e31a0c6728957f.jpg";

    let doomed = create_test_listing(&db, sub.id, user.id, "Doomed", "Going away")
        .await
        .expect("Failed to create listing");
    attach_image(&db, doomed.id, shared).await;

    let kept = create_test_listing(&db, sub.id, user.id, "Kept", "Staying put")
        .await
        .expect("Failed to create listing");
    attach_image(&db, kept.id, shared).await;

    let filenames = delete_listing(&db, doomed).await.expect("Delete failed");
    assert!(
        filenames.is_empty(),
        "A file another listing still references must not be reported for deletion"
    );

    let remaining = additional_images::Entity::find()
        .filter(additional_images::Column::ListingId.eq(kept.id))
        .count(&db)
        .await
        .expect("Query failed");
    assert_eq!(remaining, 1, "The surviving listing keeps its image record");

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_delete_listing_leaves_other_listings_alone() {
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

    let doomed = create_test_listing(&db, sub.id, user.id, "Doomed", "Going away")
        .await
        .expect("Failed to create listing");
    let kept = create_test_listing(&db, sub.id, user.id, "Kept", "Staying put")
        .await
        .expect("Failed to create listing");
    create_test_comment(&db, kept.id, "guest", "Nice!")
        .await
        .expect("Failed to create comment");

    delete_listing(&db, doomed).await.expect("Delete failed");

    let kept_comments = active_comments(&db, kept.id).await.expect("Query failed");
    assert_eq!(kept_comments.len(), 1, "Unrelated comments must survive");

    let kept_row = listings::Entity::find_by_id(kept.id)
        .one(&db)
        .await
        .expect("Query failed");
    assert!(kept_row.is_some(), "Unrelated listing must survive");

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}
