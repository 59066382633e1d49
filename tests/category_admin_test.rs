/// Integration tests for category management name uniqueness

mod common;
use serial_test::serial;

use common::*;
use bboard::orm::{sub_categories, super_categories};
use bboard::web::admin::{create_sub_category, create_super_category};
use sea_orm::{entity::*, query::*};

#[actix_rt::test]
#[serial]
async fn test_super_category_name_must_be_unique() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let created = create_super_category(&db, "Electronics", 0)
        .await
        .expect("Insert failed");
    assert!(created.is_some());

    let duplicate = create_super_category(&db, "Electronics", 5)
        .await
        .expect("Insert failed");
    assert!(duplicate.is_none(), "A taken name must be refused");

    let count = super_categories::Entity::find()
        .filter(super_categories::Column::Name.eq("Electronics"))
        .count(&db)
        .await
        .expect("Query failed");
    assert_eq!(count, 1, "Only one row may carry the name");

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_sub_category_name_unique_within_parent() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let electronics = create_super_category(&db, "Electronics", 0)
        .await
        .expect("Insert failed")
        .expect("Name was free");
    let vehicles = create_super_category(&db, "Vehicles", 1)
        .await
        .expect("Insert failed")
        .expect("Name was free");

    let created = create_sub_category(&db, electronics.id, "Accessories", 0)
        .await
        .expect("Insert failed");
    assert!(created.is_some());

    let duplicate = create_sub_category(&db, electronics.id, "Accessories", 1)
        .await
        .expect("Insert failed");
    assert!(duplicate.is_none(), "Same name under the same parent is refused");

    // The same name under another parent is a different category.
    let elsewhere = create_sub_category(&db, vehicles.id, "Accessories", 0)
        .await
        .expect("Insert failed");
    assert!(elsewhere.is_some());

    let count = sub_categories::Entity::find()
        .filter(sub_categories::Column::Name.eq("Accessories"))
        .count(&db)
        .await
        .expect("Query failed");
    assert_eq!(count, 2);

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}
