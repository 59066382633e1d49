/// Integration tests for account activation via signed email links

mod common;
use serial_test::serial;

use common::*;
use bboard::orm::users;
use bboard::web::activation::{activate_user, ActivationOutcome};
use sea_orm::{entity::*, query::*};

#[actix_rt::test]
#[serial]
async fn test_activation_flips_account_flags() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let user = create_inactive_user(&db, "newcomer", "password123")
        .await
        .expect("Failed to create test user");

    let outcome = activate_user(&db, &user.username)
        .await
        .expect("Activation query failed");
    assert_eq!(outcome, ActivationOutcome::Activated);

    let row = users::Entity::find_by_id(user.id)
        .one(&db)
        .await
        .expect("Failed to reload user")
        .expect("User disappeared");
    assert!(row.is_active, "Account should be able to log in");
    assert!(row.is_activated, "Activation flag should be set");

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_activation_is_idempotent() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let user = create_inactive_user(&db, "twice", "password123")
        .await
        .expect("Failed to create test user");

    let first = activate_user(&db, &user.username)
        .await
        .expect("Activation query failed");
    assert_eq!(first, ActivationOutcome::Activated);

    // Following a stale link again must not error or change anything.
    let second = activate_user(&db, &user.username)
        .await
        .expect("Activation query failed");
    assert_eq!(second, ActivationOutcome::AlreadyActive);

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_activation_unknown_user() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let outcome = activate_user(&db, "nobody")
        .await
        .expect("Activation query failed");
    assert_eq!(outcome, ActivationOutcome::UnknownUser);

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_signed_link_round_trip_activates() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let user = create_inactive_user(&db, "linked", "password123")
        .await
        .expect("Failed to create test user");

    // What registration puts into the email, and what the activation
    // endpoint does with the path segment.
    let token = bboard::signer::sign(&user.username);
    let username = bboard::signer::unsign(&token).expect("Signature should verify");
    assert_eq!(username, user.username);

    let outcome = activate_user(&db, &username)
        .await
        .expect("Activation query failed");
    assert_eq!(outcome, ActivationOutcome::Activated);

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_forged_link_does_not_verify() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let user = create_inactive_user(&db, "victim", "password123")
        .await
        .expect("Failed to create test user");

    // A token for another name must not activate this account.
    let token = bboard::signer::sign("attacker");
    let forged = token.replacen("attacker", "victim", 1);
    assert!(bboard::signer::unsign(&forged).is_err());

    let row = users::Entity::find()
        .filter(users::Column::Username.eq("victim"))
        .one(&db)
        .await
        .expect("Failed to reload user")
        .expect("User disappeared");
    assert!(!row.is_activated, "Account {} must stay unactivated", user.id);

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}
