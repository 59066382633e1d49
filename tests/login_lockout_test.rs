/// Integration tests for login, the failed-attempt lockout policy, and
/// login sessions

mod common;
use serial_test::serial;

use common::*;
use bboard::web::login::{login, LoginResult};

#[actix_rt::test]
#[serial]
async fn test_login_success_and_bad_password() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let user = create_test_user(&db, "alice", "correct horse")
        .await
        .expect("Failed to create test user");

    let ok = login("alice", "correct horse").await.expect("Login failed");
    assert_eq!(ok, LoginResult::Success(user.id));

    let bad = login("alice", "wrong").await.expect("Login failed");
    assert_eq!(bad, LoginResult::BadCredentials);

    let missing = login("bob", "whatever").await.expect("Login failed");
    assert_eq!(missing, LoginResult::BadCredentials);

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_unactivated_account_cannot_sign_in() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    create_inactive_user(&db, "pending", "password123")
        .await
        .expect("Failed to create test user");

    // Right password, but the activation link was never followed.
    let result = login("pending", "password123").await.expect("Login failed");
    assert_eq!(result, LoginResult::NotActivated);

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_repeated_failures_lock_the_account() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let user = create_test_user(&db, "alice", "correct horse")
        .await
        .expect("Failed to create test user");

    // Default policy locks after five failures.
    for attempt in 1..=5 {
        let result = login("alice", "wrong").await.expect("Login failed");
        assert_eq!(result, LoginResult::BadCredentials, "attempt {}", attempt);
    }

    let attempts = get_failed_attempts(&db, user.id)
        .await
        .expect("Query failed");
    assert_eq!(attempts, 5);
    assert!(is_user_locked(&db, user.id).await.expect("Query failed"));

    // Even the right password is refused while locked.
    let result = login("alice", "correct horse").await.expect("Login failed");
    assert_eq!(result, LoginResult::AccountLocked);

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_successful_login_resets_failure_count() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let user = create_test_user(&db, "alice", "correct horse")
        .await
        .expect("Failed to create test user");

    for _ in 0..3 {
        login("alice", "wrong").await.expect("Login failed");
    }
    assert_eq!(
        get_failed_attempts(&db, user.id).await.expect("Query failed"),
        3
    );

    let result = login("alice", "correct horse").await.expect("Login failed");
    assert_eq!(result, LoginResult::Success(user.id));

    assert_eq!(
        get_failed_attempts(&db, user.id).await.expect("Query failed"),
        0,
        "Counter resets on success"
    );

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_session_lifecycle() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let user = create_test_user(&db, "alice", "correct horse")
        .await
        .expect("Failed to create test user");

    let token = bboard::session::create_session(&db, user.id)
        .await
        .expect("Failed to create session");

    use bboard::orm::sessions;
    use sea_orm::entity::*;

    let row = sessions::Entity::find_by_id(token.to_string())
        .one(&db)
        .await
        .expect("Query failed")
        .expect("Session row should exist");
    assert_eq!(row.user_id, user.id);
    assert!(row.expires_at > row.created_at);

    bboard::session::remove_session(&db, token)
        .await
        .expect("Failed to remove session");

    let row = sessions::Entity::find_by_id(token.to_string())
        .one(&db)
        .await
        .expect("Query failed");
    assert!(row.is_none(), "Signed-out session should be gone");

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}

#[actix_rt::test]
#[serial]
async fn test_invalidate_user_sessions_removes_all() {
    let db = setup_test_database()
        .await
        .expect("Failed to connect to test database");

    cleanup_test_data(&db).await.expect("Failed to cleanup");

    let alice = create_test_user(&db, "alice", "correct horse")
        .await
        .expect("Failed to create test user");
    let bob = create_test_user(&db, "bob", "password123")
        .await
        .expect("Failed to create test user");

    bboard::session::create_session(&db, alice.id)
        .await
        .expect("Failed to create session");
    bboard::session::create_session(&db, alice.id)
        .await
        .expect("Failed to create session");
    let bob_token = bboard::session::create_session(&db, bob.id)
        .await
        .expect("Failed to create session");

    // Password reset kicks alice out everywhere, but not bob.
    bboard::session::invalidate_user_sessions(&db, alice.id)
        .await
        .expect("Failed to invalidate sessions");

    use bboard::orm::sessions;
    use sea_orm::{entity::*, query::*};

    let alice_sessions = sessions::Entity::find()
        .filter(sessions::Column::UserId.eq(alice.id))
        .count(&db)
        .await
        .expect("Query failed");
    assert_eq!(alice_sessions, 0);

    let bob_row = sessions::Entity::find_by_id(bob_token.to_string())
        .one(&db)
        .await
        .expect("Query failed");
    assert!(bob_row.is_some(), "Other users' sessions must survive");

    cleanup_test_data(&db).await.expect("Failed to cleanup");
}
