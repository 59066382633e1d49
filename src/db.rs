//! Global database pool.

use once_cell::sync::OnceCell;
use sea_orm::{Database, DatabaseConnection};

static DB_POOL: OnceCell<DatabaseConnection> = OnceCell::new();

/// Connect to the database and store the pool globally.
/// Subsequent calls are no-ops so tests may call this freely.
pub async fn init_db(database_url: String) {
    if DB_POOL.get().is_some() {
        return;
    }

    let pool = Database::connect(&database_url)
        .await
        .expect("Failed to connect to database.");
    let _ = DB_POOL.set(pool);
}

pub fn get_db_pool() -> &'static DatabaseConnection {
    DB_POOL.get().expect("init_db() has not been called")
}
