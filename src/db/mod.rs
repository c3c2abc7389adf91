//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for coaches, sessions and client records.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS coaches (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            coach_id TEXT NOT NULL REFERENCES coaches(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // seq follows commit order: writers are serialized, and AUTOINCREMENT never
    // reuses a value. created_at uses a fixed-width RFC 3339 form so text
    // comparison orders correctly.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clients (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            coach_id TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            status TEXT NOT NULL,
            goal TEXT,
            program TEXT,
            initials TEXT NOT NULL,
            bg_color TEXT NOT NULL,
            text_color TEXT NOT NULL,
            sessions_completed INTEGER NOT NULL DEFAULT 0,
            sessions_total INTEGER NOT NULL DEFAULT 0,
            completion INTEGER NOT NULL DEFAULT 0,
            last_workout TEXT,
            metrics TEXT,
            user_id TEXT,
            invite_code TEXT,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_clients_coach_created ON clients(coach_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_clients_coach_seq ON clients(coach_id, seq);
        CREATE INDEX IF NOT EXISTS idx_sessions_coach ON sessions(coach_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
