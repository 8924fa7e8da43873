//! SQLite connections and schema for the persisted index.
//!
//! An index is a single SQLite file with three tables:
//!
//! | Table | Contents |
//! |-------|----------|
//! | `index_meta` | exactly one row: build id, model, dims, chunking params, counts |
//! | `sources` | one row per corpus file |
//! | `chunks` | chunk text, offsets, hash, and the embedding as a little-endian f32 BLOB |
//!
//! Writers build a fresh file and never modify a published one, so
//! readers open it read-only.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Bumped when the table layout changes; older files are reported as corrupt.
pub const SCHEMA_VERSION: i64 = 1;

/// Open a new index file for writing. Any existing file at `path` is
/// removed first.
pub async fn create(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    // Rollback journal, not WAL: the file is renamed after the pool closes
    // and must be self-contained.
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Open a published index file read-only.
pub async fn open_read_only(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?;

    Ok(pool)
}

async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL,
            build_id TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            chunk_size INTEGER NOT NULL,
            chunk_overlap INTEGER NOT NULL,
            built_at INTEGER NOT NULL,
            source_count INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            source_id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            modified_at INTEGER NOT NULL,
            char_count INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            start INTEGER NOT NULL,
            char_len INTEGER NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(source_id, chunk_index),
            FOREIGN KEY (source_id) REFERENCES sources(source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
