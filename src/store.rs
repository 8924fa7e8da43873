//! Reading and writing the persisted vector index.
//!
//! [`write_index`] publishes a complete index atomically: it fills
//! `index.sqlite.tmp`, closes it, and renames it over `index.sqlite`.
//! Readers therefore see either the previous index or the new one, never
//! a half-written file.
//!
//! Read failures are reported as [`RetrievalError`]s so the retriever can
//! decide whether to degrade.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use ecoscribe_core::embedding::{blob_to_vec, vec_to_blob};
use ecoscribe_core::error::RetrievalError;
use ecoscribe_core::index::{IndexMeta, IndexedChunk, VectorIndex};
use ecoscribe_core::models::Chunk;

use crate::db::{self, SCHEMA_VERSION};

/// One corpus file as recorded in the index.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRecord {
    pub source_id: String,
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
    pub char_count: usize,
    pub chunk_count: usize,
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Persist a complete index to `path`, replacing any existing file.
pub async fn write_index(
    path: &Path,
    meta: &IndexMeta,
    sources: &[SourceRecord],
    entries: &[IndexedChunk],
) -> Result<()> {
    let tmp = tmp_path(path);
    let pool = db::create(&tmp)
        .await
        .with_context(|| format!("Failed to create {}", tmp.display()))?;

    let written = insert_all(&pool, meta, sources, entries).await;
    pool.close().await;

    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }

    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to publish index at {}", path.display()))?;

    tracing::debug!(path = %path.display(), chunks = entries.len(), "index published");
    Ok(())
}

async fn insert_all(
    pool: &SqlitePool,
    meta: &IndexMeta,
    sources: &[SourceRecord],
    entries: &[IndexedChunk],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO index_meta (id, schema_version, build_id, model, dims, chunk_size,
                                chunk_overlap, built_at, source_count, chunk_count)
        VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(SCHEMA_VERSION)
    .bind(&meta.build_id)
    .bind(&meta.model)
    .bind(meta.dims as i64)
    .bind(meta.chunk_size as i64)
    .bind(meta.chunk_overlap as i64)
    .bind(meta.built_at.timestamp())
    .bind(meta.source_count as i64)
    .bind(meta.chunk_count as i64)
    .execute(&mut *tx)
    .await?;

    for source in sources {
        sqlx::query(
            "INSERT INTO sources (source_id, path, modified_at, char_count, chunk_count) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&source.source_id)
        .bind(source.path.to_string_lossy().into_owned())
        .bind(source.modified_at.timestamp())
        .bind(source.char_count as i64)
        .bind(source.chunk_count as i64)
        .execute(&mut *tx)
        .await?;
    }

    for entry in entries {
        let chunk = &entry.chunk;
        sqlx::query(
            r#"
            INSERT INTO chunks (id, source_id, chunk_index, text, start, char_len, hash, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.source_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(chunk.start as i64)
        .bind(chunk.char_len as i64)
        .bind(&chunk.hash)
        .bind(vec_to_blob(&entry.embedding))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn open(path: &Path) -> Result<SqlitePool, RetrievalError> {
    if !path.is_file() {
        return Err(RetrievalError::MissingIndex(path.to_path_buf()));
    }
    db::open_read_only(path)
        .await
        .map_err(|e| RetrievalError::Corrupt(format!("cannot open {}: {}", path.display(), e)))
}

fn corrupt(e: sqlx::Error) -> RetrievalError {
    RetrievalError::Corrupt(e.to_string())
}

fn to_usize(v: i64, field: &str) -> Result<usize, RetrievalError> {
    usize::try_from(v).map_err(|_| RetrievalError::Corrupt(format!("negative {}: {}", field, v)))
}

fn from_timestamp(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

async fn fetch_meta(pool: &SqlitePool) -> Result<IndexMeta, RetrievalError> {
    let row = sqlx::query(
        "SELECT schema_version, build_id, model, dims, chunk_size, chunk_overlap, built_at, \
         source_count, chunk_count FROM index_meta WHERE id = 1",
    )
    .fetch_optional(pool)
    .await
    .map_err(corrupt)?
    .ok_or_else(|| RetrievalError::Corrupt("index_meta row is missing".to_string()))?;

    let version: i64 = row.try_get("schema_version").map_err(corrupt)?;
    if version != SCHEMA_VERSION {
        return Err(RetrievalError::Corrupt(format!(
            "schema version {} is not supported (expected {}); rebuild the index",
            version, SCHEMA_VERSION
        )));
    }

    Ok(IndexMeta {
        build_id: row.try_get("build_id").map_err(corrupt)?,
        model: row.try_get("model").map_err(corrupt)?,
        dims: to_usize(row.try_get("dims").map_err(corrupt)?, "dims")?,
        chunk_size: to_usize(row.try_get("chunk_size").map_err(corrupt)?, "chunk_size")?,
        chunk_overlap: to_usize(row.try_get("chunk_overlap").map_err(corrupt)?, "chunk_overlap")?,
        built_at: from_timestamp(row.try_get("built_at").map_err(corrupt)?),
        source_count: to_usize(row.try_get("source_count").map_err(corrupt)?, "source_count")?,
        chunk_count: to_usize(row.try_get("chunk_count").map_err(corrupt)?, "chunk_count")?,
    })
}

/// Build metadata only; one row read.
pub async fn read_meta(path: &Path) -> Result<IndexMeta, RetrievalError> {
    let pool = open(path).await?;
    let meta = fetch_meta(&pool).await;
    pool.close().await;
    meta
}

/// The recorded corpus files, ordered by `source_id`.
pub async fn read_sources(path: &Path) -> Result<Vec<SourceRecord>, RetrievalError> {
    let pool = open(path).await?;
    let rows = sqlx::query(
        "SELECT source_id, path, modified_at, char_count, chunk_count FROM sources \
         ORDER BY source_id",
    )
    .fetch_all(&pool)
    .await
    .map_err(corrupt);
    pool.close().await;

    rows?
        .iter()
        .map(|row| {
            let path: String = row.try_get("path").map_err(corrupt)?;
            Ok(SourceRecord {
                source_id: row.try_get("source_id").map_err(corrupt)?,
                path: PathBuf::from(path),
                modified_at: from_timestamp(row.try_get("modified_at").map_err(corrupt)?),
                char_count: to_usize(row.try_get("char_count").map_err(corrupt)?, "char_count")?,
                chunk_count: to_usize(row.try_get("chunk_count").map_err(corrupt)?, "chunk_count")?,
            })
        })
        .collect()
}

/// Load the whole index into memory.
pub async fn load_index(path: &Path) -> Result<VectorIndex, RetrievalError> {
    let pool = open(path).await?;
    let loaded = load_from(&pool).await;
    pool.close().await;
    loaded
}

async fn load_from(pool: &SqlitePool) -> Result<VectorIndex, RetrievalError> {
    let meta = fetch_meta(pool).await?;

    let rows = sqlx::query(
        "SELECT id, source_id, chunk_index, text, start, char_len, hash, embedding \
         FROM chunks ORDER BY source_id, chunk_index",
    )
    .fetch_all(pool)
    .await
    .map_err(corrupt)?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        let blob: Vec<u8> = row.try_get("embedding").map_err(corrupt)?;
        entries.push(IndexedChunk {
            chunk: Chunk {
                id: row.try_get("id").map_err(corrupt)?,
                source_id: row.try_get("source_id").map_err(corrupt)?,
                chunk_index: row.try_get("chunk_index").map_err(corrupt)?,
                text: row.try_get("text").map_err(corrupt)?,
                start: to_usize(row.try_get("start").map_err(corrupt)?, "start")?,
                char_len: to_usize(row.try_get("char_len").map_err(corrupt)?, "char_len")?,
                hash: row.try_get("hash").map_err(corrupt)?,
            },
            embedding: blob_to_vec(&blob),
        });
    }

    if entries.len() != meta.chunk_count {
        return Err(RetrievalError::Corrupt(format!(
            "index_meta declares {} chunks but {} are stored",
            meta.chunk_count,
            entries.len()
        )));
    }

    VectorIndex::new(meta, entries)
}
