//! Offline index builder.
//!
//! Scans the corpus, splits every document into overlapping chunks,
//! embeds them in batches, and publishes a fresh index file:
//!
//! ```text
//! corpus/*.txt ─▶ scan ─▶ split ─▶ embed (batch_size) ─▶ index.sqlite.tmp ─▶ rename
//! ```
//!
//! A build either publishes a complete index or leaves the previous one
//! untouched. A missing corpus, or one with no usable files, fails the
//! build instead of producing an empty index.
//!
//! Concurrent builds against the same index directory are rejected via an
//! exclusive lock file. A lock left by a killed build is reclaimed once its
//! recorded PID is no longer running.

use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

use ecoscribe_core::chunk::{chunk_document, TextSplitter};
use ecoscribe_core::embedding::Embedder;
use ecoscribe_core::error::{RestoreError, Result};
use ecoscribe_core::index::{IndexMeta, IndexedChunk};
use ecoscribe_core::models::Chunk;

use crate::config::Config;
use crate::corpus::{scan_corpus, SkippedFile};
use crate::store::{self, SourceRecord};

pub const LOCK_FILE: &str = ".build.lock";

/// Summary of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub build_id: String,
    pub documents: usize,
    pub chunks: usize,
    pub skipped: Vec<SkippedFile>,
    pub model: String,
    pub dims: usize,
    pub path: PathBuf,
    pub elapsed: Duration,
}

/// Exclusive build lock, released on drop.
///
/// The lock file records the holder's PID. A lock whose holder is no longer
/// running (the build was killed before it could clean up) is reclaimed.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
    file: File,
}

impl BuildLock {
    pub fn acquire(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir).map_err(|e| {
            RestoreError::BuildFailure(format!(
                "cannot create index directory {}: {}",
                index_dir.display(),
                e
            ))
        })?;

        let path = index_dir.join(LOCK_FILE);
        match Self::create(&path) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let Some(pid) = stale_holder(&path) else {
                    return Err(lock_error(&path, e));
                };
                tracing::warn!(pid, path = %path.display(), "reclaiming build lock of a dead process");
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(lock_error(&path, e)),
                }
                Self::create(&path).map_err(|e| lock_error(&path, e))
            }
            other => other.map_err(|e| lock_error(&path, e)),
        }
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let mut lock = Self {
            path: path.to_path_buf(),
            file,
        };
        writeln!(lock.file, "{}", std::process::id())?;
        Ok(lock)
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release build lock");
        }
    }
}

fn lock_error(path: &Path, e: std::io::Error) -> RestoreError {
    if e.kind() == ErrorKind::AlreadyExists {
        RestoreError::BuildFailure(format!(
            "another build holds the lock ({}); if no build is running, delete that file",
            path.display()
        ))
    } else {
        RestoreError::BuildFailure(format!("cannot create lock file {}: {}", path.display(), e))
    }
}

/// PID recorded in the lock at `path`, if that process is gone.
fn stale_holder(path: &Path) -> Option<u32> {
    let pid: u32 = std::fs::read_to_string(path).ok()?.trim().parse().ok()?;
    (!process_alive(pid)).then_some(pid)
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 is never delivered; kill only checks the target exists.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    // EPERM: the process exists but belongs to another user.
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Build the index described by `config` with `embedder`, replacing any
/// existing index on success.
pub async fn build_index(config: &Config, embedder: &dyn Embedder) -> Result<BuildReport> {
    let started = Instant::now();
    let splitter = TextSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;

    if embedder.dims() == 0 {
        return Err(RestoreError::BuildFailure(format!(
            "embedding provider '{}' cannot build an index; configure [embedding]",
            embedder.model_name()
        )));
    }

    let _lock = BuildLock::acquire(&config.index.path)?;

    let scan = scan_corpus(&config.index).map_err(|e| RestoreError::BuildFailure(format!("{:#}", e)))?;
    if scan.documents.is_empty() {
        return Err(RestoreError::BuildFailure(format!(
            "no non-empty files matching {:?} in {}",
            config.index.include_globs,
            config.index.corpus.display()
        )));
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    let mut sources = Vec::with_capacity(scan.documents.len());
    for doc in &scan.documents {
        let doc_chunks = chunk_document(&doc.source_id, &doc.body, &splitter);
        tracing::debug!(source = %doc.source_id, chunks = doc_chunks.len(), "chunked document");
        sources.push(SourceRecord {
            source_id: doc.source_id.clone(),
            path: doc.path.clone(),
            modified_at: doc.modified_at,
            char_count: doc.body.chars().count(),
            chunk_count: doc_chunks.len(),
        });
        chunks.extend(doc_chunks);
    }

    let entries = embed_chunks(embedder, chunks, config.embedding.batch_size).await?;

    let meta = IndexMeta {
        build_id: Uuid::new_v4().to_string(),
        model: embedder.model_name().to_string(),
        dims: embedder.dims(),
        chunk_size: splitter.chunk_size(),
        chunk_overlap: splitter.chunk_overlap(),
        built_at: Utc::now(),
        source_count: sources.len(),
        chunk_count: entries.len(),
    };

    let path = config.index_file();
    store::write_index(&path, &meta, &sources, &entries)
        .await
        .map_err(|e| RestoreError::BuildFailure(format!("{:#}", e)))?;

    tracing::info!(
        build_id = %meta.build_id,
        documents = meta.source_count,
        chunks = meta.chunk_count,
        model = %meta.model,
        "index built"
    );

    Ok(BuildReport {
        build_id: meta.build_id,
        documents: meta.source_count,
        chunks: meta.chunk_count,
        skipped: scan.skipped,
        model: meta.model,
        dims: meta.dims,
        path,
        elapsed: started.elapsed(),
    })
}

async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: Vec<Chunk>,
    batch_size: usize,
) -> Result<Vec<IndexedChunk>> {
    let dims = embedder.dims();
    let mut entries = Vec::with_capacity(chunks.len());
    let total = chunks.len();

    for (n, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await.map_err(|e| {
            RestoreError::BuildFailure(format!("embedding batch {} failed: {:#}", n, e))
        })?;

        if vectors.len() != batch.len() {
            return Err(RestoreError::BuildFailure(format!(
                "embedding provider returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            )));
        }

        for (chunk, embedding) in batch.iter().zip(vectors) {
            if embedding.len() != dims {
                return Err(RestoreError::BuildFailure(format!(
                    "embedding for chunk {} has {} dims, provider declares {}",
                    chunk.id,
                    embedding.len(),
                    dims
                )));
            }
            entries.push(IndexedChunk {
                chunk: chunk.clone(),
                embedding,
            });
        }

        tracing::debug!(embedded = entries.len(), total, "embedding progress");
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use std::fs;
    use tempfile::TempDir;

    fn config(root: &Path) -> Config {
        let mut config = Config::default();
        config.index.corpus = root.join("knowledge");
        config.index.path = root.join("db");
        config
    }

    #[tokio::test]
    async fn test_build_writes_index() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path());
        fs::create_dir_all(&config.index.corpus).unwrap();
        fs::write(
            config.index.corpus.join("history.txt"),
            "The Anglo-Frisian settlers spoke early Old English dialects.",
        )
        .unwrap();

        let embedder = HashEmbedder::new(32).unwrap();
        let report = build_index(&config, &embedder).await.unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.chunks, 1);
        assert_eq!(report.dims, 32);
        assert!(config.index_file().is_file());
        assert!(!config.index.path.join(LOCK_FILE).exists());

        let meta = store::read_meta(&config.index_file()).await.unwrap();
        assert_eq!((meta.chunk_size, meta.chunk_overlap), (500, 100));
    }

    #[tokio::test]
    async fn test_empty_corpus_fails_without_index() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path());
        fs::create_dir_all(&config.index.corpus).unwrap();
        fs::write(config.index.corpus.join("blank.txt"), "   ").unwrap();

        let err = build_index(&config, &HashEmbedder::new(8).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RestoreError::BuildFailure(_)));
        assert!(!config.index_file().exists());
    }

    #[tokio::test]
    async fn test_missing_corpus_fails() {
        let tmp = TempDir::new().unwrap();
        let err = build_index(&config(tmp.path()), &HashEmbedder::new(8).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RestoreError::BuildFailure(_)));
    }

    #[test]
    fn test_live_lock_names_path_and_remedy() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join(LOCK_FILE);
        fs::write(&lock_path, format!("{}\n", std::process::id())).unwrap();

        match BuildLock::acquire(tmp.path()) {
            Err(RestoreError::BuildFailure(msg)) => {
                assert!(msg.contains(&lock_path.display().to_string()), "{}", msg);
                assert!(msg.contains("delete that file"), "{}", msg);
            }
            other => panic!("expected lock failure, got {:?}", other),
        }
        assert!(lock_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stale_lock_is_reclaimed() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path());
        fs::create_dir_all(&config.index.corpus).unwrap();
        fs::write(config.index.corpus.join("history.txt"), "Mercian charters.").unwrap();
        fs::create_dir_all(&config.index.path).unwrap();
        let lock_path = config.index.path.join(LOCK_FILE);
        // Above the kernel's pid_max, so never a running process.
        fs::write(&lock_path, "4294967\n").unwrap();

        let embedder = HashEmbedder::new(8).unwrap();
        build_index(&config, &embedder).await.unwrap();
        assert!(!lock_path.exists());
        build_index(&config, &embedder).await.unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_reclaimed_lock_records_own_pid() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join(LOCK_FILE);
        fs::write(&lock_path, "4294967").unwrap();

        let lock = BuildLock::acquire(tmp.path()).unwrap();
        let recorded = fs::read_to_string(&lock_path).unwrap();
        assert_eq!(recorded.trim(), std::process::id().to_string());
        drop(lock);
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_lock_is_exclusive() {
        let tmp = TempDir::new().unwrap();
        let first = BuildLock::acquire(tmp.path()).unwrap();
        let second = BuildLock::acquire(tmp.path());
        match second {
            Err(RestoreError::BuildFailure(msg)) => assert!(msg.contains("another build")),
            other => panic!("expected lock failure, got {:?}", other),
        }
        drop(first);
        assert!(BuildLock::acquire(tmp.path()).is_ok());
    }
}
