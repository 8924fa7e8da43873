//! Reference corpus scanning.
//!
//! Walks `[index] corpus`, keeps files matching `include_globs` and not
//! matching `exclude_globs`, and loads each as one [`SourceDocument`].
//! Only the top level is scanned unless `recursive = true`.
//!
//! Files that cannot be read as UTF-8, or that are blank, are skipped and
//! reported rather than failing the scan.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::Path;
use walkdir::WalkDir;

use ecoscribe_core::models::SourceDocument;

use crate::config::IndexConfig;

/// A matching file that was not loaded.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub source_id: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct CorpusScan {
    /// Loaded documents, sorted by `source_id`.
    pub documents: Vec<SourceDocument>,
    pub skipped: Vec<SkippedFile>,
}

pub fn scan_corpus(config: &IndexConfig) -> Result<CorpusScan> {
    let root = &config.corpus;
    if !root.is_dir() {
        bail!("corpus directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    default_excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&default_excludes)?;

    let mut walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    if !config.recursive {
        walker = walker.max_depth(1);
    }

    let mut scan = CorpusScan::default();

    for entry in walker {
        let entry =
            entry.with_context(|| format!("failed to read corpus directory {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match load_document(path, &rel_str) {
            Ok(doc) if doc.body.trim().is_empty() => {
                tracing::warn!(source = %rel_str, "skipping empty corpus file");
                scan.skipped.push(SkippedFile {
                    source_id: rel_str,
                    reason: "empty".to_string(),
                });
            }
            Ok(doc) => scan.documents.push(doc),
            Err(e) => {
                tracing::warn!(source = %rel_str, error = %e, "skipping unreadable corpus file");
                scan.skipped.push(SkippedFile {
                    source_id: rel_str,
                    reason: e.to_string(),
                });
            }
        }
    }

    // Sort for deterministic ordering
    scan.documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    scan.skipped.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    tracing::debug!(
        root = %root.display(),
        documents = scan.documents.len(),
        skipped = scan.skipped.len(),
        "scanned corpus"
    );
    Ok(scan)
}

fn load_document(path: &Path, relative_path: &str) -> Result<SourceDocument> {
    let metadata = std::fs::metadata(path)?;
    let modified_at = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_default();

    let bytes = std::fs::read(path)?;
    let body = String::from_utf8(bytes).map_err(|_| anyhow::anyhow!("not valid UTF-8"))?;

    Ok(SourceDocument {
        source_id: relative_path.to_string(),
        path: path.to_path_buf(),
        body,
        modified_at,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("invalid glob '{}'", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(root: &Path) -> IndexConfig {
        IndexConfig {
            corpus: root.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_scans_top_level_txt_only() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b.txt"), "Wessex").unwrap();
        fs::write(tmp.path().join("a.txt"), "Mercia").unwrap();
        fs::write(tmp.path().join("notes.md"), "ignored").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("c.txt"), "Kent").unwrap();

        let scan = scan_corpus(&config(tmp.path())).unwrap();
        let ids: Vec<_> = scan.documents.iter().map(|d| d.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt", "b.txt"]);
        assert_eq!(scan.documents[0].body, "Mercia");
    }

    #[test]
    fn test_recursive_scan() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "Mercia").unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub").join("c.txt"), "Kent").unwrap();

        let mut cfg = config(tmp.path());
        cfg.recursive = true;
        let scan = scan_corpus(&cfg).unwrap();
        let ids: Vec<_> = scan.documents.iter().map(|d| d.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt", "sub/c.txt"]);
    }

    #[test]
    fn test_skips_empty_and_non_utf8() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("blank.txt"), "  \n\n ").unwrap();
        fs::write(tmp.path().join("binary.txt"), [0xff, 0xfe, 0x00, 0x81]).unwrap();
        fs::write(tmp.path().join("ok.txt"), "Northumbria").unwrap();

        let scan = scan_corpus(&config(tmp.path())).unwrap();
        assert_eq!(scan.documents.len(), 1);
        let skipped: Vec<_> = scan.skipped.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(skipped, vec!["binary.txt", "blank.txt"]);
    }

    #[test]
    fn test_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(scan_corpus(&config(&tmp.path().join("nope"))).is_err());
    }

    #[test]
    fn test_exclude_globs() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("keep.txt"), "x").unwrap();
        fs::write(tmp.path().join("draft.txt"), "y").unwrap();
        fs::write(tmp.path().join(".hidden.txt"), "z").unwrap();

        let mut cfg = config(tmp.path());
        cfg.exclude_globs = vec!["draft*".to_string()];
        let scan = scan_corpus(&cfg).unwrap();
        assert_eq!(scan.documents.len(), 1);
        assert_eq!(scan.documents[0].source_id, "keep.txt");
    }
}
