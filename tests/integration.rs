//! CLI tests. They drive the built `ecoscribe` binary with the offline
//! `hash` embedder and `--print-prompt`, so no network or API keys are
//! needed.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

const HISTORY: &str = "The Anglo-Frisian settlers spoke early Old English dialects.";
const DAMAGED: &str = "The [MASK] settlers spoke early Old English [MASK].";
const SENTINEL: &str =
    "Context retrieval failed due to missing vector DB. Proceeding without external context.";

fn ecoscribe_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ecoscribe"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let knowledge = root.join("knowledge");
    fs::create_dir_all(&knowledge).unwrap();
    fs::write(knowledge.join("history.txt"), HISTORY).unwrap();
    fs::write(
        knowledge.join("dialects.txt"),
        "Mercian dialects were spoken in the Midlands.\n\nWest Saxon became the literary standard.",
    )
    .unwrap();
    fs::write(knowledge.join("notes.md"), "Not part of the corpus.").unwrap();

    fs::write(root.join("damaged.txt"), DAMAGED).unwrap();

    let config_content = format!(
        r#"[index]
path = "{root}/rag_vector_db"
corpus = "{root}/knowledge"

[embedding]
provider = "hash"
dims = 256

[generation]
provider = "disabled"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("ecoscribe.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ecoscribe(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ecoscribe_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ecoscribe binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_index_build_and_stats() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ecoscribe(&config_path, &["index", "build"]);
    assert!(success, "build failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents: 2"));
    assert!(stdout.contains("model: feature-hash (256 dims)"));
    assert!(stdout.contains("ok"));

    let (stdout, stderr, success) = run_ecoscribe(&config_path, &["index", "stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("history.txt"));
    assert!(stdout.contains("dialects.txt"));
    assert!(!stdout.contains("notes.md"));
}

#[test]
fn test_retrieve_after_build() {
    let (_tmp, config_path) = setup_test_env();
    run_ecoscribe(&config_path, &["index", "build"]);

    let (stdout, stderr, success) =
        run_ecoscribe(&config_path, &["retrieve", "Anglo-Frisian settlers", "--k", "1"]);
    assert!(success, "retrieve failed: {}", stderr);
    assert!(stdout.contains(HISTORY));
    assert!(stdout.contains("history.txt#0"));
}

#[test]
fn test_retrieve_without_index_prints_sentinel() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _stderr, success) = run_ecoscribe(&config_path, &["retrieve", "Mercian"]);
    assert!(success);
    assert_eq!(stdout.trim(), SENTINEL);
}

#[test]
fn test_retrieve_rejects_zero_k() {
    let (_tmp, config_path) = setup_test_env();
    run_ecoscribe(&config_path, &["index", "build"]);

    let (stdout, stderr, success) =
        run_ecoscribe(&config_path, &["retrieve", "Anglo-Frisian settlers", "--k", "0"]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("at least 1"), "stderr: {}", stderr);
}

#[test]
fn test_restore_rag_prompt_embeds_context_and_text() {
    let (tmp, config_path) = setup_test_env();
    run_ecoscribe(&config_path, &["index", "build"]);
    let damaged = tmp.path().join("damaged.txt");

    let (stdout, stderr, success) = run_ecoscribe(
        &config_path,
        &[
            "restore",
            damaged.to_str().unwrap(),
            "--mode",
            "rag",
            "--style",
            "academic",
            "--print-prompt",
        ],
    );
    assert!(success, "restore failed: {}", stderr);
    assert!(stdout.contains(DAMAGED));
    assert!(stdout.contains(HISTORY));
    assert!(stdout.contains("restoring academic style texts"));
    assert!(!stderr.contains(SENTINEL));
}

#[test]
fn test_restore_rag_without_index_uses_plain_prompt() {
    let (tmp, config_path) = setup_test_env();
    let damaged = tmp.path().join("damaged.txt");

    let (stdout, stderr, success) = run_ecoscribe(
        &config_path,
        &[
            "restore",
            damaged.to_str().unwrap(),
            "--mode",
            "rag",
            "--print-prompt",
        ],
    );
    assert!(success, "restore failed: {}", stderr);
    assert!(stderr.contains(SENTINEL));
    assert!(stdout.contains("expert document restoration assistant"));
    assert!(stdout.contains(DAMAGED));
}

#[test]
fn test_restore_without_generator_fails() {
    let (tmp, config_path) = setup_test_env();
    let damaged = tmp.path().join("damaged.txt");

    let (_stdout, stderr, success) =
        run_ecoscribe(&config_path, &["restore", damaged.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("disabled"));
}

#[test]
fn test_restore_rejects_unknown_style() {
    let (tmp, config_path) = setup_test_env();
    let damaged = tmp.path().join("damaged.txt");

    let (_stdout, _stderr, success) = run_ecoscribe(
        &config_path,
        &[
            "restore",
            damaged.to_str().unwrap(),
            "--style",
            "poetic",
            "--print-prompt",
        ],
    );
    assert!(!success);
}

#[test]
fn test_damage_is_reproducible_with_seed() {
    let (_tmp, config_path) = setup_test_env();
    let binary = ecoscribe_binary();

    let run = || {
        let mut child = Command::new(&binary)
            .arg("--config")
            .arg(&config_path)
            .args(["damage", "-", "--ratio", "0.5", "--seed", "42"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        child
            .stdin
            .take()
            .unwrap()
            .write_all(HISTORY.as_bytes())
            .unwrap();
        let output = child.wait_with_output().unwrap();
        assert!(output.status.success());
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    };

    let first = run();
    assert_eq!(first, run());
    assert_eq!(first.split_whitespace().count(), 8);
    assert_eq!(first.matches("[MASK]").count(), 4);
}

#[test]
fn test_damage_rejects_bad_ratio() {
    let (tmp, config_path) = setup_test_env();
    let damaged = tmp.path().join("damaged.txt");

    let (_stdout, stderr, success) = run_ecoscribe(
        &config_path,
        &["damage", damaged.to_str().unwrap(), "--ratio", "1.5"],
    );
    assert!(!success);
    assert!(stderr.contains("mask_ratio"));
}

#[test]
fn test_explain_and_refine_prompts() {
    let (tmp, config_path) = setup_test_env();
    let restored = tmp.path().join("restored.txt");
    fs::write(&restored, HISTORY).unwrap();

    let (stdout, stderr, success) = run_ecoscribe(
        &config_path,
        &[
            "explain",
            restored.to_str().unwrap(),
            "--token",
            "Anglo-Frisian",
            "--print-prompt",
        ],
    );
    assert!(success, "explain failed: {}", stderr);
    assert!(stdout.contains("**Anglo-Frisian**"));
    assert!(stdout.contains(HISTORY));

    let (stdout, stderr, success) = run_ecoscribe(
        &config_path,
        &[
            "refine",
            restored.to_str().unwrap(),
            "--feedback",
            "use period spelling",
            "--print-prompt",
        ],
    );
    assert!(success, "refine failed: {}", stderr);
    assert_eq!(
        stdout.trim(),
        format!("Feedback: use period spelling\nText: {}", HISTORY)
    );
}

#[test]
fn test_build_fails_on_empty_corpus() {
    let (tmp, config_path) = setup_test_env();
    let knowledge = tmp.path().join("knowledge");
    fs::remove_dir_all(&knowledge).unwrap();
    fs::create_dir_all(&knowledge).unwrap();

    let (_stdout, stderr, success) = run_ecoscribe(&config_path, &["index", "build"]);
    assert!(!success);
    assert!(stderr.contains("no non-empty files"));
    assert!(!tmp.path().join("rag_vector_db").join("index.sqlite").exists());
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("page.txt");
    fs::write(&input, HISTORY).unwrap();

    let (stdout, stderr, success) = run_ecoscribe(
        &tmp.path().join("absent.toml"),
        &["damage", input.to_str().unwrap(), "--ratio", "0", "--seed", "1"],
    );
    assert!(success, "damage failed: {}", stderr);
    assert_eq!(stdout.trim(), HISTORY);
}
