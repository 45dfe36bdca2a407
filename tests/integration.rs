use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn parro_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("parro");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs_dir = root.join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("actividades.md"),
        "# Actividades parroquiales\n\n## Catequesis\n\n**Día:** Lunes\n**Horario:** 17:30\n\n### Descripción\nCatequesis de primera comunión para niños.\n\n---\n\n## Eloos Entrega\n\n**Día:** Viernes\n\n### Descripción\nServicio a personas en situación de calle.\n",
    )
    .unwrap();
    fs::write(
        docs_dir.join("horarios.txt"),
        "Misas: laborables 19:00, domingos 10:00 y 12:00.\n\nDespacho parroquial: martes y jueves de 18:00 a 20:00.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/parro.sqlite"

[chunking]
max_tokens = 700

[server]
bind = "127.0.0.1:7431"

[connectors.filesystem]
root = "{root}/docs"
include_globs = ["**/*.md", "**/*.txt"]
"#,
        root = root.display()
    );

    let config_path = config_dir.join("parro.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_parro(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = parro_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run parro binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn init_creates_catalog() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_parro(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/parro.sqlite").exists());
}

#[test]
fn init_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_parro(&config_path, &["init"]);
    let (_, _, success2) = run_parro(&config_path, &["init"]);
    assert!(success1);
    assert!(success2);
}

#[test]
fn sync_dry_run_reports_counts_without_writing() {
    let (tmp, config_path) = setup_test_env();
    run_parro(&config_path, &["init"]);

    let (stdout, _, success) = run_parro(&config_path, &["sync", "filesystem", "--dry-run"]);
    assert!(success, "dry-run failed: {}", stdout);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("items found: 2"));

    // Nothing ingested: a real sync afterwards still finds both files.
    let (stdout, _, success) = run_parro(&config_path, &["sync", "filesystem"]);
    assert!(success);
    assert!(stdout.contains("fetched: 2 items"), "stdout: {}", stdout);
    drop(tmp);
}

#[test]
fn sync_ingests_and_is_incremental() {
    let (_tmp, config_path) = setup_test_env();
    run_parro(&config_path, &["init"]);

    let (stdout, stderr, success) = run_parro(&config_path, &["sync", "filesystem"]);
    assert!(success, "sync failed: stdout={} stderr={}", stdout, stderr);
    assert!(stdout.contains("upserted documents: 2"));
    assert!(stdout.contains("ok"));

    // Second sync without changes: the checkpoint filters everything.
    let (stdout, _, success) = run_parro(&config_path, &["sync", "filesystem"]);
    assert!(success);
    assert!(stdout.contains("fetched: 0 items"), "stdout: {}", stdout);

    // --full reingests.
    let (stdout, _, success) = run_parro(&config_path, &["sync", "filesystem", "--full"]);
    assert!(success);
    assert!(stdout.contains("fetched: 2 items"));
}

#[test]
fn sync_unknown_connector_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_parro(&config_path, &["init"]);

    let (_, stderr, success) = run_parro(&config_path, &["sync", "s3"]);
    assert!(!success);
    assert!(stderr.contains("Unknown connector"));
}

#[test]
fn stats_reports_catalog_counts() {
    let (_tmp, config_path) = setup_test_env();
    run_parro(&config_path, &["init"]);
    run_parro(&config_path, &["sync", "filesystem"]);

    let (stdout, _, success) = run_parro(&config_path, &["index", "stats"]);
    assert!(success, "stats failed: {}", stdout);
    assert!(stdout.contains("Documents: 2"));
    assert!(stdout.contains("filesystem"));
}

#[test]
fn search_requires_embedding_provider() {
    let (_tmp, config_path) = setup_test_env();
    run_parro(&config_path, &["init"]);
    run_parro(&config_path, &["sync", "filesystem"]);

    let (_, stderr, success) = run_parro(&config_path, &["search", "catequesis"]);
    assert!(!success);
    assert!(
        stderr.contains("disabled"),
        "expected disabled-provider error, got: {}",
        stderr
    );
}

#[test]
fn embed_pending_requires_configuration() {
    let (_tmp, config_path) = setup_test_env();
    run_parro(&config_path, &["init"]);

    let (_, stderr, success) = run_parro(&config_path, &["embed", "pending"]);
    assert!(!success);
    assert!(stderr.contains("disabled"));
}

#[test]
fn sources_lists_subsystem_status() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_parro(&config_path, &["sources"]);
    assert!(success);
    assert!(stdout.contains("filesystem"));
    assert!(stdout.contains("embedding"));
    assert!(stdout.contains("disabled"));
}

#[test]
fn get_unknown_document_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_parro(&config_path, &["init"]);

    let (_, stderr, success) = run_parro(
        &config_path,
        &["get", "00000000-0000-0000-0000-000000000000"],
    );
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("parro.toml");
    fs::write(
        &config_path,
        r#"[db]
path = "x.sqlite"

[chunking]
max_tokens = 0

[server]
bind = "127.0.0.1:7431"
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_parro(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("max_tokens"));
}

#[test]
fn index_clear_requires_confirmation() {
    let (_tmp, config_path) = setup_test_env();
    run_parro(&config_path, &["init"]);

    let (_, stderr, success) = run_parro(&config_path, &["index", "clear"]);
    assert!(!success);
    assert!(stderr.contains("--yes"));
}
