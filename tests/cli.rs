use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn shopdesk_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("shopdesk");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/shopdesk.sqlite"

[index]
path = "{root}/data/products.index.json"

[embedding]
provider = "hash"
dims = 256

[retrieval]
top_k = 3

[server]
bind = "127.0.0.1:5999"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("shopdesk.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_shopdesk(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = shopdesk_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run shopdesk binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// init + seed + index build, asserting each step succeeds.
fn prepared_env() -> (TempDir, PathBuf) {
    let (tmp, config) = setup_test_env();
    for args in [&["init"][..], &["seed"], &["index", "build"]] {
        let (_, stderr, success) = run_shopdesk(&config, args);
        assert!(success, "{:?} failed: {}", args, stderr);
    }
    (tmp, config)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_shopdesk(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/shopdesk.sqlite").exists());

    let (_, _, again) = run_shopdesk(&config, &["init"]);
    assert!(again, "init should be idempotent");
}

#[test]
fn test_seed_is_idempotent() {
    let (_tmp, config) = setup_test_env();
    run_shopdesk(&config, &["init"]);

    let (stdout, stderr, success) = run_shopdesk(&config, &["seed"]);
    assert!(success, "seed failed: {}", stderr);
    assert!(stdout.contains("products inserted: 15"));
    assert!(stdout.contains("orders inserted: 10"));

    let (stdout, _, _) = run_shopdesk(&config, &["seed"]);
    assert!(stdout.contains("products inserted: 0"));
    assert!(stdout.contains("orders inserted: 0"));
}

#[test]
fn test_index_build_then_incremental() {
    let (_tmp, config) = prepared_env();

    let (stdout, stderr, success) = run_shopdesk(&config, &["index", "build", "--incremental"]);
    assert!(success, "incremental build failed: {}", stderr);
    assert!(stdout.contains("products: 15"));
    assert!(stdout.contains("embedded: 0"));
    assert!(stdout.contains("reused: 15"));
}

#[test]
fn test_index_status_reports_no_stale_entries() {
    let (_tmp, config) = prepared_env();
    let (stdout, stderr, success) = run_shopdesk(&config, &["index", "status"]);
    assert!(success, "status failed: {}", stderr);
    assert!(stdout.contains("hash-ngram-256"));
    assert!(stdout.contains("entries: 15"));
    assert!(stdout.contains("stale: none"));
}

#[test]
fn test_search_ranks_cotton_tshirt_first() {
    let (_tmp, config) = prepared_env();
    let (stdout, stderr, success) = run_shopdesk(&config, &["search", "适合夏天穿的纯棉衣服"]);
    assert!(success, "search failed: {}", stderr);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("1. [001] 纯棉T恤"), "got: {}", stdout);
    assert!(stdout.contains("满200减30"));
    assert!(!stdout.contains("4. ["), "top_k = 3 caps the results");
}

#[test]
fn test_search_without_index_fails() {
    let (_tmp, config) = setup_test_env();
    run_shopdesk(&config, &["init"]);
    let (_, stderr, success) = run_shopdesk(&config, &["search", "羽绒服"]);
    assert!(!success);
    assert!(stderr.contains("index"), "stderr: {}", stderr);
}

#[test]
fn test_tool_call_query_order() {
    let (_tmp, config) = prepared_env();
    let (stdout, stderr, success) = run_shopdesk(
        &config,
        &["tool", "call", "query_order", "--param", "order_id=12345"],
    );
    assert!(success, "tool call failed: {}", stderr);
    assert!(stdout.contains("订单 12345"));
    assert!(stdout.contains("已签收"));
    assert!(stdout.contains("398.00元"));
    assert!(stdout.contains("圆通快递"));
}

#[test]
fn test_tool_call_unknown_product() {
    let (_tmp, config) = prepared_env();
    let (stdout, _, success) = run_shopdesk(
        &config,
        &["tool", "call", "query_product", "--param", "product_id=999"],
    );
    assert!(success);
    assert!(stdout.contains("未找到商品ID为 999"));
}

#[test]
fn test_tool_call_unknown_tool_fails() {
    let (_tmp, config) = prepared_env();
    let (_, stderr, success) = run_shopdesk(&config, &["tool", "call", "refund"]);
    assert!(!success);
    assert!(stderr.contains("Unknown tool"));
}

#[test]
fn test_tool_list_needs_no_config() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, success) = run_shopdesk(&tmp.path().join("missing.toml"), &["tool", "list"]);
    assert!(success);
    assert!(stdout.contains("query_order"));
    assert!(stdout.contains("query_product"));
    assert!(stdout.contains("search_products"));
}

#[test]
fn test_ask_requires_reasoning_provider() {
    let (_tmp, config) = prepared_env();
    let (_, stderr, success) = run_shopdesk(&config, &["ask", "我的订单12345到哪了"]);
    assert!(!success);
    assert!(stderr.contains("disabled"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_shopdesk(&tmp.path().join("missing.toml"), &["init"]);
    assert!(!success);
    assert!(!stderr.is_empty());
}
