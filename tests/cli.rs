use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn txmail_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_txmail"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/txmail.sqlite"

[mailbox]
sender_filter = "no-reply@cake.vn"

[server]
bind = "127.0.0.1:7441"

[extraction.labels]
maGiaoDich = ["Mã GD"]
"#,
        root.display()
    );

    let config_path = config_dir.join("txmail.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_txmail(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = txmail_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("GMAIL_CLIENT_ID")
        .env_remove("GMAIL_CLIENT_SECRET")
        .env_remove("GMAIL_REFRESH_TOKEN")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run txmail binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

const NOTIFICATION: &str = r#"<html><body><table>
<tr><td>Tài khoản nhận</td><td>0011223344</td></tr>
<tr><td>Tài khoản chuyển</td><td>9988776655</td></tr>
<tr><td>Tên người chuyển</td><td>NGUYEN VAN A</td></tr>
<tr><td>Mã GD</td><td>FT25218 XYZ</td></tr>
<tr><td>Ngày giờ giao dịch</td><td>06/08/2025, 01:50:59</td></tr>
<tr><td>Số tiền</td><td>+2.000 VND</td></tr>
</table></body></html>"#;

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run_txmail(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/txmail.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config) = setup_test_env();
    assert!(run_txmail(&config, &["init"]).2);
    let (_, stderr, ok) = run_txmail(&config, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_stats_on_empty_database() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run_txmail(&config, &["stats"]);
    assert!(ok, "stats failed: {}", stderr);
    assert!(stdout.contains("Transactions:  0"));
    assert!(stdout.contains("next sync bootstraps"));
}

#[test]
fn test_recent_on_empty_database() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_txmail(&config, &["recent", "--limit", "5"]);
    assert!(ok);
    assert!(stdout.contains("No transactions stored."));
}

#[test]
fn test_prune_on_empty_database() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, ok) = run_txmail(&config, &["prune", "--days", "7"]);
    assert!(ok);
    assert!(stdout.contains("Pruned 0 transaction(s)"));
}

#[test]
fn test_prune_rejects_zero_days() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_txmail(&config, &["prune", "--days", "0"]);
    assert!(!ok);
    assert!(stderr.contains("--days"));
}

#[test]
fn test_prune_rejects_huge_window() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_txmail(&config, &["prune", "--days", "200000000"]);
    assert!(!ok);
    assert!(stderr.contains("--days must be <="), "stderr: {}", stderr);
    assert!(!stderr.contains("panicked"));
}

#[test]
fn test_parse_uses_configured_labels() {
    let (tmp, config) = setup_test_env();
    let email = tmp.path().join("email.html");
    fs::write(&email, NOTIFICATION).unwrap();

    let (stdout, stderr, ok) = run_txmail(&config, &["parse", email.to_str().unwrap()]);
    assert!(ok, "parse failed: {}", stderr);

    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["outcome"], "accepted");
    assert_eq!(report["fields"]["maGiaoDich"], "FT25218XYZ");
    assert_eq!(report["transaction"]["amount"], 2000);
    assert_eq!(
        report["transaction"]["transaction_time"],
        "2025-08-06T01:50:59+07:00"
    );
}

#[test]
fn test_parse_without_config_file() {
    let tmp = TempDir::new().unwrap();
    let email = tmp.path().join("email.html");
    fs::write(&email, "<table><tr><td>Số tiền</td><td>5.000</td></tr></table>").unwrap();

    let (stdout, _, ok) = run_txmail(
        &tmp.path().join("missing.toml"),
        &["parse", email.to_str().unwrap()],
    );
    assert!(ok);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["outcome"], "incomplete");
    assert!(report["missing"]
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m == "maGiaoDich"));
}

#[test]
fn test_sync_requires_credentials() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_txmail(&config, &["sync"]);
    assert!(!ok);
    assert!(stderr.contains("GMAIL_CLIENT_ID"));
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(
        &config,
        format!(
            "[db]\npath = \"{}/x.sqlite\"\n[schedule]\ninterval_secs = 0\n",
            tmp.path().display()
        ),
    )
    .unwrap();
    let (_, stderr, ok) = run_txmail(&config, &["init"]);
    assert!(!ok);
    assert!(stderr.contains("interval_secs"));
}
