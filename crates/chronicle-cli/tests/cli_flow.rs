use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use rusqlite::{params, Connection};

fn bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_chronicle"))
}

/// One isolated "device": its own HOME, XDG dirs and working directory.
struct Device {
    _root: tempfile::TempDir,
    home: PathBuf,
    work: PathBuf,
}

impl Device {
    fn new() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let home = root.path().join("home");
        let work = home.join("work");
        std::fs::create_dir_all(&work).expect("create work dir");
        Self {
            _root: root,
            home,
            work,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.home.join("data").join("chronicle").join("chronicle.db")
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(bin());
        cmd.args(args)
            .current_dir(&self.work)
            .env("HOME", &self.home)
            .env("XDG_CONFIG_HOME", self.home.join("config"))
            .env("XDG_DATA_HOME", self.home.join("data"))
            .env("NO_COLOR", "1")
            .env_remove("CHRONICLE_DB")
            .env_remove("CHRONICLE_CONFIG")
            .env_remove("CHRONICLE_PASSPHRASE")
            .env_remove("CHRONICLE_LOG")
            .env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command(args).output().expect("run chronicle")
    }

    fn ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "chronicle {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).expect("utf8 stdout")
    }

    fn json(&self, args: &[&str]) -> Vec<serde_json::Value> {
        let stdout = self.ok(args);
        let value: serde_json::Value = serde_json::from_str(&stdout).expect("json output");
        value.as_array().expect("json array").clone()
    }

    fn setup_sync(&self, remote: &Path) {
        let mut child = self
            .command(&[
                "sync",
                "setup",
                "--user",
                "me@example.com",
                "--remote-dir",
                remote.to_str().expect("utf8 path"),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn setup");
        child
            .stdin
            .take()
            .expect("stdin")
            .write_all(b"correct horse battery staple\n")
            .expect("write passphrase");
        let output = child.wait_with_output().expect("wait setup");
        assert!(
            output.status.success(),
            "setup failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

fn messages(entries: &[serde_json::Value]) -> Vec<&str> {
    entries
        .iter()
        .map(|e| e["message"].as_str().expect("message"))
        .collect()
}

#[test]
fn test_cli_add_list_search_delete() {
    let device = Device::new();

    let stdout = device.ok(&["add", "fixed", "login", "bug", "-t", "work", "-t", "bugs"]);
    assert!(stdout.starts_with("Entry created (ID: "));
    device.ok(&["add", "cooked dinner", "-t", "home", "--date", "2024-01-02 18:30"]);
    device.ok(&["add", "reviewed login flow", "-t", "work"]);
    assert!(device.db_path().exists());

    let listed = device.json(&["list", "--json"]);
    assert_eq!(listed.len(), 3);
    assert_eq!(messages(&listed)[2], "cooked dinner");
    assert_eq!(listed[2]["timestamp"], "2024-01-02T18:30:00+00:00");
    assert_eq!(listed[0]["working_directory"], device.work.display().to_string());

    let hits = device.json(&["search", "login", "--json"]);
    assert_eq!(hits.len(), 2);

    let hits = device.json(&["search", "--tag", "home", "--tag", "bugs", "--json"]);
    assert_eq!(hits.len(), 2);

    let hits = device.json(&["search", "login", "--tag", "bugs", "--json"]);
    assert_eq!(messages(&hits), vec!["fixed login bug"]);

    let hits = device.json(&["search", "--until", "2024-12-31", "--json"]);
    assert_eq!(messages(&hits), vec!["cooked dinner"]);

    let id = hits[0]["id"].as_str().expect("id").to_string();
    let stdout = device.ok(&["delete", &id]);
    assert!(stdout.contains(&id));
    assert_eq!(device.json(&["list", "--json"]).len(), 2);

    let table = device.ok(&["list"]);
    assert!(table.contains("Message"));
    assert!(table.contains("reviewed login flow"));
}

#[test]
fn test_cli_error_exit_codes() {
    let device = Device::new();

    let output = device.run(&["delete", "not-a-uuid"]);
    assert_eq!(output.status.code(), Some(4));

    let output = device.run(&["delete", "6f1d8e62-5c4e-4b59-9a57-0b0d6c1a2f3e"]);
    assert_eq!(output.status.code(), Some(3));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Hint:"));

    let output = device.run(&["add", "x", "--date", "next tuesday"]);
    assert_eq!(output.status.code(), Some(4));

    let output = device.run(&["add", "x", "-t", "   "]);
    assert_eq!(output.status.code(), Some(4));
    assert!(device.json(&["list", "--json"]).is_empty());

    let output = device.run(&["sync", "now"]);
    assert_eq!(output.status.code(), Some(5));
    assert!(String::from_utf8_lossy(&output.stderr).contains("chronicle sync setup"));

    let output = device.run(&["sync", "wipe"]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_project_log_mirror() {
    let device = Device::new();
    std::fs::write(
        device.work.join(".chronicle"),
        "local_logging = true\nlog_format = \"json\"\n",
    )
    .expect("write project config");
    let nested = device.work.join("src");
    std::fs::create_dir_all(&nested).expect("mkdir");

    let output = device
        .command(&["add", "from a subdirectory", "-t", "proj"])
        .current_dir(&nested)
        .output()
        .expect("run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Project log updated"));

    let logs: Vec<_> = std::fs::read_dir(device.work.join("logs"))
        .expect("logs dir")
        .map(|e| e.expect("entry").path())
        .collect();
    assert_eq!(logs.len(), 1);
    let text = std::fs::read_to_string(&logs[0]).expect("read log");
    let line: serde_json::Value = serde_json::from_str(text.trim()).expect("json line");
    assert_eq!(line["message"], "from a subdirectory");
    assert_eq!(line["tags"][0], "proj");
}

#[test]
fn test_cli_broken_project_config_only_warns() {
    let device = Device::new();
    std::fs::write(device.work.join(".chronicle"), "local_logging = [").expect("write");

    let output = device.run(&["add", "still saved"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Warning:"));
    assert_eq!(device.json(&["list", "--json"]).len(), 1);
}

#[test]
fn test_cli_sync_between_devices() {
    let shared = tempfile::tempdir().expect("shared dir");
    let remote = shared.path().join("chronicle-sync");
    let laptop = Device::new();
    let desktop = Device::new();

    laptop.setup_sync(&remote);
    desktop.setup_sync(&remote);
    let config =
        std::fs::read_to_string(laptop.home.join("config").join("chronicle").join("config.toml"))
            .expect("config written");
    assert!(config.contains("[sync]"));
    assert!(config.contains("derived_key"));
    assert!(!config.contains("correct horse"));

    laptop.ok(&["add", "written on the laptop 🚀", "-t", "sync"]);
    let pending = laptop.json(&["sync", "pending", "--json"]);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["entity"], "entry");

    laptop.ok(&["sync", "now"]);
    assert!(laptop.json(&["sync", "pending", "--json"]).is_empty());

    desktop.ok(&["sync", "now"]);
    let entries = desktop.json(&["list", "--json"]);
    assert_eq!(messages(&entries), vec!["written on the laptop 🚀"]);

    let id = entries[0]["id"].as_str().expect("id").to_string();
    desktop.ok(&["delete", &id]);
    desktop.ok(&["sync", "now"]);
    laptop.ok(&["sync", "now"]);
    assert!(laptop.json(&["list", "--json"]).is_empty());

    let status = laptop.ok(&["sync", "status"]);
    assert!(status.contains("Pending changes: 0"));
}

#[test]
fn test_cli_doctor_check_and_repair() {
    let device = Device::new();
    device.ok(&["add", "searchable needle"]);

    let stdout = device.ok(&["doctor", "check"]);
    assert!(stdout.contains("Integrity check passed"));

    {
        let conn = Connection::open(device.db_path()).expect("open db");
        conn.execute("DELETE FROM entries_fts", []).expect("break index");
    }

    let output = device.run(&["doctor", "check"]);
    assert_eq!(output.status.code(), Some(6));
    assert!(String::from_utf8_lossy(&output.stderr).contains("FAILED"));

    let stdout = device.ok(&["doctor", "rebuild-index"]);
    assert!(stdout.contains("1 entries"));
    device.ok(&["doctor", "check"]);
    assert_eq!(device.json(&["search", "needle", "--json"]).len(), 1);

    device.ok(&["doctor", "checkpoint"]);
    device.ok(&["doctor", "vacuum"]);
}

#[test]
fn test_cli_upgrades_legacy_database() {
    let device = Device::new();
    let path = device.db_path();
    std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    {
        let conn = Connection::open(&path).expect("open legacy");
        conn.execute_batch(
            "CREATE TABLE entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                message TEXT NOT NULL,
                hostname TEXT NOT NULL,
                username TEXT NOT NULL,
                working_directory TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id INTEGER NOT NULL,
                tag TEXT NOT NULL,
                FOREIGN KEY (entry_id) REFERENCES entries(id) ON DELETE CASCADE
            );",
        )
        .expect("legacy schema");
        conn.execute(
            "INSERT INTO entries (timestamp, message, hostname, username, working_directory)
             VALUES (?, ?, 'old-host', 'old-user', '/old')",
            params!["2022-07-01 10:00:00", "from before the upgrade"],
        )
        .expect("legacy row");
        conn.execute("INSERT INTO tags (entry_id, tag) VALUES (1, 'legacy')", [])
            .expect("legacy tag");
    }

    let output = device.run(&["list", "--json"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Upgraded"));
    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(entries[0]["message"], "from before the upgrade");
    assert_eq!(entries[0]["tags"][0], "legacy");
    assert_eq!(entries[0]["id"].as_str().expect("id").len(), 36);

    let output = device.run(&["list", "--json"]);
    assert!(!String::from_utf8_lossy(&output.stderr).contains("Upgraded"));
}
