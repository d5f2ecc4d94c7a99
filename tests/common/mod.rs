#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

impl CmdResult {
    /// Parse stdout as a single JSON document.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(self.stdout.trim()).unwrap_or_else(|e| {
            panic!(
                "stdout is not JSON ({e}); log: {}",
                self.log_path.display()
            )
        })
    }
}

/// Isolated working area: a data directory, a config file pointing into it,
/// and room for the store and activity log.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config_extra("")
    }

    /// Fixture whose config file has `extra` TOML appended.
    pub fn with_config_extra(extra: &str) -> Self {
        let dir = tempfile::tempdir().expect("create fixture dir");
        let root = dir.path();
        fs::create_dir_all(root.join("data")).expect("create data dir");
        let config_path = root.join("kst.toml");
        let body = format!(
            "[paths]\ndata_dir = {:?}\nsqlite_db = {:?}\njsonl_log = {:?}\n{extra}",
            root.join("data").display().to_string(),
            root.join("ingested_data.db").display().to_string(),
            root.join("kst-activity.jsonl").display().to_string(),
        );
        fs::write(&config_path, body).expect("write fixture config");
        Self { dir, config_path }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root().join("data")
    }

    pub fn write_snapshot(&self, file_name: &str, body: &str) -> PathBuf {
        let path = self.data_dir().join(file_name);
        fs::write(&path, body).expect("write snapshot");
        path
    }

    /// Run `kst --config <fixture config> <args>`.
    pub fn run(&self, case_name: &str, args: &[&str]) -> CmdResult {
        let config = self.config_path.display().to_string();
        let mut full: Vec<&str> = vec!["--config", &config];
        full.extend_from_slice(args);
        run_cli_case(case_name, &full)
    }

    pub fn activity_events(&self) -> Vec<String> {
        let raw = fs::read_to_string(self.root().join("kst-activity.jsonl")).unwrap_or_default();
        raw.lines()
            .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
            .filter_map(|v| v["event"].as_str().map(str::to_string))
            .collect()
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_kst") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "kst.exe" } else { "kst" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve kst binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("kst-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("RUST_BACKTRACE", "1")
        .env("KST_OUTPUT_FORMAT", "human")
        .output()
        .expect("execute kst command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
