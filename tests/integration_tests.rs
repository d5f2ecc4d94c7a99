//! CLI smoke tests through the built `kst` binary.

mod common;

use common::Fixture;

const DAY1: &str = "governorID,name,power,kills\n1,Alice,\"1,000\",100\n2,Bob,500,7\n";
const DAY2: &str = "governorID,name,power,kills\n1,Alice,\"1,250\",150\n2,Bob,450,9\n";

fn seeded() -> Fixture {
    let fx = Fixture::new();
    fx.write_snapshot("01012024.csv", DAY1);
    fx.write_snapshot("01022024.csv", DAY2);
    fx
}

fn ingested() -> Fixture {
    let fx = seeded();
    let result = fx.run("seed_ingest", &["ingest"]);
    assert!(
        result.status.success(),
        "seed ingest failed; log: {}",
        result.log_path.display()
    );
    fx
}

#[test]
fn help_command_prints_usage() {
    let result = common::run_cli_case("help_command_prints_usage", &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: kst [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn version_command_prints_version() {
    let result = common::run_cli_case("version_command_prints_version", &["version"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.starts_with("kst "),
        "missing version output; log: {}",
        result.log_path.display()
    );
}

#[test]
fn subcommand_help_flags_work() {
    let subcommands = [
        "ingest",
        "list",
        "show",
        "players",
        "aggregate",
        "trend",
        "delta",
        "run",
        "config",
        "version",
    ];

    for subcmd in subcommands {
        let case_name = format!("subcommand_{subcmd}_help");
        let result = common::run_cli_case(&case_name, &[subcmd, "--help"]);
        assert!(
            result.status.success(),
            "subcommand '{subcmd} --help' failed; log: {}",
            result.log_path.display()
        );
        assert!(
            result.stdout.contains("Usage"),
            "subcommand '{subcmd} --help' missing usage info; log: {}",
            result.log_path.display()
        );
    }
}

#[test]
fn completions_command_generates_shell_script() {
    let result = common::run_cli_case(
        "completions_command_generates_shell_script",
        &["completions", "bash"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains("kst"),
        "expected completion script contents; log: {}",
        result.log_path.display()
    );
}

#[test]
fn ingest_reports_summary_and_logs_activity() {
    let fx = seeded();
    fx.write_snapshot("readme.txt", "not a snapshot");

    let result = fx.run("ingest_reports_summary", &["ingest"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result
            .stdout
            .contains("Ingested 2 snapshot(s), 0 failed, 1 ignored."),
        "log: {}",
        result.log_path.display()
    );

    let events = fx.activity_events();
    assert_eq!(events.first().map(String::as_str), Some("ingest_start"));
    assert_eq!(
        events.iter().filter(|e| *e == "snapshot_loaded").count(),
        2
    );
    assert!(events.iter().any(|e| e == "ingest_complete"));
}

#[test]
fn ingest_with_bad_file_exits_partial() {
    let fx = seeded();
    fx.write_snapshot("01032024.csv", "governorID,name\n1,Alice,extra\n");

    let result = fx.run("ingest_with_bad_file_exits_partial", &["ingest"]);
    assert_eq!(result.status.code(), Some(4), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("01032024.csv"));

    let list = fx.run("list_after_partial", &["list", "--json"]);
    assert_eq!(
        list.json()["snapshots"],
        serde_json::json!(["01012024", "01022024"])
    );
}

#[test]
fn list_json_is_chronological() {
    let fx = Fixture::new();
    fx.write_snapshot("01012025.csv", "governorID\n1\n");
    fx.write_snapshot("12312024.csv", "governorID\n1\n");
    fx.run("seed", &["ingest"]);

    let result = fx.run("list_json_is_chronological", &["list", "--json"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload = result.json();
    assert_eq!(payload["command"], "list");
    assert_eq!(payload["snapshots"], serde_json::json!(["12312024", "01012025"]));
}

#[test]
fn list_on_empty_store_says_so() {
    let fx = Fixture::new();
    let result = fx.run("list_on_empty_store", &["list"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("No snapshots found"));
}

#[test]
fn show_applies_filters() {
    let fx = ingested();
    let result = fx.run(
        "show_applies_filters",
        &["show", "01022024", "--range", "power:1000:2000", "--json"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload = result.json();
    let rows = payload["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][1], "Alice");
    assert_eq!(rows[0][2], 1250);
}

#[test]
fn show_unknown_snapshot_names_the_stage() {
    let fx = ingested();
    let result = fx.run("show_unknown_snapshot", &["show", "02022024"]);
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(
        result
            .stderr
            .contains("An error occurred during snapshot read:"),
        "log: {}",
        result.log_path.display()
    );
    assert!(result.stderr.contains("KST-2101"));
}

#[test]
fn failure_line_is_localized() {
    let fx = ingested();
    let result = fx.run(
        "failure_line_is_localized",
        &["--lang", "es", "show", "02022024"],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(
        result
            .stderr
            .contains("Ocurrió un error durante lectura de instantánea:"),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn unknown_filter_column_is_a_user_error() {
    let fx = ingested();
    let result = fx.run(
        "unknown_filter_column",
        &["show", "01012024", "--filter", "level=3"],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("KST-2103"));
}

#[test]
fn players_lists_id_and_name() {
    let fx = ingested();
    let result = fx.run("players_lists_id_and_name", &["players"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("1 (Alice)"));
    assert!(result.stdout.contains("2 (Bob)"));
}

#[test]
fn trend_json_has_points_and_deltas() {
    let fx = ingested();
    let result = fx.run(
        "trend_json_has_points_and_deltas",
        &["trend", "1", "--metric", "kills", "--json"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload = result.json();
    let points = payload["trends"][0]["points"].as_array().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0]["date"], "2024-01-01");
    assert_eq!(points[0]["value"].as_f64(), Some(100.0));
    assert!(points[0]["delta"].is_null());
    assert_eq!(points[1]["delta"].as_f64(), Some(50.0));
}

#[test]
fn trend_missing_metric_warns_but_succeeds() {
    let fx = ingested();
    let result = fx.run(
        "trend_missing_metric_warns",
        &["trend", "1", "--metric", "deads"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result
            .stderr
            .contains("Column deads is missing or non-numeric."),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn delta_json_matches_scenario() {
    let fx = ingested();
    let result = fx.run("delta_json_matches_scenario", &["delta", "kills", "--json"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload = result.json();
    assert_eq!(payload["labels"], serde_json::json!(["01/01", "01/02"]));
    let rows = payload["table"]["rows"].as_array().unwrap();
    assert_eq!(rows[0]["id"], 1);
    assert_eq!(rows[0]["name"], "Alice");
    assert!(rows[0]["cells"][0].is_null());
    assert_eq!(rows[0]["cells"][1].as_f64(), Some(50.0));
}

#[test]
fn delta_human_uses_reference_annotations() {
    let fx = Fixture::with_config_extra("reference_file = \"events.csv\"\n");
    fx.write_snapshot("01012024.csv", DAY1);
    fx.write_snapshot("01022024.csv", DAY2);
    std::fs::write(
        fx.root().join("events.csv"),
        "date,location,reason\n01022024,Pass 4,KvK\n",
    )
    .unwrap();
    // Relative reference paths resolve against the working directory.
    let reference = fx.root().join("events.csv").display().to_string();
    let body = std::fs::read_to_string(&fx.config_path)
        .unwrap()
        .replace("\"events.csv\"", &format!("{reference:?}"));
    std::fs::write(&fx.config_path, body).unwrap();

    fx.run("seed", &["ingest"]);
    let result = fx.run("delta_human_uses_reference", &["delta", "power"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("01/02 (Pass 4: KvK)"));
    assert!(result.stdout.contains("+250"));
}

#[test]
fn run_json_summarizes_everything() {
    let fx = seeded();
    let result = fx.run("run_json_summarizes_everything", &["run", "--json"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let summary = &result.json()["summary"];
    assert_eq!(summary["rows"], 4);
    assert_eq!(summary["entities"], 2);
    assert_eq!(summary["deltas"].as_array().unwrap().len(), 3);
}

#[test]
fn run_with_missing_data_dir_fails_in_ingest_stage() {
    let fx = Fixture::new();
    std::fs::remove_dir(fx.data_dir()).unwrap();
    let result = fx.run("run_missing_data_dir", &["run"]);
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("An error occurred during ingestion:"));
    assert!(result.stderr.contains("KST-2002"));
}

#[test]
fn missing_explicit_config_is_a_user_error() {
    let result = common::run_cli_case(
        "missing_explicit_config",
        &["--config", "/nonexistent/kst/config.toml", "list"],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("KST-1002"));
}

#[test]
fn config_validate_json_reports_hash() {
    let fx = Fixture::new();
    let result = fx.run("config_validate_json", &["config", "validate", "--json"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload = result.json();
    assert_eq!(payload["valid"], true);
    assert_eq!(payload["hash"].as_str().map(str::len), Some(16));
}

#[test]
fn config_validate_rejects_bad_values() {
    let fx = Fixture::with_config_extra("\n[metrics]\nlabel_format = \"\"\n");
    let result = fx.run("config_validate_rejects", &["config", "validate"]);
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("KST-1001"));
}

#[test]
fn time_label_format_fails_config_instead_of_crashing_delta() {
    let fx = Fixture::with_config_extra("\n[metrics]\nlabel_format = \"%H:%M\"\n");
    fx.write_snapshot("01012024.csv", DAY1);
    let result = fx.run("time_label_format_delta", &["delta", "power"]);
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("An error occurred during configuration:"));
    assert!(result.stderr.contains("KST-1001"));
    assert!(!result.stderr.contains("panicked"));
}
