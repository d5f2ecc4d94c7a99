//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use kingdom_stats_tracker::analysis::dates::format_label;
use kingdom_stats_tracker::analysis::filter::RowFilter;
use kingdom_stats_tracker::analysis::metrics::{DataWarning, PivotTable, Trend};
use kingdom_stats_tracker::core::config::Config;
use kingdom_stats_tracker::core::errors::{KstError, PipelineStage};
use kingdom_stats_tracker::core::messages::{Language, Msg, failure_line, render, template};
use kingdom_stats_tracker::ingest::pipeline::IngestReport;
use kingdom_stats_tracker::store::table::Table;
use kingdom_stats_tracker::store::value::Value as CellValue;
use kingdom_stats_tracker::tracker::Tracker;

/// Kingdom Stats Tracker: dated CSV snapshots in, player trends out.
#[derive(Debug, Parser)]
#[command(
    name = "kst",
    author,
    version,
    about = "Kingdom Stats Tracker - snapshot ingestion and player trends",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Message language (en or es). Overrides display.language.
    #[arg(long, global = true, value_name = "LANG")]
    lang: Option<Language>,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Load every snapshot file in the data directory into the store.
    Ingest,
    /// List stored snapshots.
    List,
    /// Display one snapshot, optionally filtered.
    Show(ShowArgs),
    /// List players as "id (name)".
    Players(PlayersArgs),
    /// Show the aggregated long-form dataset.
    Aggregate(AggregateArgs),
    /// Trend of one or more metrics for one player.
    Trend(TrendArgs),
    /// Period-over-period change of a metric for every player.
    Delta(DeltaArgs),
    /// Ingest, aggregate and compute delta tables for the configured metrics.
    Run,
    /// View configuration state.
    Config(ConfigArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct ShowArgs {
    /// Snapshot name, e.g. 01312024.
    name: String,
    /// Keep rows where COLUMN equals VALUE.
    #[arg(long = "filter", value_name = "COLUMN=VALUE")]
    filters: Vec<String>,
    /// Keep rows where COLUMN lies in [MIN, MAX].
    #[arg(long = "range", value_name = "COLUMN:MIN:MAX")]
    ranges: Vec<String>,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct PlayersArgs {
    /// Restrict to one snapshot instead of all of them.
    #[arg(long, value_name = "NAME")]
    snapshot: Option<String>,
}

#[derive(Debug, Clone, Args, Serialize)]
struct AggregateArgs {
    /// Maximum rows to print.
    #[arg(long, default_value_t = 20, value_name = "N")]
    limit: usize,
}

impl Default for AggregateArgs {
    fn default() -> Self {
        Self { limit: 20 }
    }
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct TrendArgs {
    /// Player identifier.
    id: String,
    /// Metric column(s). Defaults to metrics.trend_metrics.
    #[arg(long = "metric", value_name = "COLUMN")]
    metrics: Vec<String>,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct DeltaArgs {
    /// Metric column to difference.
    metric: String,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the config file path in use.
    Path,
    /// Print the effective configuration.
    Show,
    /// Validate the configuration.
    Validate,
}

#[derive(Debug, Clone, Args, Serialize, Default)]
struct VersionArgs {
    /// Include build metadata.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }

    /// Classify a library failure, rendering it as one localized line.
    fn from_kst(err: &KstError, lang: Language) -> Self {
        let line = failure_line(err, lang);
        match err.root() {
            e if e.is_user_error() => Self::User(line),
            KstError::Serialization { .. } => Self::Internal(line),
            _ => Self::Runtime(line),
        }
    }
}

/// Per-invocation context: resolved tracker, language and output mode.
struct Ctx<'a> {
    cli: &'a Cli,
    tracker: Tracker,
    lang: Language,
    mode: OutputMode,
}

impl Ctx<'_> {
    fn fail(&self, err: &KstError) -> CliError {
        CliError::from_kst(err, self.lang)
    }

    fn msg(&self, msg: Msg, args: &[(&str, &str)]) -> String {
        render(msg, self.lang, args)
    }

    fn warn(&self, line: &str) {
        if !self.cli.quiet {
            eprintln!("{} {line}", "warning:".yellow());
        }
    }

    fn label(&self, date: chrono::NaiveDate) -> String {
        format_label(date, &self.tracker.config().metrics.label_format)
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Config(args) => return run_config(cli, args),
        Command::Version(args) => return emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let fallback_lang = cli.lang.unwrap_or(Language::En);
    let tracker = Tracker::load(cli.config.as_deref())
        .map_err(|e| CliError::from_kst(&e, fallback_lang))?;
    let ctx = Ctx {
        cli,
        lang: cli.lang.unwrap_or(tracker.config().display.language),
        mode: output_mode(cli),
        tracker,
    };

    match &cli.command {
        Command::Ingest => run_ingest(&ctx),
        Command::List => run_list(&ctx),
        Command::Show(args) => run_show(&ctx, args),
        Command::Players(args) => run_players(&ctx, args),
        Command::Aggregate(args) => run_aggregate(&ctx, args),
        Command::Trend(args) => run_trend(&ctx, args),
        Command::Delta(args) => run_delta(&ctx, args),
        Command::Run => run_full(&ctx),
        Command::Config(_) | Command::Version(_) | Command::Completions(_) => Err(
            CliError::Internal("command should have been dispatched early".to_string()),
        ),
    }
}

// ──────────────────── ingest ────────────────────

fn run_ingest(ctx: &Ctx<'_>) -> Result<(), CliError> {
    let report = ctx.tracker.ingest().map_err(|e| ctx.fail(&e))?;
    match ctx.mode {
        OutputMode::Human => print_ingest_report(ctx, &report),
        OutputMode::Json => write_json_line(&json!({
            "command": "ingest",
            "report": serde_json::to_value(&report)?,
        }))?,
    }
    ingest_outcome(ctx, &report)
}

fn print_ingest_report(ctx: &Ctx<'_>, report: &IngestReport) {
    if ctx.cli.quiet {
        return;
    }
    println!(
        "{}",
        ctx.msg(
            Msg::IngestSummary,
            &[
                ("loaded", report.loaded.len().to_string().as_str()),
                ("failed", report.failures.len().to_string().as_str()),
                ("ignored", report.ignored.len().to_string().as_str()),
            ],
        )
    );
    if ctx.cli.verbose {
        for s in &report.loaded {
            println!(
                "  {} {} rows, {} columns ({} integer) sha256:{}",
                s.name.bold(),
                s.rows,
                s.columns.len(),
                s.integer_columns.len(),
                &s.fingerprint[..s.fingerprint.len().min(12)]
            );
        }
        for p in &report.ignored {
            println!("  ignored {}", p.display());
        }
    }
    for f in &report.failures {
        eprintln!("  {} {}: {}", "failed".red(), f.path.display(), f.message);
    }
}

fn ingest_outcome(ctx: &Ctx<'_>, report: &IngestReport) -> Result<(), CliError> {
    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::Partial(template(Msg::IngestFailures, ctx.lang).to_string()))
    }
}

// ──────────────────── browse ────────────────────

fn run_list(ctx: &Ctx<'_>) -> Result<(), CliError> {
    let names = ctx
        .tracker
        .snapshot_names_chronological()
        .map_err(|e| ctx.fail(&e))?;
    match ctx.mode {
        OutputMode::Human => {
            if names.is_empty() {
                println!("{}", template(Msg::NoSnapshots, ctx.lang));
            }
            for name in &names {
                println!("{name}");
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "list",
            "snapshots": names,
        }))?,
    }
    Ok(())
}

fn parse_filters(args: &ShowArgs) -> Result<Vec<RowFilter>, KstError> {
    args.filters
        .iter()
        .chain(&args.ranges)
        .map(|raw| raw.parse::<RowFilter>())
        .collect()
}

fn run_show(ctx: &Ctx<'_>, args: &ShowArgs) -> Result<(), CliError> {
    let filters = parse_filters(args)
        .map_err(|e| ctx.fail(&e.at_stage(PipelineStage::Read)))?;
    let table = ctx
        .tracker
        .read_filtered(&args.name, &filters)
        .map_err(|e| ctx.fail(&e))?;

    match ctx.mode {
        OutputMode::Human => {
            println!(
                "{}",
                ctx.msg(Msg::SnapshotHeader, &[("name", args.name.as_str())]).bold()
            );
            print_table(&table);
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "show",
            "snapshot": args.name,
            "filters": filters,
            "columns": table.columns,
            "rows": table.rows,
        }))?,
    }
    Ok(())
}

fn run_players(ctx: &Ctx<'_>, args: &PlayersArgs) -> Result<(), CliError> {
    let players = ctx
        .tracker
        .entity_selector(args.snapshot.as_deref())
        .map_err(|e| ctx.fail(&e))?;
    match ctx.mode {
        OutputMode::Human => {
            let scope = args.snapshot.as_deref().unwrap_or("*");
            println!("{}", ctx.msg(Msg::PlayersHeader, &[("name", scope)]).bold());
            for p in &players {
                println!("{}", p.display);
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "players",
            "snapshot": args.snapshot,
            "players": players,
        }))?,
    }
    Ok(())
}

fn run_aggregate(ctx: &Ctx<'_>, args: &AggregateArgs) -> Result<(), CliError> {
    let dataset = ctx.tracker.aggregated().map_err(|e| ctx.fail(&e))?;
    let dates: Vec<String> = dataset.dates().into_iter().map(|d| ctx.label(d)).collect();

    match ctx.mode {
        OutputMode::Human => {
            println!(
                "{} rows, {} columns, {} dates",
                dataset.len(),
                dataset.columns.len(),
                dates.len()
            );
            if dataset.undated_count() > 0 {
                ctx.warn(&DataWarning::Undated { rows: dataset.undated_count() }.to_string());
            }
            let mut preview = Table::new(
                std::iter::once("snapshot".to_string())
                    .chain(dataset.columns.iter().cloned())
                    .collect(),
            );
            for record in dataset.records.iter().take(args.limit) {
                let mut row = vec![CellValue::from(record.snapshot.as_str())];
                row.extend(record.values.iter().cloned());
                preview.rows.push(row);
            }
            print_table(&preview);
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "aggregate",
            "rows": dataset.len(),
            "columns": dataset.columns,
            "dates": dataset.dates(),
            "undated_rows": dataset.undated_count(),
            "records": dataset.records.iter().take(args.limit).collect::<Vec<_>>(),
        }))?,
    }
    Ok(())
}

// ──────────────────── metrics ────────────────────

fn run_trend(ctx: &Ctx<'_>, args: &TrendArgs) -> Result<(), CliError> {
    let metrics = if args.metrics.is_empty() {
        ctx.tracker.config().metrics.trend_metrics.clone()
    } else {
        args.metrics.clone()
    };
    let trends = ctx
        .tracker
        .trends(&args.id, &metrics)
        .map_err(|e| ctx.fail(&e))?;

    match ctx.mode {
        OutputMode::Human => {
            for t in &trends {
                print_trend(ctx, t);
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "trend",
            "entity": args.id,
            "trends": trends,
        }))?,
    }
    Ok(())
}

fn print_trend(ctx: &Ctx<'_>, t: &Trend) {
    println!(
        "{}",
        ctx.msg(
            Msg::TrendHeader,
            &[("metric", t.metric.as_str()), ("entity", t.entity.as_str())]
        )
        .bold()
    );
    for warning in &t.warnings {
        ctx.warn(&warning_line(ctx, warning));
    }
    for p in &t.points {
        println!(
            "  {:<12} {:>16} {:>16}",
            ctx.label(p.date),
            fmt_number(p.value),
            fmt_delta(p.delta)
        );
    }
}

fn run_delta(ctx: &Ctx<'_>, args: &DeltaArgs) -> Result<(), CliError> {
    let table = ctx
        .tracker
        .delta_pivot(&args.metric)
        .map_err(|e| ctx.fail(&e))?;
    let labels = ctx.tracker.column_labels(&table);

    match ctx.mode {
        OutputMode::Human => {
            println!(
                "{}",
                ctx.msg(Msg::DeltaHeader, &[("metric", args.metric.as_str())]).bold()
            );
            for warning in &table.warnings {
                ctx.warn(&warning_line(ctx, warning));
            }
            print_pivot(&table, &labels);
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "delta",
            "labels": labels,
            "table": table,
        }))?,
    }
    Ok(())
}

fn run_full(ctx: &Ctx<'_>) -> Result<(), CliError> {
    let summary = ctx.tracker.run_full().map_err(|e| ctx.fail(&e))?;

    match ctx.mode {
        OutputMode::Human => {
            if !ctx.cli.quiet {
                println!("{}", template(Msg::Title, ctx.lang).bold());
            }
            print_ingest_report(ctx, &summary.ingest);
            println!(
                "{} snapshots, {} rows, {} players",
                summary.snapshots.len(),
                summary.rows,
                summary.entities
            );
            for table in &summary.deltas {
                println!();
                println!(
                    "{}",
                    ctx.msg(Msg::DeltaHeader, &[("metric", table.metric.as_str())]).bold()
                );
                for warning in &table.warnings {
                    ctx.warn(&warning_line(ctx, warning));
                }
                print_pivot(table, &ctx.tracker.column_labels(table));
            }
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "run",
            "summary": summary,
        }))?,
    }
    ingest_outcome(ctx, &summary.ingest)
}

fn warning_line(ctx: &Ctx<'_>, warning: &DataWarning) -> String {
    match warning {
        DataWarning::MissingField { column } => ctx.msg(Msg::MissingMetric, &[("column", column.as_str())]),
        DataWarning::UnknownEntity { entity } => {
            ctx.msg(Msg::NoDataForEntity, &[("entity", entity.as_str())])
        }
        other => other.to_string(),
    }
}

// ──────────────────── config / version ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    let lang = cli.lang.unwrap_or(Language::En);
    let config_err = |e: KstError| CliError::from_kst(&e.at_stage(PipelineStage::Config), lang);

    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref()).map_err(config_err)?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Internal(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config
                    .stable_hash()
                    .map_err(|e| CliError::Internal(e.to_string()))?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                if output_mode(cli) == OutputMode::Json {
                    let payload = json!({
                        "command": "config validate",
                        "valid": false,
                        "code": e.code(),
                        "error": e.to_string(),
                    });
                    write_json_line(&payload)?;
                }
                Err(config_err(e))
            }
        },
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");
    let git_sha = option_env!("GIT_SHA").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("kst {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
                println!("git_sha: {git_sha}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "kst",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                    "git_sha": git_sha,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── rendering ────────────────────

fn print_table(table: &Table) {
    let rendered: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect();
    print_grid(&table.columns, &rendered);
}

fn print_pivot(table: &PivotTable, labels: &[String]) {
    let mut header = vec![table.id_column.clone(), table.name_column.clone()];
    header.extend(labels.iter().cloned());
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|r| {
            let mut cells = vec![r.id.to_string(), r.name.to_string()];
            cells.extend(r.cells.iter().map(|c| fmt_delta(*c)));
            cells
        })
        .collect();
    print_grid(&header, &rows);
}

fn print_grid(header: &[String], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };
    println!("{}", line(header).bold());
    for row in rows {
        println!("{}", line(row));
    }
}

#[allow(clippy::cast_possible_truncation)]
fn fmt_number(value: Option<f64>) -> String {
    match value {
        None => "-".to_string(),
        Some(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => format!("{}", v as i64),
        Some(v) => format!("{v:.2}"),
    }
}

fn fmt_delta(value: Option<f64>) -> String {
    match value {
        Some(v) if v > 0.0 => format!("+{}", fmt_number(Some(v))),
        other => fmt_number(other),
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("KST_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
