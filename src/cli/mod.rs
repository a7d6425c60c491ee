//! airq command-line interface
//!
//! Sub-commands for unifying sources, benchmarking and training models, and
//! predicting from or inspecting stored artifacts.

use clap::{Parser, Subcommand};
use colored::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::data::{DropCounts, JoinReport};
use crate::export::ArtifactMetadata;
use crate::inference::{reconcile_with_report, PredictionRequest, Predictor, ReconcilePolicy};
use crate::pipeline::{Pipeline, TaskOutcome};
use crate::training::{BenchmarkReport, ModelMetrics, ModelSelector, TaskType};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_fail(msg: &str) {
    println!("  {} {}", "✗".red(), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "airq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Air-quality data unification and model benchmarking")]
#[command(long_about = None)]
pub struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Normalize the raw sources and write the unified table
    Unify,

    /// Cross-validate every candidate for one task without saving
    Benchmark {
        /// Task name from the configuration
        #[arg(short, long)]
        task: String,

        /// Also write the report as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Benchmark, select and save models from the unified table
    Train {
        /// Only this task (all configured tasks when omitted)
        #[arg(short, long)]
        task: Option<String>,
    },

    /// Predict with a stored model
    Predict {
        /// Artifact name
        #[arg(short, long)]
        model: String,

        /// Feature value as name=value; repeatable
        #[arg(short, long = "feature", value_parser = parse_feature)]
        features: Vec<(String, f64)>,

        /// JSON file with a name -> value object
        #[arg(long)]
        json: Option<PathBuf>,

        /// Refuse requests that lack schema features
        #[arg(long)]
        strict: bool,
    },

    /// Unify, then train every configured task
    Run,

    /// Show the metadata of stored models
    Inspect {
        /// Artifact name (lists every artifact when omitted)
        #[arg(short, long)]
        model: Option<String>,
    },
}

fn parse_feature(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value.trim()))?;
    Ok((name.trim().to_string(), value))
}

/// Configuration from `path` (or defaults) with environment overrides applied
pub fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(p) => PipelineConfig::from_file(p)?,
        None => PipelineConfig::default(),
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_unify(config: PipelineConfig) -> anyhow::Result<()> {
    section("Unify");
    let pipeline = Pipeline::new(config)?;

    step_run("Loading, cleaning and joining sources");
    let start = Instant::now();
    let outcome = pipeline.unify()?;
    step_done(&format!("{:.2?}", start.elapsed()));

    print_drops(&outcome.drops);
    for name in &outcome.skipped {
        println!("  {} {}", dim("skipped"), muted(name));
    }
    print_join(&outcome.report);
    println!();
    step_ok(&format!(
        "{} rows × {} cols written to {}",
        outcome.table.height(),
        outcome.table.width(),
        outcome.unified_path.display()
    ));
    Ok(())
}

pub fn cmd_benchmark(config: PipelineConfig, task_name: &str, json: Option<&Path>) -> anyhow::Result<()> {
    section("Benchmark");
    let task = config
        .task(task_name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("unknown task '{}'", task_name))?;
    let pipeline = Pipeline::new(config)?;

    step_run("Loading unified table");
    let table = pipeline.load_unified()?;
    step_done(&format!("{} rows × {} cols", table.height(), table.width()));

    step_run(&format!("Cross-validating candidates for {}", task.name));
    let start = Instant::now();
    let run = pipeline.benchmark(&table, &task)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    let report = run.report();
    print_benchmark(&report);

    match ModelSelector::rank(&run) {
        Ok(winner) => step_ok(&format!("best candidate: {}", winner.candidate.bold())),
        Err(e) => step_fail(&e.to_string()),
    }

    if let Some(path) = json {
        fs::write(path, report.to_json()?)?;
        step_ok(&format!("report written to {}", path.display()));
    }
    Ok(())
}

pub fn cmd_train(config: PipelineConfig, task_name: Option<&str>) -> anyhow::Result<()> {
    section("Train");
    let tasks = match task_name {
        Some(name) => vec![config
            .task(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown task '{}'", name))?],
        None => config.tasks.clone(),
    };
    let pipeline = Pipeline::new(config)?;

    step_run("Loading unified table");
    let table = pipeline.load_unified()?;
    step_done(&format!("{} rows × {} cols", table.height(), table.width()));

    let mut failures = 0;
    for task in &tasks {
        match pipeline.train_task(&table, task) {
            Ok(outcome) => print_task_outcome(&outcome),
            Err(e) => {
                failures += 1;
                step_fail(&format!("{}: {}", task.name, e));
            }
        }
    }
    if failures == tasks.len() {
        anyhow::bail!("no model could be trained");
    }
    Ok(())
}

pub fn cmd_run(config: PipelineConfig) -> anyhow::Result<()> {
    section("Run");
    let pipeline = Pipeline::new(config)?;

    step_run("Unifying sources");
    let start = Instant::now();
    let unification = pipeline.unify()?;
    step_done(&format!(
        "{} rows × {} cols in {:.2?}",
        unification.table.height(),
        unification.table.width(),
        start.elapsed()
    ));
    print_drops(&unification.drops);
    print_join(&unification.report);

    let results = pipeline.train_all(&unification.table);
    let mut succeeded = 0;
    for (name, result) in &results {
        match result {
            Ok(outcome) => {
                succeeded += 1;
                print_task_outcome(outcome);
            }
            Err(e) => step_fail(&format!("{}: {}", name, e)),
        }
    }

    println!();
    println!(
        "  {} {} of {} tasks produced a model",
        if succeeded == results.len() { ok("●") } else { "●".yellow() },
        succeeded,
        results.len()
    );
    Ok(())
}

pub fn cmd_predict(
    config: PipelineConfig,
    model: &str,
    features: &[(String, f64)],
    json: Option<&Path>,
    strict: bool,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(config)?;
    let policy = if strict { ReconcilePolicy::Strict } else { ReconcilePolicy::Permissive };
    let predictor = Predictor::from_store(pipeline.store(), model)?.with_policy(policy);

    let mut request: PredictionRequest = match json {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => PredictionRequest::new(),
    };
    request.extend(features.iter().cloned());

    let report = reconcile_with_report(&request, predictor.schema());
    let prediction = predictor.predict(&request)?;

    section("Prediction");
    kv("model", model);
    kv("task", &predictor.model().task_type.to_string());
    if !report.filled.is_empty() {
        kv("zero-filled", &report.filled.join(", "));
    }
    if !report.ignored.is_empty() {
        kv("ignored", &report.ignored.join(", "));
    }
    println!();
    println!("  {} {}", accent("→"), prediction.to_string().bold());
    Ok(())
}

pub fn cmd_inspect(config: PipelineConfig, model: Option<&str>) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(config)?;
    let store = pipeline.store();

    match model {
        Some(name) => print_metadata(&store.metadata(name)?),
        None => {
            section("Artifacts");
            let names = store.list()?;
            if names.is_empty() {
                println!("  {}", muted("no artifacts stored"));
            }
            for name in names {
                match store.metadata(&name) {
                    Ok(meta) => println!(
                        "  {:<24} {:<16} {}",
                        name.white(),
                        meta.candidate,
                        dim(&meta.created_at.format("%Y-%m-%d %H:%M:%S").to_string())
                    ),
                    Err(e) => println!("  {:<24} {}", name.white(), format!("err: {}", e).red()),
                }
            }
        }
    }
    Ok(())
}

// ─── Rendering ─────────────────────────────────────────────────────────────────

fn print_drops(drops: &[(String, DropCounts)]) {
    println!();
    println!("  {:<20} {:>8} {:>8} {:>8} {:>10}", muted("Source"), muted("In"), muted("Out"), muted("Dropped"), muted("Hour→0"));
    println!("  {}", dim(&"─".repeat(58)));
    for (name, counts) in drops {
        println!(
            "  {:<20} {:>8} {:>8} {:>8} {:>10}",
            name,
            counts.rows_in,
            counts.rows_out,
            counts.total_dropped(),
            counts.hours_defaulted
        );
        for (violation, n) in &counts.by_violation {
            println!("  {:<20} {}", "", dim(&format!("{}: {}", violation, n)));
        }
    }
}

fn print_join(report: &JoinReport) {
    println!();
    println!("  {:<20} {:>8} {:>8} {:>8} {:>8}", muted("Join"), muted("Kind"), muted("Before"), muted("After"), muted("Dups"));
    println!("  {}", dim(&"─".repeat(58)));
    for step in &report.steps {
        println!(
            "  {:<20} {:>8} {:>8} {:>8} {:>8}",
            step.source,
            format!("{:?}", step.kind).to_lowercase(),
            step.rows_before,
            step.rows_after,
            step.duplicates_dropped
        );
    }
}

fn print_benchmark(report: &BenchmarkReport) {
    println!();
    println!(
        "  {:<26} {:>20} {:>20}",
        muted("Model"),
        muted(&report.primary_metric.to_string()),
        muted(&report.secondary_metric.to_string())
    );
    println!("  {}", dim(&"─".repeat(68)));
    for trial in &report.trials {
        match (&trial.primary, &trial.secondary) {
            (Some(p), Some(s)) => println!(
                "  {:<26} {:>20} {:>20}",
                trial.candidate,
                format!("{:.4} ({:.4})", p.mean, p.std),
                format!("{:.4} ({:.4})", s.mean, s.std)
            ),
            _ => println!(
                "  {:<26} {}",
                trial.candidate,
                format!("err: {}", trial.error.as_deref().unwrap_or("unknown")).red()
            ),
        }
    }
    println!("  {}", dim(&"─".repeat(68)));
}

fn print_task_outcome(outcome: &TaskOutcome) {
    print_benchmark(&outcome.report);
    let model = &outcome.model;
    step_ok(&format!(
        "{} → {} ({} {:.4}, hold-out {})",
        outcome.handle.name.bold(),
        model.candidate,
        model.selection.metric,
        model.selection.cv_mean,
        format_holdout(model.task_type, &model.holdout)
    ));
    println!("    {}", dim(&outcome.handle.model_path.display().to_string()));
}

fn format_holdout(task_type: TaskType, metrics: &ModelMetrics) -> String {
    let metric = task_type.primary_metric();
    match metric.extract(metrics) {
        Some(v) => format!("{} {:.4}", metric, v),
        None => "n/a".to_string(),
    }
}

fn print_metadata(meta: &ArtifactMetadata) {
    section(&format!("Artifact {}", meta.name));
    kv("created", &meta.created_at.to_rfc3339());
    kv("task", &meta.task_type.to_string());
    kv("target", &meta.target_column);
    kv("candidate", &meta.candidate);
    kv("hyperparams", &crate::training::registry::format_params(&meta.hyperparams));
    kv(
        "selection",
        &format!("{} {:.4} ({:.4})", meta.selection.metric, meta.selection.cv_mean, meta.selection.cv_std),
    );
    kv(
        "secondary",
        &format!("{} {:.4} ({:.4})", meta.cv_secondary.metric, meta.cv_secondary.mean, meta.cv_secondary.std),
    );
    kv("hold-out", &format_holdout(meta.task_type, &meta.holdout));
    kv("train rows", &meta.train_rows.to_string());
    kv("checksum", &format!("{:016x}", meta.checksum));
    kv("format", &format!("v{} (airq {})", meta.format_version, meta.crate_version));

    section("Schema");
    for (i, feature) in meta.schema.iter().enumerate() {
        println!("  {:>3}  {}", dim(&i.to_string()), feature);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature() {
        assert_eq!(parse_feature("flujo=120").unwrap(), ("flujo".to_string(), 120.0));
        assert_eq!(parse_feature(" hora = 7.5 ").unwrap(), ("hora".to_string(), 7.5));
        assert!(parse_feature("flujo").is_err());
        assert!(parse_feature("flujo=alto").is_err());
    }

    #[test]
    fn test_cli_parses_predict() {
        let cli = Cli::try_parse_from([
            "airq", "predict", "--model", "modelo_regresion", "-f", "flujo=10", "-f", "hora=3",
        ])
        .unwrap();
        match cli.command {
            Commands::Predict { model, features, strict, .. } => {
                assert_eq!(model, "modelo_regresion");
                assert_eq!(features.len(), 2);
                assert!(!strict);
            }
            _ => panic!("expected predict"),
        }
    }
}
