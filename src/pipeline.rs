//! End-to-end run: load, normalize, unify, benchmark, select, save
//!
//! [`Pipeline`] carries the configuration and the artifact store between the
//! stages. Failures during unification abort the run; a failing task is
//! logged and skipped so the other tasks still produce artifacts.

use crate::config::{PipelineConfig, SourceConfig};
use crate::data::{
    normalize, unify, DataLoader, DataSaver, DropCounts, JoinReport, NormalizationRules,
    Source, SourceRole,
};
use crate::error::{PipelineError, Result};
use crate::export::{ArtifactHandle, ArtifactStore};
use crate::training::{BenchmarkReport, ModelSelector, TaskSpec, TrainedModel, TrainingHarness};
use polars::prelude::DataFrame;
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

/// One source after normalization
#[derive(Debug, Clone)]
pub struct CleanedSource {
    pub name: String,
    pub role: SourceRole,
    pub frame: DataFrame,
    pub drops: DropCounts,
}

/// Result of the data half of a run
#[derive(Debug, Clone)]
pub struct UnificationOutcome {
    pub table: DataFrame,
    pub report: JoinReport,
    /// Per source, in registration order
    pub drops: Vec<(String, DropCounts)>,
    /// Optional sources whose file was absent
    pub skipped: Vec<String>,
    pub unified_path: PathBuf,
}

/// A benchmarked, selected and saved model
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub report: BenchmarkReport,
    pub model: TrainedModel,
    pub handle: ArtifactHandle,
}

#[derive(Debug)]
pub struct RunSummary {
    pub unification: UnificationOutcome,
    /// Per configured task, in order
    pub tasks: Vec<(String, Result<TaskOutcome>)>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.tasks.iter().filter(|(_, r)| r.is_ok()).count()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    loader: DataLoader,
    store: ArtifactStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let store = ArtifactStore::new(&config.models_dir)?;
        Ok(Self {
            config,
            loader: DataLoader::new(),
            store,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Read every configured source file; absent optional files are skipped
    pub fn load_sources(&self) -> Result<(Vec<(SourceConfig, DataFrame)>, Vec<String>)> {
        let mut loaded = Vec::new();
        let mut skipped = Vec::new();

        for source in &self.config.sources {
            let path = self.config.source_path(source);
            if !path.is_file() {
                match source.role {
                    SourceRole::Optional => {
                        info!(source = %source.name, path = %path.display(), "Optional source absent, skipping");
                        skipped.push(source.name.clone());
                        continue;
                    }
                    SourceRole::Required => {
                        return Err(PipelineError::DataError(format!(
                            "required source '{}' not found at {}",
                            source.name,
                            path.display()
                        )))
                    }
                }
            }
            let frame = self.loader.load_auto(&path)?;
            info!(source = %source.name, rows = frame.height(), columns = frame.width(), "Loaded source");
            loaded.push((source.clone(), frame));
        }
        Ok((loaded, skipped))
    }

    /// Normalize every source in parallel, keeping registration order
    pub fn normalize_sources(&self, raw: Vec<(SourceConfig, DataFrame)>) -> Result<Vec<CleanedSource>> {
        let rules = &self.config.normalization;
        raw.into_par_iter()
            .map(|(source, raw)| {
                let (frame, drops) = normalize(&source.name, &raw, rules)?;
                Ok(CleanedSource {
                    name: source.name,
                    role: source.role,
                    frame,
                    drops,
                })
            })
            .collect()
    }

    /// Load, clean and join every source, writing the cleaned files and the unified table
    pub fn unify(&self) -> Result<UnificationOutcome> {
        let start = Instant::now();
        let (raw, skipped) = self.load_sources()?;
        let cleaned = self.normalize_sources(raw)?;

        fs::create_dir_all(&self.config.processed_dir)?;
        for source in &cleaned {
            let path = self.config.processed_dir.join(format!("{}_clean.csv", source.name));
            DataSaver::save_csv(&source.frame, &path)?;
        }

        let drops = cleaned.iter().map(|s| (s.name.clone(), s.drops.clone())).collect();
        let sources: Vec<Source> = cleaned
            .into_iter()
            .map(|s| Source::new(s.name, s.frame, s.role))
            .collect();
        let (table, report) = unify(&sources)?;

        let unified_path = self.config.unified_path();
        DataSaver::save_csv(&table, &unified_path)?;
        info!(
            rows = table.height(),
            columns = table.width(),
            path = %unified_path.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Unified table written"
        );

        Ok(UnificationOutcome {
            table,
            report,
            drops,
            skipped,
            unified_path,
        })
    }

    /// Read a previously written unified table, re-typing its cells
    pub fn load_unified(&self) -> Result<DataFrame> {
        let path = self.config.unified_path();
        if !path.is_file() {
            return Err(PipelineError::DataError(format!(
                "unified table not found at {}; run unification first",
                path.display()
            )));
        }
        let raw = self.loader.load_csv(&path)?;
        // range filters already ran per source; left-joined gaps are legitimately null
        let retype = NormalizationRules {
            humidity_columns: Vec::new(),
            pollutant_columns: Vec::new(),
            ..self.config.normalization.clone()
        };
        let (table, _) = normalize("unified", &raw, &retype)?;
        Ok(table)
    }

    /// Benchmark the candidates of one task
    pub fn benchmark(&self, table: &DataFrame, task: &TaskSpec) -> Result<crate::training::BenchmarkRun> {
        TrainingHarness::new(self.config.training.clone()).benchmark(table, task)
    }

    /// Benchmark, select and save the model for one task
    pub fn train_task(&self, table: &DataFrame, task: &TaskSpec) -> Result<TaskOutcome> {
        let run = self.benchmark(table, task)?;
        let model = ModelSelector::select(&run)?;
        let handle = self.store.save(&model, &task.name)?;
        Ok(TaskOutcome {
            report: run.report(),
            model,
            handle,
        })
    }

    /// Train every configured task on `table`; task failures are collected, not raised
    pub fn train_all(&self, table: &DataFrame) -> Vec<(String, Result<TaskOutcome>)> {
        self.config
            .tasks
            .iter()
            .map(|task| {
                let outcome = self.train_task(table, task);
                if let Err(e) = &outcome {
                    error!(task = %task.name, error = %e, "Task failed, skipping");
                }
                (task.name.clone(), outcome)
            })
            .collect()
    }

    /// Full run
    pub fn run(&self) -> Result<RunSummary> {
        let unification = self.unify()?;
        let tasks = self.train_all(&unification.table);

        let summary = RunSummary { unification, tasks };
        if summary.succeeded() < summary.tasks.len() {
            warn!(
                succeeded = summary.succeeded(),
                total = summary.tasks.len(),
                "Some tasks produced no model"
            );
        }
        Ok(summary)
    }
}
