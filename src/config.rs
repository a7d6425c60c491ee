//! Pipeline configuration
//!
//! Defaults describe the standard layout: three required sources (traffic,
//! pollutants, weather), two optional ones, and a regression plus a
//! classification task on `pm2_5`. A TOML file may override any part, and
//! `AIRQ_RAW_DIR`, `AIRQ_PROCESSED_DIR`, `AIRQ_MODELS_DIR` override the
//! directories.

use crate::data::{NormalizationRules, SourceRole};
use crate::error::{PipelineError, Result};
use crate::training::{TaskSpec, TrainingConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_RAW_DIR: &str = "AIRQ_RAW_DIR";
pub const ENV_PROCESSED_DIR: &str = "AIRQ_PROCESSED_DIR";
pub const ENV_MODELS_DIR: &str = "AIRQ_MODELS_DIR";

/// File name of the unified table inside `processed_dir`
pub const UNIFIED_FILE: &str = "TablaUnificada.csv";

/// One input file and its join role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Path relative to `raw_dir`, or absolute
    pub file: PathBuf,
    pub role: SourceRole,
}

impl SourceConfig {
    pub fn required(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            role: SourceRole::Required,
        }
    }

    pub fn optional(name: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            role: SourceRole::Optional,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    /// Cleaned sources and the unified table are written here
    pub processed_dir: PathBuf,
    pub models_dir: PathBuf,
    /// In registration order
    pub sources: Vec<SourceConfig>,
    pub normalization: NormalizationRules,
    pub training: TrainingConfig,
    pub tasks: Vec<TaskSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            models_dir: PathBuf::from("models"),
            sources: vec![
                SourceConfig::required("flujo_vehicular", "flujo_vehicular.csv"),
                SourceConfig::required("contaminantes", "contaminantes.csv"),
                SourceConfig::required("clima", "clima.csv"),
                SourceConfig::optional("air_quality", "air_quality_clean.csv"),
                SourceConfig::optional("clima_historico", "clima_historico.csv"),
            ],
            normalization: NormalizationRules::default(),
            training: TrainingConfig::default(),
            tasks: vec![
                TaskSpec::regression("modelo_regresion", "pm2_5"),
                TaskSpec::classification("modelo_clasificacion", "pm2_5"),
            ],
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PipelineError::SerializationError(e.to_string()))
    }

    /// Apply `AIRQ_*_DIR` from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply directory overrides from any key lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for (key, slot) in [
            (ENV_RAW_DIR, &mut self.raw_dir),
            (ENV_PROCESSED_DIR, &mut self.processed_dir),
            (ENV_MODELS_DIR, &mut self.models_dir),
        ] {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = PathBuf::from(value);
            }
        }
        self
    }

    pub fn with_raw_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw_dir = dir.into();
        self
    }

    pub fn with_processed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.processed_dir = dir.into();
        self
    }

    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceConfig>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<TaskSpec>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn source_path(&self, source: &SourceConfig) -> PathBuf {
        if source.file.is_absolute() {
            source.file.clone()
        } else {
            self.raw_dir.join(&source.file)
        }
    }

    pub fn unified_path(&self) -> PathBuf {
        self.processed_dir.join(UNIFIED_FILE)
    }

    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        self.training.validate()?;

        if self.tasks.is_empty() {
            return Err(PipelineError::ConfigError("no tasks configured".to_string()));
        }
        let mut task_names = HashSet::new();
        for task in &self.tasks {
            if !task_names.insert(task.name.as_str()) {
                return Err(PipelineError::ConfigError(format!(
                    "duplicate task name '{}'",
                    task.name
                )));
            }
        }

        if !self.sources.iter().any(|s| s.role == SourceRole::Required) {
            return Err(PipelineError::ConfigError(
                "at least one required source must be configured".to_string(),
            ));
        }
        let mut source_names = HashSet::new();
        for source in &self.sources {
            if !source_names.insert(source.name.as_str()) {
                return Err(PipelineError::ConfigError(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::TaskType;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sources.len(), 5);
        assert_eq!(
            config.sources.iter().filter(|s| s.role == SourceRole::Required).count(),
            3
        );
        assert_eq!(config.task("modelo_clasificacion").unwrap().task_type, TaskType::Classification);
        assert_eq!(config.unified_path(), PathBuf::from("data/processed/TablaUnificada.csv"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            models_dir = "/tmp/modelos"

            [training]
            n_folds = 3

            [[tasks]]
            name = "solo_regresion"
            task_type = "regression"
            target_column = "pm10"
            "#,
        )
        .unwrap();
        assert_eq!(config.models_dir, PathBuf::from("/tmp/modelos"));
        assert_eq!(config.training.n_folds, 3);
        assert_eq!(config.training.random_seed, 42);
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.sources.len(), 5);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = PipelineConfig::default();
        let parsed = PipelineConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_overrides() {
        let config = PipelineConfig::default().with_overrides(|key| match key {
            ENV_MODELS_DIR => Some("/srv/models".to_string()),
            ENV_RAW_DIR => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.models_dir, PathBuf::from("/srv/models"));
        assert_eq!(config.raw_dir, PathBuf::from("data/raw"));
    }

    #[test]
    fn test_validation_failures() {
        let bad_folds = PipelineConfig::default().with_training(TrainingConfig::default().with_n_folds(1));
        assert!(matches!(bad_folds.validate(), Err(PipelineError::ConfigError(_))));

        let no_tasks = PipelineConfig::default().with_tasks(Vec::new());
        assert!(matches!(no_tasks.validate(), Err(PipelineError::ConfigError(_))));

        let dup = PipelineConfig::default().with_sources(vec![
            SourceConfig::required("a", "a.csv"),
            SourceConfig::optional("a", "b.csv"),
        ]);
        assert!(matches!(dup.validate(), Err(PipelineError::ConfigError(_))));

        let holdout = PipelineConfig::default()
            .with_training(TrainingConfig::default().with_holdout_fraction(1.0));
        assert!(matches!(holdout.validate(), Err(PipelineError::ConfigError(_))));
    }
}
