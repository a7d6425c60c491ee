//! On-disk store for selected models
//!
//! Each artifact is a pair of files in the store directory:
//! - `<name>.model`: bincode envelope holding a magic tag, format version,
//!   metadata, the serialized [`TrainedModel`] and an FNV-1a checksum
//! - `<name>.meta.json`: the same metadata as a readable sidecar
//!
//! Both are written to a temporary file, synced, then renamed into place, so
//! a reader sees either the previous artifact or the new one.

use crate::error::{PipelineError, Result};
use crate::training::{
    CandidateKind, CvScore, HyperParams, ModelMetrics, SelectionMetric, TaskType, TrainedModel,
};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Leading bytes of every `.model` file
pub const MAGIC: [u8; 4] = *b"AQMD";

/// Current envelope layout
pub const FORMAT_VERSION: u32 = 1;

const MODEL_EXT: &str = "model";
const META_SUFFIX: &str = ".meta.json";

/// Descriptive record stored next to every artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub task_type: TaskType,
    pub candidate: String,
    pub kind: CandidateKind,
    pub target_column: String,
    /// Ordered feature names the model expects
    pub schema: Vec<String>,
    pub hyperparams: HyperParams,
    pub selection: SelectionMetric,
    pub cv_secondary: CvScore,
    pub holdout: ModelMetrics,
    pub train_rows: usize,
    /// FNV-1a of the model payload
    pub checksum: u64,
    pub format_version: u32,
    pub crate_version: String,
}

impl ArtifactMetadata {
    fn describe(name: &str, model: &TrainedModel, checksum: u64) -> Self {
        Self {
            name: name.to_string(),
            created_at: Utc::now(),
            task_type: model.task_type,
            candidate: model.candidate.clone(),
            kind: model.kind,
            target_column: model.target_column.clone(),
            schema: model.schema.clone(),
            hyperparams: model.hyperparams.clone(),
            selection: model.selection.clone(),
            cv_secondary: model.cv_secondary.clone(),
            holdout: model.holdout.clone(),
            train_rows: model.train_rows,
            checksum,
            format_version: FORMAT_VERSION,
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    magic: [u8; 4],
    format_version: u32,
    metadata: ArtifactMetadata,
    payload: Vec<u8>,
    checksum: u64,
}

/// Where a saved artifact landed
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactHandle {
    pub name: String,
    pub model_path: PathBuf,
    pub metadata_path: PathBuf,
    pub checksum: u64,
    pub created_at: DateTime<Utc>,
}

/// FNV-1a 64-bit hash
pub fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 14695981039346656037;
    const PRIME: u64 = 1099511628211;
    bytes.iter().fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}

/// Directory of named model artifacts.
///
/// Saves under the same name are serialized by a per-name lock; loads take the
/// read side and proceed concurrently with each other.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl ArtifactStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, MODEL_EXT))
    }

    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", name, META_SUFFIX))
    }

    fn lock_for(&self, name: &str) -> Arc<RwLock<()>> {
        self.locks
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Persist `model` under `name`, replacing any previous artifact
    pub fn save(&self, model: &TrainedModel, name: &str) -> Result<ArtifactHandle> {
        validate_name(name)?;

        let payload = bincode::serialize(model)?;
        let checksum = fnv1a(&payload);
        let metadata = ArtifactMetadata::describe(name, model, checksum);
        let envelope = Envelope {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            metadata: metadata.clone(),
            payload,
            checksum,
        };
        let model_bytes = bincode::serialize(&envelope)?;
        let meta_bytes = serde_json::to_vec_pretty(&metadata)?;

        let model_path = self.model_path(name);
        let metadata_path = self.metadata_path(name);

        let lock = self.lock_for(name);
        let _guard = lock.write();
        write_atomic(&model_path, &model_bytes)?;
        write_atomic(&metadata_path, &meta_bytes)?;

        info!(
            artifact = %name,
            candidate = %model.candidate,
            bytes = model_bytes.len(),
            checksum = format!("{:016x}", checksum),
            "Saved model artifact"
        );

        Ok(ArtifactHandle {
            name: name.to_string(),
            model_path,
            metadata_path,
            checksum,
            created_at: metadata.created_at,
        })
    }

    /// Load and verify the artifact stored under `name`
    pub fn load(&self, name: &str) -> Result<TrainedModel> {
        validate_name(name)?;
        let path = self.model_path(name);

        let lock = self.lock_for(name);
        let _guard = lock.read();

        let bytes = read_existing(&path, name)?;
        let envelope: Envelope = bincode::deserialize(&bytes)
            .map_err(|e| PipelineError::SerializationError(format!("artifact '{}' is corrupt: {}", name, e)))?;

        if envelope.magic != MAGIC {
            return Err(PipelineError::SerializationError(format!(
                "artifact '{}' has an unknown magic tag",
                name
            )));
        }
        if envelope.format_version != FORMAT_VERSION {
            return Err(PipelineError::SerializationError(format!(
                "artifact '{}' has format version {}, expected {}",
                name, envelope.format_version, FORMAT_VERSION
            )));
        }
        let actual = fnv1a(&envelope.payload);
        if actual != envelope.checksum || actual != envelope.metadata.checksum {
            return Err(PipelineError::SerializationError(format!(
                "artifact '{}' failed checksum verification",
                name
            )));
        }

        let model: TrainedModel = bincode::deserialize(&envelope.payload)?;
        if model.schema != envelope.metadata.schema {
            return Err(PipelineError::SerializationError(format!(
                "artifact '{}' schema does not match its metadata",
                name
            )));
        }

        debug!(artifact = %name, features = model.schema.len(), "Loaded model artifact");
        Ok(model)
    }

    /// Read the JSON sidecar of `name`
    pub fn metadata(&self, name: &str) -> Result<ArtifactMetadata> {
        validate_name(name)?;
        let lock = self.lock_for(name);
        let _guard = lock.read();

        let path = self.metadata_path(name);
        if !path.exists() {
            return Err(PipelineError::ArtifactNotFound(name.to_string()));
        }
        let file = File::open(&path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.model_path(name).is_file()
    }

    /// Names of every stored artifact, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(MODEL_EXT) {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if !stem.starts_with('.') => names.push(stem.to_string()),
                _ => {}
            }
        }
        names.sort();
        Ok(names)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PipelineError::InvalidInput("artifact name is empty".to_string()));
    }
    if name.starts_with('.') || name.contains(['/', '\\', '\0']) {
        return Err(PipelineError::InvalidInput(format!(
            "artifact name '{}' is not a plain file name",
            name
        )));
    }
    Ok(())
}

fn read_existing(path: &Path, name: &str) -> Result<Vec<u8>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::ArtifactNotFound(name.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Write `bytes` to a temporary file beside `path`, sync, then rename it over `path`.
///
/// The temporary file is removed if any step fails before the rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PipelineError::IoError(e.error))?;
    Ok(())
}
