//! Persistence of run artifacts.
//!
//! A run is stored as two files under the output directory:
//! `<experiment>/<run_id>.csv` (one row per item) and
//! `<experiment>/<run_id>.summary.json` (aggregates plus every record).
//! Both names are percent-encoded with [`encode_component`]. Paths depend only
//! on the run identity, so repeating a run id overwrites and distinct ids never
//! collide.

use crate::error::{EvalError, Result};
use crate::eval::results::{RunIdentity, RunSummary};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Extension of the per-run summary file.
pub const SUMMARY_SUFFIX: &str = ".summary.json";

/// Where a run's artifacts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
    pub csv_path: PathBuf,
    pub summary_path: PathBuf,
}

/// Storage backend for finished runs.
pub trait RunStore: Send + Sync {
    fn save(&self, summary: &RunSummary) -> Result<RunArtifacts>;
}

/// Percent-encode every byte outside `[A-Za-z0-9._-]` as `%XX`.
///
/// The mapping is injective, so distinct names never share a file. `.` and
/// `..` are encoded as `%2E` sequences and the empty name becomes `%`, which
/// no non-empty input can produce.
pub fn encode_component(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_string();
    }
    if raw == "." || raw == ".." {
        return "%2E".repeat(raw.len());
    }

    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

/// Artifact paths of a run under `root`.
pub fn artifact_paths(root: &Path, identity: &RunIdentity) -> RunArtifacts {
    let dir = root.join(encode_component(&identity.experiment_name));
    let run = encode_component(&identity.run_id);
    RunArtifacts {
        csv_path: dir.join(format!("{}.csv", run)),
        summary_path: dir.join(format!("{}{}", run, SUMMARY_SUFFIX)),
    }
}

/// Writes artifacts to the local filesystem.
#[derive(Debug, Clone)]
pub struct FsRunStore {
    root: PathBuf,
}

impl FsRunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
            }
        }
        Ok(())
    }
}

impl RunStore for FsRunStore {
    fn save(&self, summary: &RunSummary) -> Result<RunArtifacts> {
        let identity = summary.identity();
        let artifacts = artifact_paths(&self.root, &identity);

        save_csv(summary, &artifacts.csv_path)?;
        save_summary(summary, &artifacts.summary_path)?;

        info!(
            csv = %artifacts.csv_path.display(),
            summary = %artifacts.summary_path.display(),
            "saved run artifacts"
        );
        Ok(artifacts)
    }
}

/// Write the per-item CSV. The header is written even for an empty run.
pub fn save_csv(summary: &RunSummary, path: &Path) -> Result<()> {
    FsRunStore::ensure_parent(path)?;

    let identity = summary.identity();
    let file = fs::File::create(path).map_err(|e| EvalError::io(path, e))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(!summary.results.is_empty())
        .from_writer(file);

    if summary.results.is_empty() {
        writer.write_record(CSV_COLUMNS)?;
    }
    for record in &summary.results {
        writer.serialize(record.csv_row(&identity))?;
    }

    writer.flush().map_err(|e| EvalError::io(path, e))?;
    Ok(())
}

/// Column order of the per-item CSV.
pub const CSV_COLUMNS: [&str; 16] = [
    "experiment_name",
    "run_id",
    "variant",
    "question",
    "answer",
    "contexts",
    "latency_ms",
    "duplicate_rate",
    "retrieval_relevance",
    "retrieval_correctness",
    "answer_grounding",
    "answer_accuracy",
    "answer_clarity",
    "overall_score",
    "ids",
    "expected_keywords",
];

/// Write the run summary as pretty JSON.
pub fn save_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    FsRunStore::ensure_parent(path)?;

    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| EvalError::Serialization(e.to_string()))?;
    fs::write(path, json).map_err(|e| EvalError::io(path, e))?;
    Ok(())
}

/// Load a summary written by [`save_summary`].
pub fn load_summary(path: &Path) -> Result<RunSummary> {
    if !path.exists() {
        return Err(EvalError::Persistence(format!(
            "No run summary at '{}'",
            path.display()
        )));
    }

    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| EvalError::Serialization(e.to_string()))
}
