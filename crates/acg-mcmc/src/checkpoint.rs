use std::fs;
use std::path::{Path, PathBuf};

use acg_core::errors::{AcgError, ErrorInfo};
use acg_graph::{ConversionGraph, GraphRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;

/// Serializable snapshot of a chain between two steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPayload {
    /// Number of steps completed when the checkpoint was written.
    pub step: usize,
    /// Wall-clock time of the write, RFC 3339.
    pub created_at: String,
    /// Master seed used to derive the per-step substreams.
    pub master_seed: u64,
    /// Configuration snapshot associated with the run.
    pub config: RunConfig,
    /// Current state of the chain.
    pub graph: GraphRecord,
    /// Log prior of `graph`.
    pub log_p: f64,
}

impl CheckpointPayload {
    /// Captures the chain state after `step` completed steps.
    pub fn new(
        step: usize,
        config: &RunConfig,
        master_seed: u64,
        acg: &ConversionGraph,
        log_p: f64,
    ) -> Self {
        Self {
            step,
            created_at: Utc::now().to_rfc3339(),
            master_seed,
            config: config.clone(),
            graph: GraphRecord::from_graph(acg),
            log_p,
        }
    }

    /// Time the checkpoint was written.
    pub fn created_at(&self) -> Result<DateTime<Utc>, AcgError> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|time| time.with_timezone(&Utc))
            .map_err(|err| {
                AcgError::Serde(
                    ErrorInfo::new("checkpoint-timestamp", err.to_string())
                        .with_context("created_at", &self.created_at),
                )
            })
    }

    /// Rebuilds the checkpointed graph.
    pub fn restore_graph(&self) -> Result<ConversionGraph, AcgError> {
        self.graph.clone().into_graph()
    }

    /// Restores the payload from disk.
    pub fn load(path: &Path) -> Result<Self, AcgError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            AcgError::Serde(
                ErrorInfo::new("checkpoint-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            AcgError::Serde(
                ErrorInfo::new("checkpoint-parse", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }

    /// Writes the payload to disk.
    pub fn store(&self, path: &Path) -> Result<(), AcgError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                AcgError::Serde(
                    ErrorInfo::new("checkpoint-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            AcgError::Serde(
                ErrorInfo::new("checkpoint-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| {
            AcgError::Serde(
                ErrorInfo::new("checkpoint-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

/// Checkpoint file for `step` completed steps under `root`.
pub fn checkpoint_path(root: &Path, step: usize) -> PathBuf {
    root.join(format!("ckpt_{step:06}.json"))
}
