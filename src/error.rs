//! Error taxonomy for the sync pipeline.
//!
//! Only genuinely fatal conditions become `SyncError`. Skippable-missing
//! domain specs, missing prior snapshots, and below-threshold matches are
//! ordinary data states handled by the components that encounter them.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Non-404 failure fetching a required document. Aborts the stage.
    #[error("transport failure fetching {what} for release {version}: {message}")]
    Transport {
        what: String,
        version: String,
        message: String,
    },

    /// A stage was invoked without a prerequisite persisted artifact.
    #[error("missing prerequisite artifact {path:?}: run `{produced_by}` first")]
    MissingArtifact { path: PathBuf, produced_by: String },

    /// A persisted artifact exists but cannot be decoded.
    #[error("artifact {path:?} is corrupt: {message}")]
    CorruptArtifact { path: PathBuf, message: String },

    /// A provider spec document decoded but lacks the structure we read.
    #[error("malformed spec document for domain {domain}: {message}")]
    MalformedSpec { domain: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Coarse category used in logs and exit messages.
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::Transport { .. } => "transport",
            SyncError::MissingArtifact { .. } => "missing_artifact",
            SyncError::CorruptArtifact { .. } => "corrupt_artifact",
            SyncError::MalformedSpec { .. } => "malformed_spec",
            SyncError::Config(_) => "config",
            SyncError::Io(_) => "io",
            SyncError::Other(_) => "internal",
        }
    }

    pub fn transport(
        what: impl Into<String>,
        version: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        SyncError::Transport {
            what: what.into(),
            version: version.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
