//! Failure taxonomy for an extraction run.
//!
//! Only [`PipelineError::Usage`] and [`PipelineError::ImageLoad`] are fatal, and both happen
//! before any stage runs. Everything else is contained to one crop, one stage, or one artifact.

use std::path::PathBuf;

use thiserror::Error;

use crate::stage::StageKind;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Wrong argument count or a disallowed input extension.
    #[error("{0}")]
    Usage(String),

    /// The input could not be decoded into an image.
    #[error("failed to load image {}: {source:#}", path.display())]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// One detector failed to load or run.
    #[error("{stage} stage failed: {source:#}")]
    StageInference {
        stage: StageKind,
        #[source]
        source: anyhow::Error,
    },

    /// A crop rectangle had no area left after rounding and clamping.
    #[error("empty crop region at ({x}, {y}) with size {width}x{height}")]
    EmptyRegion {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },

    /// Persisting one artifact failed.
    #[error("failed to write artifact {name}: {source:#}")]
    ArtifactWrite {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// Whether this error stops the run before any stage executes.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Usage(_) | Self::ImageLoad { .. })
    }
}
