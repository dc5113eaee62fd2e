//! Detection-to-artifact pipeline.
//!
//! A decoded image is handed to a fixed sequence of fault-isolated detection stages (text,
//! face, region classifier, whole-image classifier). Each stage's observations are mapped from
//! normalized detector space into pixel crops and reports, then persisted through an
//! [`ArtifactWriter`].

/// Named outputs and the file-name contract.
pub mod artifact;
/// Concrete ONNX and Tesseract collaborators.
pub mod backends;
/// Pixel-exact cropping.
pub mod cropper;
/// Failure taxonomy.
pub mod error;
/// Normalized-box to pixel-rect conversion.
pub mod geometry;
/// Detector findings.
pub mod observation;
/// Stage orchestration.
pub mod pipeline;
/// Detector seam and fault isolation.
pub mod stage;
/// Artifact persistence.
pub mod writer;

pub use artifact::{Artifact, DetectionRecord};
pub use backends::build_stages;
pub use cropper::crop;
pub use error::PipelineError;
pub use geometry::{NormalizedBox, PixelRect, to_pixel_rect};
pub use observation::Observation;
pub use pipeline::{PipelineOrchestrator, PipelineSummary, StageReport};
pub use stage::{DetectionStage, Detector, StageKind};
pub use writer::{ArtifactWriter, DirectoryWriter};
