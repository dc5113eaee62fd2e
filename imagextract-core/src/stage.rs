//! Fault-isolated wrappers around the inference collaborators.
//!
//! A [`DetectionStage`] owns one [`Detector`] and guarantees that nothing the detector does can
//! reach the orchestrator: load failures, returned errors and panics all become "zero
//! observations" plus a warning naming the stage.

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
};

use image::DynamicImage;
use log::{debug, warn};

use crate::{error::PipelineError, observation::Observation};
use imagextract_utils::timing_guard;

/// The four detector kinds, declared in pipeline execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageKind {
    Text,
    Face,
    RegionClassifier,
    WholeImageClassifier,
}

impl StageKind {
    /// Every stage kind in execution order.
    pub const ORDER: [StageKind; 4] = [
        StageKind::Text,
        StageKind::Face,
        StageKind::RegionClassifier,
        StageKind::WholeImageClassifier,
    ];

    /// Identifier used in log labels.
    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Face => "face",
            Self::RegionClassifier => "region_classifier",
            Self::WholeImageClassifier => "whole_image_classifier",
        }
    }

    /// Human-facing name used in progress output.
    pub fn title(self) -> &'static str {
        match self {
            Self::Text => "OCR",
            Self::Face => "Face Detection",
            Self::RegionClassifier => "YOLO Object Detection",
            Self::WholeImageClassifier => "RESNET Object Detection",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Face => "face",
            Self::RegionClassifier => "region classifier",
            Self::WholeImageClassifier => "whole-image classifier",
        })
    }
}

/// An inference collaborator: given a decoded image, report what it sees.
///
/// Implementations block until inference completes.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<Observation>>;
}

impl<F> Detector for F
where
    F: Fn(&DynamicImage) -> anyhow::Result<Vec<Observation>> + Send + Sync,
{
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<Observation>> {
        self(image)
    }
}

enum Backend {
    Ready(Box<dyn Detector>),
    Unavailable(anyhow::Error),
}

/// One detector kind plus its collaborator, or the reason the collaborator could not be built.
pub struct DetectionStage {
    kind: StageKind,
    backend: Backend,
}

impl fmt::Debug for DetectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.backend {
            Backend::Ready(_) => "ready",
            Backend::Unavailable(_) => "unavailable",
        };
        f.debug_struct("DetectionStage")
            .field("kind", &self.kind)
            .field("backend", &state)
            .finish()
    }
}

impl DetectionStage {
    pub fn new<D>(kind: StageKind, detector: D) -> Self
    where
        D: Detector + 'static,
    {
        Self {
            kind,
            backend: Backend::Ready(Box::new(detector)),
        }
    }

    /// A stage whose collaborator failed to load. Running it yields nothing.
    pub fn unavailable(kind: StageKind, reason: anyhow::Error) -> Self {
        Self {
            kind,
            backend: Backend::Unavailable(reason),
        }
    }

    /// Wrap the outcome of constructing a collaborator.
    pub fn from_result<D>(kind: StageKind, detector: anyhow::Result<D>) -> Self
    where
        D: Detector + 'static,
    {
        match detector {
            Ok(detector) => Self::new(kind, detector),
            Err(err) => Self::unavailable(kind, err),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn is_available(&self) -> bool {
        matches!(self.backend, Backend::Ready(_))
    }

    /// Run the collaborator, surfacing any failure as [`PipelineError::StageInference`].
    pub fn try_run(&self, image: &DynamicImage) -> Result<Vec<Observation>, PipelineError> {
        let detector = match &self.backend {
            Backend::Ready(detector) => detector,
            Backend::Unavailable(reason) => {
                return Err(PipelineError::StageInference {
                    stage: self.kind,
                    source: anyhow::anyhow!("collaborator unavailable: {reason:#}"),
                });
            }
        };

        let _guard = timing_guard(
            format!("imagextract_core::stage::{}", self.kind.label()),
            log::Level::Debug,
        );
        match panic::catch_unwind(AssertUnwindSafe(|| detector.detect(image))) {
            Ok(Ok(observations)) => Ok(observations),
            Ok(Err(source)) => Err(PipelineError::StageInference {
                stage: self.kind,
                source,
            }),
            Err(payload) => Err(PipelineError::StageInference {
                stage: self.kind,
                source: anyhow::anyhow!("detector panicked: {}", panic_message(&*payload)),
            }),
        }
    }

    /// Run the collaborator. Failures are logged and reported as zero observations.
    pub fn run(&self, image: &DynamicImage) -> Vec<Observation> {
        match self.try_run(image) {
            Ok(observations) => {
                debug!("[{}] {} observation(s)", self.kind, observations.len());
                observations
            }
            Err(err) => {
                warn!("[{}] stage failed: {err}", self.kind);
                Vec::new()
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::NormalizedBox;

    type StubFn = fn(&DynamicImage) -> anyhow::Result<Vec<Observation>>;

    fn blank() -> DynamicImage {
        DynamicImage::new_rgb8(4, 4)
    }

    #[test]
    fn kinds_sort_into_execution_order() {
        let mut kinds = vec![
            StageKind::WholeImageClassifier,
            StageKind::Face,
            StageKind::RegionClassifier,
            StageKind::Text,
        ];
        kinds.sort();
        assert_eq!(kinds, StageKind::ORDER.to_vec());
    }

    #[test]
    fn successful_detectors_pass_observations_through() {
        let stage = DetectionStage::new(
            StageKind::Face,
            |_: &DynamicImage| -> anyhow::Result<Vec<Observation>> {
                Ok(vec![Observation::Face {
                    bbox: NormalizedBox::full(),
                    confidence: 0.9,
                }])
            },
        );
        assert!(stage.is_available());
        assert_eq!(stage.run(&blank()).len(), 1);
    }

    #[test]
    fn detector_errors_become_empty_results() {
        let stage = DetectionStage::new(
            StageKind::Text,
            |_: &DynamicImage| -> anyhow::Result<Vec<Observation>> {
                anyhow::bail!("inference exploded")
            },
        );
        assert!(stage.run(&blank()).is_empty());
        let err = stage.try_run(&blank()).unwrap_err();
        assert!(err.to_string().contains("inference exploded"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn detector_panics_are_contained() {
        let stage = DetectionStage::new(
            StageKind::RegionClassifier,
            |_: &DynamicImage| -> anyhow::Result<Vec<Observation>> { panic!("bad tensor") },
        );
        assert!(stage.run(&blank()).is_empty());
        let err = stage.try_run(&blank()).unwrap_err();
        assert!(err.to_string().contains("bad tensor"), "{err}");
    }

    #[test]
    fn unavailable_stages_report_the_load_error() {
        let stage = DetectionStage::from_result::<StubFn>(
            StageKind::WholeImageClassifier,
            Err(anyhow::anyhow!("model file not found")),
        );
        assert!(!stage.is_available());
        assert!(stage.run(&blank()).is_empty());
        let message = stage.try_run(&blank()).unwrap_err().to_string();
        assert!(message.contains("whole-image classifier"), "{message}");
        assert!(message.contains("model file not found"), "{message}");
    }
}
