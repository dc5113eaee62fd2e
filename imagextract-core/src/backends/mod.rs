//! Concrete inference collaborators and stage assembly.
//!
//! Every collaborator reports observations in the detector-native normalized, bottom-left
//! convention. Models are located under an explicit models directory; nothing here consults the
//! working directory or the executable path.

pub mod labels;
mod onnx;
pub mod postprocess;
pub mod preprocess;
pub mod resnet;
#[cfg(feature = "tesseract")]
pub mod tesseract;
pub mod yolo;
pub mod yunet;

use std::path::Path;

use log::debug;

use crate::stage::{DetectionStage, StageKind};
use imagextract_utils::config::PipelineSettings;

pub use preprocess::{InputSize, PreprocessOutput, TensorLayout};
pub use resnet::ResNetClassifier;
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractRecognizer;
pub use yolo::YoloDetector;
pub use yunet::YuNetDetector;

/// Construct one stage per detector kind from `settings`, loading models from `models_dir`.
///
/// Collaborators that fail to load become unavailable stages; the failure is reported when the
/// stage runs.
pub fn build_stages(settings: &PipelineSettings, models_dir: &Path) -> Vec<DetectionStage> {
    debug!("Loading models from {}", models_dir.display());
    let stages = vec![
        text_stage(settings, models_dir),
        DetectionStage::from_result(
            StageKind::Face,
            YuNetDetector::from_settings(&settings.face, models_dir),
        ),
        DetectionStage::from_result(
            StageKind::RegionClassifier,
            YoloDetector::from_settings(&settings.region_classifier, models_dir),
        ),
        DetectionStage::from_result(
            StageKind::WholeImageClassifier,
            ResNetClassifier::from_settings(&settings.whole_image_classifier, models_dir),
        ),
    ];
    for stage in stages.iter().filter(|stage| !stage.is_available()) {
        debug!("[{}] collaborator unavailable", stage.kind());
    }
    stages
}

#[cfg(feature = "tesseract")]
fn text_stage(settings: &PipelineSettings, models_dir: &Path) -> DetectionStage {
    DetectionStage::from_result(
        StageKind::Text,
        TesseractRecognizer::from_settings(&settings.text, models_dir),
    )
}

#[cfg(not(feature = "tesseract"))]
fn text_stage(_settings: &PipelineSettings, _models_dir: &Path) -> DetectionStage {
    DetectionStage::unavailable(
        StageKind::Text,
        anyhow::anyhow!("text recognition requires building with the `tesseract` feature"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_models_yield_unavailable_stages_in_every_slot() {
        let dir = tempfile::tempdir().unwrap();
        let stages = build_stages(&PipelineSettings::default(), dir.path());
        let kinds: Vec<StageKind> = stages.iter().map(DetectionStage::kind).collect();
        assert_eq!(kinds, StageKind::ORDER.to_vec());
        assert!(
            stages
                .iter()
                .filter(|stage| stage.kind() != StageKind::Text)
                .all(|stage| !stage.is_available())
        );
    }
}
