//! Runs every detection stage over one image and turns observations into artifacts.
//!
//! Stages execute sequentially in [`StageKind`] order (text, face, region classifier,
//! whole-image classifier). The decoded source is written first. Each stage then runs exactly
//! once; its observations are mapped, cropped and named, and the resulting artifacts are handed
//! to the [`ArtifactWriter`]. Failures are contained to the smallest unit: a degenerate crop
//! skips that crop, a failing stage yields nothing, a failed write loses only that file.

use std::path::PathBuf;

use image::{DynamicImage, GenericImageView};
use log::{debug, info, warn};

use crate::{
    artifact::{
        Artifact, DetectionRecord, classification_report, detection_manifest, face_file_name,
        object_file_name, text_report,
    },
    cropper::crop,
    error::PipelineError,
    geometry::{NormalizedBox, to_pixel_rect},
    observation::Observation,
    stage::{DetectionStage, StageKind},
    writer::ArtifactWriter,
};
use imagextract_utils::timing_guard;

/// Linear enlargement applied to face boxes before cropping.
pub const FACE_PAD_FACTOR: f64 = 0.25;
/// Object boxes are cropped as reported.
pub const OBJECT_PAD_FACTOR: f64 = 0.0;

/// Per-stage outcome counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub kind: StageKind,
    /// Observations returned by the stage (zero when it failed).
    pub observations: usize,
    /// Artifacts persisted.
    pub written: usize,
    /// Artifacts whose write failed.
    pub failed: usize,
    /// Crops skipped because their region was empty.
    pub skipped: usize,
}

impl StageReport {
    fn new(kind: StageKind) -> Self {
        Self {
            kind,
            observations: 0,
            written: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

/// What one call to [`PipelineOrchestrator::process`] produced.
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    /// Whether the copy of the source image was persisted.
    pub source_written: bool,
    /// One entry per stage, in execution order.
    pub stages: Vec<StageReport>,
    /// Every path written, in write order.
    pub files: Vec<PathBuf>,
}

impl PipelineSummary {
    pub fn stage(&self, kind: StageKind) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.kind == kind)
    }

    pub fn total_failed(&self) -> usize {
        self.stages.iter().map(|report| report.failed).sum::<usize>()
            + usize::from(!self.source_written)
    }
}

/// Drives the stages and names their outputs.
#[derive(Debug)]
pub struct PipelineOrchestrator {
    stages: Vec<DetectionStage>,
    face_pad_factor: f64,
}

impl PipelineOrchestrator {
    /// Build an orchestrator. Stages are reordered into execution order regardless of the
    /// order given.
    pub fn new(mut stages: Vec<DetectionStage>) -> Self {
        stages.sort_by_key(DetectionStage::kind);
        Self {
            stages,
            face_pad_factor: FACE_PAD_FACTOR,
        }
    }

    /// Override the face enlargement factor. Negative or non-finite values disable padding.
    pub fn with_face_pad_factor(mut self, pad_factor: f64) -> Self {
        self.face_pad_factor = if pad_factor.is_finite() {
            pad_factor.max(0.0)
        } else {
            0.0
        };
        self
    }

    pub fn stages(&self) -> &[DetectionStage] {
        &self.stages
    }

    /// Process `image`, writing the source copy under `source_name` followed by every stage's
    /// artifacts.
    pub fn process(
        &self,
        image: &DynamicImage,
        source_name: &str,
        writer: &mut dyn ArtifactWriter,
    ) -> PipelineSummary {
        self.process_with_progress(image, source_name, writer, |_| {})
    }

    /// Like [`process`](Self::process), invoking `on_stage` after each stage completes.
    pub fn process_with_progress<F>(
        &self,
        image: &DynamicImage,
        source_name: &str,
        writer: &mut dyn ArtifactWriter,
        mut on_stage: F,
    ) -> PipelineSummary
    where
        F: FnMut(&StageReport),
    {
        let _guard = timing_guard("imagextract_core::pipeline::process", log::Level::Debug);
        let mut files = Vec::new();

        let source = Artifact::SourceImage {
            name: source_name.to_string(),
            image: image.clone(),
        };
        let source_written = emit(writer, &source, &mut files).is_some();

        let mut stages = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            let observations = stage.run(image);
            let mut run = StageRun {
                report: StageReport::new(stage.kind()),
                writer: &mut *writer,
                files: &mut files,
            };
            run.report.observations = observations.len();
            match stage.kind() {
                StageKind::Text => run.text(observations),
                StageKind::Face => run.faces(observations, image, self.face_pad_factor),
                StageKind::RegionClassifier => run.objects(observations, image),
                StageKind::WholeImageClassifier => run.classifications(observations),
            }
            on_stage(&run.report);
            stages.push(run.report);
        }

        PipelineSummary {
            source_written,
            stages,
            files,
        }
    }
}

struct StageRun<'a> {
    report: StageReport,
    writer: &'a mut dyn ArtifactWriter,
    files: &'a mut Vec<PathBuf>,
}

impl StageRun<'_> {
    fn write(&mut self, artifact: &Artifact) -> bool {
        match emit(self.writer, artifact, self.files) {
            Some(_) => {
                self.report.written += 1;
                true
            }
            None => {
                self.report.failed += 1;
                false
            }
        }
    }

    fn drop_unexpected(&self, observation: &Observation) {
        warn!(
            "[{}] dropping unexpected {} observation",
            self.report.kind,
            observation.kind_name()
        );
    }

    fn text(&mut self, observations: Vec<Observation>) {
        let mut lines = Vec::with_capacity(observations.len());
        for observation in observations {
            match observation {
                Observation::Text { text, .. } => lines.push(text),
                other => self.drop_unexpected(&other),
            }
        }
        if let Some(report) = text_report(lines.iter().map(String::as_str)) {
            self.write(&report);
        }
    }

    fn faces(&mut self, observations: Vec<Observation>, image: &DynamicImage, pad_factor: f64) {
        let mut boxes = Vec::with_capacity(observations.len());
        for observation in observations {
            match observation {
                Observation::Face { bbox, .. } => boxes.push(bbox),
                other => self.drop_unexpected(&other),
            }
        }

        let crops: Vec<DynamicImage> = boxes
            .into_iter()
            .filter_map(|bbox| match crop_box(image, bbox, pad_factor) {
                Ok(face) => Some(face),
                Err(err) => {
                    debug!("[{}] skipping face: {err}", self.report.kind);
                    self.report.skipped += 1;
                    None
                }
            })
            .collect();

        for (index, face) in crops.into_iter().enumerate() {
            self.write(&Artifact::CroppedImage {
                name: face_file_name(index),
                image: face,
            });
        }
    }

    fn objects(&mut self, observations: Vec<Observation>, image: &DynamicImage) {
        let mut detections = Vec::with_capacity(observations.len());
        for observation in observations {
            match observation {
                Observation::Object {
                    label,
                    confidence,
                    bbox,
                } => detections.push((label, confidence, bbox)),
                other => self.drop_unexpected(&other),
            }
        }

        let mut records = Vec::with_capacity(detections.len());
        for (object_number, (label, confidence, bbox)) in detections.into_iter().enumerate() {
            let mut record = DetectionRecord::new(object_number, label, confidence, bbox);
            let produced = match crop_box(image, bbox, OBJECT_PAD_FACTOR) {
                Ok(object) => self.write(&Artifact::CroppedImage {
                    name: object_file_name(object_number),
                    image: object,
                }),
                Err(err) => {
                    debug!("[{}] skipping object {object_number}: {err}", self.report.kind);
                    self.report.skipped += 1;
                    false
                }
            };
            if !produced {
                record.image_file_name = None;
            }
            records.push(record);
        }

        if let Some(manifest) = detection_manifest(records) {
            self.write(&manifest);
        }
    }

    fn classifications(&mut self, observations: Vec<Observation>) {
        let mut labels = Vec::with_capacity(observations.len());
        for observation in observations {
            match observation {
                Observation::Classification { label, confidence } => {
                    labels.push((label, confidence))
                }
                other => self.drop_unexpected(&other),
            }
        }
        let report = classification_report(
            labels
                .iter()
                .map(|(label, confidence)| (label.as_str(), *confidence)),
        );
        if let Some(report) = report {
            self.write(&report);
        }
    }
}

fn crop_box(
    image: &DynamicImage,
    bbox: NormalizedBox,
    pad_factor: f64,
) -> Result<DynamicImage, PipelineError> {
    let (width, height) = image.dimensions();
    crop(image, &to_pixel_rect(bbox, width, height, pad_factor))
}

fn emit(
    writer: &mut dyn ArtifactWriter,
    artifact: &Artifact,
    files: &mut Vec<PathBuf>,
) -> Option<PathBuf> {
    match writer.write(artifact) {
        Ok(path) => {
            info!("Saved {}", path.display());
            files.push(path.clone());
            Some(path)
        }
        Err(source) => {
            let err = PipelineError::ArtifactWrite {
                name: artifact.file_name().to_string(),
                source,
            };
            warn!("{err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Keeps artifacts in memory and fails writes for the configured names.
    #[derive(Default)]
    struct MemoryWriter {
        artifacts: Vec<Artifact>,
        fail: Vec<String>,
    }

    impl ArtifactWriter for MemoryWriter {
        fn write(&mut self, artifact: &Artifact) -> anyhow::Result<PathBuf> {
            let name = artifact.file_name().to_string();
            anyhow::ensure!(!self.fail.contains(&name), "disk full");
            self.artifacts.push(artifact.clone());
            Ok(PathBuf::from(name))
        }
    }

    impl MemoryWriter {
        fn names(&self) -> Vec<&str> {
            self.artifacts.iter().map(Artifact::file_name).collect()
        }

        fn images(&self) -> BTreeMap<&str, (u32, u32)> {
            self.artifacts
                .iter()
                .filter_map(|artifact| match artifact {
                    Artifact::CroppedImage { name, image } => {
                        Some((name.as_str(), image.dimensions()))
                    }
                    _ => None,
                })
                .collect()
        }
    }

    fn stage(kind: StageKind, observations: Vec<Observation>) -> DetectionStage {
        DetectionStage::new(
            kind,
            move |_: &DynamicImage| -> anyhow::Result<Vec<Observation>> {
                Ok(observations.clone())
            },
        )
    }

    fn face(x: f64, y: f64, w: f64, h: f64) -> Observation {
        Observation::Face {
            bbox: NormalizedBox::new(x, y, w, h),
            confidence: 0.99,
        }
    }

    #[test]
    fn source_copy_comes_first_and_stages_run_in_order() {
        let orchestrator = PipelineOrchestrator::new(vec![
            stage(
                StageKind::WholeImageClassifier,
                vec![Observation::Classification {
                    label: "tabby".into(),
                    confidence: 0.5,
                }],
            ),
            stage(
                StageKind::Text,
                vec![Observation::Text {
                    text: "hello".into(),
                    confidence: 0.9,
                }],
            ),
            stage(StageKind::Face, vec![face(0.25, 0.25, 0.5, 0.5)]),
        ]);
        let image = DynamicImage::new_rgb8(100, 80);
        let mut writer = MemoryWriter::default();
        let summary = orchestrator.process(&image, "in.png", &mut writer);

        assert_eq!(
            writer.names(),
            vec![
                "in.png",
                "OCR_RecognizedText.txt",
                "Face0.png",
                "RESNET_ObjectClassificationResults.txt"
            ]
        );
        let kinds: Vec<_> = summary.stages.iter().map(|report| report.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Text,
                StageKind::Face,
                StageKind::WholeImageClassifier
            ]
        );
        assert!(summary.source_written);
        assert_eq!(summary.total_failed(), 0);
    }

    #[test]
    fn faces_are_numbered_over_successful_crops() {
        let orchestrator = PipelineOrchestrator::new(vec![stage(
            StageKind::Face,
            vec![
                face(0.0, 0.0, 0.5, 0.5),
                face(2.0, 2.0, 0.1, 0.1),
                face(0.5, 0.5, 0.5, 0.5),
            ],
        )]);
        let image = DynamicImage::new_rgb8(40, 40);
        let mut writer = MemoryWriter::default();
        let summary = orchestrator.process(&image, "in.png", &mut writer);

        let images = writer.images();
        assert_eq!(images.keys().copied().collect::<Vec<_>>(), ["Face0.png", "Face1.png"]);
        let report = summary.stage(StageKind::Face).unwrap();
        assert_eq!(report.observations, 3);
        assert_eq!(report.written, 2);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn failed_object_crops_keep_their_record_without_a_file() {
        let orchestrator = PipelineOrchestrator::new(vec![stage(
            StageKind::RegionClassifier,
            vec![
                Observation::Object {
                    label: "cup".into(),
                    confidence: 0.9,
                    bbox: NormalizedBox::new(0.0, 0.0, 0.5, 0.5),
                },
                Observation::Object {
                    label: "ghost".into(),
                    confidence: 0.4,
                    bbox: NormalizedBox::new(0.5, 0.5, 0.0, 0.0),
                },
            ],
        )]);
        let image = DynamicImage::new_rgb8(20, 20);
        let mut writer = MemoryWriter::default();
        orchestrator.process(&image, "in.png", &mut writer);

        let records = writer
            .artifacts
            .iter()
            .find_map(|artifact| match artifact {
                Artifact::DetectionManifest { records, .. } => Some(records.clone()),
                _ => None,
            })
            .expect("manifest");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].image_file_name.as_deref(), Some("Object0.png"));
        assert_eq!(records[1].object_number, 1);
        assert_eq!(records[1].image_file_name, None);
        assert_eq!(writer.images().len(), 1);
    }

    #[test]
    fn write_failures_are_counted_and_do_not_stop_other_artifacts() {
        let orchestrator = PipelineOrchestrator::new(vec![
            stage(
                StageKind::RegionClassifier,
                vec![Observation::Object {
                    label: "cup".into(),
                    confidence: 0.9,
                    bbox: NormalizedBox::full(),
                }],
            ),
            stage(
                StageKind::WholeImageClassifier,
                vec![Observation::Classification {
                    label: "mug".into(),
                    confidence: 0.7,
                }],
            ),
        ]);
        let image = DynamicImage::new_rgb8(10, 10);
        let mut writer = MemoryWriter {
            fail: vec!["Object0.png".into()],
            ..Default::default()
        };
        let summary = orchestrator.process(&image, "in.png", &mut writer);

        let report = summary.stage(StageKind::RegionClassifier).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.written, 1);
        let manifest = writer
            .artifacts
            .iter()
            .find_map(|artifact| match artifact {
                Artifact::DetectionManifest { records, .. } => Some(records.clone()),
                _ => None,
            })
            .expect("manifest");
        assert_eq!(manifest[0].image_file_name, None);
        assert!(writer.names().contains(&"RESNET_ObjectClassificationResults.txt"));
        assert_eq!(summary.total_failed(), 1);
    }

    #[test]
    fn mismatched_observations_are_dropped() {
        let orchestrator = PipelineOrchestrator::new(vec![stage(
            StageKind::Face,
            vec![Observation::Text {
                text: "not a face".into(),
                confidence: 1.0,
            }],
        )]);
        let image = DynamicImage::new_rgb8(10, 10);
        let mut writer = MemoryWriter::default();
        let summary = orchestrator.process(&image, "in.png", &mut writer);
        assert_eq!(writer.names(), vec!["in.png"]);
        assert_eq!(summary.stage(StageKind::Face).unwrap().written, 0);
    }

    #[test]
    fn progress_callback_sees_every_stage() {
        let orchestrator = PipelineOrchestrator::new(
            StageKind::ORDER
                .iter()
                .map(|&kind| stage(kind, Vec::new()))
                .collect(),
        );
        let image = DynamicImage::new_rgb8(4, 4);
        let mut writer = MemoryWriter::default();
        let mut seen = Vec::new();
        orchestrator.process_with_progress(&image, "in.png", &mut writer, |report| {
            seen.push(report.kind)
        });
        assert_eq!(seen, StageKind::ORDER.to_vec());
        assert_eq!(writer.names(), vec!["in.png"]);
    }
}
