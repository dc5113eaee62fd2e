//! Named, in-memory outputs of a run and the file-name contract they follow.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedBox;

/// Recognized text, one line per text region.
pub const TEXT_REPORT_FILE: &str = "OCR_RecognizedText.txt";
/// Whole-image classification labels.
pub const CLASSIFICATION_REPORT_FILE: &str = "RESNET_ObjectClassificationResults.txt";
/// Region classifier detection records.
pub const DETECTION_MANIFEST_FILE: &str = "YOLO_ObjectClassificationResults.json";

/// `Face{n}.png`
pub fn face_file_name(index: usize) -> String {
    format!("Face{index}.png")
}

/// `Object{n}.png`, where `n` is the record's `objectNumber`.
pub fn object_file_name(object_number: usize) -> String {
    format!("Object{object_number}.png")
}

/// One entry of the detection manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    /// Zero-based position of the object in the detector's output.
    pub object_number: usize,
    pub class_name: String,
    /// Percentage in `0..=100`.
    pub confidence: f32,
    /// `[x, y, width, height]`, normalized with a bottom-left origin.
    pub bounding_box: [f64; 4],
    /// `None` when the object's crop could not be produced.
    pub image_file_name: Option<String>,
}

impl DetectionRecord {
    pub fn new(
        object_number: usize,
        class_name: impl Into<String>,
        confidence: f32,
        bbox: NormalizedBox,
    ) -> Self {
        Self {
            object_number,
            class_name: class_name.into(),
            confidence: confidence * 100.0,
            bounding_box: bbox.to_array(),
            image_file_name: Some(object_file_name(object_number)),
        }
    }

    pub fn bbox(&self) -> NormalizedBox {
        NormalizedBox::from(self.bounding_box)
    }
}

/// A unit of output, written exactly once.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// The decoded input, re-encoded as PNG under its original file name.
    SourceImage { name: String, image: DynamicImage },
    CroppedImage { name: String, image: DynamicImage },
    TextReport { filename: String, content: String },
    ClassificationReport { filename: String, content: String },
    DetectionManifest {
        filename: String,
        records: Vec<DetectionRecord>,
    },
}

impl Artifact {
    /// File name relative to the output directory.
    pub fn file_name(&self) -> &str {
        match self {
            Self::SourceImage { name, .. } | Self::CroppedImage { name, .. } => name,
            Self::TextReport { filename, .. }
            | Self::ClassificationReport { filename, .. }
            | Self::DetectionManifest { filename, .. } => filename,
        }
    }
}

/// Join recognized lines into the text report, or `None` when nothing was recognized.
pub fn text_report<'a, I>(lines: I) -> Option<Artifact>
where
    I: IntoIterator<Item = &'a str>,
{
    let content: String = lines
        .into_iter()
        .flat_map(|line| [line, "\n"])
        .collect();
    (!content.is_empty()).then(|| Artifact::TextReport {
        filename: TEXT_REPORT_FILE.to_string(),
        content,
    })
}

/// Format `(label, confidence)` pairs as `Class: <label>, Confidence: <pct>%` lines, or `None`
/// when there are no labels.
pub fn classification_report<'a, I>(labels: I) -> Option<Artifact>
where
    I: IntoIterator<Item = (&'a str, f32)>,
{
    let content: String = labels
        .into_iter()
        .map(|(label, confidence)| {
            format!("Class: {label}, Confidence: {}%\n", confidence * 100.0)
        })
        .collect();
    (!content.is_empty()).then(|| Artifact::ClassificationReport {
        filename: CLASSIFICATION_REPORT_FILE.to_string(),
        content,
    })
}

/// Wrap detection records into the manifest artifact, or `None` when there are none.
pub fn detection_manifest(records: Vec<DetectionRecord>) -> Option<Artifact> {
    (!records.is_empty()).then(|| Artifact::DetectionManifest {
        filename: DETECTION_MANIFEST_FILE.to_string(),
        records,
    })
}
