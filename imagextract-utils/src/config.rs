//! Shared configuration types consumed across the imagextract workspace.
//!
//! Settings are plain serde structures that can be persisted as JSON and handed to the CLI and
//! to the inference collaborators. Every section uses `#[serde(default)]` so a partial file only
//! overrides what it names.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::output::PngCompression;

/// Environment variable consulted when no explicit settings path is given.
pub const CONFIG_ENV: &str = "IMAGEXTRACT_CONFIG";

/// Face detector (YuNet) parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FaceSettings {
    /// Model file name, resolved against the models directory.
    pub model_file: String,
    /// Inference input width in pixels.
    pub input_width: u32,
    /// Inference input height in pixels.
    pub input_height: u32,
    /// Minimum confidence score for a face to be kept.
    pub score_threshold: f32,
    /// IoU threshold used by non-maximum suppression.
    pub nms_threshold: f32,
    /// Maximum number of faces kept after sorting by score.
    pub top_k: usize,
    /// Linear enlargement applied around each face before cropping (0.25 = 125%).
    pub pad_factor: f64,
}

impl Default for FaceSettings {
    fn default() -> Self {
        Self {
            model_file: "face_detection_yunet_2023mar.onnx".to_string(),
            input_width: 640,
            input_height: 640,
            score_threshold: 0.9,
            nms_threshold: 0.3,
            top_k: 5_000,
            pad_factor: 0.25,
        }
    }
}

/// Text recognizer (Tesseract) parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextSettings {
    /// Tesseract language codes, e.g. `eng` or `eng+fra`.
    pub language: String,
    /// Optional tessdata directory. Falls back to `<models>/tessdata` when it exists.
    pub tessdata_dir: Option<PathBuf>,
    /// Tesseract page segmentation mode (3 = fully automatic).
    pub page_segmentation_mode: u32,
    /// Minimum mean confidence (0-100) for a recognized line to be kept.
    pub min_confidence: i32,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            tessdata_dir: None,
            page_segmentation_mode: 3,
            min_confidence: 0,
        }
    }
}

/// Region classifier (YOLOv5) parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegionClassifierSettings {
    pub model_file: String,
    /// Optional label list (one per line). The COCO class names are used when absent.
    pub labels_file: Option<String>,
    /// Square input edge in pixels.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for RegionClassifierSettings {
    fn default() -> Self {
        Self {
            model_file: "yolov5m.onnx".to_string(),
            labels_file: None,
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

/// Whole-image classifier (ResNet-50) parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WholeImageClassifierSettings {
    pub model_file: String,
    /// Label list with one class name per output index.
    pub labels_file: String,
    /// Square input edge in pixels.
    pub input_size: u32,
    /// Cap on the ranked labels reported. `None` reports every label.
    pub top_k: Option<usize>,
}

impl Default for WholeImageClassifierSettings {
    fn default() -> Self {
        Self {
            model_file: "resnet50.onnx".to_string(),
            labels_file: "imagenet_classes.txt".to_string(),
            input_size: 224,
            top_k: None,
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Debug,
        }
    }
}

/// Complete settings for one extraction run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Directory holding model and label files. Resolved by the caller when `None`.
    pub models_dir: Option<PathBuf>,
    /// Root under which the per-image output directory is created. Defaults to the user's
    /// documents directory.
    pub output_root: Option<PathBuf>,
    /// Encoder effort for every PNG written (`fast`, `default` or `best`).
    pub png_compression: PngCompression,
    pub face: FaceSettings,
    pub text: TextSettings,
    pub region_classifier: RegionClassifierSettings,
    pub whole_image_classifier: WholeImageClassifierSettings,
    pub telemetry: TelemetrySettings,
}

impl PipelineSettings {
    /// Load settings from a JSON file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: PipelineSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;
        settings.sanitize();
        Ok(settings)
    }

    /// Serialize settings to disk in pretty-printed JSON, overwriting any existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }

    /// Load from `explicit`, then from `$IMAGEXTRACT_CONFIG`, otherwise return defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        match env::var_os(CONFIG_ENV) {
            Some(value) if !value.is_empty() => Self::load_from_path(PathBuf::from(value)),
            _ => Ok(Self::default()),
        }
    }

    /// Clamp values that would make the geometry or decoders misbehave.
    pub fn sanitize(&mut self) {
        if !self.face.pad_factor.is_finite() || self.face.pad_factor < 0.0 {
            self.face.pad_factor = 0.0;
        }
        self.face.input_width = self.face.input_width.max(1);
        self.face.input_height = self.face.input_height.max(1);
        self.region_classifier.input_size = self.region_classifier.input_size.max(1);
        self.whole_image_classifier.input_size = self.whole_image_classifier.input_size.max(1);
    }

    /// Resolve a model-relative file name against `models_dir`.
    pub fn model_path(models_dir: &Path, file: &str) -> PathBuf {
        let candidate = Path::new(file);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            models_dir.join(candidate)
        }
    }
}

/// Root directory for outputs: the configured override, else the user's documents directory.
pub fn resolve_output_root(settings: &PipelineSettings) -> Result<PathBuf> {
    if let Some(root) = settings.output_root.as_ref() {
        return Ok(root.clone());
    }
    dirs::document_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Documents")))
        .context("unable to locate the user's documents directory")
}
