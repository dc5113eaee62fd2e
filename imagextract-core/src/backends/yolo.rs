//! YOLOv5 region classifier.
//!
//! The graph emits `[1, N, 5 + C]` rows of `[cx, cy, w, h, objectness, class scores..]` in
//! input pixels. A class's confidence is `objectness * class score`.

use std::path::Path;

use anyhow::Result;
use image::DynamicImage;
use log::debug;
use tract_onnx::prelude::Tensor;

use super::{
    labels::{coco_labels, label_for, load_labels},
    onnx::OnnxModel,
    postprocess::{Scored, non_max_suppression, sort_by_score},
    preprocess::{InputSize, TensorLayout, preprocess},
};
use crate::{
    geometry::{NormalizedBox, PixelRect},
    observation::Observation,
    stage::Detector,
};
use imagextract_utils::{
    config::{PipelineSettings, RegionClassifierSettings},
    timing_guard,
};

/// Thresholds applied while decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct YoloFilter {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloFilter {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

impl From<&RegionClassifierSettings> for YoloFilter {
    fn from(settings: &RegionClassifierSettings) -> Self {
        Self {
            confidence_threshold: settings.confidence_threshold,
            iou_threshold: settings.iou_threshold,
            max_detections: settings.max_detections,
        }
    }
}

/// One located object in source pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectBox {
    pub rect: PixelRect,
    /// `(class index, confidence)` for every class above threshold, best first. Never empty.
    pub classes: Vec<(usize, f32)>,
}

impl Scored for ObjectBox {
    fn rect(&self) -> &PixelRect {
        &self.rect
    }

    fn score(&self) -> f32 {
        self.classes.first().map_or(0.0, |(_, score)| *score)
    }

    fn group(&self) -> usize {
        self.classes.first().map_or(0, |(class, _)| *class)
    }
}

/// Object detection backed by a YOLOv5 ONNX graph.
#[derive(Debug)]
pub struct YoloDetector {
    model: OnnxModel,
    labels: Vec<String>,
    input_size: InputSize,
    filter: YoloFilter,
}

impl YoloDetector {
    pub fn load(
        model_path: &Path,
        labels: Vec<String>,
        input_size: InputSize,
        filter: YoloFilter,
    ) -> Result<Self> {
        let model = OnnxModel::load(model_path, "YOLO", Some(input_size.nchw()))?;
        Ok(Self {
            model,
            labels,
            input_size,
            filter,
        })
    }

    pub fn from_settings(settings: &RegionClassifierSettings, models_dir: &Path) -> Result<Self> {
        let labels = match &settings.labels_file {
            Some(file) => load_labels(&PipelineSettings::model_path(models_dir, file))?,
            None => coco_labels(),
        };
        Self::load(
            &PipelineSettings::model_path(models_dir, &settings.model_file),
            labels,
            InputSize::square(settings.input_size),
            YoloFilter::from(settings),
        )
    }

    /// Objects in source pixels, best first.
    pub fn detect_objects(&self, image: &DynamicImage) -> Result<Vec<ObjectBox>> {
        let prep = preprocess(image, self.input_size, TensorLayout::Rgb01)?;
        let outputs = {
            let _guard = timing_guard("imagextract_core::yolo::inference", log::Level::Debug);
            self.model.run(prep.tensor)?
        };
        decode_detections(&outputs[0], prep.scale_x, prep.scale_y, &self.filter)
    }
}

impl Detector for YoloDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Observation>> {
        let (width, height) = (image.width(), image.height());
        let observations = self
            .detect_objects(image)?
            .into_iter()
            .filter_map(|object| {
                let bbox = NormalizedBox::from_top_left_pixels(
                    object.rect.x,
                    object.rect.y,
                    object.rect.width,
                    object.rect.height,
                    width,
                    height,
                );
                let labels = object
                    .classes
                    .iter()
                    .map(|&(class, score)| (label_for(&self.labels, class), score));
                Observation::object_from_labels(labels, bbox)
            })
            .collect();
        Ok(observations)
    }
}

/// Decode `[1, N, 5 + C]` (or `[N, 5 + C]`) rows into filtered, de-duplicated objects.
pub fn decode_detections(
    output: &Tensor,
    scale_x: f32,
    scale_y: f32,
    filter: &YoloFilter,
) -> Result<Vec<ObjectBox>> {
    let (rows, cols) = match output.shape() {
        [rows, cols] | [1, rows, cols] => (*rows, *cols),
        other => anyhow::bail!(
            "YOLO output must have shape [N, 5 + C] or [1, N, 5 + C] (got {:?})",
            other
        ),
    };
    anyhow::ensure!(cols > 5, "YOLO output rows need at least one class column");
    let data = output
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("YOLO output is not f32: {e}"))?;
    anyhow::ensure!(
        data.len() == rows * cols,
        "YOLO output data is not contiguous"
    );

    let mut objects: Vec<ObjectBox> = data
        .chunks_exact(cols)
        .filter_map(|row| decode_row(row, scale_x, scale_y, filter.confidence_threshold))
        .collect();
    debug!("YOLO candidates before NMS: {}", objects.len());

    sort_by_score(&mut objects);
    let mut objects = non_max_suppression(objects, filter.iou_threshold);
    objects.truncate(filter.max_detections);
    Ok(objects)
}

fn decode_row(row: &[f32], scale_x: f32, scale_y: f32, threshold: f32) -> Option<ObjectBox> {
    let objectness = row[4];
    if !objectness.is_finite() || objectness < threshold {
        return None;
    }

    let mut classes: Vec<(usize, f32)> = row[5..]
        .iter()
        .enumerate()
        .map(|(class, score)| (class, objectness * score))
        .filter(|(_, confidence)| confidence.is_finite() && *confidence >= threshold)
        .collect();
    if classes.is_empty() {
        return None;
    }
    classes.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
    let rect = PixelRect::new(
        f64::from((cx - w / 2.0) * scale_x),
        f64::from((cy - h / 2.0) * scale_y),
        f64::from(w * scale_x),
        f64::from(h * scale_y),
    );
    (!rect.is_empty()).then_some(ObjectBox { rect, classes })
}
