//! YuNet face detector.
//!
//! The 2023 YuNet export emits twelve stride heads (`cls`, `obj`, `bbox`, `kps` for strides 8,
//! 16 and 32); older exports emit one fused `[N, 15]` tensor. Both are reduced to
//! `[x, y, w, h, landmarks.., score]` rows in input space before filtering.

use std::path::Path;

use anyhow::Result;
use image::DynamicImage;
use tract_onnx::prelude::Tensor;

use super::{
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
    config::{FaceSettings, PipelineSettings},
    timing_guard,
};

const STRIDES: [usize; 3] = [8, 16, 32];
const OUTPUTS_PER_STRIDE: usize = 4; // cls, obj, bbox, kps
const OUTPUT_COLS: usize = 15; // bbox (4) + landmarks (10) + score (1)

/// Filtering applied to decoded rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceFilter {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for FaceFilter {
    fn default() -> Self {
        Self {
            score_threshold: 0.9,
            nms_threshold: 0.3,
            top_k: 5_000,
        }
    }
}

impl From<&FaceSettings> for FaceFilter {
    fn from(settings: &FaceSettings) -> Self {
        Self {
            score_threshold: settings.score_threshold,
            nms_threshold: settings.nms_threshold,
            top_k: settings.top_k,
        }
    }
}

/// A face in source-image pixels, top-left origin.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub rect: PixelRect,
    pub score: f32,
}

impl Scored for FaceBox {
    fn rect(&self) -> &PixelRect {
        &self.rect
    }

    fn score(&self) -> f32 {
        self.score
    }
}

/// Face detection backed by a YuNet ONNX graph.
#[derive(Debug)]
pub struct YuNetDetector {
    model: OnnxModel,
    input_size: InputSize,
    filter: FaceFilter,
}

impl YuNetDetector {
    pub fn load(model_path: &Path, input_size: InputSize, filter: FaceFilter) -> Result<Self> {
        let model = OnnxModel::load(model_path, "YuNet", None)?;
        Ok(Self {
            model,
            input_size,
            filter,
        })
    }

    pub fn from_settings(settings: &FaceSettings, models_dir: &Path) -> Result<Self> {
        Self::load(
            &PipelineSettings::model_path(models_dir, &settings.model_file),
            InputSize::new(settings.input_width, settings.input_height),
            FaceFilter::from(settings),
        )
    }

    /// Faces in source pixels, best first.
    pub fn detect_faces(&self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let prep = preprocess(image, self.input_size, TensorLayout::Bgr255)?;
        let raw = {
            let _guard = timing_guard("imagextract_core::yunet::inference", log::Level::Debug);
            let mut outputs = self.model.run(prep.tensor)?;
            match outputs.len() {
                1 => outputs.remove(0),
                len if len == STRIDES.len() * OUTPUTS_PER_STRIDE => {
                    decode_stride_outputs(&outputs, self.input_size)?
                }
                other => anyhow::bail!(
                    "unexpected number of YuNet outputs: expected 1 or {}, got {}",
                    STRIDES.len() * OUTPUTS_PER_STRIDE,
                    other
                ),
            }
        };
        filter_faces(&raw, prep.scale_x, prep.scale_y, &self.filter)
    }
}

impl Detector for YuNetDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Observation>> {
        let (width, height) = (image.width(), image.height());
        Ok(self
            .detect_faces(image)?
            .into_iter()
            .map(|face| Observation::Face {
                bbox: NormalizedBox::from_top_left_pixels(
                    face.rect.x,
                    face.rect.y,
                    face.rect.width,
                    face.rect.height,
                    width,
                    height,
                ),
                confidence: face.score,
            })
            .collect())
    }
}

/// Score-filter, scale, rank, truncate and de-duplicate fused `[N, 15]` rows.
pub fn filter_faces(
    output: &Tensor,
    scale_x: f32,
    scale_y: f32,
    filter: &FaceFilter,
) -> Result<Vec<FaceBox>> {
    let rows = match output.shape() {
        [rows, OUTPUT_COLS] | [1, rows, OUTPUT_COLS] => *rows,
        other => anyhow::bail!(
            "YuNet output must have shape [N, 15] or [1, N, 15] (got {:?})",
            other
        ),
    };
    let data = output
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("YuNet output is not f32: {e}"))?;
    anyhow::ensure!(
        data.len() == rows * OUTPUT_COLS,
        "YuNet output data is not contiguous"
    );

    let mut faces: Vec<FaceBox> = data
        .chunks_exact(OUTPUT_COLS)
        .filter_map(|row| {
            let score = row[14];
            if !score.is_finite() || score < filter.score_threshold {
                return None;
            }
            let rect = PixelRect::new(
                f64::from(row[0] * scale_x),
                f64::from(row[1] * scale_y),
                f64::from(row[2] * scale_x),
                f64::from(row[3] * scale_y),
            );
            (!rect.is_empty()).then_some(FaceBox { rect, score })
        })
        .collect();

    sort_by_score(&mut faces);
    if filter.top_k > 0 && faces.len() > filter.top_k {
        faces.truncate(filter.top_k);
    }
    if filter.nms_threshold > 0.0 && faces.len() > 1 {
        faces = non_max_suppression(faces, filter.nms_threshold);
    }
    Ok(faces)
}

/// Fuse the twelve stride heads into one `[N, 15]` tensor in input coordinates.
pub(crate) fn decode_stride_outputs(outputs: &[Tensor], input_size: InputSize) -> Result<Tensor> {
    anyhow::ensure!(
        outputs.len() == STRIDES.len() * OUTPUTS_PER_STRIDE,
        "YuNet decode expects {} tensors, got {}",
        STRIDES.len() * OUTPUTS_PER_STRIDE,
        outputs.len()
    );

    let pad_w = (input_size.width as usize).div_ceil(32) * 32;
    let pad_h = (input_size.height as usize).div_ceil(32) * 32;
    let total_cells: usize = STRIDES
        .iter()
        .map(|stride| (pad_w / stride) * (pad_h / stride))
        .sum();
    let mut fused = Vec::with_capacity(total_cells * OUTPUT_COLS);

    for (stride_index, &stride) in STRIDES.iter().enumerate() {
        let cols = pad_w / stride;
        let rows = pad_h / stride;
        let cell_count = rows * cols;
        let stride_f = stride as f32;

        let head = |group: usize, name: &'static str, per_cell: usize| {
            let index = stride_index + STRIDES.len() * group;
            stride_head(outputs, index, name, cell_count * per_cell)
        };
        let cls = head(0, "cls", 1)?;
        let obj = head(1, "obj", 1)?;
        let bbox = head(2, "bbox", 4)?;
        let kps = head(3, "kps", 10)?;

        for row in 0..rows {
            for col in 0..cols {
                let idx = row * cols + col;
                let mut score = (cls[idx].clamp(0.0, 1.0) * obj[idx].clamp(0.0, 1.0)).sqrt();
                if !score.is_finite() {
                    score = 0.0;
                }

                let b = &bbox[idx * 4..idx * 4 + 4];
                let cx = (col as f32 + b[0]) * stride_f;
                let cy = (row as f32 + b[1]) * stride_f;
                let w = b[2].exp() * stride_f;
                let h = b[3].exp() * stride_f;
                fused.extend_from_slice(&[
                    (-0.5f32).mul_add(w, cx),
                    (-0.5f32).mul_add(h, cy),
                    w,
                    h,
                ]);

                let k = &kps[idx * 10..idx * 10 + 10];
                for landmark in k.chunks_exact(2) {
                    fused.push((landmark[0] + col as f32) * stride_f);
                    fused.push((landmark[1] + row as f32) * stride_f);
                }
                fused.push(score);
            }
        }
    }

    let rows = fused.len() / OUTPUT_COLS;
    Tensor::from_shape(&[rows, OUTPUT_COLS], &fused)
        .map_err(|e| anyhow::anyhow!("failed to build fused YuNet tensor: {e}"))
}

fn stride_head<'a>(
    outputs: &'a [Tensor],
    index: usize,
    name: &str,
    expected_len: usize,
) -> Result<&'a [f32]> {
    let slice = outputs[index]
        .as_slice::<f32>()
        .map_err(|e| anyhow::anyhow!("{name} output not f32: {e}"))?;
    anyhow::ensure!(
        slice.len() == expected_len,
        "{name} length mismatch: expected {}, got {}",
        expected_len,
        slice.len()
    );
    Ok(slice)
}
