//! Tesseract text recognizer (requires the `tesseract` feature and a system libtesseract).

use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use leptess::{LepTess, Variable};
use log::debug;

use crate::{observation::Observation, stage::Detector};
use imagextract_utils::{config::TextSettings, timing_guard};

/// Line-level text recognition.
///
/// Tesseract handles are not thread-safe, so one is created per call.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    language: String,
    tessdata_dir: Option<PathBuf>,
    page_segmentation_mode: u32,
    min_confidence: i32,
}

impl TesseractRecognizer {
    /// Validate that Tesseract can be initialised for `settings.language`.
    pub fn from_settings(settings: &TextSettings, models_dir: &Path) -> Result<Self> {
        let tessdata_dir = settings.tessdata_dir.clone().or_else(|| {
            let bundled = models_dir.join("tessdata");
            bundled.is_dir().then_some(bundled)
        });
        let recognizer = Self {
            language: settings.language.clone(),
            tessdata_dir,
            page_segmentation_mode: settings.page_segmentation_mode,
            min_confidence: settings.min_confidence,
        };
        recognizer.engine()?;
        Ok(recognizer)
    }

    fn engine(&self) -> Result<LepTess> {
        let data_path = self
            .tessdata_dir
            .as_deref()
            .map(|dir| dir.to_str().context("tessdata path is not valid UTF-8"))
            .transpose()?;
        // Default engine mode: LSTM whenever the traineddata ships an LSTM model.
        let mut engine = LepTess::new(data_path, &self.language).map_err(|e| {
            anyhow::anyhow!("failed to initialise Tesseract for '{}': {e}", self.language)
        })?;
        engine
            .set_variable(
                Variable::TesseditPagesegMode,
                &self.page_segmentation_mode.to_string(),
            )
            .map_err(|e| anyhow::anyhow!("failed to set page segmentation mode: {e}"))?;
        Ok(engine)
    }

    /// Recognized `(line, confidence)` pairs in reading order.
    pub fn recognize(&self, image: &DynamicImage) -> Result<Vec<(String, f32)>> {
        let _guard = timing_guard("imagextract_core::tesseract::recognize", log::Level::Debug);
        let mut engine = self.engine()?;

        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .context("failed to encode image for Tesseract")?;
        engine
            .set_image_from_mem(png.get_ref())
            .map_err(|e| anyhow::anyhow!("failed to hand image to Tesseract: {e}"))?;

        // No boxes means no text on the page.
        let Some(boxes) =
            engine.get_component_boxes(leptess::capi::TessPageIteratorLevel_RIL_TEXTLINE, true)
        else {
            return Ok(Vec::new());
        };

        let mut lines = Vec::new();
        for bbox in &boxes {
            let geom = bbox.get_geometry();
            engine.set_rectangle(geom.x, geom.y, geom.w, geom.h);
            let text = engine.get_utf8_text().unwrap_or_default().trim().to_string();
            if text.is_empty() {
                continue;
            }
            let confidence = engine.mean_text_conf();
            if confidence < self.min_confidence {
                debug!("Dropping low-confidence line ({confidence}%): {text}");
                continue;
            }
            lines.push((text, confidence as f32 / 100.0));
        }
        Ok(lines)
    }
}

impl Detector for TesseractRecognizer {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Observation>> {
        Ok(self
            .recognize(image)?
            .into_iter()
            .filter_map(|line| Observation::text_from_candidates([line]))
            .collect())
    }
}
