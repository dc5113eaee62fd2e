//! Encoders for the files an extraction run produces.
//!
//! Images are always written as PNG regardless of the destination's extension, text is written
//! as UTF-8, and structured records as pretty-printed JSON.

use anyhow::{Context, Result};
use image::{
    DynamicImage, ImageEncoder,
    codecs::png::{CompressionType, FilterType, PngEncoder},
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

/// Simplified PNG compression strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    #[default]
    Default,
    Best,
}

impl PngCompression {
    fn into_image(self) -> CompressionType {
        match self {
            Self::Fast => CompressionType::Fast,
            Self::Default => CompressionType::Default,
            Self::Best => CompressionType::Best,
        }
    }
}

/// Encode `image` as PNG and write it to `destination`.
pub fn save_png(
    image: &DynamicImage,
    destination: &Path,
    compression: PngCompression,
) -> Result<()> {
    ensure_parent(destination)?;
    debug!("Encoding PNG {}", destination.display());

    // Anything other than 8-bit luma/RGB(A) is flattened to RGBA8 before encoding.
    let rgba;
    let source = match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => image,
        _ => {
            rgba = DynamicImage::ImageRgba8(image.to_rgba8());
            &rgba
        }
    };

    let file = File::create(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;
    let mut writer = BufWriter::new(file);
    PngEncoder::new_with_quality(&mut writer, compression.into_image(), FilterType::Adaptive)
        .write_image(
            source.as_bytes(),
            source.width(),
            source.height(),
            source.color().into(),
        )
        .with_context(|| format!("failed to encode PNG {}", destination.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", destination.display()))?;
    Ok(())
}

/// Write UTF-8 text to `destination`, replacing any existing file.
pub fn write_text(destination: &Path, content: &str) -> Result<()> {
    ensure_parent(destination)?;
    fs::write(destination, content.as_bytes())
        .with_context(|| format!("failed to write {}", destination.display()))
}

/// Serialize `value` as pretty-printed JSON into `destination`.
pub fn write_json_pretty<T: Serialize + ?Sized>(destination: &Path, value: &T) -> Result<()> {
    ensure_parent(destination)?;
    let file = File::create(destination)
        .with_context(|| format!("failed to create {}", destination.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("failed to serialize JSON to {}", destination.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", destination.display()))?;
    Ok(())
}

fn ensure_parent(destination: &Path) -> Result<()> {
    if let Some(parent) = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty() && !p.exists())
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}
