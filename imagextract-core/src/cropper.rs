//! Pixel-exact sub-image extraction.

use image::{DynamicImage, GenericImageView};

use crate::error::PipelineError;
use crate::geometry::PixelRect;

/// Copy the pixels of `image` covered by `rect`.
///
/// Edges are rounded to whole pixels and clamped to the image. The result is never resized or
/// padded; it is a straight copy of source pixels. Fails with [`PipelineError::EmptyRegion`] when
/// nothing of the rect remains inside the image.
pub fn crop(image: &DynamicImage, rect: &PixelRect) -> Result<DynamicImage, PipelineError> {
    let (img_w, img_h) = image.dimensions();
    let (x, y, width, height) = rect
        .to_pixel_bounds(img_w, img_h)
        .ok_or_else(|| PipelineError::EmptyRegion {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        })?;
    Ok(image.crop_imm(x, y, width, height))
}
