//! Resizing and tensor layout conversion ahead of inference.
//!
//! Each model expects a different input convention, captured by [`TensorLayout`]. The returned
//! scale factors map coordinates in the model's input space back to the source image.

use std::borrow::Cow;

use anyhow::Result;
use image::{DynamicImage, GenericImageView, RgbImage, imageops::FilterType};
use tract_onnx::prelude::Tensor;

use imagextract_utils::{
    IMAGENET_MEAN, IMAGENET_STD, compute_resize_scales, resize_image, rgb_to_bgr_chw,
    rgb_to_normalized_chw, timing_guard,
};

/// Model input resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(edge: u32) -> Self {
        Self::new(edge, edge)
    }

    /// `[1, 3, H, W]`
    pub fn nchw(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::square(640)
    }
}

/// Channel order and value range of the input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// BGR, raw `0..=255` values (OpenCV `blobFromImage`).
    Bgr255,
    /// RGB scaled to `[0, 1]`.
    Rgb01,
    /// RGB scaled to `[0, 1]` then standardized with the ImageNet mean and std.
    ImageNet,
}

/// Tensor plus the metadata needed to map results back to the source image.
#[derive(Debug)]
pub struct PreprocessOutput {
    /// `[1, 3, H, W]` input tensor.
    pub tensor: Tensor,
    /// Horizontal factor from input space to source pixels.
    pub scale_x: f32,
    /// Vertical factor from input space to source pixels.
    pub scale_y: f32,
}

/// Resize `image` to `input_size` and lay it out as `layout`.
pub fn preprocess(
    image: &DynamicImage,
    input_size: InputSize,
    layout: TensorLayout,
) -> Result<PreprocessOutput> {
    let _guard = timing_guard("imagextract_core::preprocess", log::Level::Trace);
    let input_w = input_size.width;
    let input_h = input_size.height;
    anyhow::ensure!(
        input_w > 0 && input_h > 0,
        "input dimensions must be greater than zero"
    );

    let (orig_w, orig_h) = image.dimensions();
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "source image dimensions must be greater than zero"
    );
    let resized_rgb: Cow<'_, RgbImage> = if orig_w == input_w && orig_h == input_h {
        match image.as_rgb8() {
            Some(rgb) => Cow::Borrowed(rgb),
            None => Cow::Owned(image.to_rgb8()),
        }
    } else {
        Cow::Owned(resize_image(image, input_w, input_h, FilterType::Triangle))
    };

    let chw = match layout {
        TensorLayout::Bgr255 => rgb_to_bgr_chw(&resized_rgb),
        TensorLayout::Rgb01 => rgb_to_normalized_chw(&resized_rgb, [0.0; 3], [1.0; 3]),
        TensorLayout::ImageNet => {
            rgb_to_normalized_chw(&resized_rgb, IMAGENET_MEAN, IMAGENET_STD)
        }
    };

    let (data, offset) = chw.into_raw_vec_and_offset();
    debug_assert_eq!(offset, Some(0), "expected contiguous array");
    let tensor = Tensor::from_shape(&input_size.nchw(), &data)
        .map_err(|e| anyhow::anyhow!("failed to build tensor: {e}"))?;

    let (scale_x, scale_y) = compute_resize_scales((orig_w, orig_h), (input_w, input_h))?;

    Ok(PreprocessOutput {
        tensor,
        scale_x,
        scale_y,
    })
}
