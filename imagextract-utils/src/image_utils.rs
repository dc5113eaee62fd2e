use std::{fs::File, io::Read, path::Path};

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage, imageops::FilterType};
use ndarray::Array3;

/// ImageNet channel means (RGB) used by torchvision-style classifiers.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations (RGB).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

const PDF_SIGNATURE: &[u8; 5] = b"%PDF-";

/// Decode an image file into memory.
///
/// The format is guessed from the file contents rather than trusted from the extension. PDF
/// documents are rendered from their first page.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    if is_pdf(path_ref) {
        return load_pdf(path_ref);
    }
    image::ImageReader::open(path_ref)
        .with_context(|| format!("failed to open image {}", path_ref.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to read image header {}", path_ref.display()))?
        .decode()
        .with_context(|| format!("failed to decode image {}", path_ref.display()))
}

/// True when the file starts with the PDF signature or carries a `.pdf` extension.
pub fn is_pdf(path: &Path) -> bool {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    by_extension || has_pdf_signature(path)
}

fn has_pdf_signature(path: &Path) -> bool {
    let mut header = [0u8; 5];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut header))
        .is_ok_and(|()| &header == PDF_SIGNATURE)
}

#[cfg(feature = "pdf")]
fn load_pdf(path: &Path) -> Result<DynamicImage> {
    crate::pdf::render_first_page(path, crate::pdf::PDF_RENDER_DPI)
}

#[cfg(not(feature = "pdf"))]
fn load_pdf(path: &Path) -> Result<DynamicImage> {
    anyhow::bail!(
        "failed to decode image {}: PDF input requires building with the `pdf` feature",
        path.display()
    )
}

/// Resize an image to exactly `width` x `height` and convert it to RGB.
pub fn resize_image(image: &DynamicImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    image.resize_exact(width, height, filter).to_rgb8()
}

/// Convert an RGB image into a BGR CHW array with raw `0..=255` values (OpenCV `blobFromImage`).
pub fn rgb_to_bgr_chw(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        array[(0, yi, xi)] = pixel[2] as f32;
        array[(1, yi, xi)] = pixel[1] as f32;
        array[(2, yi, xi)] = pixel[0] as f32;
    }
    array
}

/// Convert an RGB image into an RGB CHW array scaled to `[0, 1]`, then standardized with
/// `(value - mean) / std` per channel.
pub fn rgb_to_normalized_chw(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        for channel in 0..3 {
            let value = pixel[channel] as f32 / 255.0;
            array[(channel, yi, xi)] = (value - mean[channel]) / std[channel];
        }
    }
    array
}

/// Scale factors that map coordinates from the resized `target` back to the `original` image.
pub fn compute_resize_scales(original: (u32, u32), target: (u32, u32)) -> Result<(f32, f32)> {
    let (orig_w, orig_h) = original;
    let (target_w, target_h) = target;
    anyhow::ensure!(
        target_w > 0 && target_h > 0,
        "target dimensions must be non-zero"
    );
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "original dimensions must be non-zero"
    );
    Ok((
        orig_w as f32 / target_w as f32,
        orig_h as f32 / target_h as f32,
    ))
}
