use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use log::debug;
use pdfium_render::prelude::*;

/// Resolution the first page of a PDF input is rasterised at.
pub const PDF_RENDER_DPI: f32 = 150.0;

const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Bind pdfium from the working directory, falling back to the system library.
fn bind_pdfium() -> Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .context("failed to bind the pdfium library")?;
    Ok(Pdfium::new(bindings))
}

/// Render page 1 of the PDF at `path` to an image at `dpi`.
pub fn render_first_page(path: &Path, dpi: f32) -> Result<DynamicImage> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .with_context(|| format!("failed to open PDF {}", path.display()))?;
    let page = document
        .pages()
        .get(0)
        .with_context(|| format!("PDF {} has no pages", path.display()))?;

    let scale = dpi / PDF_POINTS_PER_INCH;
    let pixel_width = (page.width().value * scale).round().max(1.0) as i32;
    let pixel_height = (page.height().value * scale).round().max(1.0) as i32;
    debug!(
        "Rendering {} page 1 at {pixel_width}x{pixel_height}",
        path.display()
    );

    let bitmap = page
        .render_with_config(
            &PdfRenderConfig::new()
                .set_target_width(pixel_width)
                .set_target_height(pixel_height)
                .render_form_data(true)
                .render_annotations(true),
        )
        .with_context(|| format!("failed to render PDF {}", path.display()))?;
    Ok(bitmap.as_image())
}
