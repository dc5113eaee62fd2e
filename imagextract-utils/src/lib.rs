//! Common helpers shared across the imagextract crates.

/// Run settings and their JSON persistence.
pub mod config;
/// Image decoding, resizing, and tensor layout conversion.
pub mod image_utils;
/// PNG, text, and JSON encoders for produced artifacts.
pub mod output;
/// PDF page rendering.
#[cfg(feature = "pdf")]
pub mod pdf;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;

use std::path::Path;

use anyhow::Result;
use log::LevelFilter;

pub use config::{PipelineSettings, resolve_output_root};
pub use image_utils::{
    IMAGENET_MEAN, IMAGENET_STD, compute_resize_scales, is_pdf, load_image, resize_image,
    rgb_to_bgr_chw, rgb_to_normalized_chw,
};
pub use output::{PngCompression, save_png, write_json_pretty, write_text};
pub use telemetry::{
    TimingGuard, configure as configure_telemetry, telemetry_allows, telemetry_enabled,
    timing_guard,
};

/// Initialize logging once, honouring `RUST_LOG` and falling back to `default_filter`.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(telemetry::TELEMETRY_TARGET, LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<std::path::PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
