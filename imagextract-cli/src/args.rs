//! Command-line argument definitions for imagextract.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Extract faces, text, objects and labels from a single image.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct ExtractArgs {
    /// Image to process (jpg, jpeg, png, tiff or pdf).
    #[arg(value_name = "IMAGE")]
    pub images: Vec<PathBuf>,

    /// Optional settings JSON. Falls back to `$IMAGEXTRACT_CONFIG`, then built-in defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding model and label files (defaults to `models/` next to the executable).
    #[arg(long, value_name = "DIR")]
    pub models_dir: Option<PathBuf>,

    /// Root under which the per-image output directory is created (defaults to Documents).
    #[arg(long, value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,
}

impl ExtractArgs {
    /// The single image argument, or `None` when zero or several were given.
    pub fn single_image(&self) -> Option<&PathBuf> {
        match self.images.as_slice() {
            [image] => Some(image),
            _ => None,
        }
    }
}
