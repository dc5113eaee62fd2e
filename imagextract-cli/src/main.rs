//! imagextract: run text, face, object and whole-image detection over one image and save
//! what was found next to a copy of the source.

mod args;
mod config;
mod input;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, error::ErrorKind};
use imagextract_core::{DirectoryWriter, PipelineError, PipelineOrchestrator, build_stages};
use imagextract_utils::{configure_telemetry, init_logging, load_image, resolve_output_root};
use log::{error, info, warn};

use crate::{
    args::ExtractArgs,
    config::{apply_cli_overrides, load_settings, resolve_models_dir},
    input::{output_dir_for, source_name, validate_input},
};

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_IMAGE_LOAD: u8 = 3;

const USAGE: &str = "Usage: imagextract <image_path>";

fn main() -> ExitCode {
    if let Err(err) = init_logging(log::LevelFilter::Info) {
        eprintln!("failed to initialize logging: {err:#}");
    }

    let args = match ExtractArgs::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            println!("\n[ERROR] {USAGE}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_failure(&err),
    }
}

fn run(args: &ExtractArgs) -> Result<()> {
    let image_path = args
        .single_image()
        .ok_or_else(|| PipelineError::Usage(USAGE.to_string()))?;
    validate_input(image_path)?;

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, args);
    configure_telemetry(
        settings.telemetry.enabled,
        settings.telemetry.level_filter(),
    );

    let image = load_image(image_path).map_err(|source| PipelineError::ImageLoad {
        path: image_path.clone(),
        source,
    })?;
    info!(
        "Loaded {} ({}x{})",
        image_path.display(),
        image.width(),
        image.height()
    );

    let output_root = resolve_output_root(&settings)?;
    let output_dir = output_dir_for(&output_root, image_path);
    let mut writer =
        DirectoryWriter::create(&output_dir)?.with_compression(settings.png_compression);

    let models_dir = resolve_models_dir(&settings)?;
    info!("Loading models from {}", models_dir.display());
    let orchestrator = PipelineOrchestrator::new(build_stages(&settings, &models_dir))
        .with_face_pad_factor(settings.face.pad_factor);

    let source = source_name(image_path);
    println!("Processing {source}...");
    let summary = orchestrator.process_with_progress(
        &image,
        &source,
        &mut writer,
        |report| {
            println!("{}: \u{2705}", report.kind.title());
            info!(
                "{} produced {} observation(s), {} file(s) written, {} skipped",
                report.kind.title(),
                report.observations,
                report.written,
                report.skipped
            );
        },
    );

    let failed = summary.total_failed();
    if failed > 0 {
        warn!("{failed} artifact(s) could not be written");
    }
    info!(
        "Wrote {} file(s) to {}",
        summary.files.len(),
        writer.root().display()
    );
    println!("\n[INFO] Image Processing Task Complete.\n");
    Ok(())
}

fn report_failure(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Usage(message)) => {
            println!("\n[ERROR] {message}");
            ExitCode::from(EXIT_USAGE)
        }
        Some(PipelineError::ImageLoad { path, source }) => {
            println!("[ERROR] Failed to load image at {}", path.display());
            error!("{source:#}");
            ExitCode::from(EXIT_IMAGE_LOAD)
        }
        _ => {
            println!("[ERROR] {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
