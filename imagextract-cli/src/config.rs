//! Configuration loading and CLI override logic.

use std::{env, path::PathBuf};

use anyhow::{Context, Result};
use imagextract_utils::{PipelineSettings, normalize_path};
use log::info;

use crate::args::ExtractArgs;

/// Load settings from `--config`, then `$IMAGEXTRACT_CONFIG`, then built-in defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<PipelineSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)
            .with_context(|| format!("settings file not found: {}", path.display()))?;
        let settings = PipelineSettings::resolve(Some(&resolved))?;
        info!("Loaded settings from {}", resolved.display());
        Ok(settings)
    } else {
        PipelineSettings::resolve(None)
    }
}

/// Apply command-line arguments to override loaded or default settings.
pub fn apply_cli_overrides(settings: &mut PipelineSettings, args: &ExtractArgs) {
    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            settings.telemetry.level = lower.clone();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
        }
    }
    if let Some(dir) = args.models_dir.as_ref() {
        settings.models_dir = Some(dir.clone());
    }
    if let Some(root) = args.output_root.as_ref() {
        settings.output_root = Some(root.clone());
    }
    settings.sanitize();
}

/// Directory holding model files: the configured one, else `models/` beside the executable.
pub fn resolve_models_dir(settings: &PipelineSettings) -> Result<PathBuf> {
    if let Some(dir) = settings.models_dir.as_ref() {
        return Ok(dir.clone());
    }
    let exe = env::current_exe().context("failed to locate the running executable")?;
    exe.parent()
        .map(|parent| parent.join("models"))
        .context("executable path has no parent directory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn flags_override_file_values() {
        let args = ExtractArgs::parse_from([
            "imagextract",
            "--models-dir",
            "/srv/models",
            "--output-root",
            "/srv/out",
            "--telemetry-level",
            " OFF ",
            "--telemetry",
            "a.png",
        ]);
        let mut settings = PipelineSettings::default();
        settings.models_dir = Some(PathBuf::from("/from/file"));
        apply_cli_overrides(&mut settings, &args);

        assert_eq!(settings.models_dir, Some(PathBuf::from("/srv/models")));
        assert_eq!(settings.output_root, Some(PathBuf::from("/srv/out")));
        assert_eq!(settings.telemetry.level, "off");
        assert!(!settings.telemetry.enabled);
    }

    #[test]
    fn models_dir_defaults_next_to_executable() {
        let settings = PipelineSettings::default();
        let dir = resolve_models_dir(&settings).expect("models dir");
        assert!(dir.ends_with("models"));

        let explicit = PipelineSettings {
            models_dir: Some(PathBuf::from("weights")),
            ..PipelineSettings::default()
        };
        assert_eq!(
            resolve_models_dir(&explicit).unwrap(),
            PathBuf::from("weights")
        );
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let missing = PathBuf::from("/definitely/not/here/settings.json");
        assert!(load_settings(Some(&missing)).is_err());
    }
}
