//! Input validation and output naming.

use std::path::{Path, PathBuf};

use imagextract_core::PipelineError;

/// Extensions accepted on the command line, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "tiff", "pdf"];

/// Reject paths whose extension is not in [`ALLOWED_EXTENSIONS`].
pub fn validate_input(path: &Path) -> Result<(), PipelineError> {
    let allowed = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
        .unwrap_or(false);
    if allowed {
        Ok(())
    } else {
        Err(PipelineError::Usage(format!(
            "Invalid file type: {}. Allowed extensions: {}",
            path.display(),
            ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }
}

/// `<root>/<file stem>`, the directory a run writes into.
pub fn output_dir_for(root: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_else(|| "image".into());
    root.join(stem)
}

/// File name under which the source copy is saved.
pub fn source_name(input: &Path) -> String {
    input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.png".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_match_case_insensitively() {
        for name in ["a.jpg", "b.JPEG", "c.Png", "d.tiff", "e.PDF"] {
            assert!(validate_input(Path::new(name)).is_ok(), "{name}");
        }
    }

    #[test]
    fn other_extensions_are_usage_errors() {
        for name in ["a.gif", "b.tif", "noext", "c.png.bak"] {
            let err = validate_input(Path::new(name)).unwrap_err();
            assert!(matches!(err, PipelineError::Usage(_)), "{name}");
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn output_dir_uses_stem_and_source_keeps_name() {
        let input = Path::new("/photos/holiday.beach.JPG");
        assert_eq!(
            output_dir_for(Path::new("/docs"), input),
            PathBuf::from("/docs/holiday.beach")
        );
        assert_eq!(source_name(input), "holiday.beach.JPG");
    }
}
