//! Persistence of artifacts under one output directory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::artifact::Artifact;
use imagextract_utils::{PngCompression, save_png, write_json_pretty, write_text};

/// Destination for artifacts produced by a run.
pub trait ArtifactWriter {
    /// Persist `artifact`, returning where it ended up. Existing files are overwritten.
    fn write(&mut self, artifact: &Artifact) -> Result<PathBuf>;
}

/// Writes every artifact as a file directly inside one directory.
#[derive(Debug, Clone)]
pub struct DirectoryWriter {
    root: PathBuf,
    compression: PngCompression,
}

impl DirectoryWriter {
    /// Create (or reuse) `root`. An existing directory is written into as-is.
    pub fn create<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if root.is_dir() {
            warn!("Output directory already exists at {}", root.display());
        } else {
            fs::create_dir_all(&root).with_context(|| {
                format!("failed to create output directory {}", root.display())
            })?;
            info!("Output directory created at {}", root.display());
        }
        Ok(Self {
            root,
            compression: PngCompression::Default,
        })
    }

    pub fn with_compression(mut self, compression: PngCompression) -> Self {
        self.compression = compression;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactWriter for DirectoryWriter {
    fn write(&mut self, artifact: &Artifact) -> Result<PathBuf> {
        let destination = self.root.join(artifact.file_name());
        match artifact {
            Artifact::SourceImage { image, .. } | Artifact::CroppedImage { image, .. } => {
                save_png(image, &destination, self.compression)?
            }
            Artifact::TextReport { content, .. }
            | Artifact::ClassificationReport { content, .. } => {
                write_text(&destination, content)?
            }
            Artifact::DetectionManifest { records, .. } => {
                write_json_pretty(&destination, records)?
            }
        }
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{DetectionRecord, detection_manifest, text_report};
    use crate::geometry::NormalizedBox;
    use image::DynamicImage;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_directories_and_reuses_existing_ones() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("photo");
        let first = DirectoryWriter::create(&root).expect("create");
        assert!(first.root().is_dir());
        let again = DirectoryWriter::create(&root).expect("reuse");
        assert_eq!(again.root(), root.as_path());
    }

    #[test]
    fn writes_each_artifact_kind_by_name() {
        let dir = tempdir().unwrap();
        let mut writer = DirectoryWriter::create(dir.path())
            .unwrap()
            .with_compression(PngCompression::Fast);

        let crop = Artifact::CroppedImage {
            name: "Face0.png".into(),
            image: DynamicImage::new_rgb8(3, 2),
        };
        let path = writer.write(&crop).unwrap();
        assert_eq!(path, dir.path().join("Face0.png"));
        assert_eq!(image::open(&path).unwrap().width(), 3);

        let text = text_report(["hello"]).unwrap();
        let path = writer.write(&text).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "hello\n");

        let record = DetectionRecord::new(0, "cup", 0.8, NormalizedBox::full());
        let manifest = detection_manifest(vec![record.clone()]).unwrap();
        let path = writer.write(&manifest).unwrap();
        let parsed: Vec<DetectionRecord> =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed, vec![record]);
    }
}
