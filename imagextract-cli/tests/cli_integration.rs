use std::fs;

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use predicates::prelude::*;
use tempfile::tempdir;

fn imagextract() -> Command {
    let mut cmd = Command::cargo_bin("imagextract").unwrap();
    cmd.env_remove("IMAGEXTRACT_CONFIG");
    cmd
}

#[test]
fn help_exits_cleanly() {
    imagextract()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--models-dir"));
}

#[test]
fn missing_argument_prints_usage() {
    imagextract()
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Usage: imagextract <image_path>"));
}

#[test]
fn two_arguments_print_usage() {
    imagextract()
        .args(["a.png", "b.png"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn disallowed_extension_is_rejected_before_loading() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("anim.gif");
    fs::write(&input, b"GIF89a").unwrap();

    imagextract()
        .arg(&input)
        .arg("--output-root")
        .arg(dir.path())
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Allowed extensions"));
    assert!(!dir.path().join("anim").exists());
}

#[test]
fn undecodable_image_exits_with_load_error() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("broken.png");
    fs::write(&input, b"not really a png").unwrap();

    imagextract()
        .arg(&input)
        .arg("--output-root")
        .arg(dir.path())
        .assert()
        .code(3)
        .stdout(predicate::str::contains("Failed to load image at"));
    assert!(!dir.path().join("broken").exists());
}

#[test]
fn run_without_models_only_copies_source() {
    let input_dir = tempdir().unwrap();
    let models_dir = tempdir().unwrap();
    let output_root = tempdir().unwrap();

    let input = input_dir.path().join("Snapshot.PNG");
    RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 8) as u8, (y * 10) as u8, 90]))
        .save_with_format(&input, image::ImageFormat::Png)
        .unwrap();

    imagextract()
        .arg(&input)
        .arg("--models-dir")
        .arg(models_dir.path())
        .arg("--output-root")
        .arg(output_root.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Face Detection: \u{2705}"))
        .stdout(predicate::str::contains("Image Processing Task Complete."));

    let out_dir = output_root.path().join("Snapshot");
    let entries: Vec<String> = fs::read_dir(&out_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["Snapshot.PNG".to_string()]);

    let copy = image::open(out_dir.join("Snapshot.PNG")).unwrap();
    assert_eq!((copy.width(), copy.height()), (32, 24));
}

#[test]
fn rerun_into_existing_directory_succeeds() {
    let work = tempdir().unwrap();
    let input = work.path().join("scan.jpg");
    RgbImage::from_pixel(16, 16, Rgb([200, 10, 10]))
        .save_with_format(&input, image::ImageFormat::Jpeg)
        .unwrap();
    let models = work.path().join("no-models");
    fs::create_dir(&models).unwrap();

    for _ in 0..2 {
        imagextract()
            .arg(&input)
            .arg("--models-dir")
            .arg(&models)
            .arg("--output-root")
            .arg(work.path().join("out"))
            .assert()
            .success();
    }
    assert!(work.path().join("out/scan/scan.jpg").is_file());
}

#[test]
fn settings_file_drives_models_and_compression() {
    let work = tempdir().unwrap();
    let models = work.path().join("models");
    fs::create_dir(&models).unwrap();
    let out = work.path().join("out");
    let config = work.path().join("settings.json");
    fs::write(
        &config,
        format!(
            r#"{{ "models_dir": {:?}, "output_root": {:?}, "png_compression": "best" }}"#,
            models.display().to_string(),
            out.display().to_string()
        ),
    )
    .unwrap();

    let input = work.path().join("card.png");
    RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]))
        .save_with_format(&input, image::ImageFormat::Png)
        .unwrap();

    imagextract()
        .arg("--config")
        .arg(&config)
        .arg(&input)
        .assert()
        .success();
    let copy = image::open(out.join("card/card.png")).unwrap();
    assert_eq!((copy.width(), copy.height()), (8, 8));
}
