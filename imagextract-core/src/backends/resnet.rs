//! ResNet whole-image classifier.

use std::path::Path;

use anyhow::Result;
use image::DynamicImage;

use super::{
    labels::{label_for, load_labels},
    onnx::OnnxModel,
    postprocess::top_k,
    preprocess::{InputSize, TensorLayout, preprocess},
};
use crate::{observation::Observation, stage::Detector};
use imagextract_utils::{
    config::{PipelineSettings, WholeImageClassifierSettings},
    timing_guard,
};

/// Ranks ImageNet-style labels for the whole image.
#[derive(Debug)]
pub struct ResNetClassifier {
    model: OnnxModel,
    labels: Vec<String>,
    input_size: InputSize,
    top_k: Option<usize>,
}

impl ResNetClassifier {
    pub fn load(
        model_path: &Path,
        labels: Vec<String>,
        input_size: InputSize,
        top_k: Option<usize>,
    ) -> Result<Self> {
        let model = OnnxModel::load(model_path, "ResNet", Some(input_size.nchw()))?;
        Ok(Self {
            model,
            labels,
            input_size,
            top_k,
        })
    }

    pub fn from_settings(
        settings: &WholeImageClassifierSettings,
        models_dir: &Path,
    ) -> Result<Self> {
        let labels = load_labels(&PipelineSettings::model_path(
            models_dir,
            &settings.labels_file,
        ))?;
        Self::load(
            &PipelineSettings::model_path(models_dir, &settings.model_file),
            labels,
            InputSize::square(settings.input_size),
            settings.top_k,
        )
    }

    /// Ranked `(label, probability)` pairs, best first.
    pub fn classify(&self, image: &DynamicImage) -> Result<Vec<(String, f32)>> {
        let prep = preprocess(image, self.input_size, TensorLayout::ImageNet)?;
        let outputs = {
            let _guard = timing_guard("imagextract_core::resnet::inference", log::Level::Debug);
            self.model.run(prep.tensor)?
        };
        let logits = outputs[0]
            .as_slice::<f32>()
            .map_err(|e| anyhow::anyhow!("ResNet output is not f32: {e}"))?;
        Ok(rank_labels(logits, &self.labels, self.top_k))
    }
}

impl Detector for ResNetClassifier {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Observation>> {
        Ok(self
            .classify(image)?
            .into_iter()
            .map(|(label, confidence)| Observation::Classification { label, confidence })
            .collect())
    }
}

/// Convert raw scores to probabilities and rank every label, best first. `limit` keeps only the
/// most likely ones.
///
/// Outputs that already form a probability distribution are used as-is.
pub fn rank_labels(
    scores: &[f32],
    labels: &[String],
    limit: Option<usize>,
) -> Vec<(String, f32)> {
    let probabilities = if is_distribution(scores) {
        scores.to_vec()
    } else {
        softmax(scores)
    };
    top_k(&probabilities, limit.unwrap_or(probabilities.len()))
        .into_iter()
        .map(|(index, probability)| (label_for(labels, index), probability))
        .collect()
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits
        .iter()
        .copied()
        .filter(|value| value.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![0.0; logits.len()];
    }
    let exps: Vec<f32> = logits.iter().map(|value| (value - max).exp()).collect();
    let sum: f32 = exps.iter().filter(|value| value.is_finite()).sum();
    exps.into_iter()
        .map(|value| if value.is_finite() { value / sum } else { 0.0 })
        .collect()
}

fn is_distribution(scores: &[f32]) -> bool {
    !scores.is_empty()
        && scores.iter().all(|value| (0.0..=1.0).contains(value))
        && (scores.iter().sum::<f32>() - 1.0).abs() < 1e-3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn softmax_sums_to_one_and_preserves_order() {
        let probabilities = softmax(&[1.0, 3.0, 2.0]);
        assert!((probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(probabilities[1] > probabilities[2] && probabilities[2] > probabilities[0]);
        assert_eq!(softmax(&[f32::NAN, f32::NAN]), vec![0.0, 0.0]);
    }

    #[test]
    fn ranks_logits_best_first() {
        let names = labels(&["a", "b", "c", "d"]);
        let ranked = rank_labels(&[0.5, 4.0, 2.0, -1.0], &names, Some(2));
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0, "b");
        assert_eq!(ranked[1].0, "c");
        assert!(ranked[0].1 > 0.8);
    }

    #[test]
    fn probability_outputs_pass_through() {
        let ranked = rank_labels(&[0.25, 0.75], &labels(&["cat", "dog"]), Some(5));
        assert_eq!(ranked, vec![("dog".to_string(), 0.75), ("cat".to_string(), 0.25)]);
    }

    #[test]
    fn default_settings_report_every_label() {
        let scores: Vec<f32> = (0..1000).map(|i| (i % 97) as f32 * 0.01).collect();
        let names: Vec<String> = (0..1000).map(|i| format!("class {i}")).collect();
        let limit = PipelineSettings::default().whole_image_classifier.top_k;

        let ranked = rank_labels(&scores, &names, limit);
        assert_eq!(ranked.len(), 1000);
        assert!(ranked.windows(2).all(|pair| pair[0].1 >= pair[1].1));
    }

    #[test]
    fn loading_without_labels_fails() {
        let settings = WholeImageClassifierSettings::default();
        let err = ResNetClassifier::from_settings(&settings, Path::new("/nonexistent/models"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("imagenet_classes.txt"));
    }
}
