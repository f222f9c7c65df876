use super::{Classification, ClassificationModel};
use crate::backend::OrtModel;
use crate::config::InferenceConfig;
use crate::labels::Labels;
use common::span;
use image::RgbImage;
use preprocess::CenterCrop;
use preprocess::config::{CLASSIFIER_CROP, CLASSIFIER_RESIZE_SHORT};

const INPUT_NAME: &str = "input";
const OUTPUT_NAME: &str = "output";

/// ImageNet-style image classifier (`[1, 3, 224, 224]` in, `[1, classes]` out).
pub struct OnnxClassifier {
    model: OrtModel,
    crop: CenterCrop,
    labels: Labels,
}

impl OnnxClassifier {
    pub fn load(path: &str, config: &InferenceConfig) -> anyhow::Result<Self> {
        let model = OrtModel::load(path, config.execution_provider, config.intra_threads)?;
        let labels = Labels::load_or(config.classifier_labels_path.as_deref(), Labels::default)?;
        tracing::info!(classes = labels.len(), "Classifier ready");

        Ok(Self {
            model,
            crop: CenterCrop::new(CLASSIFIER_RESIZE_SHORT, CLASSIFIER_CROP),
            labels,
        })
    }
}

impl ClassificationModel for OnnxClassifier {
    fn classify(
        &mut self,
        image: &RgbImage,
        top_k: usize,
    ) -> anyhow::Result<Vec<Classification>> {
        let (width, height) = image.dimensions();
        let input = self.crop.apply(image.as_raw(), width, height)?;

        let mut outputs = {
            let _s = span!("model_inference", model = "classifier");
            self.model.run(INPUT_NAME, &input.tensor, &[OUTPUT_NAME])?
        };
        let logits = outputs
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Classifier returned no output"))?;
        let scores: Vec<f32> = logits.iter().copied().collect();

        Ok(top_k_indices(&probabilities(&scores), top_k)
            .into_iter()
            .map(|(id, confidence)| Classification {
                label: self.labels.name(id).into_owned(),
                confidence,
            })
            .collect())
    }
}

/// Softmax, unless the scores already form a distribution.
fn probabilities(scores: &[f32]) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    let already_normalised =
        scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3;
    if already_normalised || scores.is_empty() {
        return scores.to_vec();
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

fn top_k_indices(probs: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_applied_to_logits() {
        let probs = probabilities(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();

        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
        assert!((probs[2] - 0.665).abs() < 1e-3);
    }

    #[test]
    fn test_distribution_passes_through() {
        let probs = probabilities(&[0.1, 0.7, 0.2]);
        assert_eq!(probs, vec![0.1, 0.7, 0.2]);
    }

    #[test]
    fn test_top_k_order_and_truncation() {
        let ranked = top_k_indices(&[0.1, 0.5, 0.05, 0.35], 2);
        assert_eq!(ranked, vec![(1, 0.5), (3, 0.35)]);

        assert_eq!(top_k_indices(&[0.4, 0.6], 10).len(), 2);
    }
}
