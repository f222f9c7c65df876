use super::DepthModel;
use crate::backend::OrtModel;
use crate::config::InferenceConfig;
use crate::processing::depth::DepthMap;
use common::span;
use image::RgbImage;
use preprocess::DepthResize;

const INPUT_NAME: &str = "pixel_values";
const OUTPUT_NAME: &str = "predicted_depth";

/// Depth Anything V2 exported to ONNX. Output is relative inverse depth.
pub struct DepthAnything {
    model: OrtModel,
    resize: DepthResize,
}

impl DepthAnything {
    pub fn load(path: &str, config: &InferenceConfig) -> anyhow::Result<Self> {
        let model = OrtModel::load(path, config.execution_provider, config.intra_threads)?;
        tracing::info!(target_size = config.depth_input_size, "Depth model ready");

        Ok(Self {
            model,
            resize: DepthResize::new(config.depth_input_size),
        })
    }
}

impl DepthModel for DepthAnything {
    fn estimate(&mut self, image: &RgbImage) -> anyhow::Result<DepthMap> {
        let (width, height) = image.dimensions();
        let input = self.resize.apply(image.as_raw(), width, height)?;

        let mut outputs = {
            let _s = span!("model_inference", model = "depth");
            self.model.run(INPUT_NAME, &input.tensor, &[OUTPUT_NAME])?
        };
        let raw = outputs
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Depth model returned no output"))?;

        // [1, h, w] or [1, 1, h, w]
        let shape = raw.shape().to_vec();
        if shape.len() < 2 || shape[..shape.len() - 2].iter().any(|d| *d != 1) {
            anyhow::bail!("Unexpected depth output shape {:?}", shape);
        }
        let (rows, cols) = (shape[shape.len() - 2], shape[shape.len() - 1]);
        let prediction = raw.into_shape_with_order((rows, cols))?;

        Ok(DepthMap::from_prediction(
            prediction.view(),
            height as usize,
            width as usize,
        ))
    }
}
