use super::SegmentationModel;
use crate::backend::OrtModel;
use crate::config::InferenceConfig;
use crate::labels::Labels;
use crate::processing::segmentation::{Segment, SegmentationDecoder, TransformParams};
use common::span;
use image::RgbImage;
use preprocess::Letterbox;
use std::borrow::Cow;

const INPUT_NAME: &str = "images";
const OUTPUTS: [&str; 2] = ["output0", "output1"];

/// YOLOv8-seg exported to ONNX.
pub struct YoloSegmenter {
    model: OrtModel,
    letterbox: Letterbox,
    decoder: SegmentationDecoder,
    labels: Labels,
}

impl YoloSegmenter {
    pub fn load(config: &InferenceConfig) -> anyhow::Result<Self> {
        let model = OrtModel::load(
            &config.segmentation_model_path,
            config.execution_provider,
            config.intra_threads,
        )?;
        let labels = Labels::load_or(config.segmentation_labels_path.as_deref(), Labels::coco)?;

        tracing::info!(
            classes = labels.len(),
            input_width = config.input_size.0,
            input_height = config.input_size.1,
            "Segmentation model ready"
        );

        Ok(Self {
            model,
            letterbox: Letterbox::new(config.input_size),
            decoder: SegmentationDecoder::new(
                config.confidence_threshold,
                config.iou_threshold,
                config.max_detections,
            ),
            labels,
        })
    }
}

impl SegmentationModel for YoloSegmenter {
    fn segment(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Segment>> {
        let (width, height) = image.dimensions();
        let input = self.letterbox.apply(image.as_raw(), width, height)?;

        let outputs = {
            let _s = span!("model_inference", model = "segmentation");
            self.model.run(INPUT_NAME, &input.tensor, &OUTPUTS)?
        };
        let [preds, protos] = outputs.as_slice() else {
            anyhow::bail!("Segmentation model returned {} outputs", outputs.len());
        };

        let transform = TransformParams {
            orig_width: width,
            orig_height: height,
            input_width: self.letterbox.input_size.0,
            input_height: self.letterbox.input_size.1,
            scale: input.scale,
            offset_x: input.offset_x,
            offset_y: input.offset_y,
        };

        self.decoder
            .decode(&preds.view(), &protos.view(), &transform)
    }

    fn class_name(&self, class_id: usize) -> Cow<'_, str> {
        self.labels.name(class_id)
    }
}
