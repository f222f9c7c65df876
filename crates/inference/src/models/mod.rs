//! Model seams used by the prediction service.
//!
//! Each trait has an ONNX Runtime implementation; tests substitute fakes.

mod classifier;
mod depth_anything;
mod yolo;

use crate::processing::{depth::DepthMap, segmentation::Segment};
use image::RgbImage;
use serde::Serialize;
use std::borrow::Cow;

pub use classifier::OnnxClassifier;
pub use depth_anything::DepthAnything;
pub use yolo::YoloSegmenter;

/// Instance segmentation: boxes, classes and masks in source-image pixels.
pub trait SegmentationModel: Send {
    fn segment(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Segment>>;

    fn class_name(&self, class_id: usize) -> Cow<'_, str>;
}

/// Relative monocular depth.
pub trait DepthModel: Send {
    /// The returned map has the same size as `image`.
    fn estimate(&mut self, image: &RgbImage) -> anyhow::Result<DepthMap>;
}

pub trait ClassificationModel: Send {
    fn classify(&mut self, image: &RgbImage, top_k: usize)
    -> anyhow::Result<Vec<Classification>>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}
