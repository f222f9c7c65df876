pub mod backend;
pub mod config;
pub mod labels;
pub mod media;
pub mod models;
pub mod processing;
pub mod service;
pub mod video;

// Re-export commonly used types for convenience
pub use config::InferenceConfig;
pub use models::{Classification, ClassificationModel, DepthModel, SegmentationModel};
pub use processing::depth::DepthMap;
pub use processing::segmentation::{BBox, Mask, Segment};
pub use service::{
    DetectionSummary, ImageReport, PredictionReport, PredictionService, VideoReport,
};
pub use video::VideoError;
