use crate::backend::ExecutionProvider;
use common::{env_opt, env_or};
use std::env;

const DEFAULT_SEGMENTATION_MODEL: &str = "models/yolov8n-seg.onnx";
const DEFAULT_DEPTH_MODEL: &str = "models/depth_anything_v2_small.onnx";

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub segmentation_model_path: String,
    pub segmentation_labels_path: Option<String>,
    /// `None` disables depth estimation; volume scores then fall back to box area.
    pub depth_model_path: Option<String>,
    pub classifier_model_path: Option<String>,
    pub classifier_labels_path: Option<String>,
    pub input_size: (u32, u32),
    pub depth_input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Depth runs on every n-th video frame only.
    pub depth_frame_stride: u64,
    pub classifier_top_k: usize,
    pub execution_provider: ExecutionProvider,
    pub intra_threads: usize,
    pub jpeg_quality: u8,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            segmentation_model_path: DEFAULT_SEGMENTATION_MODEL.to_string(),
            segmentation_labels_path: None,
            depth_model_path: Some(DEFAULT_DEPTH_MODEL.to_string()),
            classifier_model_path: None,
            classifier_labels_path: None,
            input_size: preprocess::DEFAULT_INPUT_SIZE,
            depth_input_size: preprocess::DEFAULT_DEPTH_SIZE,
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            max_detections: 300,
            depth_frame_stride: 15,
            classifier_top_k: 5,
            execution_provider: ExecutionProvider::Cpu,
            intra_threads: 4,
            jpeg_quality: 95,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let depth_model_path = match env::var("DEPTH_MODEL_PATH") {
            Ok(path) if path.trim().is_empty() => None,
            Ok(path) => Some(path.trim().to_string()),
            Err(_) => defaults.depth_model_path,
        };

        let execution_provider = match env_opt("EXECUTION_PROVIDER") {
            Some(value) => value.parse()?,
            None => defaults.execution_provider,
        };

        let depth_frame_stride = env_or("DEPTH_FRAME_STRIDE", defaults.depth_frame_stride);
        if depth_frame_stride == 0 {
            anyhow::bail!("DEPTH_FRAME_STRIDE must be at least 1");
        }

        let confidence_threshold =
            env_or("CONFIDENCE_THRESHOLD", defaults.confidence_threshold);
        if !(0.0..=1.0).contains(&confidence_threshold) {
            anyhow::bail!(
                "CONFIDENCE_THRESHOLD must be within [0, 1], got {}",
                confidence_threshold
            );
        }

        let input_size = (
            env_or("INPUT_WIDTH", defaults.input_size.0),
            env_or("INPUT_HEIGHT", defaults.input_size.1),
        );
        if input_size.0 == 0 || input_size.1 == 0 {
            anyhow::bail!(
                "INPUT_WIDTH and INPUT_HEIGHT must be positive, got {}x{}",
                input_size.0,
                input_size.1
            );
        }

        Ok(Self {
            segmentation_model_path: env_opt("SEGMENTATION_MODEL_PATH")
                .unwrap_or(defaults.segmentation_model_path),
            segmentation_labels_path: env_opt("SEGMENTATION_LABELS_PATH"),
            depth_model_path,
            classifier_model_path: env_opt("CLASSIFIER_MODEL_PATH"),
            classifier_labels_path: env_opt("CLASSIFIER_LABELS_PATH"),
            input_size,
            depth_input_size: env_or("DEPTH_INPUT_SIZE", defaults.depth_input_size),
            confidence_threshold,
            iou_threshold: env_or("IOU_THRESHOLD", defaults.iou_threshold),
            max_detections: env_or("MAX_DETECTIONS", defaults.max_detections),
            depth_frame_stride,
            classifier_top_k: env_or("CLASSIFIER_TOP_K", defaults.classifier_top_k),
            execution_provider,
            intra_threads: env_or("INTRA_THREADS", defaults.intra_threads),
            jpeg_quality: env_or("JPEG_QUALITY", defaults.jpeg_quality).clamp(1, 100),
            ffmpeg_path: env_opt("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: env_opt("FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
        })
    }
}
