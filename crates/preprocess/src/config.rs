/// Detector input size (YOLOv8 exports default to 640x640).
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (640, 640);

/// Target edge for Depth Anything V2 preprocessing.
pub const DEFAULT_DEPTH_SIZE: u32 = 518;

/// Depth Anything's ViT patch size; resized sides are rounded to a multiple of it.
pub const DEPTH_PATCH_MULTIPLE: u32 = 14;

pub const CLASSIFIER_RESIZE_SHORT: u32 = 256;
pub const CLASSIFIER_CROP: u32 = 224;
