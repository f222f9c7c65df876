pub mod config;
pub mod crop;
pub mod depth;
pub mod letterbox;

use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::{Array, IxDyn};

pub use config::{DEFAULT_DEPTH_SIZE, DEFAULT_INPUT_SIZE};
pub use crop::CenterCrop;
pub use depth::DepthResize;
pub use letterbox::Letterbox;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Result of preprocessing including transformation parameters
#[derive(Debug)]
pub struct PreprocessResult {
    /// NCHW tensor `[1, 3, h, w]`
    pub tensor: Array<f32, IxDyn>,
    /// Scale factor applied to the source image
    pub scale: f32,
    /// X offset of the resized image inside the tensor (letterbox padding)
    pub offset_x: f32,
    /// Y offset of the resized image inside the tensor (letterbox padding)
    pub offset_y: f32,
}

/// Trait for image preprocessing implementations
pub trait Preprocess {
    /// Preprocess an RGB image (HWC, 3 bytes per pixel) for inference
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult>;

    /// Get the input size this preprocessor targets, if it is fixed
    fn input_size(&self) -> Option<(u32, u32)>;
}

/// How pixel values are mapped to floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// `v / 255`
    Unit,
    /// `(v / 255 - mean) / std` per channel
    ImageNet,
}

pub(crate) fn check_buffer(pixels: &[u8], width: u32, height: u32) -> anyhow::Result<()> {
    if width == 0 || height == 0 {
        anyhow::bail!("Invalid image dimensions: {}x{}", width, height);
    }

    let expected_size = width as usize * height as usize * 3;
    if pixels.len() != expected_size {
        anyhow::bail!(
            "Buffer size mismatch: expected {}, got {} bytes",
            expected_size,
            pixels.len()
        );
    }
    Ok(())
}

pub(crate) fn resize_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    new_width: u32,
    new_height: u32,
    filter: FilterType,
) -> anyhow::Result<Image<'static>> {
    let src = ImageRef::new(width, height, pixels, PixelType::U8x3)?;
    let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

    Resizer::new().resize(
        &src,
        &mut resized,
        &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(filter)),
    )?;

    Ok(resized)
}

/// Convert packed RGB bytes into a `[1, 3, h, w]` tensor.
pub fn to_nchw(
    buf: &[u8],
    width: usize,
    height: usize,
    normalization: Normalization,
) -> anyhow::Result<Array<f32, IxDyn>> {
    let spatial = width * height;
    let mut output = vec![0.0f32; 3 * spatial];

    for (i, px) in buf.chunks_exact(3).take(spatial).enumerate() {
        for c in 0..3 {
            let v = px[c] as f32 / 255.0;
            output[i + c * spatial] = match normalization {
                Normalization::Unit => v,
                Normalization::ImageNet => (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c],
            };
        }
    }

    Ok(Array::from_shape_vec(
        IxDyn(&[1, 3, height, width]),
        output,
    )?)
}
