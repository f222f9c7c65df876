use crate::config::{DEFAULT_DEPTH_SIZE, DEPTH_PATCH_MULTIPLE};
use crate::{
    Normalization, Preprocess, PreprocessResult, check_buffer, resize_rgb, to_nchw,
};
use common::span;
use fast_image_resize::FilterType;

/// Resize for Depth Anything style depth models.
///
/// Both axes use whichever scale factor is closer to 1, then each side is
/// rounded to a multiple of the ViT patch size. The tensor is therefore not
/// square and its size depends on the input aspect ratio.
pub struct DepthResize {
    pub target: u32,
    pub multiple: u32,
}

impl DepthResize {
    pub fn new(target: u32) -> Self {
        Self {
            target,
            multiple: DEPTH_PATCH_MULTIPLE,
        }
    }

    /// Output `(width, height)` for a source of the given size.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        let mut scale_w = self.target as f32 / width as f32;
        let mut scale_h = self.target as f32 / height as f32;

        if (1.0 - scale_w).abs() < (1.0 - scale_h).abs() {
            scale_h = scale_w;
        } else {
            scale_w = scale_h;
        }

        (
            self.constrain(scale_w * width as f32),
            self.constrain(scale_h * height as f32),
        )
    }

    fn constrain(&self, value: f32) -> u32 {
        let m = self.multiple as f32;
        let rounded = (value / m).round() * m;
        (rounded as u32).max(self.multiple)
    }

    pub fn apply(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        let _s = span!("depth_resize");

        check_buffer(pixels, width, height)?;

        let (new_width, new_height) = self.output_size(width, height);
        let resized = resize_rgb(
            pixels,
            width,
            height,
            new_width,
            new_height,
            FilterType::CatmullRom,
        )?;

        let tensor = to_nchw(
            resized.buffer(),
            new_width as usize,
            new_height as usize,
            Normalization::ImageNet,
        )?;

        Ok(PreprocessResult {
            tensor,
            scale: new_width as f32 / width as f32,
            offset_x: 0.0,
            offset_y: 0.0,
        })
    }
}

impl Default for DepthResize {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH_SIZE)
    }
}

impl Preprocess for DepthResize {
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        self.apply(pixels, width, height)
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        None
    }
}
