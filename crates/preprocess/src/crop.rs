use crate::config::{CLASSIFIER_CROP, CLASSIFIER_RESIZE_SHORT};
use crate::{
    Normalization, Preprocess, PreprocessResult, check_buffer, resize_rgb, to_nchw,
};
use common::span;
use fast_image_resize::FilterType;

/// Resize the short side, then take a centred square crop (ImageNet classifiers).
pub struct CenterCrop {
    pub resize_short: u32,
    pub crop: u32,
    crop_buffer: Vec<u8>,
}

impl CenterCrop {
    pub fn new(resize_short: u32, crop: u32) -> Self {
        Self {
            resize_short: resize_short.max(crop),
            crop,
            crop_buffer: vec![0; (crop * crop * 3) as usize],
        }
    }

    pub fn apply(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        let _s = span!("center_crop");

        check_buffer(pixels, width, height)?;

        let scale = self.resize_short as f32 / width.min(height) as f32;
        let new_width = ((width as f32 * scale).round() as u32).max(self.crop);
        let new_height = ((height as f32 * scale).round() as u32).max(self.crop);

        let resized = resize_rgb(
            pixels,
            width,
            height,
            new_width,
            new_height,
            FilterType::Bilinear,
        )?;

        let left = (new_width - self.crop) / 2;
        let top = (new_height - self.crop) / 2;
        let src = resized.buffer();
        let row_bytes = (self.crop * 3) as usize;

        for y in 0..self.crop {
            let src_row = (((y + top) * new_width + left) * 3) as usize;
            let dst_row = (y * self.crop * 3) as usize;
            self.crop_buffer[dst_row..dst_row + row_bytes]
                .copy_from_slice(&src[src_row..src_row + row_bytes]);
        }

        let tensor = to_nchw(
            &self.crop_buffer,
            self.crop as usize,
            self.crop as usize,
            Normalization::ImageNet,
        )?;

        Ok(PreprocessResult {
            tensor,
            scale,
            offset_x: -(left as f32),
            offset_y: -(top as f32),
        })
    }
}

impl Default for CenterCrop {
    fn default() -> Self {
        Self::new(CLASSIFIER_RESIZE_SHORT, CLASSIFIER_CROP)
    }
}

impl Preprocess for CenterCrop {
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        self.apply(pixels, width, height)
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        Some((self.crop, self.crop))
    }
}
