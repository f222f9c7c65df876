use crate::config::DEFAULT_INPUT_SIZE;
use crate::{
    Normalization, Preprocess, PreprocessResult, check_buffer, resize_rgb, to_nchw,
};
use common::span;
use fast_image_resize::FilterType;

const LETTERBOX_COLOR: u8 = 114;

/// Aspect-preserving resize onto a gray canvas, as YOLO detectors expect.
pub struct Letterbox {
    pub input_size: (u32, u32),
    letterboxed_buffer: Vec<u8>,
}

/// Geometry of a letterbox for a given source size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxGeometry {
    pub scale: f32,
    pub new_width: u32,
    pub new_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl LetterboxGeometry {
    pub fn compute(width: u32, height: u32, input_size: (u32, u32)) -> Self {
        let scale =
            (input_size.0 as f32 / width as f32).min(input_size.1 as f32 / height as f32);
        let new_width = ((width as f32 * scale).round() as u32).clamp(1, input_size.0);
        let new_height = ((height as f32 * scale).round() as u32).clamp(1, input_size.1);

        Self {
            scale,
            new_width,
            new_height,
            offset_x: (input_size.0 - new_width) / 2,
            offset_y: (input_size.1 - new_height) / 2,
        }
    }
}

impl Letterbox {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size.0 * input_size.1 * 3) as usize],
        }
    }

    pub fn apply(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        let _s = span!("letterbox");

        check_buffer(pixels, width, height)?;

        let geometry = LetterboxGeometry::compute(width, height, self.input_size);
        tracing::trace!(width, height, ?geometry, "Letterboxing frame");

        let resized = resize_rgb(
            pixels,
            width,
            height,
            geometry.new_width,
            geometry.new_height,
            FilterType::Bilinear,
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = self.input_size.0 * 3;
        let row_bytes = (geometry.new_width * 3) as usize;

        for y in 0..geometry.new_height {
            let src_row = (y * geometry.new_width * 3) as usize;
            let dst_row = ((y + geometry.offset_y) * stride + geometry.offset_x * 3) as usize;

            self.letterboxed_buffer[dst_row..dst_row + row_bytes]
                .copy_from_slice(&resized_data[src_row..src_row + row_bytes]);
        }

        let tensor = to_nchw(
            &self.letterboxed_buffer,
            self.input_size.0 as usize,
            self.input_size.1 as usize,
            Normalization::Unit,
        )?;

        Ok(PreprocessResult {
            tensor,
            scale: geometry.scale,
            offset_x: geometry.offset_x as f32,
            offset_y: geometry.offset_y as f32,
        })
    }
}

impl Default for Letterbox {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}

impl Preprocess for Letterbox {
    fn preprocess(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<PreprocessResult> {
        self.apply(pixels, width, height)
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        Some(self.input_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_image_fills_detector_input() {
        // 2x2 photo: red, green, blue, white
        let pixels = [255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255];

        let result = Letterbox::default().apply(&pixels, 2, 2).unwrap();
        assert_eq!(result.tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(result.scale, 320.0);
    }

    #[test]
    fn test_rejects_short_buffer() {
        let err = Letterbox::default()
            .apply(&[0u8; 200], 10, 10)
            .unwrap_err()
            .to_string();
        assert!(err.contains("mismatch"), "unexpected error: {}", err);

        assert!(Letterbox::default().apply(&[], 0, 10).is_err());
    }

    #[test]
    fn test_letterboxing_preserves_aspect_ratio() {
        let pixels = vec![200u8; 800 * 600 * 3];

        let mut letterbox = Letterbox::default();
        let result = letterbox.apply(&pixels, 800, 600).unwrap();

        // min(640/800, 640/600) = 0.8 -> 640x480, centred vertically
        assert_eq!(result.scale, 0.8);
        assert_eq!(result.offset_x, 0.0);
        assert_eq!(result.offset_y, 80.0);
        assert_eq!(result.tensor.shape(), &[1, 3, 640, 640]);

        // Padding rows carry the letterbox gray, content rows the image value
        let pad = result.tensor[[0, 0, 10, 320]];
        let content = result.tensor[[0, 0, 320, 320]];
        assert!((pad - 114.0 / 255.0).abs() < 1e-6, "pad = {}", pad);
        assert!((content - 200.0 / 255.0).abs() < 0.01, "content = {}", content);
    }

    #[test]
    fn test_tall_image_pads_horizontally() {
        let geometry = LetterboxGeometry::compute(300, 600, (640, 640));

        assert!((geometry.scale - 640.0 / 600.0).abs() < 1e-6);
        assert_eq!(geometry.new_height, 640);
        assert_eq!(geometry.new_width, 320);
        assert_eq!(geometry.offset_x, 160);
        assert_eq!(geometry.offset_y, 0);
    }

    #[test]
    fn test_values_are_unit_scaled() {
        let pixels = vec![255u8; 4 * 4 * 3];
        let mut letterbox = Letterbox::new((4, 4));
        let result = letterbox.apply(&pixels, 4, 4).unwrap();

        assert!(result.tensor.iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_usable_through_trait_object() {
        let mut preprocessor: Box<dyn Preprocess> = Box::new(Letterbox::new((320, 320)));

        let result = preprocessor.preprocess(&[128u8; 160 * 80 * 3], 160, 80).unwrap();
        assert_eq!(result.scale, 2.0);
        assert_eq!(result.offset_y, 80.0);
        assert_eq!(preprocessor.input_size(), Some((320, 320)));
    }
}
