use super::segmentation::Segment;
use common::span;
use image::RgbImage;

const MASK_ALPHA: f32 = 0.5;

/// Ultralytics default plotting palette.
const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

pub fn class_color(class_id: usize) -> [u8; 3] {
    PALETTE[class_id % PALETTE.len()]
}

/// Blend every segment's mask into the image in its class colour. Boxes are not drawn.
pub fn overlay_masks(image: &mut RgbImage, segments: &[Segment]) {
    let _s = span!("overlay_masks", segments = segments.len());
    let (w, h) = image.dimensions();

    for segment in segments {
        let Some(mask) = &segment.mask else {
            continue;
        };
        let color = class_color(segment.class_id);

        for (x, y) in mask.pixels() {
            if x as u32 >= w || y as u32 >= h {
                continue;
            }
            let px = image.get_pixel_mut(x as u32, y as u32);
            for c in 0..3 {
                let blended =
                    px.0[c] as f32 * (1.0 - MASK_ALPHA) + color[c] as f32 * MASK_ALPHA;
                px.0[c] = blended.round() as u8;
            }
        }
    }
}
