//! Magma colormap: nine evenly spaced rows of matplotlib's table, linearly interpolated.

const MAGMA_STOPS: [[u8; 3]; 9] = [
    [0, 0, 4],
    [28, 16, 68],
    [79, 18, 123],
    [129, 37, 129],
    [181, 54, 122],
    [229, 80, 100],
    [251, 135, 97],
    [254, 194, 135],
    [252, 253, 191],
];

/// RGB colour for an 8-bit level.
pub fn magma(level: u8) -> [u8; 3] {
    let segments = (MAGMA_STOPS.len() - 1) as f32;
    let pos = level as f32 / 255.0 * segments;
    let i = (pos.floor() as usize).min(MAGMA_STOPS.len() - 2);
    let t = pos - i as f32;

    let a = MAGMA_STOPS[i];
    let b = MAGMA_STOPS[i + 1];
    [0, 1, 2].map(|c| (a[c] as f32 + (b[c] as f32 - a[c] as f32) * t).round() as u8)
}
