use super::depth::DepthMap;
use super::segmentation::{BBox, Mask};

/// Calibration divisor for Depth Anything V2 relative depth.
pub const VOLUME_CALIBRATION: f32 = 50_000.0;

/// Multiplier applied to the box/image area ratio when no volume is available.
pub const BOX_RATIO_SCALE: f32 = 10.0;

pub fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

/// Depth-weighted mask area: `area_px * mean_depth / 50000`, rounded to 2 places.
///
/// Zero when there is no depth map or the mask does not overlap it.
pub fn volume_score(mask: &Mask, depth: Option<&DepthMap>) -> f32 {
    let Some(depth) = depth else {
        return 0.0;
    };
    let Some(mean_depth) = depth.mean_over(mask) else {
        return 0.0;
    };

    let area = mask.area() as f32;
    round2(area * mean_depth / VOLUME_CALIBRATION)
}

/// Box area as a fraction of the image, times ten.
pub fn box_ratio_fallback(bbox: &BBox, image_width: u32, image_height: u32) -> f32 {
    let image_area = image_width as f32 * image_height as f32;
    if image_area <= 0.0 {
        return 0.0;
    }
    bbox.area() / image_area * BOX_RATIO_SCALE
}

#[derive(Debug, Clone)]
struct ClassVolumes {
    name: String,
    volumes: Vec<f32>,
    confidence_sum: f32,
}

/// Per-class volume scores collected across video frames.
#[derive(Debug, Clone, Default)]
pub struct VolumeAccumulator {
    classes: Vec<ClassVolumes>,
}

/// Averaged per-class result.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassAverage {
    pub name: String,
    pub mean_volume: f32,
    pub mean_confidence: f32,
    pub samples: usize,
}

impl VolumeAccumulator {
    pub fn record(&mut self, name: &str, volume: f32, confidence: f32) {
        match self.classes.iter_mut().find(|c| c.name == name) {
            Some(entry) => {
                entry.volumes.push(volume);
                entry.confidence_sum += confidence;
            }
            None => self.classes.push(ClassVolumes {
                name: name.to_string(),
                volumes: vec![volume],
                confidence_sum: confidence,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Averages in first-seen class order, rounded to 2 places.
    pub fn averages(&self) -> Vec<ClassAverage> {
        self.classes
            .iter()
            .filter(|c| !c.volumes.is_empty())
            .map(|c| {
                let n = c.volumes.len() as f32;
                ClassAverage {
                    name: c.name.clone(),
                    mean_volume: round2(c.volumes.iter().sum::<f32>() / n),
                    mean_confidence: round2(c.confidence_sum / n),
                    samples: c.volumes.len(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn full_mask(x0: usize, y0: usize, w: usize, h: usize) -> Mask {
        Mask {
            x0,
            y0,
            data: Array2::from_elem((h, w), true),
        }
    }

    #[test]
    fn test_volume_score_formula() {
        // 100x100 mask over constant depth 12.5 -> 10000 * 12.5 / 50000 = 2.5
        let depth = DepthMap::new(Array2::from_elem((200, 200), 12.5));
        let mask = full_mask(10, 10, 100, 100);

        assert_eq!(volume_score(&mask, Some(&depth)), 2.5);
    }

    #[test]
    fn test_volume_score_rounds_to_two_places() {
        // 7 px * 1.0 / 50000 = 0.00014 -> 0.0
        let depth = DepthMap::new(Array2::from_elem((10, 10), 1.0));
        assert_eq!(volume_score(&full_mask(0, 0, 7, 1), Some(&depth)), 0.0);

        // 300 * 300 * 3.3333 / 50000 = 5.99994 -> 6.0
        let depth = DepthMap::new(Array2::from_elem((300, 300), 3.3333));
        assert_eq!(volume_score(&full_mask(0, 0, 300, 300), Some(&depth)), 6.0);
    }

    #[test]
    fn test_volume_score_without_depth_is_zero() {
        assert_eq!(volume_score(&full_mask(0, 0, 10, 10), None), 0.0);
    }

    #[test]
    fn test_box_ratio_fallback() {
        let bbox = BBox { x1: 0.0, y1: 0.0, x2: 64.0, y2: 48.0 };
        // (64 * 48) / (640 * 480) * 10 = 0.1
        assert!((box_ratio_fallback(&bbox, 640, 480) - 0.1).abs() < 1e-6);
        assert_eq!(box_ratio_fallback(&bbox, 0, 480), 0.0);
    }

    #[test]
    fn test_accumulator_averages_in_first_seen_order() {
        let mut acc = VolumeAccumulator::default();
        acc.record("rice", 1.0, 0.8);
        acc.record("soup", 4.0, 0.6);
        acc.record("rice", 2.0, 0.9);
        acc.record("rice", 0.0, 0.7);

        let averages = acc.averages();
        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].name, "rice");
        assert_eq!(averages[0].mean_volume, 1.0);
        assert_eq!(averages[0].mean_confidence, 0.8);
        assert_eq!(averages[0].samples, 3);
        assert_eq!(averages[1].name, "soup");
        assert_eq!(averages[1].mean_volume, 4.0);
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = VolumeAccumulator::default();
        assert!(acc.is_empty());
        assert!(acc.averages().is_empty());
    }
}
