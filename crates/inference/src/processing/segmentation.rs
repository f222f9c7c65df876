use common::{span, span_debug};
use ndarray::{Array2, ArrayView3, ArrayView4, ArrayViewD, Ix3, Ix4, s};

/// Letterbox geometry needed to map detector coordinates back to the source image.
#[derive(Debug, Clone, Copy)]
pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub input_width: u32,
    pub input_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    /// Build from center/width/height.
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

/// Binary instance mask stored over the detection's bounding region.
///
/// `data[[row, col]]` covers source pixel `(x0 + col, y0 + row)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub x0: usize,
    pub y0: usize,
    pub data: Array2<bool>,
}

impl Mask {
    pub fn area(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// Source-image coordinates `(x, y)` of every set pixel.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.data
            .indexed_iter()
            .filter(|(_, v)| **v)
            .map(|((row, col), _)| (self.x0 + col, self.y0 + row))
    }
}

#[derive(Debug, Clone)]
pub struct Segment {
    pub class_id: usize,
    pub confidence: f32,
    /// Box in source-image pixels
    pub bbox: BBox,
    /// `None` when the predicted mask has no pixels inside the box
    pub mask: Option<Mask>,
}

#[derive(Debug, Clone)]
struct Candidate {
    class_id: usize,
    confidence: f32,
    bbox: BBox,
    anchor: usize,
}

/// Turns raw YOLOv8-seg output into scored, masked detections.
///
/// `preds` is `[1, 4 + nc + nm, anchors]` (cxcywh in input pixels, class
/// scores, mask coefficients); `protos` is `[1, nm, mh, mw]`.
pub struct SegmentationDecoder {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl SegmentationDecoder {
    pub fn new(confidence_threshold: f32, iou_threshold: f32, max_detections: usize) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            max_detections,
        }
    }

    pub fn decode(
        &self,
        preds: &ArrayViewD<f32>,
        protos: &ArrayViewD<f32>,
        transform: &TransformParams,
    ) -> anyhow::Result<Vec<Segment>> {
        let _s = span!("decode_segments");

        let preds = preds
            .view()
            .into_dimensionality::<Ix3>()
            .map_err(|_| anyhow::anyhow!("Expected 3-d predictions, got {:?}", preds.shape()))?;
        let protos = protos
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| anyhow::anyhow!("Expected 4-d prototypes, got {:?}", protos.shape()))?;

        let channels = preds.shape()[1];
        let num_masks = protos.shape()[1];
        if channels <= 4 + num_masks {
            anyhow::bail!(
                "Prediction has {} channels, too few for 4 box + {} mask coefficients",
                channels,
                num_masks
            );
        }
        let num_classes = channels - 4 - num_masks;

        let mut candidates = self.collect_candidates(&preds, num_classes);
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let kept = non_max_suppression(candidates, self.iou_threshold, self.max_detections);

        tracing::trace!(kept = kept.len(), num_classes, "Decoded detections");

        let _m = span_debug!("build_masks");

        Ok(kept
            .into_iter()
            .map(|candidate| {
                let coeffs: Vec<f32> = (0..num_masks)
                    .map(|k| preds[[0, 4 + num_classes + k, candidate.anchor]])
                    .collect();
                let bbox = unletterbox(&candidate.bbox, transform);
                let mask = build_mask(&coeffs, &protos, &bbox, transform);

                Segment {
                    class_id: candidate.class_id,
                    confidence: candidate.confidence,
                    bbox,
                    mask,
                }
            })
            .collect())
    }

    fn collect_candidates(&self, preds: &ArrayView3<f32>, num_classes: usize) -> Vec<Candidate> {
        let anchors = preds.shape()[2];
        let mut candidates = Vec::new();

        for anchor in 0..anchors {
            let mut best_score = f32::NEG_INFINITY;
            let mut class_id = 0usize;
            for c in 0..num_classes {
                let score = preds[[0, 4 + c, anchor]];
                if score > best_score {
                    best_score = score;
                    class_id = c;
                }
            }

            if best_score < self.confidence_threshold {
                continue;
            }

            candidates.push(Candidate {
                class_id,
                confidence: best_score,
                bbox: BBox::from_cxcywh(
                    preds[[0, 0, anchor]],
                    preds[[0, 1, anchor]],
                    preds[[0, 2, anchor]],
                    preds[[0, 3, anchor]],
                ),
                anchor,
            });
        }

        candidates
    }
}

/// Greedy per-class NMS over candidates sorted by descending confidence.
fn non_max_suppression(
    candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    let mut kept: Vec<Candidate> = Vec::new();

    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

/// Inverse letterbox transform, clamped to the source image.
fn unletterbox(bbox: &BBox, t: &TransformParams) -> BBox {
    let w = t.orig_width as f32;
    let h = t.orig_height as f32;
    BBox {
        x1: ((bbox.x1 - t.offset_x) / t.scale).clamp(0.0, w),
        y1: ((bbox.y1 - t.offset_y) / t.scale).clamp(0.0, h),
        x2: ((bbox.x2 - t.offset_x) / t.scale).clamp(0.0, w),
        y2: ((bbox.y2 - t.offset_y) / t.scale).clamp(0.0, h),
    }
}

fn build_mask(
    coeffs: &[f32],
    protos: &ArrayView4<f32>,
    bbox: &BBox,
    t: &TransformParams,
) -> Option<Mask> {
    let mask_h = protos.shape()[2];
    let mask_w = protos.shape()[3];
    if mask_h == 0 || mask_w == 0 {
        return None;
    }

    let x_start = bbox.x1.floor() as usize;
    let y_start = bbox.y1.floor() as usize;
    let x_end = (bbox.x2.ceil() as usize).min(t.orig_width as usize);
    let y_end = (bbox.y2.ceil() as usize).min(t.orig_height as usize);
    if x_end <= x_start || y_end <= y_start {
        return None;
    }

    // Source pixel -> letterboxed input -> prototype grid (half-pixel centres)
    let sx = mask_w as f32 / t.input_width as f32;
    let sy = mask_h as f32 / t.input_height as f32;
    let to_proto_x = |x: f32| (x * t.scale + t.offset_x) * sx - 0.5;
    let to_proto_y = |y: f32| (y * t.scale + t.offset_y) * sy - 0.5;

    let px0 = clamp_index(to_proto_x(bbox.x1).floor() - 1.0, mask_w);
    let px1 = clamp_index(to_proto_x(bbox.x2).ceil() + 1.0, mask_w);
    let py0 = clamp_index(to_proto_y(bbox.y1).floor() - 1.0, mask_h);
    let py1 = clamp_index(to_proto_y(bbox.y2).ceil() + 1.0, mask_h);

    // Mask logits over the prototype window; sigmoid(v) > 0.5 iff v > 0
    let mut window = Array2::<f32>::zeros((py1 - py0 + 1, px1 - px0 + 1));
    for (k, coeff) in coeffs.iter().enumerate() {
        window.scaled_add(*coeff, &protos.slice(s![0, k, py0..=py1, px0..=px1]));
    }

    let mut data = Array2::from_elem((y_end - y_start, x_end - x_start), false);
    let mut any = false;

    for y in y_start..y_end {
        let cy = y as f32 + 0.5;
        if cy < bbox.y1 || cy > bbox.y2 {
            continue;
        }
        let py = to_proto_y(cy) - py0 as f32;

        for x in x_start..x_end {
            let cx = x as f32 + 0.5;
            if cx < bbox.x1 || cx > bbox.x2 {
                continue;
            }
            let px = to_proto_x(cx) - px0 as f32;

            if sample_bilinear(&window, px, py) > 0.0 {
                data[[y - y_start, x - x_start]] = true;
                any = true;
            }
        }
    }

    any.then_some(Mask {
        x0: x_start,
        y0: y_start,
        data,
    })
}

#[inline]
fn clamp_index(v: f32, len: usize) -> usize {
    (v.max(0.0) as usize).min(len - 1)
}

/// Bilinear sample with edge clamping.
fn sample_bilinear(grid: &Array2<f32>, x: f32, y: f32) -> f32 {
    let (h, w) = grid.dim();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let top = grid[[y0, x0]] * (1.0 - fx) + grid[[y0, x1]] * fx;
    let bottom = grid[[y1, x0]] * (1.0 - fx) + grid[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}
