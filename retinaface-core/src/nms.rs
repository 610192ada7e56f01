//! Greedy IoU-based non-maximum suppression.

use std::cmp::Ordering;

use crate::postprocess::BoundingBox;

/// How box extents are measured when computing areas and overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AreaConvention {
    /// `x2 - x1 + 1`: corners are treated as inclusive pixel indices. A collapsed box still
    /// covers one pixel, so the union is never zero. Matches the reference RetinaFace NMS.
    #[default]
    InclusivePixels,
    /// `x2 - x1`: continuous coordinates.
    Continuous,
}

impl AreaConvention {
    #[inline]
    fn extent(self, lo: f32, hi: f32) -> f32 {
        match self {
            AreaConvention::InclusivePixels => hi - lo + 1.0,
            AreaConvention::Continuous => hi - lo,
        }
    }

    /// Area of `bbox` under this convention.
    pub fn area(self, bbox: &BoundingBox) -> f32 {
        self.extent(bbox.x1, bbox.x2).max(0.0) * self.extent(bbox.y1, bbox.y2).max(0.0)
    }
}

impl From<bool> for AreaConvention {
    fn from(inclusive_pixels: bool) -> Self {
        if inclusive_pixels {
            AreaConvention::InclusivePixels
        } else {
            AreaConvention::Continuous
        }
    }
}

/// Intersection over union of two boxes.
pub fn iou(a: &BoundingBox, b: &BoundingBox, convention: AreaConvention) -> f32 {
    let w = convention.extent(a.x1.max(b.x1), a.x2.min(b.x2)).max(0.0);
    let h = convention.extent(a.y1.max(b.y1), a.y2.min(b.y2)).max(0.0);
    let intersection = w * h;
    if intersection <= 0.0 {
        return 0.0;
    }

    let union = convention.area(a) + convention.area(b) - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Indices of `scores` in descending score order; equal scores keep their input order.
pub fn score_order(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
    });
    order
}

/// Greedy non-maximum suppression.
///
/// Returns the indices of the kept boxes, highest score first. A box is discarded when its
/// IoU with an already kept box exceeds `threshold`; boxes with IoU exactly at the threshold
/// survive.
pub fn non_max_suppression(
    boxes: &[BoundingBox],
    scores: &[f32],
    threshold: f32,
    convention: AreaConvention,
) -> Vec<usize> {
    debug_assert_eq!(boxes.len(), scores.len());
    let order = score_order(scores);
    let mut suppressed = vec![false; boxes.len()];
    let mut keep = Vec::new();

    for (position, &current) in order.iter().enumerate() {
        if suppressed[current] {
            continue;
        }
        keep.push(current);
        for &other in &order[position + 1..] {
            if !suppressed[other] && iou(&boxes[current], &boxes[other], convention) > threshold
            {
                suppressed[other] = true;
            }
        }
    }

    keep
}
