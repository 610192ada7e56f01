//! Anchor-relative decoding of box and landmark regressions.
//!
//! Outputs stay in normalized model-input coordinates. Nothing is clamped here; bounds are
//! applied once the coordinates are mapped back to image pixels.

use crate::postprocess::{BoundingBox, Landmark};
use crate::prediction::{LANDM_COLS, LOC_COLS, RawPrediction};
use crate::priors::PriorBox;

/// Training-time scale constants applied to the regression deltas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variances {
    /// Applied to center and landmark offsets.
    pub center: f32,
    /// Applied to the log-scale width/height deltas.
    pub size: f32,
}

impl Default for Variances {
    fn default() -> Self {
        Self {
            center: 0.1,
            size: 0.2,
        }
    }
}

impl From<[f32; 2]> for Variances {
    fn from([center, size]: [f32; 2]) -> Self {
        Self { center, size }
    }
}

/// Decode one anchor's `[dx, dy, dw, dh]` into normalized corners.
#[inline]
pub fn decode_box(loc: [f32; LOC_COLS], prior: &PriorBox, variances: Variances) -> BoundingBox {
    let cx = prior.cx + loc[0] * variances.center * prior.sx;
    let cy = prior.cy + loc[1] * variances.center * prior.sy;
    let w = prior.sx * (loc[2] * variances.size).exp();
    let h = prior.sy * (loc[3] * variances.size).exp();

    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    BoundingBox {
        x1,
        y1,
        x2: x1 + w,
        y2: y1 + h,
    }
}

/// Decode every anchor of `raw` against the matching prior.
pub fn decode_boxes(
    raw: &RawPrediction,
    priors: &[PriorBox],
    variances: Variances,
) -> Vec<BoundingBox> {
    debug_assert_eq!(raw.len(), priors.len());
    priors
        .iter()
        .enumerate()
        .map(|(index, prior)| decode_box(raw.loc(index), prior, variances))
        .collect()
}

/// Decode one anchor's five landmark offsets. Only the center variance is used.
#[inline]
pub fn decode_landmarks(
    landm: &[f32; LANDM_COLS],
    prior: &PriorBox,
    variances: Variances,
) -> [Landmark; 5] {
    std::array::from_fn(|p| Landmark {
        x: prior.cx + landm[2 * p] * variances.center * prior.sx,
        y: prior.cy + landm[2 * p + 1] * variances.center * prior.sy,
    })
}

pub fn decode_all_landmarks(
    raw: &RawPrediction,
    priors: &[PriorBox],
    variances: Variances,
) -> Vec<[Landmark; 5]> {
    debug_assert_eq!(raw.len(), priors.len());
    priors
        .iter()
        .enumerate()
        .map(|(index, prior)| decode_landmarks(&raw.landm(index), prior, variances))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIOR: PriorBox = PriorBox {
        cx: 0.5,
        cy: 0.4,
        sx: 0.2,
        sy: 0.1,
    };

    fn approx(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    #[test]
    fn zero_deltas_return_the_prior_box() {
        let bbox = decode_box([0.0; 4], &PRIOR, Variances::default());
        approx(bbox.x1, 0.4);
        approx(bbox.y1, 0.35);
        approx(bbox.x2, 0.6);
        approx(bbox.y2, 0.45);
    }

    #[test]
    fn deltas_are_scaled_by_variances() {
        let bbox = decode_box([1.0, -2.0, 0.0, 5.0], &PRIOR, Variances::default());
        // cx = 0.5 + 1*0.1*0.2, cy = 0.4 - 2*0.1*0.1, h = 0.1*e
        let h = 0.1 * 1.0f32.exp();
        approx(bbox.x1, 0.52 - 0.1);
        approx(bbox.x2 - bbox.x1, 0.2);
        approx(bbox.y1, 0.38 - h / 2.0);
        approx(bbox.y2 - bbox.y1, h);
    }

    #[test]
    fn decoded_boxes_are_not_clamped() {
        let edge = PriorBox {
            cx: 0.0,
            cy: 1.0,
            sx: 0.5,
            sy: 0.5,
        };
        let bbox = decode_box([0.0; 4], &edge, Variances::default());
        assert!(bbox.x1 < 0.0);
        assert!(bbox.y2 > 1.0);
    }

    #[test]
    fn landmarks_use_center_variance_only() {
        let mut landm = [0.0; LANDM_COLS];
        landm[0] = 1.0;
        landm[9] = -1.0;
        let variances = Variances {
            center: 0.1,
            size: 100.0,
        };
        let points = decode_landmarks(&landm, &PRIOR, variances);
        approx(points[0].x, 0.52);
        approx(points[0].y, 0.4);
        approx(points[2].x, 0.5);
        approx(points[4].y, 0.39);
    }

    #[test]
    fn batch_decode_pairs_rows_with_priors() {
        let raw = RawPrediction::from_slices(
            2,
            &[0.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0],
            &[0.1, 0.9, 0.2, 0.8],
            &[0.0; 20],
        )
        .unwrap();
        let priors = [PRIOR, PRIOR];
        let boxes = decode_boxes(&raw, &priors, Variances::default());
        let landmarks = decode_all_landmarks(&raw, &priors, Variances::default());
        assert_eq!(boxes.len(), 2);
        assert_eq!(landmarks.len(), 2);
        approx(boxes[0].x1, 0.4);
        approx(boxes[1].x1, 0.6);
        approx(landmarks[1][3].x, 0.5);
    }

    #[test]
    fn variances_convert_from_settings_array() {
        assert_eq!(Variances::from([0.1, 0.2]), Variances::default());
    }
}
