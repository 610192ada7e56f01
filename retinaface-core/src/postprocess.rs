use std::cmp::Ordering;

use retinaface_utils::{config::DetectionSettings, timing_guard};

use crate::decode::{Variances, decode_all_landmarks, decode_boxes};
use crate::error::PipelineError;
use crate::letterbox::LetterboxParams;
use crate::mapping::CoordinateMapper;
use crate::nms::{AreaConvention, iou, non_max_suppression};
use crate::prediction::RawPrediction;
use crate::priors::PriorBox;

/// Parameters that turn raw RetinaFace outputs into final detections.
#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessConfig {
    /// Anchors with a face score at or below this value are dropped before sorting.
    pub score_floor: f32,
    /// IoU above which the lower-scoring of two boxes is suppressed.
    pub nms_threshold: f32,
    /// Score a caller should require before rendering. Not applied by [`apply_postprocess`].
    pub display_threshold: f32,
    /// Candidates kept after sorting and before NMS (0 keeps all).
    pub top_k: usize,
    /// Column of `conf` holding the face probability.
    pub face_class_index: usize,
    pub variances: Variances,
    pub area: AreaConvention,
    pub snap_to_model_pixels: bool,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self::from(&DetectionSettings::default())
    }
}

impl From<&DetectionSettings> for PostprocessConfig {
    fn from(settings: &DetectionSettings) -> Self {
        Self {
            score_floor: settings.score_floor,
            nms_threshold: settings.nms_threshold,
            display_threshold: settings.display_threshold,
            top_k: settings.top_k,
            face_class_index: settings.face_class_index,
            variances: Variances::default(),
            area: AreaConvention::from(settings.inclusive_pixel_area),
            snap_to_model_pixels: settings.snap_to_model_pixels,
        }
    }
}

impl PostprocessConfig {
    pub fn with_variances(mut self, variances: Variances) -> Self {
        self.variances = variances;
        self
    }
}

/// Axis-aligned box given by its corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Area under the given convention.
    pub fn area(&self, convention: AreaConvention) -> f32 {
        convention.area(self)
    }

    pub fn iou(&self, other: &Self, convention: AreaConvention) -> f32 {
        iou(self, other, convention)
    }

    /// Corners as `[x1, y1, x2, y2]`.
    pub fn to_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Facial landmark in image space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
}

/// A detected face in original-image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Left eye, right eye, nose, left mouth corner, right mouth corner, in the order the
    /// network emits them.
    pub landmarks: [Landmark; 5],
    pub score: f32,
}

impl Detection {
    /// `true` when the score reaches `threshold`.
    pub fn is_displayable(&self, threshold: f32) -> bool {
        self.score >= threshold
    }
}

/// Decode raw outputs into detections mapped back onto the source image.
///
/// 1. Decode every anchor against its prior.
/// 2. Map boxes and landmarks through the inverse letterbox, clamped to the image.
/// 3. Keep anchors whose face score exceeds the floor.
/// 4. Sort by descending score, optionally truncate to `top_k`.
/// 5. Greedy NMS.
///
/// The output is ordered by descending score. Detections below the display threshold are
/// returned too.
pub fn apply_postprocess(
    raw: &RawPrediction,
    priors: &[PriorBox],
    letterbox: &LetterboxParams,
    config: &PostprocessConfig,
) -> Result<Vec<Detection>, PipelineError> {
    let _guard = timing_guard("retinaface_core::apply_postprocess", log::Level::Debug);
    raw.ensure_prior_count(priors.len())?;
    let scores = raw.class_scores(config.face_class_index)?;

    let boxes = decode_boxes(raw, priors, config.variances);
    let landmarks = decode_all_landmarks(raw, priors, config.variances);
    let mapper = CoordinateMapper::new(letterbox, config.snap_to_model_pixels);

    let candidates: Vec<Detection> = boxes
        .iter()
        .zip(&landmarks)
        .zip(scores)
        .map(|((bbox, points), score)| Detection {
            bbox: mapper.map_box(bbox),
            landmarks: mapper.map_landmarks(points),
            score,
        })
        .collect();

    let mut detections = filter_by_score(candidates, config.score_floor);
    sort_by_score(&mut detections);
    if config.top_k > 0 && detections.len() > config.top_k {
        detections.truncate(config.top_k);
    }

    let detections = suppress(detections, config.nms_threshold, config.area);
    log::debug!(
        "postprocess kept {} detections from {} anchors",
        detections.len(),
        priors.len()
    );
    Ok(detections)
}

/// Drop detections whose score is not strictly above `floor`. Non-finite scores are dropped.
pub fn filter_by_score(mut detections: Vec<Detection>, floor: f32) -> Vec<Detection> {
    detections.retain(|detection| detection.score.is_finite() && detection.score > floor);
    detections
}

/// Stable sort by descending score.
pub fn sort_by_score(detections: &mut [Detection]) {
    detections.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

fn suppress(detections: Vec<Detection>, threshold: f32, area: AreaConvention) -> Vec<Detection> {
    if detections.len() < 2 {
        return detections;
    }
    let _guard = timing_guard("retinaface_core::nms", log::Level::Trace);
    let boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bbox).collect();
    let scores: Vec<f32> = detections.iter().map(|d| d.score).collect();
    let keep = non_max_suppression(&boxes, &scores, threshold, area);

    let mut slots: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();
    keep.into_iter().filter_map(|index| slots[index].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::InputSize;

    const CENTER_PRIOR: PriorBox = PriorBox {
        cx: 0.5,
        cy: 0.5,
        sx: 0.2,
        sy: 0.2,
    };

    fn identity_letterbox() -> LetterboxParams {
        LetterboxParams::compute((320, 320), InputSize::new(320, 320)).unwrap()
    }

    fn detection(score: f32) -> Detection {
        Detection {
            bbox: BoundingBox {
                x1: 0.0,
                y1: 0.0,
                x2: 10.0,
                y2: 10.0,
            },
            landmarks: [Landmark { x: 0.0, y: 0.0 }; 5],
            score,
        }
    }

    #[test]
    fn two_identical_anchors_keep_the_higher_score() {
        let raw =
            RawPrediction::from_slices(2, &[0.0; 8], &[0.1, 0.9, 0.05, 0.95], &[0.0; 20]).unwrap();
        let detections = apply_postprocess(
            &raw,
            &[CENTER_PRIOR, CENTER_PRIOR],
            &identity_letterbox(),
            &PostprocessConfig::default(),
        )
        .unwrap();

        assert_eq!(detections.len(), 1);
        let face = &detections[0];
        assert_eq!(face.score, 0.95);
        assert!((face.bbox.x1 - 128.0).abs() < 1e-3);
        assert!((face.bbox.y1 - 128.0).abs() < 1e-3);
        assert!((face.bbox.x2 - 192.0).abs() < 1e-3);
        assert!((face.bbox.y2 - 192.0).abs() < 1e-3);
        for point in face.landmarks {
            assert!((point.x - 160.0).abs() < 1e-3);
            assert!((point.y - 160.0).abs() < 1e-3);
        }
    }

    #[test]
    fn maps_through_letterbox_and_clamps() {
        let letterbox = LetterboxParams::compute((640, 480), InputSize::new(320, 320)).unwrap();
        let corner = PriorBox {
            cx: 0.05,
            cy: 0.1,
            sx: 0.2,
            sy: 0.2,
        };
        let raw = RawPrediction::from_slices(1, &[0.0; 4], &[0.2, 0.8], &[0.0; 10]).unwrap();
        let detections =
            apply_postprocess(&raw, &[corner], &letterbox, &PostprocessConfig::default()).unwrap();

        let bbox = detections[0].bbox;
        assert_eq!(bbox.x1, 0.0, "left edge clamped");
        assert_eq!(bbox.y1, 0.0, "top padding clamped");
        // x2 = (0.15 * 320) / 0.5, y2 = (0.2 * 320 - 40) / 0.5
        assert!((bbox.x2 - 96.0).abs() < 1e-3);
        assert!((bbox.y2 - 48.0).abs() < 1e-3);
    }

    #[test]
    fn score_floor_is_exclusive_and_display_threshold_is_not_applied() {
        let raw = RawPrediction::from_slices(
            3,
            &[0.0; 12],
            &[0.98, 0.02, 0.7, 0.3, 0.99, 0.01],
            &[0.0; 30],
        )
        .unwrap();
        let priors = [
            CENTER_PRIOR,
            PriorBox {
                cx: 0.1,
                cy: 0.1,
                sx: 0.1,
                sy: 0.1,
            },
            CENTER_PRIOR,
        ];
        let detections = apply_postprocess(
            &raw,
            &priors,
            &identity_letterbox(),
            &PostprocessConfig::default(),
        )
        .unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].score, 0.3);
        assert!(!detections[0].is_displayable(0.5));
    }

    #[test]
    fn top_k_truncates_before_nms() {
        let boxes: Vec<f32> = vec![0.0; 16];
        let conf = [0.0, 0.5, 0.0, 0.6, 0.0, 0.7, 0.0, 0.8];
        let raw = RawPrediction::from_slices(4, &boxes, &conf, &[0.0; 40]).unwrap();
        let priors: Vec<PriorBox> = (0..4)
            .map(|i| PriorBox {
                cx: 0.1 + 0.25 * i as f32,
                cy: 0.5,
                sx: 0.1,
                sy: 0.1,
            })
            .collect();
        let config = PostprocessConfig {
            top_k: 2,
            ..Default::default()
        };
        let detections = apply_postprocess(&raw, &priors, &identity_letterbox(), &config).unwrap();
        let scores: Vec<f32> = detections.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.8, 0.7]);
    }

    #[test]
    fn prior_count_mismatch_is_reported() {
        let raw = RawPrediction::from_slices(1, &[0.0; 4], &[0.1, 0.9], &[0.0; 10]).unwrap();
        let err = apply_postprocess(
            &raw,
            &[CENTER_PRIOR, CENTER_PRIOR],
            &identity_letterbox(),
            &PostprocessConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::PriorCountMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn empty_prediction_yields_no_detections() {
        let raw = RawPrediction::from_slices(0, &[], &[], &[]).unwrap();
        let detections = apply_postprocess(
            &raw,
            &[],
            &identity_letterbox(),
            &PostprocessConfig::default(),
        )
        .unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn filtering_is_idempotent() {
        let all: Vec<Detection> = [0.01, 0.02, 0.021, 0.5, f32::NAN, 0.9]
            .into_iter()
            .map(detection)
            .collect();
        let once = filter_by_score(all, 0.02);
        let twice = filter_by_score(once.clone(), 0.02);
        assert_eq!(once, twice);
        let scores: Vec<f32> = once.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.021, 0.5, 0.9]);
    }

    #[test]
    fn sort_is_descending_and_stable() {
        let mut detections = vec![detection(0.3), detection(0.9), detection(0.3)];
        detections[0].landmarks[0].x = 1.0;
        detections[2].landmarks[0].x = 2.0;
        sort_by_score(&mut detections);
        assert_eq!(detections[0].score, 0.9);
        assert_eq!(detections[1].landmarks[0].x, 1.0);
        assert_eq!(detections[2].landmarks[0].x, 2.0);
    }

    #[test]
    fn config_follows_settings() {
        let settings = DetectionSettings {
            inclusive_pixel_area: false,
            top_k: 50,
            ..Default::default()
        };
        let config = PostprocessConfig::from(&settings);
        assert_eq!(config.area, AreaConvention::Continuous);
        assert_eq!(config.top_k, 50);
        assert_eq!(config.score_floor, 0.02);
        assert_eq!(config.nms_threshold, 0.4);
        assert_eq!(config.variances, Variances::default());
    }
}
