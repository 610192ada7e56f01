//! Serializable output records.

use serde::Serialize;
use retinaface_core::{Detection, DetectionOutput};

/// A single detection as written to JSON.
#[derive(Debug, Serialize)]
pub struct DetectionRecord {
    pub score: f32,
    /// `[x1, y1, x2, y2]` in source-image pixels.
    pub bbox: [f32; 4],
    pub landmarks: [[f32; 2]; 5],
}

/// All reported detections for a single image.
#[derive(Debug, Serialize)]
pub struct ImageDetections {
    pub image: String,
    pub detections: Vec<DetectionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated: Option<String>,
}

impl From<&Detection> for DetectionRecord {
    fn from(detection: &Detection) -> Self {
        Self {
            score: detection.score,
            bbox: detection.bbox.to_array(),
            landmarks: detection.landmarks.map(|lm| [lm.x, lm.y]),
        }
    }
}

impl ImageDetections {
    /// Build the record for one image, keeping only displayable detections unless
    /// `include_all` is set.
    pub fn from_output(image: String, output: &DetectionOutput, include_all: bool) -> Self {
        let detections = if include_all {
            output.detections.iter().map(DetectionRecord::from).collect()
        } else {
            output.displayable().map(DetectionRecord::from).collect()
        };
        Self {
            image,
            detections,
            annotated: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retinaface_core::{BoundingBox, InputSize, Landmark, LetterboxParams};

    fn output() -> DetectionOutput {
        let detection = |score| Detection {
            bbox: BoundingBox {
                x1: 1.0,
                y1: 2.0,
                x2: 3.0,
                y2: 4.0,
            },
            landmarks: [Landmark { x: 5.0, y: 6.0 }; 5],
            score,
        };
        DetectionOutput {
            detections: vec![detection(0.9), detection(0.5), detection(0.2)],
            letterbox: LetterboxParams::compute((10, 10), InputSize::new(10, 10)).unwrap(),
            original_size: (10, 10),
            display_threshold: 0.5,
        }
    }

    #[test]
    fn display_threshold_filters_unless_all_requested() {
        let shown = ImageDetections::from_output("a.jpg".into(), &output(), false);
        assert_eq!(shown.detections.len(), 2);
        let all = ImageDetections::from_output("a.jpg".into(), &output(), true);
        assert_eq!(all.detections.len(), 3);
    }

    #[test]
    fn serializes_corners_and_landmarks() {
        let record = ImageDetections::from_output("a.jpg".into(), &output(), false);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["image"], "a.jpg");
        assert!(json.get("annotated").is_none());
        let first = &json["detections"][0];
        assert_eq!(first["bbox"], serde_json::json!([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(first["landmarks"][4], serde_json::json!([5.0, 6.0]));
        assert!((first["score"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }
}
