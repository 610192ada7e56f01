//! Core RetinaFace detection primitives.
//!
//! This crate letterboxes images into the model input, runs the ONNX graph with
//! `tract-onnx`, and decodes the anchor-relative outputs into face boxes and landmarks.

/// Anchor-relative box and landmark decoding.
pub mod decode;
/// High-level face detection runner.
pub mod detector;
/// Pipeline error type.
pub mod error;
/// Aspect-preserving resize with padding.
pub mod letterbox;
/// Inverse letterbox mapping.
pub mod mapping;
/// ONNX model loading and execution.
pub mod model;
/// Non-maximum suppression.
pub mod nms;
/// Score filtering, mapping, and suppression of decoded anchors.
pub mod postprocess;
/// Raw network outputs.
pub mod prediction;
/// Image pre-processing (letterboxing, tensor conversion).
pub mod preprocess;
/// Anchor grid generation.
pub mod priors;

pub use decode::{Variances, decode_all_landmarks, decode_box, decode_boxes, decode_landmarks};
pub use detector::{DetectionOutput, RetinaFaceDetector};
pub use error::PipelineError;
pub use letterbox::{LetterboxParams, LetterboxResult, letterbox_image};
pub use mapping::CoordinateMapper;
pub use model::{InferenceBackend, RetinaFaceModel};
pub use nms::{AreaConvention, iou, non_max_suppression};
pub use postprocess::{
    BoundingBox, Detection, Landmark, PostprocessConfig, apply_postprocess, filter_by_score,
    sort_by_score,
};
pub use prediction::RawPrediction;
pub use preprocess::{
    InputSize, PreprocessConfig, PreprocessOutput, preprocess_dynamic_image, preprocess_image,
};
pub use priors::{
    PriorBox, PriorConfig, PriorLevel, PriorSet, cached_priors, expected_prior_count,
    generate_priors,
};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
