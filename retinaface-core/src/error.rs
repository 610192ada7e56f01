use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the detection pipeline.
///
/// Variants split into two classes: input I/O problems, which are reported before any numeric
/// work starts, and configuration mismatches between the model and the configured geometry,
/// which are caller bugs and never retried. An image without detections is not an error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input image does not exist: {}", path.display())]
    MissingImage { path: PathBuf },

    #[error("failed to decode image {}: {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("source image has zero area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("model input size must be non-zero (got {width}x{height})")]
    InvalidInputSize { width: u32, height: u32 },

    #[error("prior level {level} is invalid: {reason}")]
    InvalidPriorLevel { level: usize, reason: &'static str },

    #[error("prior layout has no levels")]
    EmptyPriorLayout,

    #[error(
        "{tensor} tensor holds {actual} anchors but the prior grid for this input size has {expected}; \
         the model was exported for a different input size"
    )]
    PriorCountMismatch {
        tensor: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{tensor} tensor has unsupported shape {shape:?}")]
    TensorShape {
        tensor: &'static str,
        shape: Vec<usize>,
    },

    #[error("network produced {actual} outputs, expected {expected} (loc, conf, landm)")]
    OutputArity { expected: usize, actual: usize },

    #[error("face class index {index} is out of range for {classes} confidence columns")]
    ClassIndexOutOfRange { index: usize, classes: usize },
}

impl PipelineError {
    /// `true` for model/configuration mismatches.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidInputSize { .. }
                | PipelineError::InvalidPriorLevel { .. }
                | PipelineError::EmptyPriorLayout
                | PipelineError::PriorCountMismatch { .. }
                | PipelineError::TensorShape { .. }
                | PipelineError::OutputArity { .. }
                | PipelineError::ClassIndexOutOfRange { .. }
        )
    }

    /// `true` for failures to read the input image.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingImage { .. } | PipelineError::ImageDecode { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_variants() {
        let mismatch = PipelineError::PriorCountMismatch {
            tensor: "loc",
            expected: 4200,
            actual: 16800,
        };
        assert!(mismatch.is_configuration());
        assert!(!mismatch.is_io());
        assert!(mismatch.to_string().contains("4200"));

        let missing = PipelineError::MissingImage {
            path: PathBuf::from("nope.jpg"),
        };
        assert!(missing.is_io());
        assert!(!missing.is_configuration());

        let empty = PipelineError::EmptyImage {
            width: 0,
            height: 10,
        };
        assert!(!empty.is_io() && !empty.is_configuration());
    }
}
