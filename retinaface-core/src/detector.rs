use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use image::DynamicImage;
use retinaface_utils::{config::AppSettings, timing_guard};

use crate::letterbox::LetterboxParams;
use crate::model::{InferenceBackend, RetinaFaceModel};
use crate::postprocess::{Detection, PostprocessConfig, apply_postprocess};
use crate::prediction::RawPrediction;
use crate::preprocess::{
    PreprocessConfig, PreprocessOutput, preprocess_dynamic_image, preprocess_image,
};
use crate::priors::{PriorConfig, PriorSet, cached_priors};

/// Result of running the detector on one image.
#[derive(Debug, Clone)]
pub struct DetectionOutput {
    /// Post-NMS detections in source-image pixels, highest score first.
    pub detections: Vec<Detection>,
    /// Geometry the image was letterboxed with.
    pub letterbox: LetterboxParams,
    pub original_size: (u32, u32),
    /// Threshold from the postprocess configuration, for callers deciding what to render.
    pub display_threshold: f32,
}

impl DetectionOutput {
    /// Detections scoring at or above the display threshold.
    pub fn displayable(&self) -> impl Iterator<Item = &Detection> + '_ {
        self.detections
            .iter()
            .filter(|detection| detection.is_displayable(self.display_threshold))
    }
}

/// RetinaFace detector: preprocessing, inference, and anchor decoding behind one call.
///
/// The prior grid is built once for the configured input size and shared; the detector is
/// `Send + Sync` and can serve images from several threads.
#[derive(Debug, Clone)]
pub struct RetinaFaceDetector {
    backend: Arc<dyn InferenceBackend>,
    preprocess: PreprocessConfig,
    postprocess: PostprocessConfig,
    priors: Arc<PriorSet>,
}

impl RetinaFaceDetector {
    /// Load the ONNX model at `model_path` and build a detector around it.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        preprocess: PreprocessConfig,
        postprocess: PostprocessConfig,
        priors: &PriorConfig,
    ) -> Result<Self> {
        let path = model_path.as_ref();
        let model = RetinaFaceModel::load(path, preprocess.tensor_shape())
            .with_context(|| format!("failed to load RetinaFace model {}", path.display()))?;
        Self::with_backend(Arc::new(model), preprocess, postprocess, priors)
    }

    /// Build a detector from persisted settings.
    pub fn from_settings(settings: &AppSettings) -> Result<Self> {
        let preprocess = PreprocessConfig::from(&settings.input);
        let postprocess = PostprocessConfig::from(&settings.detection)
            .with_variances(settings.priors.variances.into());
        Self::new(
            settings.resolved_model_path(),
            preprocess,
            postprocess,
            &PriorConfig::from(&settings.priors),
        )
    }

    /// Build a detector around an existing inference backend.
    pub fn with_backend(
        backend: Arc<dyn InferenceBackend>,
        preprocess: PreprocessConfig,
        postprocess: PostprocessConfig,
        priors: &PriorConfig,
    ) -> Result<Self> {
        let priors = cached_priors(preprocess.input_size, priors)?;
        Ok(Self {
            backend,
            preprocess,
            postprocess,
            priors,
        })
    }

    /// Run detection on an image file.
    pub fn detect_path<P: AsRef<Path>>(&self, path: P) -> Result<DetectionOutput> {
        let _guard = timing_guard("retinaface_core::detect_path", log::Level::Debug);
        let prep = preprocess_image(path, &self.preprocess)?;
        self.detect_preprocessed(prep)
    }

    /// Run detection on an in-memory image.
    pub fn detect_image(&self, image: &DynamicImage) -> Result<DetectionOutput> {
        let _guard = timing_guard("retinaface_core::detect_image", log::Level::Debug);
        let prep = preprocess_dynamic_image(image, &self.preprocess)?;
        self.detect_preprocessed(prep)
    }

    /// Run inference and post-processing on an already prepared input.
    pub fn detect_preprocessed(&self, prep: PreprocessOutput) -> Result<DetectionOutput> {
        let outputs = {
            let _guard = timing_guard("retinaface_core::inference", log::Level::Debug);
            self.backend.infer(prep.tensor)?
        };

        let raw = RawPrediction::from_tensors(&outputs)?;
        let detections = apply_postprocess(
            &raw,
            self.priors.as_slice(),
            &prep.letterbox,
            &self.postprocess,
        )?;

        Ok(DetectionOutput {
            detections,
            letterbox: prep.letterbox,
            original_size: prep.original_size,
            display_threshold: self.postprocess.display_threshold,
        })
    }

    pub fn preprocess_config(&self) -> &PreprocessConfig {
        &self.preprocess
    }

    pub fn postprocess_config(&self) -> &PostprocessConfig {
        &self.postprocess
    }

    /// Number of anchors the model outputs must carry.
    pub fn prior_count(&self) -> usize {
        self.priors.len()
    }
}
