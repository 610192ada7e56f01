mod annotate;
mod args;
mod config;
mod input;
mod types;
#[cfg_attr(not(feature = "webcam"), allow(dead_code))]
mod webcam;

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use rayon::prelude::*;
use retinaface_core::{DetectionOutput, PipelineError, RetinaFaceDetector};
use retinaface_utils::{configure_from, init_logging, normalize_path};

use crate::{
    annotate::{annotate_image, annotation_path},
    args::DetectArgs,
    config::{apply_cli_overrides, load_settings, model_path},
    input::{IMAGE_EXTENSIONS, collect_images},
    types::ImageDetections,
    webcam::run_webcam_mode,
};

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = DetectArgs::parse();

    if args.webcam {
        let detector = build_detector(&args)?;
        return run_webcam_mode(&args, &detector);
    }

    let input = args
        .input
        .as_deref()
        .context("--input is required unless --webcam is given")?;
    let input_path = normalize_path(input)?;
    let images = collect_images(&input_path)?;
    if images.is_empty() {
        anyhow::bail!(
            "no images found at {} (supported extensions: {})",
            input_path.display(),
            IMAGE_EXTENSIONS.join(", ")
        );
    }

    let detector = build_detector(&args)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs)
        .build()
        .context("failed to build worker pool")?;

    info!("Processing {} image(s)...", images.len());
    let results = pool.install(|| {
        let detected = detect_all(&detector, &images)?;
        let annotate = match args.annotate.as_ref() {
            Some(dir) => {
                fs::create_dir_all(dir).with_context(|| {
                    format!("failed to create annotation directory {}", dir.display())
                })?;
                Some(Annotation {
                    input_root: &input_path,
                    output_dir: normalize_path(dir)?,
                })
            }
            None => None,
        };
        Ok::<_, anyhow::Error>(build_records(detected, annotate.as_ref(), args.all))
    })?;

    if results.is_empty() {
        anyhow::bail!("all detections failed; cannot produce output");
    }

    write_results(&results, args.json.as_deref())
}

/// Load settings, apply CLI overrides, and build the detector they describe.
fn build_detector(args: &DetectArgs) -> Result<RetinaFaceDetector> {
    let mut settings = load_settings(args.config.as_deref())?;
    apply_cli_overrides(&mut settings, args);
    configure_from(&settings.telemetry);

    info!(
        "Loading RetinaFace model from {} at resolution {}x{}",
        model_path(&settings).display(),
        settings.input.width,
        settings.input.height
    );
    let detector = RetinaFaceDetector::from_settings(&settings)?;
    info!("Prior grid holds {} anchors", detector.prior_count());
    Ok(detector)
}

/// Detect faces in every image before anything is written.
///
/// Unreadable images are logged and skipped. A model/configuration mismatch on any image aborts
/// the whole batch, so a misconfigured run leaves no partial output behind.
fn detect_all(
    detector: &RetinaFaceDetector,
    images: &[PathBuf],
) -> Result<Vec<(PathBuf, DetectionOutput)>> {
    let outcomes = images
        .par_iter()
        .map(|path| detect_one(detector, path))
        .collect::<Result<Vec<_>>>()?;
    Ok(outcomes.into_iter().flatten().collect())
}

fn detect_one(
    detector: &RetinaFaceDetector,
    image_path: &Path,
) -> Result<Option<(PathBuf, DetectionOutput)>> {
    match detector.detect_path(image_path) {
        Ok(output) => {
            info!(
                "{} -> {} detection(s), {} above display threshold",
                image_path.display(),
                output.detections.len(),
                output.displayable().count()
            );
            Ok(Some((image_path.to_path_buf(), output)))
        }
        Err(err) => {
            if let Some(pipeline) = err.downcast_ref::<PipelineError>()
                && pipeline.is_configuration()
            {
                return Err(err.context(format!("failed to process {}", image_path.display())));
            }
            warn!("Failed to process {}: {err:#}", image_path.display());
            Ok(None)
        }
    }
}

/// Where annotated copies go and which input directory their paths are relative to.
struct Annotation<'a> {
    input_root: &'a Path,
    output_dir: PathBuf,
}

fn build_records(
    detected: Vec<(PathBuf, DetectionOutput)>,
    annotate: Option<&Annotation<'_>>,
    include_all: bool,
) -> Vec<ImageDetections> {
    detected
        .into_par_iter()
        .map(|(image_path, output)| {
            let mut record = ImageDetections::from_output(
                image_path.display().to_string(),
                &output,
                include_all,
            );

            if let Some(annotation) = annotate {
                let target =
                    annotation_path(annotation.input_root, &image_path, &annotation.output_dir);
                match annotate_image(&image_path, output.displayable(), &target) {
                    Ok(path) => {
                        info!("Annotated image saved to {}", path.display());
                        record.annotated = Some(path.display().to_string());
                    }
                    Err(err) => warn!("Failed to annotate {}: {err:#}", image_path.display()),
                }
            }

            record
        })
        .collect()
}

fn write_results(results: &[ImageDetections], json_path: Option<&Path>) -> Result<()> {
    if let Some(json_path) = json_path {
        if let Some(dir) = json_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {}", dir.display()))?;
        }
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(file, results).with_context(|| {
            format!("failed to write detection JSON to {}", json_path.display())
        })?;
        info!("Wrote detections to {}", json_path.display());
    } else {
        let json =
            serde_json::to_string_pretty(results).context("failed to serialize detections")?;
        println!("{json}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use image::{Rgb, RgbImage};
    use retinaface_core::{
        InferenceBackend, PostprocessConfig, PreprocessConfig, PriorConfig, expected_prior_count,
    };
    use tract_onnx::prelude::Tensor;

    /// Answers every image with `anchors` background anchors, plus one face at `face`.
    #[derive(Debug)]
    struct FixedBackend {
        anchors: usize,
        face: Option<usize>,
    }

    impl InferenceBackend for FixedBackend {
        fn infer(&self, _input: Tensor) -> Result<Vec<Tensor>> {
            let loc = vec![0.0f32; self.anchors * 4];
            let mut conf: Vec<f32> = (0..self.anchors).flat_map(|_| [1.0, 0.0]).collect();
            if let Some(index) = self.face {
                conf[index * 2] = 0.05;
                conf[index * 2 + 1] = 0.95;
            }
            let landm = vec![0.0f32; self.anchors * 10];
            Ok(vec![
                Tensor::from_shape(&[1, self.anchors, 4], &loc)?,
                Tensor::from_shape(&[1, self.anchors, 2], &conf)?,
                Tensor::from_shape(&[1, self.anchors, 10], &landm)?,
            ])
        }
    }

    fn detector(anchors: Option<usize>) -> RetinaFaceDetector {
        let preprocess = PreprocessConfig::default();
        let priors = PriorConfig::default();
        let expected = expected_prior_count(preprocess.input_size, &priors);
        RetinaFaceDetector::with_backend(
            Arc::new(FixedBackend {
                anchors: anchors.unwrap_or(expected),
                // Level 0, centre cell of the 40x40 grid.
                face: Some((20 * 40 + 20) * 2),
            }),
            preprocess,
            PostprocessConfig::default(),
            &priors,
        )
        .expect("detector")
    }

    fn write_images(root: &Path, relative: &[&str]) -> Vec<PathBuf> {
        relative
            .iter()
            .map(|name| {
                let path = root.join(name);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                RgbImage::from_pixel(64, 64, Rgb([40, 80, 120]))
                    .save(&path)
                    .unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn configuration_mismatch_fails_the_whole_detection_pass() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_images(dir.path(), &["a.png", "b.png", "c.png"]);

        let err = detect_all(&detector(Some(16_800)), &images).unwrap_err();
        let pipeline = err
            .downcast_ref::<PipelineError>()
            .expect("pipeline error in chain");
        assert!(pipeline.is_configuration());
    }

    #[test]
    fn unreadable_images_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut images = write_images(dir.path(), &["good.png"]);
        let broken = dir.path().join("broken.png");
        fs::write(&broken, b"not an image").unwrap();
        images.push(broken);

        let detected = detect_all(&detector(None), &images).unwrap();
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].0, images[0]);
        assert_eq!(detected[0].1.detections.len(), 1);
    }

    #[test]
    fn nested_images_get_separate_annotations() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let images = write_images(input.path(), &["a/face.png", "b/face.png"]);

        let detected = detect_all(&detector(None), &images).unwrap();
        let annotation = Annotation {
            input_root: input.path(),
            output_dir: output.path().to_path_buf(),
        };
        let records = build_records(detected, Some(&annotation), false);

        let mut written: Vec<String> = records
            .iter()
            .map(|record| record.annotated.clone().expect("annotated"))
            .collect();
        written.sort();
        assert_eq!(
            written,
            vec![
                output.path().join("a/face.png").display().to_string(),
                output.path().join("b/face.png").display().to_string(),
            ]
        );
        assert!(output.path().join("a/face.png").exists());
        assert!(output.path().join("b/face.png").exists());
    }
}
