//! Configuration loading and CLI override logic.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::info;
use retinaface_utils::{config::AppSettings, normalize_path};

use crate::args::DetectArgs;

/// Load application settings from a file or use defaults.
pub fn load_settings(config_path: Option<&Path>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        let resolved = normalize_path(path)?;
        let settings = AppSettings::load_from_path(&resolved)?;
        info!("Loaded settings from {}", resolved.display());
        Ok(settings)
    } else {
        Ok(AppSettings::default())
    }
}

/// Apply command-line arguments on top of loaded or default settings.
pub fn apply_cli_overrides(settings: &mut AppSettings, args: &DetectArgs) {
    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
            settings.telemetry.level = lower;
        }
    }

    if let Some(model) = args.model.as_ref() {
        settings.model_path = Some(model.display().to_string());
    }

    if let Some(width) = args.width {
        settings.input.width = width;
    }
    if let Some(height) = args.height {
        settings.input.height = height;
    }
    if let Some(fill) = args.fill {
        settings.input.fill_value = fill;
    }
    if let Some(mode) = args.resize_quality {
        settings.input.resize_quality = mode;
    }
    if let Some(order) = args.channel_order {
        settings.input.channel_order = order;
    }
    if let Some(layout) = args.tensor_layout {
        settings.input.tensor_layout = layout;
    }

    if let Some(floor) = args.score_floor {
        settings.detection.score_floor = floor;
    }
    if let Some(nms) = args.nms_threshold {
        settings.detection.nms_threshold = nms;
    }
    if let Some(display) = args.display_threshold {
        settings.detection.display_threshold = display;
    }
    if let Some(top_k) = args.top_k {
        settings.detection.top_k = top_k;
    }
}

/// Model path after overrides, as a filesystem path.
pub fn model_path(settings: &AppSettings) -> PathBuf {
    PathBuf::from(settings.resolved_model_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use retinaface_utils::config::{ChannelOrder, DEFAULT_MODEL_PATH};

    fn parse(extra: &[&str]) -> DetectArgs {
        let mut argv = vec!["retinaface-cli", "--input", "photo.jpg"];
        argv.extend_from_slice(extra);
        DetectArgs::parse_from(argv)
    }

    #[test]
    fn no_flags_keep_defaults() {
        let mut settings = AppSettings::default();
        apply_cli_overrides(&mut settings, &parse(&[]));
        assert_eq!(settings.detection, AppSettings::default().detection);
        assert_eq!(settings.input, AppSettings::default().input);
        assert_eq!(model_path(&settings), PathBuf::from(DEFAULT_MODEL_PATH));
    }

    #[test]
    fn flags_override_settings() {
        let mut settings = AppSettings::default();
        let args = parse(&[
            "--model",
            "other.onnx",
            "--width",
            "640",
            "--height",
            "640",
            "--fill",
            "0",
            "--channel-order",
            "bgr",
            "--score-floor",
            "0.1",
            "--nms-threshold",
            "0.3",
            "--display-threshold",
            "0.8",
            "--top-k",
            "100",
        ]);
        apply_cli_overrides(&mut settings, &args);

        assert_eq!(model_path(&settings), PathBuf::from("other.onnx"));
        assert_eq!((settings.input.width, settings.input.height), (640, 640));
        assert_eq!(settings.input.fill_value, 0);
        assert_eq!(settings.input.channel_order, ChannelOrder::Bgr);
        assert_eq!(settings.detection.score_floor, 0.1);
        assert_eq!(settings.detection.nms_threshold, 0.3);
        assert_eq!(settings.detection.display_threshold, 0.8);
        assert_eq!(settings.detection.top_k, 100);
    }

    #[test]
    fn telemetry_level_off_disables_telemetry() {
        let mut settings = AppSettings::default();
        apply_cli_overrides(&mut settings, &parse(&["--telemetry"]));
        assert!(settings.telemetry.enabled);

        apply_cli_overrides(&mut settings, &parse(&["--telemetry-level", " OFF "]));
        assert!(!settings.telemetry.enabled);
        assert_eq!(settings.telemetry.level, "off");
    }

    #[test]
    fn webcam_mode_replaces_input() {
        let args = DetectArgs::parse_from(["retinaface-cli", "--webcam", "--webcam-frames", "5"]);
        assert!(args.webcam && args.input.is_none());
        assert_eq!(args.webcam_frames, 5);
        assert_eq!(args.webcam_output, PathBuf::from("result_camera.jpg"));

        assert!(DetectArgs::try_parse_from(["retinaface-cli"]).is_err());
        assert!(
            DetectArgs::try_parse_from(["retinaface-cli", "--input", "a.jpg", "--webcam"])
                .is_err()
        );
        assert!(
            DetectArgs::try_parse_from(["retinaface-cli", "--input", "a.jpg", "--webcam-fps", "5"])
                .is_err()
        );
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(load_settings(Some(Path::new("does/not/exist.json"))).is_err());
        assert!(load_settings(None).is_ok());
    }
}
