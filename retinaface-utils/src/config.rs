//! Shared configuration types consumed across the RetinaFace workspace.
//!
//! These structures describe the pre-processing, prior generation, and post-processing
//! parameters in a serializable form so the CLI can persist and reload them.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, str::FromStr};

/// Default location of the RetinaFace ONNX export.
pub const DEFAULT_MODEL_PATH: &str = "models/retinaface_mobile320.onnx";

/// Post-processing parameters.
///
/// Defaults mirror the thresholds the RetinaFace reference demo was tuned with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    /// Anchors scoring at or below this value are discarded before sorting.
    pub score_floor: f32,
    /// IoU above which a lower-scoring box is suppressed.
    pub nms_threshold: f32,
    /// Minimum score a caller should render or report.
    pub display_threshold: f32,
    /// Maximum candidates forwarded to NMS after sorting (0 keeps all).
    pub top_k: usize,
    /// Column of the confidence tensor holding the face-class probability.
    pub face_class_index: usize,
    /// Use the inclusive `(x2 - x1 + 1)` pixel area in IoU computations.
    pub inclusive_pixel_area: bool,
    /// Floor model-pixel coordinates before inverting the letterbox.
    pub snap_to_model_pixels: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            score_floor: 0.02,
            nms_threshold: 0.4,
            display_threshold: 0.5,
            top_k: 0,
            face_class_index: 1,
            inclusive_pixel_area: true,
            snap_to_model_pixels: false,
        }
    }
}

/// Resize filter preference for the letterbox step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeQuality {
    /// Smooth, area-weighted resampling (default).
    #[default]
    Quality,
    /// Nearest-neighbour resampling for throughput.
    Speed,
}

impl fmt::Display for ResizeQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResizeQuality::Quality => "quality",
            ResizeQuality::Speed => "speed",
        })
    }
}

impl FromStr for ResizeQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(ResizeQuality::Quality),
            "speed" => Ok(ResizeQuality::Speed),
            other => Err(format!(
                "invalid resize quality '{other}'; expected 'quality' or 'speed'"
            )),
        }
    }
}

/// Channel order of the tensor handed to the network.
///
/// RetinaFace exports expect RGB: the reverse of OpenCV's native BGR. Images decoded by the
/// `image` crate are already RGB, so the default requires no swap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelOrder::Rgb => "rgb",
            ChannelOrder::Bgr => "bgr",
        })
    }
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgb" => Ok(ChannelOrder::Rgb),
            "bgr" => Ok(ChannelOrder::Bgr),
            other => Err(format!(
                "invalid channel order '{other}'; expected 'rgb' or 'bgr'"
            )),
        }
    }
}

/// Memory layout of the input tensor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// `[1, 3, H, W]`, the usual ONNX export layout.
    #[default]
    Nchw,
    /// `[1, H, W, 3]`.
    Nhwc,
}

impl fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TensorLayout::Nchw => "nchw",
            TensorLayout::Nhwc => "nhwc",
        })
    }
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nchw" => Ok(TensorLayout::Nchw),
            "nhwc" => Ok(TensorLayout::Nhwc),
            other => Err(format!(
                "invalid tensor layout '{other}'; expected 'nchw' or 'nhwc'"
            )),
        }
    }
}

/// Model input geometry and letterbox parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InputDimensions {
    pub width: u32,
    pub height: u32,
    /// Resampling filter used when shrinking or enlarging into the canvas.
    pub resize_quality: ResizeQuality,
    /// Value written to every channel of the padding area.
    pub fill_value: u8,
    pub channel_order: ChannelOrder,
    pub tensor_layout: TensorLayout,
}

impl Default for InputDimensions {
    fn default() -> Self {
        Self {
            width: 320,
            height: 320,
            resize_quality: ResizeQuality::Quality,
            fill_value: 114,
            channel_order: ChannelOrder::Rgb,
            tensor_layout: TensorLayout::Nchw,
        }
    }
}

/// One feature-map level of the anchor grid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorLevelSettings {
    /// Down-sampling factor of the feature map, in input pixels.
    pub stride: u32,
    /// Anchor base sizes emitted for every cell, in input pixels.
    pub min_sizes: Vec<u32>,
}

/// Anchor grid and decoding constants the network was trained with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PriorSettings {
    pub levels: Vec<PriorLevelSettings>,
    /// `[center, size]` variances applied to the regression deltas.
    pub variances: [f32; 2],
}

impl Default for PriorSettings {
    fn default() -> Self {
        Self {
            levels: vec![
                PriorLevelSettings {
                    stride: 8,
                    min_sizes: vec![16, 32],
                },
                PriorLevelSettings {
                    stride: 16,
                    min_sizes: vec![64, 128],
                },
                PriorLevelSettings {
                    stride: 32,
                    min_sizes: vec![256, 512],
                },
            ],
            variances: [0.1, 0.2],
        }
    }
}

/// Settings controlling optional runtime telemetry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether stage timings are logged.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Debug,
        }
    }
}

/// Complete set of user-configurable parameters, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Path to the RetinaFace ONNX model. `None` falls back to [`DEFAULT_MODEL_PATH`].
    pub model_path: Option<String>,
    pub input: InputDimensions,
    pub detection: DetectionSettings,
    pub priors: PriorSettings,
    pub telemetry: TelemetrySettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            model_path: Some(DEFAULT_MODEL_PATH.into()),
            input: InputDimensions::default(),
            detection: DetectionSettings::default(),
            priors: PriorSettings::default(),
            telemetry: TelemetrySettings::default(),
        }
    }
}

impl AppSettings {
    /// Load settings from a JSON file.
    ///
    /// Missing sections take their defaults; a missing `model_path` falls back to
    /// [`DEFAULT_MODEL_PATH`].
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;

        if settings.model_path.is_none() {
            settings.model_path = Some(DEFAULT_MODEL_PATH.into());
        }
        Ok(settings)
    }

    /// Model path to load, falling back to [`DEFAULT_MODEL_PATH`].
    pub fn resolved_model_path(&self) -> &str {
        self.model_path.as_deref().unwrap_or(DEFAULT_MODEL_PATH)
    }

    /// Serialize settings to disk as pretty-printed JSON, overwriting any existing file.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }
}
