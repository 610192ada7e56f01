//! Command-line argument definitions for retinaface-cli.

use clap::{ArgAction, Parser};
use retinaface_utils::config::{ChannelOrder, ResizeQuality, TensorLayout};
use std::path::PathBuf;

/// Run RetinaFace face detection over images or directories.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct DetectArgs {
    /// Path to an image file or a directory containing images.
    #[arg(short, long, required_unless_present = "webcam", conflicts_with = "webcam")]
    pub input: Option<PathBuf>,

    /// Run detection on live frames from a camera instead of files.
    #[arg(long, action = ArgAction::SetTrue)]
    pub webcam: bool,

    /// Camera device index.
    #[arg(long, default_value_t = 0, requires = "webcam")]
    pub webcam_device: u32,

    /// Requested capture width (the driver may pick another).
    #[arg(long, default_value_t = 640, requires = "webcam")]
    pub webcam_width: u32,

    /// Requested capture height (the driver may pick another).
    #[arg(long, default_value_t = 480, requires = "webcam")]
    pub webcam_height: u32,

    /// Requested capture frame rate.
    #[arg(long, default_value_t = 30, requires = "webcam")]
    pub webcam_fps: u32,

    /// Frames to process before stopping (0 = until Ctrl+C).
    #[arg(long, default_value_t = 0, requires = "webcam")]
    pub webcam_frames: u32,

    /// File the latest annotated camera frame is written to.
    #[arg(long, default_value = "result_camera.jpg", requires = "webcam")]
    pub webcam_output: PathBuf,

    /// Path to the RetinaFace ONNX model (defaults to the settings file or
    /// `models/retinaface_mobile320.onnx`).
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Optional settings JSON. Built-in parameters are used when absent.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,

    /// Override model input width (pixels). Must match the exported model.
    #[arg(long)]
    pub width: Option<u32>,

    /// Override model input height (pixels). Must match the exported model.
    #[arg(long)]
    pub height: Option<u32>,

    /// Letterbox padding value written to every channel.
    #[arg(long, value_name = "VALUE")]
    pub fill: Option<u8>,

    /// Resize quality mode: `quality` (area-weighted) or `speed` (nearest).
    #[arg(long, value_name = "MODE")]
    pub resize_quality: Option<ResizeQuality>,

    /// Channel order fed to the network (`rgb` or `bgr`).
    #[arg(long, value_name = "ORDER")]
    pub channel_order: Option<ChannelOrder>,

    /// Input tensor layout (`nchw` or `nhwc`).
    #[arg(long, value_name = "LAYOUT")]
    pub tensor_layout: Option<TensorLayout>,

    /// Override the pre-NMS score floor.
    #[arg(long)]
    pub score_floor: Option<f32>,

    /// Override the NMS IoU threshold.
    #[arg(long)]
    pub nms_threshold: Option<f32>,

    /// Override the score required for reporting and annotation.
    #[arg(long)]
    pub display_threshold: Option<f32>,

    /// Keep at most this many candidates before NMS (0 keeps all).
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Report every post-NMS detection, including those below the display threshold.
    #[arg(long, action = ArgAction::SetTrue)]
    pub all: bool,

    /// Write detections to a JSON file instead of stdout.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Directory to write annotated images with boxes and landmarks overlaid.
    #[arg(long)]
    pub annotate: Option<PathBuf>,

    /// Number of images processed in parallel (0 uses all cores).
    #[arg(long, default_value_t = 0)]
    pub jobs: usize,
}
