//! Live camera mode: detect on every captured frame and keep the latest annotated frame on disk.

use std::time::{Duration, Instant};

use anyhow::Result;
use image::{DynamicImage, Rgba, RgbaImage};
use retinaface_core::{DetectionOutput, RetinaFaceDetector};

use crate::{
    annotate::{draw_detections, draw_label},
    args::DetectArgs,
};

const OVERLAY_COLOR: Rgba<u8> = Rgba([0, 255, 255, 255]);
const OVERLAY_SCALE: f32 = 22.0;
const OVERLAY_ORIGIN: (i32, i32) = (10, 10);

/// Progress is logged once per this many frames.
pub const LOG_INTERVAL: u64 = 10;

/// Average frame rate since capture started.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    started: Instant,
    frames: u64,
}

impl FrameClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            frames: 0,
        }
    }

    /// Count one processed frame and return the running average fps.
    pub fn tick(&mut self) -> f64 {
        self.frames += 1;
        frames_per_second(self.frames, self.started.elapsed())
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

pub fn frames_per_second(frames: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { frames as f64 / secs } else { 0.0 }
}

pub fn overlay_text(faces: usize, fps: f64) -> String {
    format!("faces={faces} fps={fps:.2}")
}

/// Draw the displayable detections and the face-count/fps overlay onto a copy of `frame`.
///
/// Returns the canvas and the number of faces drawn.
pub fn render_frame(
    frame: &DynamicImage,
    output: &DetectionOutput,
    fps: f64,
) -> (RgbaImage, usize) {
    let mut canvas = frame.to_rgba8();
    draw_detections(&mut canvas, output.displayable());
    let faces = output.displayable().count();
    draw_label(
        &mut canvas,
        &overlay_text(faces, fps),
        OVERLAY_ORIGIN.0,
        OVERLAY_ORIGIN.1,
        OVERLAY_SCALE,
        OVERLAY_COLOR,
    );
    (canvas, faces)
}

#[cfg(feature = "webcam")]
pub fn run_webcam_mode(args: &DetectArgs, detector: &RetinaFaceDetector) -> Result<()> {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use anyhow::Context;
    use log::{debug, info, warn};
    use retinaface_core::PipelineError;
    use retinaface_utils::{WebcamCapture, list_webcam_devices};

    use crate::annotate::save_rgb;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("failed to install Ctrl+C handler")?;
    }

    match list_webcam_devices() {
        Ok(devices) => {
            for (idx, name) in devices {
                info!("camera [{idx}] {name}");
            }
        }
        Err(err) => warn!("could not enumerate cameras: {err:#}"),
    }

    let mut camera = WebcamCapture::open(
        args.webcam_device,
        args.webcam_width,
        args.webcam_height,
        args.webcam_fps,
    )?;
    let (width, height) = camera.resolution();
    info!(
        "camera {} ready at {width}x{height}; writing frames to {} (Ctrl+C to stop)",
        camera.device_index(),
        args.webcam_output.display()
    );

    let limit = u64::from(args.webcam_frames);
    let mut clock = FrameClock::start();

    while !stop.load(Ordering::SeqCst) && (limit == 0 || clock.frames() < limit) {
        let frame = match camera.capture_frame() {
            Ok(frame) => frame,
            Err(err) => {
                debug!("dropped camera frame: {err:#}");
                continue;
            }
        };

        let output = match detector.detect_image(&frame) {
            Ok(output) => output,
            Err(err) => {
                if let Some(pipeline) = err.downcast_ref::<PipelineError>()
                    && pipeline.is_configuration()
                {
                    return Err(err.context("camera frame does not fit the configured model"));
                }
                warn!("detection failed on camera frame: {err:#}");
                continue;
            }
        };

        let fps = clock.tick();
        let (canvas, faces) = render_frame(&frame, &output, fps);
        if clock.frames() % LOG_INTERVAL == 0 {
            info!("frame={} faces={faces} fps={fps:.2}", clock.frames());
        }
        if let Err(err) = save_rgb(canvas, &args.webcam_output) {
            warn!("{err:#}");
        }
    }

    info!("camera loop finished after {} frame(s)", clock.frames());
    camera.stop()
}

#[cfg(not(feature = "webcam"))]
pub fn run_webcam_mode(_args: &DetectArgs, _detector: &RetinaFaceDetector) -> Result<()> {
    anyhow::bail!("this build has no camera support; rebuild with `--features webcam`")
}
