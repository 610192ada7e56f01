//! Camera capture for live detection.

use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, RgbImage};
use log::{debug, info, warn};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution},
};

/// An open camera stream delivering RGB frames.
pub struct WebcamCapture {
    camera: Camera,
    device_index: u32,
}

impl WebcamCapture {
    /// Open camera `device_index` and request the given geometry.
    ///
    /// Drivers are free to ignore the request; a refused resolution or frame rate is logged and
    /// the camera default is kept.
    pub fn open(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
        debug!("opening camera {device_index} requesting {width}x{height} @ {fps} fps");

        let mut camera = Camera::new(CameraIndex::Index(device_index), requested)
            .with_context(|| format!("failed to open camera {device_index}"))?;
        camera
            .open_stream()
            .context("failed to start camera stream")?;

        if let Err(err) = camera.set_resolution(Resolution::new(width, height)) {
            warn!("camera refused {width}x{height}: {err}");
        }
        if let Err(err) = camera.set_frame_rate(fps) {
            warn!("camera refused {fps} fps: {err}");
        }

        let actual = camera.resolution();
        info!(
            "camera {device_index} streaming {}x{} @ {} fps",
            actual.width(),
            actual.height(),
            camera.frame_rate()
        );

        Ok(Self {
            camera,
            device_index,
        })
    }

    /// Block until the next frame arrives and decode it to RGB.
    pub fn capture_frame(&mut self) -> Result<DynamicImage> {
        let frame = self
            .camera
            .frame()
            .context("failed to capture camera frame")?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("failed to decode camera frame")?;

        let (width, height) = (decoded.width(), decoded.height());
        let rgb = RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| anyhow!("camera frame does not fill {width}x{height}"))?;
        Ok(DynamicImage::ImageRgb8(rgb))
    }

    pub fn resolution(&self) -> (u32, u32) {
        let res = self.camera.resolution();
        (res.width(), res.height())
    }

    pub fn frame_rate(&self) -> u32 {
        self.camera.frame_rate()
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    /// Stop streaming and release the device.
    pub fn stop(mut self) -> Result<()> {
        self.camera
            .stop_stream()
            .context("failed to stop camera stream")?;
        info!("camera {} stopped", self.device_index);
        Ok(())
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if self.camera.is_stream_open()
            && let Err(err) = self.camera.stop_stream()
        {
            warn!("failed to stop camera {} on drop: {err}", self.device_index);
        }
    }
}

/// `(index, human readable name)` of every camera the platform backend reports.
pub fn list_webcam_devices() -> Result<Vec<(u32, String)>> {
    let devices = query(ApiBackend::Auto).context("failed to enumerate cameras")?;
    Ok(devices
        .iter()
        .enumerate()
        .map(|(idx, info)| (idx as u32, info.human_name().to_string()))
        .collect())
}
