//! Common helpers shared across the RetinaFace crates.

/// Persisted settings for input geometry, priors, and post-processing.
pub mod config;
/// Image loading, resizing, and tensor packing.
pub mod image_utils;
/// Scoped stage timing behind a runtime switch.
pub mod telemetry;
/// Camera capture.
#[cfg(feature = "webcam")]
pub mod webcam;

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::LevelFilter;

pub use image_utils::{load_image, resize_filter, resize_image, rgb_to_chw, rgb_to_tensor_data};
pub use telemetry::{
    TELEMETRY_TARGET, TimingGuard, configure as configure_telemetry, configure_from,
    telemetry_allows, telemetry_enabled, telemetry_level, timing_guard, timing_guard_if,
};
#[cfg(feature = "webcam")]
pub use webcam::{WebcamCapture, list_webcam_devices};

/// Initialize logging once.
///
/// `RUST_LOG` takes precedence; otherwise `default_filter` applies. Telemetry records are
/// always let through to the logger and gated by [`telemetry`] instead.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(TELEMETRY_TARGET, LevelFilter::Trace);

    // A second initialisation (tests, embedding) is not an error.
    let _ = builder.try_init();
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
