//! Preprocessing: letterbox the source image and pack it into the network input tensor.

use std::path::Path;

use anyhow::Result;
use image::{DynamicImage, GenericImageView};
use retinaface_utils::{
    config::{ChannelOrder, InputDimensions, ResizeQuality, TensorLayout},
    resize_filter, rgb_to_tensor_data, timing_guard,
};
use tract_onnx::prelude::Tensor;

use crate::error::PipelineError;
use crate::letterbox::{LetterboxParams, letterbox_image};

/// Model input resolution. Determines the prior grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputSize {
    pub width: u32,
    pub height: u32,
}

impl InputSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for InputSize {
    fn default() -> Self {
        Self::new(320, 320)
    }
}

/// Configuration for turning an image into a network input.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub input_size: InputSize,
    /// Padding value broadcast to every channel.
    pub fill_value: u8,
    pub resize_quality: ResizeQuality,
    pub channel_order: ChannelOrder,
    pub tensor_layout: TensorLayout,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        InputDimensions::default().into()
    }
}

impl PreprocessConfig {
    /// Shape of the tensor produced for this configuration.
    pub fn tensor_shape(&self) -> [usize; 4] {
        let (w, h) = (
            self.input_size.width as usize,
            self.input_size.height as usize,
        );
        match self.tensor_layout {
            TensorLayout::Nchw => [1, 3, h, w],
            TensorLayout::Nhwc => [1, h, w, 3],
        }
    }
}

impl From<InputDimensions> for PreprocessConfig {
    fn from(dimensions: InputDimensions) -> Self {
        let InputDimensions {
            width,
            height,
            resize_quality,
            fill_value,
            channel_order,
            tensor_layout,
        } = dimensions;
        Self {
            input_size: InputSize::new(width, height),
            fill_value,
            resize_quality,
            channel_order,
            tensor_layout,
        }
    }
}

impl From<&InputDimensions> for PreprocessConfig {
    fn from(dimensions: &InputDimensions) -> Self {
        (*dimensions).into()
    }
}

/// Network input plus the letterbox geometry needed to map detections back.
#[derive(Debug)]
pub struct PreprocessOutput {
    pub tensor: Tensor,
    pub letterbox: LetterboxParams,
    pub original_size: (u32, u32),
}

/// Load an image from disk and preprocess it.
///
/// A missing or undecodable file fails with an I/O-class [`PipelineError`] before any
/// resampling happens.
pub fn preprocess_image<P: AsRef<Path>>(
    path: P,
    config: &PreprocessConfig,
) -> Result<PreprocessOutput> {
    let _guard = timing_guard("retinaface_core::preprocess_image", log::Level::Debug);
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PipelineError::MissingImage {
            path: path.to_path_buf(),
        }
        .into());
    }
    let image = image::open(path).map_err(|source| PipelineError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;
    preprocess_dynamic_image(&image, config)
}

/// Preprocess an in-memory image.
pub fn preprocess_dynamic_image(
    image: &DynamicImage,
    config: &PreprocessConfig,
) -> Result<PreprocessOutput> {
    let _guard = timing_guard("retinaface_core::preprocess_dynamic_image", log::Level::Trace);
    let letterboxed = letterbox_image(
        image,
        config.input_size,
        config.fill_value,
        resize_filter(config.resize_quality),
    )?;

    let packed = rgb_to_tensor_data(
        &letterboxed.image,
        config.channel_order,
        config.tensor_layout,
    );
    let (data, offset) = packed.into_raw_vec_and_offset();
    debug_assert_eq!(offset, Some(0), "expected contiguous array");
    let tensor = Tensor::from_shape(&config.tensor_shape(), &data)
        .map_err(|e| anyhow::anyhow!("failed to build input tensor: {e}"))?;

    Ok(PreprocessOutput {
        tensor,
        letterbox: letterboxed.params,
        original_size: image.dimensions(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 8) as u8, (y * 8) as u8, 255])
        }))
    }

    #[test]
    fn produces_nchw_tensor_with_letterbox_metadata() {
        let config = PreprocessConfig {
            input_size: InputSize::new(16, 16),
            ..Default::default()
        };
        let output = preprocess_dynamic_image(&gradient(32, 16), &config).unwrap();

        assert_eq!(output.original_size, (32, 16));
        assert_eq!(output.tensor.shape(), &[1, 3, 16, 16]);
        assert_eq!(output.letterbox.scale, 0.5);
        assert_eq!(output.letterbox.offset_y, 4);

        let data = output.tensor.as_slice::<f32>().unwrap();
        // Top-left pixel is padding on every plane.
        assert_eq!(data[0], 114.0);
        assert_eq!(data[16 * 16], 114.0);
        assert_eq!(data[2 * 16 * 16], 114.0);
        // Blue plane of the first image row.
        assert_eq!(data[2 * 16 * 16 + 4 * 16], 255.0);
    }

    #[test]
    fn nhwc_layout_is_respected() {
        let config = PreprocessConfig {
            input_size: InputSize::new(8, 8),
            tensor_layout: TensorLayout::Nhwc,
            channel_order: ChannelOrder::Bgr,
            ..Default::default()
        };
        let output = preprocess_dynamic_image(&gradient(8, 8), &config).unwrap();
        assert_eq!(output.tensor.shape(), &[1, 8, 8, 3]);
        let data = output.tensor.as_slice::<f32>().unwrap();
        // BGR: first value is the blue channel.
        assert_eq!(data[0], 255.0);
        assert_eq!(data[2], 0.0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = preprocess_image("definitely/missing.jpg", &PreprocessConfig::default())
            .unwrap_err();
        let pipeline = err.downcast_ref::<PipelineError>().expect("pipeline error");
        assert!(pipeline.is_io());
    }

    #[test]
    fn undecodable_file_is_an_io_error() {
        let file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .expect("tempfile");
        std::fs::write(file.path(), b"not an image").unwrap();

        let err = preprocess_image(file.path(), &PreprocessConfig::default()).unwrap_err();
        let pipeline = err.downcast_ref::<PipelineError>().expect("pipeline error");
        assert!(matches!(pipeline, PipelineError::ImageDecode { .. }));
    }

    #[test]
    fn converts_dimensions_into_config() {
        let dims = InputDimensions {
            width: 640,
            height: 480,
            fill_value: 0,
            ..Default::default()
        };
        let config: PreprocessConfig = (&dims).into();
        assert_eq!(config.input_size, InputSize::new(640, 480));
        assert_eq!(config.fill_value, 0);
        assert_eq!(config.tensor_shape(), [1, 3, 480, 640]);
    }
}
