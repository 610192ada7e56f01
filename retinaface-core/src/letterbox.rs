//! Aspect-preserving resize into a fixed padded canvas.

use std::borrow::Cow;

use image::{DynamicImage, GenericImageView, Rgb, RgbImage, imageops, imageops::FilterType};
use retinaface_utils::resize_image;

use crate::error::PipelineError;
use crate::preprocess::InputSize;

/// Geometry of a letterbox: the uniform scale and the padding offsets of the scaled image.
///
/// `scale = min(target_w / src_w, target_h / src_h)` and the scaled image is centered, so
/// `offset_x = (target_w - scaled_w) / 2` (integer division) and likewise for `y`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxParams {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub source_size: (u32, u32),
    pub target: InputSize,
}

impl LetterboxParams {
    /// Compute the letterbox geometry for a `source` image placed in `target`.
    pub fn compute(source: (u32, u32), target: InputSize) -> Result<Self, PipelineError> {
        let (src_w, src_h) = source;
        if src_w == 0 || src_h == 0 {
            return Err(PipelineError::EmptyImage {
                width: src_w,
                height: src_h,
            });
        }
        if target.width == 0 || target.height == 0 {
            return Err(PipelineError::InvalidInputSize {
                width: target.width,
                height: target.height,
            });
        }

        let ratio = (target.width as f64 / src_w as f64).min(target.height as f64 / src_h as f64);
        let scaled_width = ((src_w as f64 * ratio).round() as u32).clamp(1, target.width);
        let scaled_height = ((src_h as f64 * ratio).round() as u32).clamp(1, target.height);

        Ok(Self {
            scale: ratio as f32,
            offset_x: (target.width - scaled_width) / 2,
            offset_y: (target.height - scaled_height) / 2,
            scaled_width,
            scaled_height,
            source_size: source,
            target,
        })
    }

    /// Forward-map a source pixel coordinate into canvas pixels.
    pub fn project_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x.mul_add(self.scale, self.offset_x as f32),
            y.mul_add(self.scale, self.offset_y as f32),
        )
    }

    /// `true` when the source fills the canvas without resampling or padding.
    pub fn is_identity(&self) -> bool {
        self.source_size == (self.target.width, self.target.height)
    }
}

/// A letterboxed canvas together with the geometry used to build it.
#[derive(Debug, Clone)]
pub struct LetterboxResult {
    pub image: RgbImage,
    pub params: LetterboxParams,
}

/// Resize `image` into a `target` canvas filled with `fill`, preserving its aspect ratio.
pub fn letterbox_image(
    image: &DynamicImage,
    target: InputSize,
    fill: u8,
    filter: FilterType,
) -> Result<LetterboxResult, PipelineError> {
    let params = LetterboxParams::compute(image.dimensions(), target)?;

    if params.is_identity() {
        return Ok(LetterboxResult {
            image: image.to_rgb8(),
            params,
        });
    }

    let resized: Cow<'_, RgbImage> = match image.as_rgb8() {
        Some(rgb) if rgb.dimensions() == (params.scaled_width, params.scaled_height) => {
            Cow::Borrowed(rgb)
        }
        _ => Cow::Owned(resize_image(
            image,
            params.scaled_width,
            params.scaled_height,
            filter,
        )),
    };

    let mut canvas = RgbImage::from_pixel(target.width, target.height, Rgb([fill; 3]));
    imageops::replace(
        &mut canvas,
        resized.as_ref(),
        params.offset_x as i64,
        params.offset_y as i64,
    );

    Ok(LetterboxResult {
        image: canvas,
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_image_is_padded_vertically() {
        let params = LetterboxParams::compute((640, 480), InputSize::new(320, 320)).unwrap();
        assert_eq!(params.scale, 0.5);
        assert_eq!((params.scaled_width, params.scaled_height), (320, 240));
        assert_eq!((params.offset_x, params.offset_y), (0, 40));
    }

    #[test]
    fn tall_image_is_padded_horizontally() {
        let params = LetterboxParams::compute((100, 400), InputSize::new(320, 320)).unwrap();
        assert_eq!(params.scale, 0.8);
        assert_eq!((params.scaled_width, params.scaled_height), (80, 320));
        assert_eq!((params.offset_x, params.offset_y), (120, 0));
    }

    #[test]
    fn odd_padding_rounds_offset_down() {
        let params = LetterboxParams::compute((300, 100), InputSize::new(320, 320)).unwrap();
        // ratio 320/300, scaled height round(106.67) = 107, padding 213 -> offset 106
        assert_eq!(params.scaled_height, 107);
        assert_eq!(params.offset_y, 106);
    }

    #[test]
    fn zero_area_source_fails() {
        let err = LetterboxParams::compute((0, 10), InputSize::new(320, 320)).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyImage { .. }));
    }

    #[test]
    fn canvas_is_filled_and_image_centered() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 4, Rgb([200, 10, 20])));
        let result =
            letterbox_image(&source, InputSize::new(8, 8), 114, FilterType::Triangle).unwrap();

        assert_eq!(result.image.dimensions(), (8, 8));
        assert_eq!(result.params.offset_y, 2);
        assert_eq!(result.image.get_pixel(0, 0), &Rgb([114, 114, 114]));
        assert_eq!(result.image.get_pixel(7, 7), &Rgb([114, 114, 114]));
        assert_eq!(result.image.get_pixel(3, 2), &Rgb([200, 10, 20]));
        assert_eq!(result.image.get_pixel(3, 5), &Rgb([200, 10, 20]));
        assert_eq!(result.image.get_pixel(3, 6), &Rgb([114, 114, 114]));
    }

    #[test]
    fn downscale_averages_pixels() {
        let mut source = RgbImage::new(4, 4);
        for (x, _, pixel) in source.enumerate_pixels_mut() {
            let v = if x % 2 == 0 { 0 } else { 200 };
            *pixel = Rgb([v, v, v]);
        }
        let result = letterbox_image(
            &DynamicImage::ImageRgb8(source),
            InputSize::new(2, 2),
            0,
            FilterType::Triangle,
        )
        .unwrap();
        let value = result.image.get_pixel(0, 0)[0];
        assert!(value > 0 && value < 200, "expected blended value, got {value}");
    }

    #[test]
    fn letterbox_is_deterministic() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_fn(13, 7, |x, y| {
            Rgb([(x * 17) as u8, (y * 31) as u8, 90])
        }));
        let a = letterbox_image(&source, InputSize::new(32, 32), 114, FilterType::Triangle).unwrap();
        let b = letterbox_image(&source, InputSize::new(32, 32), 114, FilterType::Triangle).unwrap();
        assert_eq!(a.image.as_raw(), b.image.as_raw());
        assert_eq!(a.params, b.params);
    }
}
