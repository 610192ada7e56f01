//! Inverse letterbox mapping from normalized model coordinates to source-image pixels.

use crate::letterbox::LetterboxParams;
use crate::postprocess::{BoundingBox, Landmark};

/// Maps normalized model-input coordinates back into the original image.
///
/// Each axis is handled independently: `(coord * model_dim - offset) / scale`, clamped to
/// `[0, image_dim]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    model_width: f32,
    model_height: f32,
    scale: f32,
    offset_x: f32,
    offset_y: f32,
    image_width: f32,
    image_height: f32,
    snap_to_model_pixels: bool,
}

impl CoordinateMapper {
    /// Build a mapper from the geometry the input was letterboxed with.
    ///
    /// With `snap_to_model_pixels`, model-space coordinates are floored to whole pixels before
    /// the inverse is applied.
    pub fn new(letterbox: &LetterboxParams, snap_to_model_pixels: bool) -> Self {
        let (image_width, image_height) = letterbox.source_size;
        Self {
            model_width: letterbox.target.width as f32,
            model_height: letterbox.target.height as f32,
            scale: letterbox.scale,
            offset_x: letterbox.offset_x as f32,
            offset_y: letterbox.offset_y as f32,
            image_width: image_width as f32,
            image_height: image_height as f32,
            snap_to_model_pixels,
        }
    }

    #[inline]
    fn to_model_pixels(&self, normalized: f32, dimension: f32) -> f32 {
        let value = normalized * dimension;
        if self.snap_to_model_pixels {
            value.floor()
        } else {
            value
        }
    }

    #[inline]
    fn unclamped_x(&self, x: f32) -> f32 {
        (self.to_model_pixels(x, self.model_width) - self.offset_x) / self.scale
    }

    #[inline]
    fn unclamped_y(&self, y: f32) -> f32 {
        (self.to_model_pixels(y, self.model_height) - self.offset_y) / self.scale
    }

    pub fn map_x(&self, x: f32) -> f32 {
        self.unclamped_x(x).clamp(0.0, self.image_width)
    }

    pub fn map_y(&self, y: f32) -> f32 {
        self.unclamped_y(y).clamp(0.0, self.image_height)
    }

    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.map_x(x), self.map_y(y))
    }

    /// Inverse mapping without the final clamp.
    pub fn unclamped_point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.unclamped_x(x), self.unclamped_y(y))
    }

    pub fn map_box(&self, bbox: &BoundingBox) -> BoundingBox {
        BoundingBox {
            x1: self.map_x(bbox.x1),
            y1: self.map_y(bbox.y1),
            x2: self.map_x(bbox.x2),
            y2: self.map_y(bbox.y2),
        }
    }

    pub fn map_landmarks(&self, landmarks: &[Landmark; 5]) -> [Landmark; 5] {
        landmarks.map(|point| Landmark {
            x: self.map_x(point.x),
            y: self.map_y(point.y),
        })
    }
}
