//! Image annotation functionality for drawing detections.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use ab_glyph::FontRef;
use anyhow::{Context, Result};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::{
    drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use log::warn;
use retinaface_core::{BoundingBox, Detection};
use retinaface_utils::load_image;

const BOX_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const LABEL_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const LABEL_SCALE: f32 = 13.0;

/// One colour per landmark: left eye, right eye, nose, left mouth, right mouth.
const LANDMARK_COLORS: [Rgba<u8>; 5] = [
    Rgba([255, 0, 0, 255]),
    Rgba([255, 255, 0, 255]),
    Rgba([255, 0, 255, 255]),
    Rgba([0, 255, 0, 255]),
    Rgba([0, 0, 255, 255]),
];

const LANDMARK_RADIUS: i32 = 1;

static FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");
static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();

fn label_font() -> Option<&'static FontRef<'static>> {
    FONT.get_or_init(|| match FontRef::try_from_slice(FONT_DATA) {
        Ok(font) => Some(font),
        Err(err) => {
            warn!("bundled label font is unusable, text overlays disabled: {err}");
            None
        }
    })
    .as_ref()
}

/// Draw `text` with its top-left corner at `(x, y)`. Does nothing without a usable font.
pub fn draw_label(
    image: &mut RgbaImage,
    text: &str,
    x: i32,
    y: i32,
    scale: f32,
    color: Rgba<u8>,
) {
    if let Some(font) = label_font() {
        draw_text_mut(image, color, x, y, scale, font, text);
    }
}

/// Where the annotated copy of `image_path` goes.
///
/// The path below `input_root` is mirrored inside `output_dir`, so images sharing a file name
/// in different sub-directories never overwrite each other.
pub fn annotation_path(input_root: &Path, image_path: &Path, output_dir: &Path) -> PathBuf {
    match image_path.strip_prefix(input_root) {
        Ok(relative) if !relative.as_os_str().is_empty() => output_dir.join(relative),
        _ => output_dir.join(
            image_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("frame.png")),
        ),
    }
}

/// Draw detections on the image at `image_path` and save the result to `output_path`.
pub fn annotate_image<'a>(
    image_path: &Path,
    detections: impl IntoIterator<Item = &'a Detection>,
    output_path: &Path,
) -> Result<PathBuf> {
    let mut image = load_image(image_path)?.to_rgba8();

    if image.width() == 0 || image.height() == 0 {
        anyhow::bail!(
            "cannot annotate image with zero dimensions: {}",
            image_path.display()
        );
    }

    draw_detections(&mut image, detections);
    save_rgb(image, output_path)?;
    Ok(output_path.to_path_buf())
}

/// Save an annotated canvas, dropping alpha so every output format accepts it.
pub fn save_rgb(image: RgbaImage, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    DynamicImage::ImageRgba8(image)
        .to_rgb8()
        .save(output_path)
        .with_context(|| format!("failed to save annotated image {}", output_path.display()))
}

/// Draw boxes, score labels and landmarks in place.
pub fn draw_detections<'a>(
    image: &mut RgbaImage,
    detections: impl IntoIterator<Item = &'a Detection>,
) {
    let (img_w, img_h) = image.dimensions();
    for detection in detections {
        let rect = rect_from_bbox(&detection.bbox, img_w, img_h);
        draw_hollow_rect_mut(image, rect, BOX_COLOR);
        draw_label(
            image,
            &format!("{:.4}", detection.score),
            rect.left() + 2,
            rect.top() + 2,
            LABEL_SCALE,
            LABEL_COLOR,
        );
        for (lm, color) in detection.landmarks.iter().zip(LANDMARK_COLORS) {
            let cx = clamp_to_i32(lm.x, img_w);
            let cy = clamp_to_i32(lm.y, img_h);
            draw_filled_circle_mut(image, (cx, cy), LANDMARK_RADIUS, color);
        }
    }
}

/// Convert corner coordinates to an integer `Rect` inside the image.
fn rect_from_bbox(bbox: &BoundingBox, img_w: u32, img_h: u32) -> Rect {
    let max_x = img_w.saturating_sub(1) as f32;
    let max_y = img_h.saturating_sub(1) as f32;

    let clamped = BoundingBox {
        x1: bbox.x1.clamp(0.0, max_x),
        y1: bbox.y1.clamp(0.0, max_y),
        x2: bbox.x2.clamp(0.0, max_x),
        y2: bbox.y2.clamp(0.0, max_y),
    };

    let width = clamped.width().max(1.0).round() as u32;
    let height = clamped.height().max(1.0).round() as u32;

    Rect::at(clamped.x1.round() as i32, clamped.y1.round() as i32).of_size(width, height)
}

#[inline]
fn clamp_to_i32(value: f32, max_extent: u32) -> i32 {
    if max_extent == 0 {
        return 0;
    }
    let max = (max_extent - 1) as f32;
    value.clamp(0.0, max).round() as i32
}
