use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage, imageops::FilterType};
use ndarray::{Array3, Array4};

use crate::config::{ChannelOrder, ResizeQuality, TensorLayout};

/// Load an image from disk into memory.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    image::open(path_ref).with_context(|| format!("failed to open image {}", path_ref.display()))
}

/// Map a [`ResizeQuality`] preference to an `image` filter.
///
/// `Triangle` averages every source pixel under the footprint when shrinking, which is the
/// closest filter `image` ships to OpenCV's `INTER_AREA`.
pub fn resize_filter(quality: ResizeQuality) -> FilterType {
    match quality {
        ResizeQuality::Quality => FilterType::Triangle,
        ResizeQuality::Speed => FilterType::Nearest,
    }
}

/// Resize an image to an exact resolution.
pub fn resize_image(image: &DynamicImage, width: u32, height: u32, filter: FilterType) -> RgbImage {
    image.resize_exact(width, height, filter).to_rgb8()
}

/// Convert an RGB image into a planar `[3, H, W]` array in the requested channel order.
pub fn rgb_to_chw(image: &RgbImage, order: ChannelOrder) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    let channels = channel_indices(order);
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        for (plane, &src) in channels.iter().enumerate() {
            array[(plane, yi, xi)] = pixel[src] as f32;
        }
    }
    array
}

/// Convert an RGB image into an interleaved `[H, W, 3]` array in the requested channel order.
pub fn rgb_to_hwc(image: &RgbImage, order: ChannelOrder) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let channels = channel_indices(order);
    Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        image.get_pixel(x as u32, y as u32)[channels[c]] as f32
    })
}

/// Pack an RGB image into a batched network input of shape `[1, 3, H, W]` or `[1, H, W, 3]`.
pub fn rgb_to_tensor_data(
    image: &RgbImage,
    order: ChannelOrder,
    layout: TensorLayout,
) -> Array4<f32> {
    let planar = match layout {
        TensorLayout::Nchw => rgb_to_chw(image, order),
        TensorLayout::Nhwc => rgb_to_hwc(image, order),
    };
    planar.insert_axis(ndarray::Axis(0))
}

fn channel_indices(order: ChannelOrder) -> [usize; 3] {
    match order {
        ChannelOrder::Rgb => [0, 1, 2],
        ChannelOrder::Bgr => [2, 1, 0],
    }
}
