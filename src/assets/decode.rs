use anyhow::Context;
use ndarray::Array3;

use crate::foundation::{core::LayerImage, error::MosculpResult};

/// Decode an encoded image (JPEG, PNG, ...) into an RGB float layer.
///
/// Alpha, if present, is dropped: layer images are opaque renders or video frames.
pub fn decode_layer_image(bytes: &[u8]) -> MosculpResult<LayerImage> {
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    Ok(layer_from_rgb(&dyn_img.to_rgb8()))
}

/// Convert an 8-bit RGB image to a `height x width x 3` float layer.
pub fn layer_from_rgb(rgb: &image::RgbImage) -> LayerImage {
    let (width, height) = rgb.dimensions();
    Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        f32::from(rgb.get_pixel(x as u32, y as u32)[c])
    })
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
