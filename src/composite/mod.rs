//! Layer compositing: soft-edge matting, synthetic background and cropping.

pub(crate) mod background;
pub(crate) mod blur;
pub(crate) mod crop;
pub(crate) mod matting;

use image::RgbImage;

use crate::{
    assets::{index_map::IndexMap, ingredients::Ingredients},
    foundation::config::DEFAULT_MATTING_SIGMA,
    foundation::error::{MosculpError, MosculpResult},
};

#[derive(Clone, Copy, Debug, PartialEq)]
/// Compositor tuning.
pub struct CompositeOpts {
    /// Gaussian sigma of the matting blur, in pixels.
    pub sigma: f32,
}

impl Default for CompositeOpts {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_MATTING_SIGMA,
        }
    }
}

/// Composite the layers of `index_map` into one image.
///
/// With `artistic_background` the video background is replaced by the merged shadow background
/// `bg`, and the output takes the background's size.
pub fn composite(
    ingredients: &Ingredients,
    index_map: &IndexMap,
    transparency: f64,
    artistic_background: bool,
    opts: &CompositeOpts,
) -> MosculpResult<RgbImage> {
    if !(0.0..=1.0).contains(&transparency) {
        return Err(MosculpError::invalid_request(format!(
            "transparency must be in [0, 1], got {transparency}"
        )));
    }
    let t = transparency as f32;
    if artistic_background {
        let (padded, map) = background::with_synthetic_background(ingredients, index_map)?;
        matting::simple_matting(&padded, &map, t, opts.sigma)
    } else {
        matting::simple_matting(ingredients, index_map, t, opts.sigma)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/composite/mod.rs"]
mod tests;
