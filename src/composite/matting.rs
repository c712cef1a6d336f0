use image::RgbImage;
use ndarray::{Array2, Array3, Axis, Zip};
use rayon::prelude::*;

use crate::{
    assets::{
        index_map::{IndexMap, LayerKind},
        ingredients::Ingredients,
    },
    composite::blur::gaussian_blur,
    foundation::core::{Dims, LayerImage, Plane},
    foundation::error::{MosculpError, MosculpResult},
};

/// Absorbs float round-off before truncating blended values to `u8`.
const QUANTIZE_EPSILON: f32 = 1e-3;

/// Pixels whose current layer is a sculpture part.
pub fn sculpture_occupancy(index_map: &IndexMap) -> Array2<bool> {
    let sculpture: Vec<bool> = index_map.kinds().iter().map(LayerKind::is_sculpture).collect();
    index_map.curr().mapv(|i| sculpture[i as usize])
}

/// Raw (unblurred) weight plane of every layer, in index-map order.
///
/// A sculpture layer weighs `1 - t` where it is current. Any other layer weighs `1` where it is
/// current and `t` where it lies behind sculpture.
pub fn weight_planes(index_map: &IndexMap, transparency: f32) -> Vec<Plane> {
    let occupied = sculpture_occupancy(index_map);
    let t = transparency;
    index_map
        .kinds()
        .par_iter()
        .enumerate()
        .map(|(i, kind)| {
            let i = i as u32;
            let mut plane = Plane::zeros(index_map.curr().raw_dim());
            if kind.is_sculpture() {
                Zip::from(&mut plane)
                    .and(index_map.curr())
                    .for_each(|w, &curr| {
                        if curr == i {
                            *w = 1.0 - t;
                        }
                    });
            } else {
                Zip::from(&mut plane)
                    .and(index_map.curr())
                    .and(index_map.prev())
                    .and(&occupied)
                    .for_each(|w, &curr, &prev, &occ| {
                        if curr == i {
                            *w = 1.0;
                        } else if prev == i && occ {
                            *w = t;
                        }
                    });
            }
            plane
        })
        .collect()
}

/// Blur every plane to soften layer boundaries.
pub fn soften(planes: Vec<Plane>, sigma: f32) -> MosculpResult<Vec<Plane>> {
    planes
        .into_par_iter()
        .map(|p| gaussian_blur(&p, sigma))
        .collect()
}

/// Divide every plane by the per-pixel sum over planes, so weights sum to one.
///
/// A pixel with zero or non-finite total weight cannot be blended and is reported as
/// `InvalidIndexMap`.
pub fn normalize_weights(planes: &mut [Plane]) -> MosculpResult<()> {
    let Some(first) = planes.first() else {
        return Err(MosculpError::invalid_index_map("no layers to blend"));
    };
    let mut total = Plane::zeros(first.raw_dim());
    for plane in planes.iter() {
        total += plane;
    }
    if let Some(((y, x), sum)) = total
        .indexed_iter()
        .find(|(_, s)| !s.is_finite() || **s <= 0.0)
    {
        return Err(MosculpError::invalid_index_map(format!(
            "no layer contributes to pixel ({x}, {y}) (total weight {sum})"
        )));
    }
    planes
        .par_iter_mut()
        .for_each(|plane| *plane /= &total);
    Ok(())
}

/// Weighted per-channel sum of `images`, quantized to 8 bits by truncation.
pub fn blend(planes: &[Plane], images: &[&LayerImage]) -> MosculpResult<RgbImage> {
    let Some(first) = planes.first() else {
        return Err(MosculpError::invalid_index_map("no layers to blend"));
    };
    let dims = Dims::of_plane(first);
    if images.len() != planes.len() {
        return Err(MosculpError::invalid_index_map(format!(
            "{} weight planes for {} images",
            planes.len(),
            images.len()
        )));
    }
    let expected = (dims.height, dims.width, 3);
    if planes.iter().any(|p| Dims::of_plane(p) != dims)
        || images.iter().any(|img| img.dim() != expected)
    {
        return Err(MosculpError::invalid_index_map(format!(
            "layers must all be {dims} RGB"
        )));
    }
    let mut acc = Array3::<f32>::zeros((dims.height, dims.width, 3));
    for (weights, image) in planes.iter().zip(images) {
        let w3 = weights.view().insert_axis(Axis(2));
        Zip::from(&mut acc)
            .and(*image)
            .and_broadcast(&w3)
            .par_for_each(|a, &px, &w| *a += px * w);
    }

    let mut out = RgbImage::new(dims.width as u32, dims.height as u32);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let (r, c) = (y as usize, x as usize);
        px.0 = [
            quantize(acc[[r, c, 0]]),
            quantize(acc[[r, c, 1]]),
            quantize(acc[[r, c, 2]]),
        ];
    }
    Ok(out)
}

fn quantize(v: f32) -> u8 {
    (v + QUANTIZE_EPSILON).clamp(0.0, 255.0) as u8
}

/// Soft-edge matting of every layer of `index_map` with translucency `transparency`.
///
/// Every named layer needs an image of the index map's shape in `ingredients`.
#[tracing::instrument(skip_all, fields(dims = %index_map.dims(), layers = index_map.layer_count()))]
pub fn simple_matting(
    ingredients: &Ingredients,
    index_map: &IndexMap,
    transparency: f32,
    sigma: f32,
) -> MosculpResult<RgbImage> {
    let dims = index_map.dims();
    let images = index_map
        .names()
        .iter()
        .map(|name| {
            let image = ingredients.require(name)?;
            if image.dim() != (dims.height, dims.width, 3) {
                let (h, w, c) = image.dim();
                return Err(MosculpError::invalid_index_map(format!(
                    "layer '{name}' is {w}x{h}x{c}, index map is {dims}"
                )));
            }
            Ok(image)
        })
        .collect::<MosculpResult<Vec<_>>>()?;

    let mut planes = soften(weight_planes(index_map, transparency), sigma)?;
    normalize_weights(&mut planes)?;
    blend(&planes, &images)
}

#[cfg(test)]
#[path = "../../tests/unit/composite/matting.rs"]
mod tests;
