use ndarray::{Array, Array2, Array3, ArrayViewMut, Dimension, Slice};

use crate::{
    assets::{
        index_map::{BACKGROUND_LAYER, IndexMap, LayerKind},
        ingredients::Ingredients,
    },
    foundation::core::{Dims, LayerImage},
    foundation::error::{MosculpError, MosculpResult},
};

/// Offset of the subject inside a larger canvas: the top/left margins get the floor half.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Padding {
    /// Rows above the subject.
    pub top: usize,
    /// Columns left of the subject.
    pub left: usize,
    /// Canvas size.
    pub canvas: Dims,
}

impl Padding {
    /// Centre `subject` on `canvas`; fails when the canvas is smaller in either direction.
    pub fn center(subject: Dims, canvas: Dims) -> MosculpResult<Self> {
        if canvas.height < subject.height || canvas.width < subject.width {
            return Err(MosculpError::invalid_index_map(format!(
                "background {canvas} is smaller than the subject {subject}"
            )));
        }
        Ok(Self {
            top: (canvas.height - subject.height) / 2,
            left: (canvas.width - subject.width) / 2,
            canvas,
        })
    }

    /// The `h x w` subject region of a canvas-sized array; trailing axes are kept whole.
    fn window<'a, A, D: Dimension>(
        &self,
        canvas: &'a mut Array<A, D>,
        h: usize,
        w: usize,
    ) -> ArrayViewMut<'a, A, D> {
        canvas.slice_each_axis_mut(|ax| match ax.axis.index() {
            0 => Slice::from(self.top..self.top + h),
            1 => Slice::from(self.left..self.left + w),
            _ => Slice::from(..),
        })
    }

    fn plane<T: Clone>(&self, src: &Array2<T>, fill: T) -> Array2<T> {
        let (h, w) = src.dim();
        let mut out = Array2::from_elem((self.canvas.height, self.canvas.width), fill);
        self.window(&mut out, h, w).assign(src);
        out
    }

    fn image(&self, src: &LayerImage) -> LayerImage {
        let (h, w, c) = src.dim();
        let mut out = Array3::zeros((self.canvas.height, self.canvas.width, c));
        self.window(&mut out, h, w).assign(src);
        out
    }
}

/// Replace the video background with the merged shadow background `bg`.
///
/// Appends the `bg` layer, pads every other image and the maps to the background's size, points
/// both maps at `bg` outside the subject and stops the last video frame from showing through the
/// sculpture.
#[tracing::instrument(skip_all, fields(dims = %index_map.dims()))]
pub fn with_synthetic_background(
    ingredients: &Ingredients,
    index_map: &IndexMap,
) -> MosculpResult<(Ingredients, IndexMap)> {
    let background = ingredients.require(BACKGROUND_LAYER)?;
    let subject = index_map.dims();
    let pad = Padding::center(subject, Dims::of_image(background))?;
    let (extended, bg) = index_map.extend_layers(BACKGROUND_LAYER)?;

    let mut padded = Ingredients::new();
    for name in ingredients.names() {
        let image = ingredients.require(name)?;
        if name == BACKGROUND_LAYER {
            padded.insert(name, image.clone());
            continue;
        }
        if Dims::of_image(image) != subject {
            return Err(MosculpError::invalid_index_map(format!(
                "layer '{name}' is {}, index map is {subject}",
                Dims::of_image(image)
            )));
        }
        padded.insert(name, pad.image(image));
    }

    let foreground = pad.plane(extended.foreground(), false);
    let mut prev = pad.plane(extended.prev(), bg);
    let mut curr = pad.plane(extended.curr(), bg);
    ndarray::Zip::from(&mut prev)
        .and(&mut curr)
        .and(&foreground)
        .for_each(|p, c, &fg| {
            if !fg {
                *p = bg;
                *c = bg;
            }
        });

    let last_frame = extended
        .names()
        .iter()
        .zip(extended.kinds())
        .enumerate()
        .filter(|(_, (_, kind))| matches!(kind, LayerKind::Frame(_)))
        .max_by(|(_, (a, _)), (_, (b, _))| a.cmp(b))
        .map(|(i, _)| i as u32);
    if let Some(last) = last_frame {
        prev.mapv_inplace(|p| if p == last { bg } else { p });
    }

    let map = extended.with_pixels(prev, curr, foreground)?;
    Ok((padded, map))
}

#[cfg(test)]
#[path = "../../tests/unit/composite/background.rs"]
mod tests;
