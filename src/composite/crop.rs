use image::RgbImage;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
/// Rows `top..bottom` and columns `left..right` to keep; an unset bound keeps the image edge.
pub struct CropRect {
    /// First kept row.
    pub top: Option<u32>,
    /// One past the last kept row.
    pub bottom: Option<u32>,
    /// First kept column.
    pub left: Option<u32>,
    /// One past the last kept column.
    pub right: Option<u32>,
}

impl CropRect {
    /// Reject rectangles that are empty whatever the image size.
    pub fn validate(&self) -> Result<(), String> {
        if let (Some(top), Some(bottom)) = (self.top, self.bottom)
            && bottom <= top
        {
            return Err(format!("bottom ({bottom}) must be greater than top ({top})"));
        }
        if let (Some(left), Some(right)) = (self.left, self.right)
            && right <= left
        {
            return Err(format!("right ({right}) must be greater than left ({left})"));
        }
        Ok(())
    }

    /// `(x, y, width, height)` of the rectangle clamped to a `width x height` image.
    pub fn clamp_to(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let top = self.top.unwrap_or(0).min(height);
        let bottom = self.bottom.unwrap_or(height).min(height).max(top);
        let left = self.left.unwrap_or(0).min(width);
        let right = self.right.unwrap_or(width).min(width).max(left);
        (left, top, right - left, bottom - top)
    }
}

/// Crop `image` to `rect`, clamped to the image bounds.
///
/// A rectangle lying entirely outside the image leaves it uncropped.
pub fn apply_crop(image: RgbImage, rect: &CropRect) -> RgbImage {
    let (x, y, w, h) = rect.clamp_to(image.width(), image.height());
    if w == 0 || h == 0 {
        tracing::warn!(
            ?rect,
            width = image.width(),
            height = image.height(),
            "crop misses the image, keeping it whole"
        );
        return image;
    }
    if (x, y, w, h) == (0, 0, image.width(), image.height()) {
        return image;
    }
    image::imageops::crop_imm(&image, x, y, w, h).to_image()
}

#[cfg(test)]
#[path = "../../tests/unit/composite/crop.rs"]
mod tests;
