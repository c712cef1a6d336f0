use ndarray::{Array2, Array3};

/// One RGB layer image: `height x width x 3`, channel values in `0.0..=255.0`.
pub type LayerImage = Array3<f32>;

/// Per-pixel scalar plane (`height x width`), used for matting weights.
pub type Plane = Array2<f32>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// Pixel dimensions of a plane, image or index map.
pub struct Dims {
    /// Rows.
    pub height: usize,
    /// Columns.
    pub width: usize,
}

impl Dims {
    /// Construct dimensions from `(height, width)`.
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Dimensions of a 2D array.
    pub fn of_plane<T>(plane: &Array2<T>) -> Self {
        let (height, width) = plane.dim();
        Self { height, width }
    }

    /// Spatial dimensions of a `height x width x channels` array.
    pub fn of_image<T>(image: &Array3<T>) -> Self {
        let (height, width, _) = image.dim();
        Self { height, width }
    }

    /// Number of pixels.
    pub fn area(self) -> usize {
        self.height * self.width
    }
}

impl std::fmt::Display for Dims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Format a parameter with the fixed two-decimal precision used by asset paths and cache keys.
///
/// Values that differ only beyond the second decimal produce the same string.
pub fn fixed2(v: f64) -> String {
    // `-0.0 + 0.0` is `+0.0`, so a negative zero never leaks a "-0.00" key.
    format!("{:.2}", v + 0.0)
}

/// Round to the two-decimal granularity of [`fixed2`].
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
