use serde::{Deserialize, Serialize};

/// Axis-aligned box in zero-based, inclusive pixel coordinates.
///
/// A box covering exactly one pixel has `x1 == x2` and `y1 == y2`, so widths,
/// heights and areas all carry the `+ 1` of the inclusive convention.
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl RoiBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Builds a zero-based box from the 1-based inclusive bounds used by annotation
    /// and results files.
    pub fn from_one_based(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self::new(xmin - 1., ymin - 1., xmax - 1., ymax - 1.)
    }

    /// Returns the bounds in the 1-based convention, the inverse of [`RoiBox::from_one_based`].
    pub fn to_one_based(&self) -> (f32, f32, f32, f32) {
        (self.x1 + 1., self.y1 + 1., self.x2 + 1., self.y2 + 1.)
    }

    /// Clamps the lower corner to zero and the upper corner to the last pixel.
    ///
    /// # Arguments
    ///
    /// * `width` - The image width in pixels.
    /// * `height` - The image height in pixels.
    ///
    /// # Returns
    ///
    /// A `RoiBox` with each corner bounded on one side only.
    pub fn clamp_to_image(mut self, width: u32, height: u32) -> Self {
        let max_x = width as f32 - 1.;
        let max_y = height as f32 - 1.;
        if self.x1 < 0. {
            self.x1 = 0.;
        }
        if self.y1 < 0. {
            self.y1 = 0.;
        }
        if self.x2 > max_x {
            self.x2 = max_x;
        }
        if self.y2 > max_y {
            self.y2 = max_y;
        }
        self
    }

    /// Inclusive width, zero when the box is inverted.
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1 + 1.).max(0.)
    }

    /// Inclusive height, zero when the box is inverted.
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1 + 1.).max(0.)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn is_inverted(&self) -> bool {
        self.x2 < self.x1 || self.y2 < self.y1
    }

    /// Computes the inclusive intersection area between this bounding box and another.
    pub fn intersect(&self, other: &RoiBox) -> f32 {
        let iw = self.x2.min(other.x2) - self.x1.max(other.x1) + 1.;
        let ih = self.y2.min(other.y2) - self.y1.max(other.y1) + 1.;
        iw.max(0.) * ih.max(0.)
    }

    /// Computes the union area between this bounding box and another.
    pub fn union(&self, other: &RoiBox) -> f32 {
        self.area() + other.area() - self.intersect(other)
    }

    /// Computes the intersection over union (IoU) between this bounding box and another.
    pub fn iou(&self, other: &RoiBox) -> f32 {
        let union = self.union(other);
        if union <= 0. {
            return 0.;
        }
        self.intersect(other) / union
    }

    pub fn xy1_xy2(&self) -> (f32, f32, f32, f32) {
        (self.x1, self.y1, self.x2, self.y2)
    }
}
