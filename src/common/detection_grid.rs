use ndarray::{Array2, ArrayView2};

use crate::common::RoiBox;
use crate::error::DatasetError;
use crate::Result;

/// Minimum columns of a detection row: `x1, y1, x2, y2, ..., score`.
pub const DETECTION_COLS: usize = 5;

/// Detector output indexed by `[class][image position]`.
///
/// Each cell is an `N x 5` (or wider) array of zero-based boxes whose last column is the
/// confidence score. Image positions follow the filtered image index.
#[derive(Debug, Clone)]
pub struct DetectionGrid {
    num_classes: usize,
    num_images: usize,
    cells: Vec<Array2<f32>>,
}

impl DetectionGrid {
    /// A grid with zero detections in every cell.
    pub fn new(num_classes: usize, num_images: usize) -> Self {
        Self {
            num_classes,
            num_images,
            cells: (0..num_classes * num_images)
                .map(|_| Array2::zeros((0, DETECTION_COLS)))
                .collect(),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_images(&self) -> usize {
        self.num_images
    }

    pub fn get(&self, class_index: usize, image_index: usize) -> Result<ArrayView2<'_, f32>> {
        let cell = self.cell_index(class_index, image_index)?;
        Ok(self.cells[cell].view())
    }

    /// Replaces the detections of one class on one image.
    ///
    /// # Arguments
    ///
    /// * `class_index` - Position of the class in the class table.
    /// * `image_index` - Position of the image in the filtered index.
    /// * `dets` - `N x C` array, `C >= 5`, score in the last column.
    pub fn set(&mut self, class_index: usize, image_index: usize, dets: Array2<f32>) -> Result<()> {
        if dets.ncols() < DETECTION_COLS {
            return Err(DatasetError::DetectionShape(format!(
                "detections need at least {} columns, got {}", DETECTION_COLS, dets.ncols())));
        }
        let cell = self.cell_index(class_index, image_index)?;
        self.cells[cell] = dets;
        Ok(())
    }

    /// Appends a single detection to a cell.
    pub fn push(&mut self, class_index: usize, image_index: usize, bbox: RoiBox, score: f32) -> Result<()> {
        let cell = self.cell_index(class_index, image_index)?;
        let row = [bbox.x1, bbox.y1, bbox.x2, bbox.y2, score];
        let target = &mut self.cells[cell];
        if target.ncols() != DETECTION_COLS {
            return Err(DatasetError::DetectionShape(format!(
                "cannot push a {}-column row into a {}-column cell", DETECTION_COLS, target.ncols())));
        }
        target
            .push_row(ndarray::ArrayView1::from(&row))
            .map_err(|e| DatasetError::DetectionShape(e.to_string()))
    }

    fn cell_index(&self, class_index: usize, image_index: usize) -> Result<usize> {
        if class_index >= self.num_classes || image_index >= self.num_images {
            return Err(DatasetError::DetectionShape(format!(
                "cell [{}][{}] outside a {}x{} grid",
                class_index, image_index, self.num_classes, self.num_images)));
        }
        Ok(class_index * self.num_images + image_index)
    }
}
