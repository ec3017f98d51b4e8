use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::common::RoiBox;
use crate::error::DatasetError;
use crate::Result;

/// Compressed sparse row matrix of box/class overlaps.
///
/// Ground-truth rows are one-hot: a single stored entry of `1.0` in the column of the
/// box's class.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseOverlaps {
    pub num_classes: usize,
    pub indptr: Vec<usize>,
    pub indices: Vec<usize>,
    pub data: Vec<f32>,
}

impl SparseOverlaps {
    pub fn empty(num_classes: usize) -> Self {
        Self {
            num_classes,
            indptr: vec![0],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Builds one one-hot row per class index.
    pub fn from_one_hot(classes: &[usize], num_classes: usize) -> Self {
        let mut overlaps = Self::empty(num_classes);
        for &cls in classes {
            overlaps.push_one_hot(cls);
        }
        overlaps
    }

    pub fn push_one_hot(&mut self, cls: usize) {
        self.push_row(&[(cls, 1.0)]);
    }

    /// Appends a row holding the given `(column, value)` entries. An empty slice is an
    /// all-zero row.
    pub fn push_row(&mut self, entries: &[(usize, f32)]) {
        if self.indptr.is_empty() {
            self.indptr.push(0);
        }
        for &(col, value) in entries {
            self.indices.push(col);
            self.data.push(value);
        }
        self.indptr.push(self.indices.len());
    }

    /// Stacks the rows of `other` below these.
    pub fn append(&mut self, other: &SparseOverlaps) -> Result<()> {
        if other.num_classes != self.num_classes {
            return Err(DatasetError::InvalidRecord(format!(
                "cannot stack {}-class overlaps onto {}-class overlaps", other.num_classes, self.num_classes)));
        }
        for i in 0..other.rows() {
            let row: Vec<(usize, f32)> = other.row(i).collect();
            self.push_row(&row);
        }
        Ok(())
    }

    /// Checks that `indptr` is a monotone offset table over `indices` and `data`, and that
    /// every stored column fits the matrix. [`SparseOverlaps::row`] relies on this.
    pub fn check(&self) -> Result<()> {
        if self.indices.len() != self.data.len() {
            return Err(DatasetError::InvalidRecord(format!(
                "overlaps store {} indices but {} values", self.indices.len(), self.data.len())));
        }
        let (first, last) = match (self.indptr.first(), self.indptr.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ if self.indices.is_empty() => return Ok(()),
            _ => return Err(DatasetError::InvalidRecord("overlaps have entries but no row offsets".to_string())),
        };
        if first != 0 || last != self.indices.len() || self.indptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(DatasetError::InvalidRecord(format!(
                "row offsets {:?} do not index {} entries", self.indptr, self.indices.len())));
        }
        if let Some(&col) = self.indices.iter().find(|&&c| c >= self.num_classes) {
            return Err(DatasetError::InvalidRecord(format!(
                "overlap column {} outside {} classes", col, self.num_classes)));
        }
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    /// Stored `(column, value)` entries of row `i`.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let (start, end) = (self.indptr[i], self.indptr[i + 1]);
        self.indices[start..end].iter().copied().zip(self.data[start..end].iter().copied())
    }

    pub fn row_sum(&self, i: usize) -> f32 {
        self.row(i).map(|(_, v)| v).sum()
    }

    /// Column holding the largest overlap of row `i`.
    pub fn argmax(&self, i: usize) -> Option<usize> {
        self.row(i)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(col, _)| col)
    }

    pub fn to_dense(&self) -> Array2<f32> {
        let mut dense = Array2::zeros((self.rows(), self.num_classes));
        for i in 0..self.rows() {
            for (col, value) in self.row(i) {
                dense[[i, col]] = value;
            }
        }
        dense
    }
}

/// Ground truth of one image.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiRecord {
    pub boxes: Vec<RoiBox>,
    pub gt_classes: Vec<usize>,
    pub gt_overlaps: SparseOverlaps,
    pub seg_areas: Vec<f32>,
    pub flipped: bool,
}

impl RoiRecord {
    pub fn num_boxes(&self) -> usize {
        self.boxes.len()
    }

    /// Builds the record of an image's proposal boxes.
    ///
    /// Each proposal row stores its best IoU against `gt` in the column of that ground-truth
    /// box's class, and is empty when it overlaps no ground truth. Proposals carry class 0
    /// and no segmentation area.
    pub fn from_proposals(boxes: Vec<RoiBox>, gt: &RoiRecord, num_classes: usize) -> Self {
        let mut gt_overlaps = SparseOverlaps::empty(num_classes);
        for proposal in &boxes {
            let best = gt
                .boxes
                .iter()
                .zip(&gt.gt_classes)
                .map(|(g, &cls)| (cls, proposal.iou(g)))
                .fold(None, |best: Option<(usize, f32)>, (cls, ov)| match best {
                    Some((_, top)) if top >= ov => best,
                    _ => Some((cls, ov)),
                });
            match best {
                Some((cls, ov)) if ov > 0. => gt_overlaps.push_row(&[(cls, ov)]),
                _ => gt_overlaps.push_row(&[]),
            }
        }

        let n = boxes.len();
        Self {
            boxes,
            gt_classes: vec![0; n],
            gt_overlaps,
            seg_areas: vec![0.; n],
            flipped: false,
        }
    }

    /// Appends the boxes of `other` after this record's boxes.
    pub fn merge(&mut self, other: &RoiRecord) -> Result<()> {
        self.gt_overlaps.append(&other.gt_overlaps)?;
        self.boxes.extend_from_slice(&other.boxes);
        self.gt_classes.extend_from_slice(&other.gt_classes);
        self.seg_areas.extend_from_slice(&other.seg_areas);
        Ok(())
    }

    /// Checks the structural invariants: aligned lengths, one-hot overlap rows, and class
    /// indices inside the table.
    pub fn validate(&self, num_classes: usize) -> Result<()> {
        self.gt_overlaps.check()?;
        let n = self.boxes.len();
        if self.gt_classes.len() != n || self.gt_overlaps.rows() != n || self.seg_areas.len() != n {
            return Err(DatasetError::InvalidRecord(format!(
                "length mismatch: boxes={} gt_classes={} overlaps={} seg_areas={}",
                n, self.gt_classes.len(), self.gt_overlaps.rows(), self.seg_areas.len())));
        }
        if self.gt_overlaps.num_classes != num_classes {
            return Err(DatasetError::InvalidRecord(format!(
                "overlaps have {} columns, expected {}", self.gt_overlaps.num_classes, num_classes)));
        }

        for (i, &cls) in self.gt_classes.iter().enumerate() {
            if cls >= num_classes {
                return Err(DatasetError::InvalidRecord(format!(
                    "box {} has class {} outside [0, {})", i, cls, num_classes)));
            }
            if self.gt_overlaps.row_sum(i) != 1.0 || self.gt_overlaps.argmax(i) != Some(cls) {
                return Err(DatasetError::InvalidRecord(format!(
                    "overlap row {} is not one-hot on class {}", i, cls)));
            }
        }
        Ok(())
    }
}
