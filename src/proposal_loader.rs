use std::fs;
use std::io::BufReader;
use std::path::Path;

use crate::common::RoiBox;
use crate::error::DatasetError;
use crate::Result;

/// Reads precomputed region proposals.
///
/// The file is JSON: one list per image, in image index order, of zero-based rows
/// `[x1, y1, x2, y2]` with an optional trailing score. Rows are expected best first.
pub struct ProposalLoader;

impl ProposalLoader {
    /// # Arguments
    ///
    /// * `path` - The proposal file.
    /// * `num_images` - Length of the filtered image index the file must cover.
    /// * `top_k` - Proposals kept per image.
    ///
    /// # Returns
    ///
    /// The proposal boxes of every image, at most `top_k` each.
    pub fn load(path: &Path, num_images: usize, top_k: usize) -> Result<Vec<Vec<RoiBox>>> {
        log::info!("loading {}", path.display());
        let file = fs::File::open(path).map_err(|e| DatasetError::io(path, e))?;
        let rows: Vec<Vec<Vec<f32>>> =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| DatasetError::json(path, e))?;

        if rows.len() != num_images {
            return Err(DatasetError::InvalidRecord(format!(
                "{} has proposals for {} images, index has {}", path.display(), rows.len(), num_images)));
        }

        rows.into_iter()
            .enumerate()
            .map(|(im_ind, image_rows)| {
                image_rows
                    .into_iter()
                    .take(top_k)
                    .map(|row| to_box(im_ind, &row))
                    .collect()
            })
            .collect()
    }
}

fn to_box(im_ind: usize, row: &[f32]) -> Result<RoiBox> {
    if row.len() < 4 || row[..4].iter().any(|v| !v.is_finite()) {
        return Err(DatasetError::InvalidRecord(format!(
            "proposal {:?} of image {} is not four finite coordinates", row, im_ind)));
    }
    Ok(RoiBox::new(row[0], row[1], row[2], row[3]))
}
