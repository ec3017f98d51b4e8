use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::common::{ClassTable, DetectionGrid, ResultLine, RoiBox};
use crate::data::create_dir;
use crate::error::DatasetError;
use crate::Result;

/// Writes detections as per-class text files in the 1-based annotation convention.
///
/// File names are `<comp_id>[_<salt>]_det_<image_set>_<class>.txt`, so runs with different
/// salts can share one results directory.
#[derive(Debug, Clone)]
pub struct ResultsWriter {
    results_dir: PathBuf,
    comp_id: String,
    image_set: String,
}

impl ResultsWriter {
    /// # Arguments
    ///
    /// * `results_dir` - Directory the files go to, created on first write.
    /// * `comp_id` - Component identifier, salt already appended if any.
    /// * `image_set` - Image-set name, e.g. `train`.
    pub fn new(results_dir: &Path, comp_id: &str, image_set: &str) -> Self {
        Self {
            results_dir: results_dir.to_path_buf(),
            comp_id: comp_id.to_string(),
            image_set: image_set.to_string(),
        }
    }

    pub fn path_for(&self, class_name: &str) -> PathBuf {
        self.results_dir
            .join(format!("{}_det_{}_{}.txt", self.comp_id, self.image_set, class_name))
    }

    /// Writes the results file of one class.
    ///
    /// The file is written under a temporary name and renamed into place, so a failed
    /// write leaves nothing behind.
    pub fn write(&self, class_index: usize, class_name: &str, grid: &DetectionGrid,
                 image_index: &[String]) -> Result<PathBuf> {
        if grid.num_images() != image_index.len() {
            return Err(DatasetError::DetectionShape(format!(
                "grid covers {} images, index has {}", grid.num_images(), image_index.len())));
        }
        create_dir(&self.results_dir)?;

        let path = self.path_for(class_name);
        let tmp = path.with_extension("txt.tmp");
        let written = write_lines(&tmp, class_index, grid, image_index)
            .and_then(|lines| fs::rename(&tmp, &path).map(|()| lines).map_err(|e| DatasetError::io(&path, e)));

        match written {
            Ok(lines) => {
                log::debug!("Wrote {} detections to {}", lines, path.display());
                Ok(path)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e)
            }
        }
    }

    /// Writes one file per non-background class.
    ///
    /// On error the files already written by this call are removed.
    pub fn write_all(&self, classes: &ClassTable, grid: &DetectionGrid,
                     image_index: &[String]) -> Result<Vec<PathBuf>> {
        if grid.num_classes() != classes.len() {
            return Err(DatasetError::DetectionShape(format!(
                "grid covers {} classes, class table has {}", grid.num_classes(), classes.len())));
        }

        let mut paths = Vec::with_capacity(classes.len().saturating_sub(1));
        for (cls_ind, cls) in classes.foreground() {
            log::info!("Writing {} results file", cls);
            match self.write(cls_ind, cls, grid, image_index) {
                Ok(path) => paths.push(path),
                Err(e) => {
                    for path in &paths {
                        if let Err(rm) = fs::remove_file(path) {
                            log::warn!("Failed to remove results file {}: {}", path.display(), rm);
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(paths)
    }
}

fn write_lines(path: &Path, class_index: usize, grid: &DetectionGrid, image_index: &[String]) -> Result<usize> {
    let file = fs::File::create(path).map_err(|e| DatasetError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let mut lines = 0usize;
    for (im_ind, image_id) in image_index.iter().enumerate() {
        let dets = grid.get(class_index, im_ind)?;
        let score_col = dets.ncols() - 1;
        for det in dets.rows() {
            let bbox = RoiBox::new(det[0], det[1], det[2], det[3]);
            let line = ResultLine::from_detection(image_id, &bbox, det[score_col]);
            writeln!(writer, "{}", line).map_err(|e| DatasetError::io(path, e))?;
            lines += 1;
        }
    }
    writer.flush().map_err(|e| DatasetError::io(path, e))?;
    Ok(lines)
}
