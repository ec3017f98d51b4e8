use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::common::{ClassTable, DetectionGrid};
use crate::data::create_dir;
use crate::error::DatasetError;
use crate::evaluation::{ApEvaluator, ApRequest, ClassEval, GroundTruthSource};
use crate::results_writer::ResultsWriter;
use crate::utils;
use crate::Result;

/// IoU a detection must exceed to match a ground-truth box.
pub const IOU_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassReport {
    pub class_index: usize,
    pub class_name: String,
    pub eval: ClassEval,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalSummary {
    pub classes: Vec<ClassReport>,
    pub mean_ap: f64,
}

impl EvalSummary {
    pub fn ap_for(&self, class_name: &str) -> Option<f64> {
        self.classes
            .iter()
            .find(|c| c.class_name == class_name)
            .map(|c| c.eval.ap)
    }
}

/// Arithmetic mean of per-class APs, `0.0` for no classes.
pub fn mean_average_precision(aps: &[f64]) -> f64 {
    if aps.is_empty() {
        return 0.;
    }
    aps.iter().sum::<f64>() / aps.len() as f64
}

/// Results files of one evaluation run, deleted on drop when cleanup is enabled.
struct ResultFiles {
    paths: Vec<PathBuf>,
    cleanup: bool,
}

impl Drop for ResultFiles {
    fn drop(&mut self) {
        if !self.cleanup {
            return;
        }
        for path in &self.paths {
            if let Err(e) = fs::remove_file(path) {
                log::warn!("Failed to remove results file {}: {}", path.display(), e);
            }
        }
    }
}

/// One evaluation of detector output against a dataset's ground truth.
pub struct Evaluation<'a> {
    pub classes: &'a ClassTable,
    pub image_index: &'a [String],
    pub image_set_path: &'a Path,
    pub annotations: &'a dyn GroundTruthSource,
    pub writer: &'a ResultsWriter,
    pub cache_dir: &'a Path,
    pub cleanup: bool,
    pub use_difficult: bool,
}

impl Evaluation<'_> {
    /// Writes the results files, scores every non-background class and aggregates mean AP.
    ///
    /// # Arguments
    ///
    /// * `detections` - Detector output over the filtered image index.
    /// * `output_dir` - Receives one `<class>_pr.json` per class.
    /// * `evaluator` - Computes each class's curve and AP.
    ///
    /// # Returns
    ///
    /// The per-class reports and their mean AP.
    pub fn run(&self, detections: &DetectionGrid, output_dir: &Path,
               evaluator: &dyn ApEvaluator) -> Result<EvalSummary> {
        let start = Instant::now();
        let mut elapsed = start.elapsed();

        let files = ResultFiles {
            paths: self.writer.write_all(self.classes, detections, self.image_index)?,
            cleanup: self.cleanup,
        };
        elapsed = utils::trace("EVAL", "Write results", start, elapsed);

        create_dir(output_dir)?;

        let mut reports = Vec::with_capacity(files.paths.len());
        for ((cls_ind, cls), path) in self.classes.foreground().zip(&files.paths) {
            let request = ApRequest {
                detections_path: path,
                annotations: self.annotations,
                image_set_path: self.image_set_path,
                class_name: cls,
                cache_dir: self.cache_dir,
                iou_threshold: IOU_THRESHOLD,
                use_difficult: self.use_difficult,
            };
            let eval = evaluator.evaluate(&request)?;
            log::info!("AP for {} = {:.4}", cls, eval.ap);
            write_pr_file(&output_dir.join(format!("{}_pr.json", cls)), &eval)?;

            reports.push(ClassReport {
                class_index: cls_ind,
                class_name: cls.to_string(),
                eval,
            });
        }
        utils::trace("EVAL", "Per-class AP", start, elapsed);

        let aps: Vec<f64> = reports.iter().map(|r| r.eval.ap).collect();
        let mean_ap = mean_average_precision(&aps);
        log::info!("Mean AP = {:.4}", mean_ap);
        log::info!("Results:\n{}\n{:.3}",
                   aps.iter().map(|ap| format!("{:.3}", ap)).collect::<Vec<_>>().join("\n"), mean_ap);

        Ok(EvalSummary { classes: reports, mean_ap })
    }
}

fn write_pr_file(path: &Path, eval: &ClassEval) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| DatasetError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, eval).map_err(|e| DatasetError::json(path, e))?;
    writer.flush().map_err(|e| DatasetError::io(path, e))
}
