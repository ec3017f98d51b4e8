mod utils;
mod error;
pub mod common;
pub mod data;
pub mod evaluation;
pub mod annotation_parser;
pub mod index_loader;
pub mod proposal_loader;
pub mod results_writer;
pub mod roidb_cache;
pub mod fishclef;

use std::path::Path;
use std::time::Instant;

use crate::common::DetectionGrid;
use crate::data::ImageReader;
use crate::evaluation::{EvalSummary, VocApEvaluator};

pub use error::DatasetError;
pub use fishclef::FishClef;

pub type Result<T, E = DatasetError> = std::result::Result<T, E>;

/// Evaluates detections with the all-points VOC evaluator.
pub fn evaluate_voc<R: ImageReader>(dataset: &FishClef<R>, detections: &DetectionGrid,
                                    output_dir: &Path) -> Result<EvalSummary> {
    let now = Instant::now();

    let summary = dataset.evaluate_detections(detections, output_dir, &VocApEvaluator::default())?;

    log::info!("{} evaluated in {:?}", dataset.name(), now.elapsed());

    Ok(summary)
}
