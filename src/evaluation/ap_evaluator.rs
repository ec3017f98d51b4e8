use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{ResultLine, RoiBox};
use crate::data::{create_dir, AnnotationFingerprint, AnnotationStore, GroundTruthObject};
use crate::error::DatasetError;
use crate::utils;
use crate::Result;

/// Per-image ground truth, as needed by an AP evaluator.
pub trait GroundTruthSource {
    fn ground_truth(&self, image_id: &str) -> Result<Vec<GroundTruthObject>>;

    /// Current state of the annotations of `image_ids`, used to detect stale caches.
    fn fingerprint(&self, image_ids: &[String]) -> Result<AnnotationFingerprint>;

    /// Class names that [`GroundTruthObject::class_name`] is resolved against.
    fn class_names(&self) -> &[String];
}

impl GroundTruthSource for AnnotationStore {
    fn ground_truth(&self, image_id: &str) -> Result<Vec<GroundTruthObject>> {
        AnnotationStore::ground_truth(self, image_id)
    }

    fn fingerprint(&self, image_ids: &[String]) -> Result<AnnotationFingerprint> {
        AnnotationStore::fingerprint(self, image_ids)
    }

    fn class_names(&self) -> &[String] {
        self.classes().names()
    }
}

/// Everything an evaluator needs to score one class.
pub struct ApRequest<'a> {
    pub detections_path: &'a Path,
    pub annotations: &'a dyn GroundTruthSource,
    pub image_set_path: &'a Path,
    pub class_name: &'a str,
    pub cache_dir: &'a Path,
    pub iou_threshold: f32,
    pub use_difficult: bool,
}

/// Precision/recall curve and average precision of one class.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassEval {
    pub rec: Vec<f64>,
    pub prec: Vec<f64>,
    pub ap: f64,
}

pub trait ApEvaluator {
    fn evaluate(&self, request: &ApRequest<'_>) -> Result<ClassEval>;
}

/// How a precision/recall curve is integrated into one AP value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ApInterpolation {
    /// VOC2010+: exact area under the monotone precision envelope.
    #[default] AllPoints,
    /// VOC2007: mean of the envelope sampled at recall 0.0, 0.1, ..., 1.0.
    ElevenPoint,
}

/// Computes AP from a recall-ordered curve.
pub fn average_precision(rec: &[f64], prec: &[f64], method: ApInterpolation) -> f64 {
    match method {
        ApInterpolation::ElevenPoint => {
            let mut ap = 0.;
            for t in 0..=10 {
                let t = t as f64 / 10.;
                let p = rec
                    .iter()
                    .zip(prec)
                    .filter(|(r, _)| **r >= t)
                    .map(|(_, p)| *p)
                    .fold(0., f64::max);
                ap += p / 11.;
            }
            ap
        }
        ApInterpolation::AllPoints => {
            let mut mrec = Vec::with_capacity(rec.len() + 2);
            mrec.push(0.);
            mrec.extend_from_slice(rec);
            mrec.push(1.);

            let mut mpre = Vec::with_capacity(prec.len() + 2);
            mpre.push(0.);
            mpre.extend_from_slice(prec);
            mpre.push(0.);

            for i in (1..mpre.len()).rev() {
                mpre[i - 1] = mpre[i - 1].max(mpre[i]);
            }

            (0..mrec.len() - 1)
                .filter(|&i| mrec[i + 1] != mrec[i])
                .map(|i| (mrec[i + 1] - mrec[i]) * mpre[i + 1])
                .sum()
        }
    }
}

struct ImageGroundTruth {
    boxes: Vec<RoiBox>,
    difficult: Vec<bool>,
    matched: Vec<bool>,
}

#[derive(Serialize, Deserialize)]
struct GroundTruthCache {
    image_ids: Vec<String>,
    fingerprint: AnnotationFingerprint,
    class_names: Vec<String>,
    annots: HashMap<String, Vec<GroundTruthObject>>,
}

impl GroundTruthCache {
    fn matches(&self, image_ids: &[String], fingerprint: &AnnotationFingerprint, class_names: &[String]) -> bool {
        self.image_ids == image_ids && &self.fingerprint == fingerprint && self.class_names == class_names
    }
}

/// PASCAL VOC style evaluator.
///
/// Predictions are taken in descending confidence. Each is matched to the ground-truth
/// box of its image and class with the highest IoU, and counts as a true positive only
/// if that IoU exceeds the threshold and the box was not claimed before. Difficult boxes
/// are ignored unless the request asks for them.
#[derive(Debug, Default, Clone, Copy)]
pub struct VocApEvaluator {
    pub interpolation: ApInterpolation,
}

impl VocApEvaluator {
    pub fn new(interpolation: ApInterpolation) -> Self {
        Self { interpolation }
    }

    /// Loads every image's ground truth, reusing `<cache_dir>/<image_set>_annots.json` when
    /// it was written for the same ids, annotation contents and class table.
    fn load_ground_truth(&self, request: &ApRequest<'_>, image_ids: &[String])
                         -> Result<HashMap<String, Vec<GroundTruthObject>>> {
        let stem = request
            .image_set_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "imageset".to_string());
        let cache_file = request.cache_dir.join(format!("{}_annots.json", stem));

        let fingerprint = request.annotations.fingerprint(image_ids)?;
        let class_names = request.annotations.class_names();

        if let Some(cached) = read_gt_cache(&cache_file) {
            if cached.matches(image_ids, &fingerprint, class_names) {
                log::debug!("Loaded annotations from {}", cache_file.display());
                return Ok(cached.annots);
            }
            log::info!("Annotation cache {} is stale; re-reading annotations", cache_file.display());
        }

        let mut annots = HashMap::with_capacity(image_ids.len());
        for (i, id) in image_ids.iter().enumerate() {
            annots.insert(id.clone(), request.annotations.ground_truth(id)?);
            if (i + 1) % 100 == 0 {
                log::debug!("Reading annotation for {}/{}", i + 1, image_ids.len());
            }
        }

        let cache = GroundTruthCache {
            image_ids: image_ids.to_vec(),
            fingerprint,
            class_names: class_names.to_vec(),
            annots,
        };
        write_gt_cache(request.cache_dir, &cache_file, &cache)?;
        Ok(cache.annots)
    }
}

impl ApEvaluator for VocApEvaluator {
    fn evaluate(&self, request: &ApRequest<'_>) -> Result<ClassEval> {
        let image_ids = utils::file_to_vec(request.image_set_path)?;
        let annots = self.load_ground_truth(request, &image_ids)?;

        let mut class_gt: HashMap<&str, ImageGroundTruth> = HashMap::with_capacity(annots.len());
        let mut npos = 0usize;
        for id in &image_ids {
            let objects: Vec<&GroundTruthObject> = annots
                .get(id)
                .map(|objs| objs.iter().filter(|o| o.class_name == request.class_name).collect())
                .unwrap_or_default();
            let difficult: Vec<bool> = objects.iter().map(|o| o.difficult).collect();
            npos += difficult.iter().filter(|d| request.use_difficult || !**d).count();
            class_gt.insert(id.as_str(), ImageGroundTruth {
                boxes: objects.iter().map(|o| o.bbox).collect(),
                matched: vec![false; difficult.len()],
                difficult,
            });
        }

        let mut detections = read_detections(request.detections_path)?;
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut tp = vec![0f64; detections.len()];
        let mut fp = vec![0f64; detections.len()];
        for (d, det) in detections.iter().enumerate() {
            let Some(gt) = class_gt.get_mut(det.image_id.as_str()) else {
                log::warn!("Detection for '{}' which is not in the image set", det.image_id);
                fp[d] = 1.;
                continue;
            };

            let bb = det.zero_based_box();
            let best = gt
                .boxes
                .iter()
                .enumerate()
                .map(|(j, g)| (j, bb.iou(g)))
                .fold(None, |best: Option<(usize, f32)>, (j, ov)| match best {
                    Some((_, top)) if top >= ov => best,
                    _ => Some((j, ov)),
                });

            match best {
                Some((j, ov)) if ov > request.iou_threshold => {
                    if !request.use_difficult && gt.difficult[j] {
                        continue;
                    }
                    if !gt.matched[j] {
                        tp[d] = 1.;
                        gt.matched[j] = true;
                    } else {
                        fp[d] = 1.;
                    }
                }
                _ => fp[d] = 1.,
            }
        }

        let mut rec = Vec::with_capacity(tp.len());
        let mut prec = Vec::with_capacity(tp.len());
        let (mut ctp, mut cfp) = (0f64, 0f64);
        for (t, f) in tp.iter().zip(&fp) {
            ctp += t;
            cfp += f;
            rec.push(if npos > 0 { ctp / npos as f64 } else { 0. });
            prec.push(ctp / (ctp + cfp).max(f64::EPSILON));
        }

        let ap = if npos > 0 { average_precision(&rec, &prec, self.interpolation) } else { 0. };
        Ok(ClassEval { rec, prec, ap })
    }
}

fn read_detections(path: &Path) -> Result<Vec<ResultLine>> {
    let file = fs::File::open(path).map_err(|e| DatasetError::io(path, e))?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| DatasetError::io(path, e))?;
        if !line.trim().is_empty() {
            lines.push(ResultLine::parse(&line)?);
        }
    }
    Ok(lines)
}

fn read_gt_cache(path: &Path) -> Option<GroundTruthCache> {
    let file = fs::File::open(path).ok()?;
    match serde_json::from_reader(BufReader::new(file)) {
        Ok(cache) => Some(cache),
        Err(e) => {
            log::warn!("Ignoring unreadable annotation cache {}: {}", path.display(), e);
            None
        }
    }
}

fn write_gt_cache(dir: &Path, path: &Path, cache: &GroundTruthCache) -> Result<()> {
    create_dir(dir)?;
    let file = fs::File::create(path).map_err(|e| DatasetError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, cache).map_err(|e| DatasetError::json(path, e))?;
    writer.flush().map_err(|e| DatasetError::io(path, e))
}
