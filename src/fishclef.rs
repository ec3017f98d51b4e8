use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::annotation_parser::AnnotationParser;
use crate::common::{CachePolicy, ClassTable, DatasetConfig, DetectionGrid, RoiRecord};
use crate::data::{default_cache_dir, AnnotationStore, HeaderImageReader, ImageReader};
use crate::error::DatasetError;
use crate::evaluation::{ApEvaluator, EvalSummary, Evaluation};
use crate::index_loader::ImageIndexLoader;
use crate::proposal_loader::ProposalLoader;
use crate::results_writer::ResultsWriter;
use crate::roidb_cache::{AnnotationFingerprint, CacheKey, RoidbCache};
use crate::utils;
use crate::Result;

/// The FishClef dataset laid out as a devkit:
///
/// ```text
/// <devkit>/data/ImageSets/<image_set>.txt
/// <devkit>/data/Annotations/<id>.xml
/// <devkit>/data/Images/<id>.{jpg,png,bmp}
/// <devkit>/results/                  per-class detections, transient
/// <devkit>/annotations_cache/        evaluator ground-truth cache
/// ```
pub struct FishClef<R: ImageReader = HeaderImageReader> {
    image_set: String,
    devkit_path: PathBuf,
    data_path: PathBuf,
    config: DatasetConfig,
    classes: ClassTable,
    annotations: AnnotationStore,
    image_index: Vec<String>,
    image_reader: R,
    roidb: Option<Vec<RoiRecord>>,
}

impl FishClef<HeaderImageReader> {
    pub fn new(image_set: &str, devkit_path: &Path, config: DatasetConfig) -> Result<Self> {
        Self::with_classes(image_set, devkit_path, config, ClassTable::fishclef())
    }

    /// Opens a devkit with a custom class table.
    pub fn with_classes(image_set: &str, devkit_path: &Path, config: DatasetConfig,
                        classes: ClassTable) -> Result<Self> {
        if !devkit_path.exists() {
            return Err(DatasetError::missing(devkit_path));
        }
        let data_path = devkit_path.join("data");
        if !data_path.exists() {
            return Err(DatasetError::missing(data_path));
        }

        let annotations = AnnotationStore::new(&data_path.join("Annotations"), config.annotation_format,
                                               classes.clone());
        let image_set_file = image_set_path(&data_path, image_set);
        let image_index = ImageIndexLoader::load(&image_set_file, &annotations)?;

        log::info!("Number of classes: {}", classes.len());
        log::debug!("Dataset config:\n{}", config.to_string());

        Ok(Self {
            image_set: image_set.to_string(),
            devkit_path: devkit_path.to_path_buf(),
            data_path,
            config,
            classes,
            annotations,
            image_index,
            image_reader: HeaderImageReader,
            roidb: None,
        })
    }
}

impl<R: ImageReader> FishClef<R> {
    /// Swaps the collaborator used to read image dimensions.
    pub fn with_image_reader<R2: ImageReader>(self, image_reader: R2) -> FishClef<R2> {
        FishClef {
            image_set: self.image_set,
            devkit_path: self.devkit_path,
            data_path: self.data_path,
            config: self.config,
            classes: self.classes,
            annotations: self.annotations,
            image_index: self.image_index,
            image_reader,
            roidb: None,
        }
    }

    pub fn name(&self) -> String {
        format!("fishclef_{}", self.image_set)
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn image_index(&self) -> &[String] {
        &self.image_index
    }

    pub fn num_images(&self) -> usize {
        self.image_index.len()
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn image_set_file(&self) -> PathBuf {
        image_set_path(&self.data_path, &self.image_set)
    }

    pub fn results_path(&self) -> PathBuf {
        self.devkit_path.join("results")
    }

    /// Where roidb artifacts live: the configured directory or `<user cache>/fishclef`.
    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.config.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_cache_dir(),
        }
    }

    /// Absolute path to the image at position `i` of the filtered index.
    pub fn image_path_at(&self, i: usize) -> Result<PathBuf> {
        let id = self.image_index.get(i).ok_or(DatasetError::IndexOutOfRange {
            index: i,
            len: self.image_index.len(),
        })?;
        self.image_path_from_index(id)
    }

    /// Tries each configured extension in order and returns the first existing file.
    pub fn image_path_from_index(&self, image_id: &str) -> Result<PathBuf> {
        let images_dir = self.data_path.join("Images");
        let stem = if self.config.use_original_images {
            format!("{}-orig", image_id)
        } else {
            image_id.to_string()
        };

        self.config
            .image_extensions
            .iter()
            .map(|ext| images_dir.join(format!("{}{}", stem, ext)))
            .find(|p| p.exists())
            .ok_or_else(|| DatasetError::missing(images_dir.join(stem)))
    }

    /// Size and digest of every filtered annotation, in index order.
    pub fn fingerprint(&self) -> Result<AnnotationFingerprint> {
        self.annotations.fingerprint(&self.image_index)
    }

    /// The ground-truth roidb, loaded from the cache or built and cached on first call.
    pub fn gt_roidb(&mut self) -> Result<&[RoiRecord]> {
        let roidb = match self.roidb.take() {
            Some(roidb) => roidb,
            None => {
                let cache = RoidbCache::new(&self.cache_path()?, self.config.cache_policy);
                let mut key = CacheKey::new(&self.name(), &self.devkit_path);
                if self.config.cache_policy == CachePolicy::Fingerprint {
                    key = key.with_fingerprint(self.fingerprint()?);
                }

                let roidb = cache.get_or_build(&key, self.classes.len(), || self.build_gt_roidb())?;
                if roidb.len() != self.image_index.len() {
                    return Err(DatasetError::InvalidRecord(format!(
                        "cached roidb has {} records, image index has {}", roidb.len(), self.image_index.len())));
                }
                roidb
            }
        };
        Ok(self.roidb.insert(roidb).as_slice())
    }

    /// The ground-truth roidb with the proposals of `config.rpn_file` appended to each record.
    ///
    /// Proposal rows hold their best IoU against the image's ground truth. Only the first
    /// `config.top_k` proposals of each image are kept.
    pub fn rpn_roidb(&mut self) -> Result<Vec<RoiRecord>> {
        let rpn_file = self
            .config
            .rpn_file
            .clone()
            .ok_or_else(|| DatasetError::InvalidConfig("rpn_file is not set".to_string()))?;
        let num_classes = self.classes.len();
        let top_k = self.config.top_k;
        let num_images = self.image_index.len();

        let gt_roidb = self.gt_roidb()?;
        let proposals = ProposalLoader::load(&rpn_file, num_images, top_k)?;

        gt_roidb
            .iter()
            .zip(proposals)
            .map(|(gt, boxes)| {
                let mut record = gt.clone();
                record.merge(&RoiRecord::from_proposals(boxes, gt, num_classes))?;
                Ok(record)
            })
            .collect()
    }

    fn build_gt_roidb(&self) -> Result<Vec<RoiRecord>> {
        let start = Instant::now();
        let num_classes = self.classes.len();

        let roidb = self
            .image_index
            .iter()
            .map(|id| {
                let doc = self.annotations.load(id)?;
                let dims = self.image_reader.dimensions(&self.image_path_from_index(id)?)?;
                let record = AnnotationParser::parse(id, &doc, dims, &self.classes)?;
                record.validate(num_classes)?;
                Ok(record)
            })
            .collect::<Result<Vec<_>>>()?;

        utils::trace("ROIDB", "Parse annotations", start, Default::default());
        Ok(roidb)
    }

    /// Scores detector output against this dataset's ground truth.
    ///
    /// # Arguments
    ///
    /// * `detections` - `[class][image]` detections over [`FishClef::image_index`].
    /// * `output_dir` - Receives the per-class precision/recall files.
    /// * `evaluator` - The AP evaluator, typically [`crate::evaluation::VocApEvaluator`].
    pub fn evaluate_detections(&self, detections: &DetectionGrid, output_dir: &Path,
                               evaluator: &dyn ApEvaluator) -> Result<EvalSummary> {
        let writer = ResultsWriter::new(&self.results_path(), &self.config.comp_id_with_salt(), &self.image_set);
        let image_set_file = self.image_set_file();
        let cache_dir = self.devkit_path.join("annotations_cache");

        Evaluation {
            classes: &self.classes,
            image_index: &self.image_index,
            image_set_path: &image_set_file,
            annotations: &self.annotations,
            writer: &writer,
            cache_dir: &cache_dir,
            cleanup: self.config.cleanup,
            use_difficult: self.config.use_difficult,
        }
        .run(detections, output_dir, evaluator)
    }
}

fn image_set_path(data_path: &Path, image_set: &str) -> PathBuf {
    data_path.join("ImageSets").join(format!("{}.txt", image_set))
}
