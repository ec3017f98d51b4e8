use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{CachePolicy, RoiRecord};
use crate::data::create_dir;
use crate::error::DatasetError;
use crate::Result;

const CACHE_VERSION: u32 = 2;

pub use crate::data::AnnotationFingerprint;

/// Identity of a cached roidb: dataset name, devkit, and optionally the state of the
/// annotation files it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheKey {
    pub dataset_name: String,
    pub devkit_tag: String,
    pub fingerprint: Option<AnnotationFingerprint>,
}

impl CacheKey {
    pub fn new(dataset_name: &str, devkit_path: &Path) -> Self {
        let devkit_tag = devkit_path
            .file_name()
            .map(|n| sanitize(&n.to_string_lossy()))
            .unwrap_or_else(|| "devkit".to_string());
        Self {
            dataset_name: dataset_name.to_string(),
            devkit_tag,
            fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: AnnotationFingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn file_stem(&self) -> String {
        format!("{}_{}", sanitize(&self.dataset_name), self.devkit_tag)
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[derive(Serialize, Deserialize)]
struct CacheArtifact {
    version: u32,
    fingerprint: Option<AnnotationFingerprint>,
    roidb: Vec<RoiRecord>,
}

/// On-disk cache of ground-truth roidbs, one JSON artifact per [`CacheKey`].
///
/// There is no locking. Two processes warming the same key both build, and the last
/// rename wins. Artifacts are written to a temporary file first, so a reader never sees
/// a partial one.
#[derive(Debug, Clone)]
pub struct RoidbCache {
    cache_dir: PathBuf,
    policy: CachePolicy,
}

impl RoidbCache {
    pub fn new(cache_dir: &Path, policy: CachePolicy) -> Self {
        Self { cache_dir: cache_dir.to_path_buf(), policy }
    }

    pub fn artifact_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(format!("{}_gt_roidb.json", key.file_stem()))
    }

    /// Returns the cached roidb for `key`, or runs `builder` and caches its output.
    ///
    /// Every record of a cached artifact must pass [`RoiRecord::validate`] against
    /// `num_classes`, otherwise the artifact is reported as [`DatasetError::CacheDecode`].
    pub fn get_or_build<F>(&self, key: &CacheKey, num_classes: usize, builder: F) -> Result<Vec<RoiRecord>>
    where
        F: FnOnce() -> Result<Vec<RoiRecord>>,
    {
        let path = self.artifact_path(key);

        if path.exists() {
            let artifact = load(&path)?;
            if self.is_current(key, &artifact, &path) {
                for (i, record) in artifact.roidb.iter().enumerate() {
                    record.validate(num_classes).map_err(|e| DatasetError::CacheDecode {
                        path: path.clone(),
                        reason: format!("record {}: {}", i, e),
                    })?;
                }
                log::info!("{} gt roidb loaded from {}", key.dataset_name, path.display());
                return Ok(artifact.roidb);
            }
        }

        let roidb = builder()?;
        let artifact = CacheArtifact {
            version: CACHE_VERSION,
            fingerprint: key.fingerprint.clone(),
            roidb,
        };
        self.store(&path, &artifact)?;
        log::info!("wrote gt roidb to {}", path.display());

        Ok(artifact.roidb)
    }

    fn is_current(&self, key: &CacheKey, artifact: &CacheArtifact, path: &Path) -> bool {
        if artifact.version != CACHE_VERSION {
            log::warn!("Cache {} has version {}, expected {}; rebuilding",
                       path.display(), artifact.version, CACHE_VERSION);
            return false;
        }
        match (self.policy, &key.fingerprint) {
            (CachePolicy::Trust, _) | (CachePolicy::Fingerprint, None) => true,
            (CachePolicy::Fingerprint, Some(current)) => {
                let fresh = artifact.fingerprint.as_ref() == Some(current);
                if !fresh {
                    log::warn!("Cache {} does not match the current annotations; rebuilding", path.display());
                }
                fresh
            }
        }
    }

    fn store(&self, path: &Path, artifact: &CacheArtifact) -> Result<()> {
        create_dir(&self.cache_dir)?;

        let tmp = path.with_extension("json.tmp");
        let written = write_json(&tmp, artifact)
            .and_then(|()| fs::rename(&tmp, path).map_err(|e| DatasetError::io(path, e)));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        written
    }
}

fn load(path: &Path) -> Result<CacheArtifact> {
    let file = fs::File::open(path).map_err(|e| DatasetError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| DatasetError::CacheDecode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_json(path: &Path, artifact: &CacheArtifact) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| DatasetError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, artifact).map_err(|e| DatasetError::json(path, e))?;
    writer.flush().map_err(|e| DatasetError::io(path, e))
}
