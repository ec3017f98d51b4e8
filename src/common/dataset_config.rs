use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;
use crate::Result;

const SALT_LEN: usize = 12;
const DEFAULT_TOP_K: usize = 2000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationFormat {
    #[default] Xml,
    Json,
}

impl FromStr for AnnotationFormat {
    type Err = DatasetError;

    fn from_str(format: &str) -> Result<Self> {
        match format.trim().to_lowercase().as_str() {
            "xml" => Ok(AnnotationFormat::Xml),
            "json" => Ok(AnnotationFormat::Json),
            other => Err(DatasetError::InvalidConfig(format!("unknown annotation format '{}'", other))),
        }
    }
}

impl AnnotationFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AnnotationFormat::Xml => "xml",
            AnnotationFormat::Json => "json",
        }
    }
}

/// What a cached roidb is checked against before it is reused.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Reuse any artifact found on disk.
    Trust,
    /// Reuse an artifact only if its annotation fingerprint still matches.
    #[default] Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub cleanup: bool,
    pub salt: Option<String>,
    pub comp_id: String,
    pub use_difficult: bool,
    pub use_original_images: bool,
    pub image_extensions: Vec<String>,
    pub annotation_format: AnnotationFormat,
    pub cache_dir: Option<PathBuf>,
    pub cache_policy: CachePolicy,
    /// Proposal boxes merged into the ground truth by `FishClef::rpn_roidb`.
    pub rpn_file: Option<PathBuf>,
    /// Proposals kept per image, in file order.
    pub top_k: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            cleanup: true,
            salt: None,
            comp_id: "comp4".to_string(),
            use_difficult: false,
            use_original_images: false,
            image_extensions: vec![".jpg".to_string(), ".png".to_string(), ".bmp".to_string()],
            annotation_format: AnnotationFormat::Xml,
            cache_dir: None,
            cache_policy: CachePolicy::Fingerprint,
            rpn_file: None,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl DatasetConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Loads a config from a JSON file. Missing keys take their default value.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| DatasetError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| DatasetError::json(path, e))
    }

    pub fn with_cleanup(mut self, x: bool) -> Self {
        self.cleanup = x;
        self
    }

    pub fn with_salt(mut self, salt: &str) -> Self {
        self.salt = Some(salt.to_string());
        self
    }

    /// Generates a fresh salt. Results file names then differ between runs.
    pub fn with_random_salt(mut self) -> Self {
        let salt: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SALT_LEN)
            .map(char::from)
            .collect();
        self.salt = Some(salt);
        self
    }

    pub fn with_comp_id(mut self, comp_id: &str) -> Self {
        self.comp_id = comp_id.to_string();
        self
    }

    pub fn with_use_difficult(mut self, x: bool) -> Self {
        self.use_difficult = x;
        self
    }

    pub fn with_original_images(mut self, x: bool) -> Self {
        self.use_original_images = x;
        self
    }

    pub fn with_image_extensions(mut self, exts: &[&str]) -> Self {
        self.image_extensions = exts.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn with_annotation_format(mut self, format: AnnotationFormat) -> Self {
        self.annotation_format = format;
        self
    }

    pub fn with_cache_dir(mut self, dir: &Path) -> Self {
        self.cache_dir = Some(dir.to_path_buf());
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_rpn_file(mut self, path: &Path) -> Self {
        self.rpn_file = Some(path.to_path_buf());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// `comp4` or `comp4_<salt>`.
    pub fn comp_id_with_salt(&self) -> String {
        match &self.salt {
            Some(salt) => format!("{}_{}", self.comp_id, salt),
            None => self.comp_id.clone(),
        }
    }

    pub fn to_string(&self) -> String {
        format!("Component ID: {}\n\
        Cleanup Results Files: {}\n\
        Use Difficult: {}\n\
        Use Original Images: {}\n\
        Image Extensions: {:?}\n\
        Annotation Format: {:?}\n\
        Cache Dir: {:?}\n\
        Cache Policy: {:?}\n\
        RPN File: {:?}\n\
        Top K: {}",
                self.comp_id_with_salt(), self.cleanup, self.use_difficult,
                self.use_original_images, self.image_extensions, self.annotation_format,
                self.cache_dir, self.cache_policy, self.rpn_file, self.top_k)
    }
}
