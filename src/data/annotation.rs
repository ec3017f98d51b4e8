use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::{AnnotationFormat, ClassTable, RoiBox};
use crate::error::DatasetError;
use crate::Result;

/// The `object` entry of an xmltodict-style document: a bare object when the image has
/// one instance, a list when it has several.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct RawBndBox {
    pub xmin: Option<String>,
    pub ymin: Option<String>,
    pub xmax: Option<String>,
    pub ymax: Option<String>,
}

/// An `<object>` element exactly as written in the annotation file.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct RawObject {
    pub name: Option<String>,
    pub bndbox: Option<RawBndBox>,
    pub difficult: Option<String>,
}

impl RawObject {
    pub fn class_name(&self, image_id: &str) -> Result<&str> {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(name),
            Some(_) => Err(DatasetError::malformed(image_id, "name", "is empty")),
            None => Err(DatasetError::malformed(image_id, "name", "is missing")),
        }
    }

    /// The 1-based `(xmin, ymin, xmax, ymax)` bounds.
    pub fn bounds(&self, image_id: &str) -> Result<[f32; 4]> {
        let bndbox = self
            .bndbox
            .as_ref()
            .ok_or_else(|| DatasetError::malformed(image_id, "bndbox", "is missing"))?;

        Ok([
            parse_coord(image_id, "bndbox.xmin", bndbox.xmin.as_deref())?,
            parse_coord(image_id, "bndbox.ymin", bndbox.ymin.as_deref())?,
            parse_coord(image_id, "bndbox.xmax", bndbox.xmax.as_deref())?,
            parse_coord(image_id, "bndbox.ymax", bndbox.ymax.as_deref())?,
        ])
    }

    pub fn is_difficult(&self) -> bool {
        self.difficult
            .as_deref()
            .and_then(|d| d.trim().parse::<i32>().ok())
            .is_some_and(|d| d != 0)
    }
}

fn parse_coord(image_id: &str, field: &str, value: Option<&str>) -> Result<f32> {
    let text = value.ok_or_else(|| DatasetError::malformed(image_id, field, "is missing"))?;
    match text.trim().parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(_) => Err(DatasetError::malformed(image_id, field, format!("'{}' is not finite", text))),
        Err(e) => Err(DatasetError::malformed(image_id, field, format!("'{}': {}", text, e))),
    }
}

#[derive(Deserialize)]
struct XmlAnnotation {
    #[serde(rename = "object", default)]
    objects: Vec<RawObject>,
}

#[derive(Deserialize)]
struct JsonDocument {
    annotation: JsonAnnotation,
}

#[derive(Deserialize)]
struct JsonAnnotation {
    #[serde(default)]
    object: Option<OneOrMany<RawObject>>,
}

/// An annotation document with its objects in file order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AnnotationDoc {
    pub objects: Vec<RawObject>,
}

impl AnnotationDoc {
    pub fn from_objects(objects: OneOrMany<RawObject>) -> Self {
        Self { objects: objects.into_vec() }
    }

    pub fn from_xml_str(text: &str, path: &Path) -> Result<Self> {
        let doc: XmlAnnotation = quick_xml::de::from_str(text).map_err(|source| DatasetError::Xml {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { objects: doc.objects })
    }

    pub fn from_json_str(text: &str, path: &Path) -> Result<Self> {
        let doc: JsonDocument = serde_json::from_str(text).map_err(|e| DatasetError::json(path, e))?;
        Ok(doc.annotation.object.map(Self::from_objects).unwrap_or_default())
    }

    pub fn read(path: &Path, format: AnnotationFormat) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| DatasetError::io(path, e))?;
        match format {
            AnnotationFormat::Xml => Self::from_xml_str(&text, path),
            AnnotationFormat::Json => Self::from_json_str(&text, path),
        }
    }

    pub fn has_objects(&self) -> bool {
        !self.objects.is_empty()
    }
}

/// A ground-truth box as seen by an AP evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthObject {
    /// Canonical class name, after catch-all resolution.
    pub class_name: String,
    /// Zero-based, unclamped.
    pub bbox: RoiBox,
    pub difficult: bool,
}

/// Size and content digest of one annotation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationStamp {
    pub image_id: String,
    pub len: u64,
    pub digest: u64,
}

/// Per-image annotation stamps, in image index order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationFingerprint(pub Vec<AnnotationStamp>);

/// Locates and reads the annotation file of each image id.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    dir: PathBuf,
    format: AnnotationFormat,
    classes: ClassTable,
}

impl AnnotationStore {
    pub fn new(dir: &Path, format: AnnotationFormat, classes: ClassTable) -> Self {
        Self { dir: dir.to_path_buf(), format, classes }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn path_for(&self, image_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", image_id, self.format.extension()))
    }

    pub fn load(&self, image_id: &str) -> Result<AnnotationDoc> {
        let path = self.path_for(image_id);
        log::trace!("Reading annotation {}", path.display());
        AnnotationDoc::read(&path, self.format)
    }

    /// Stamps the annotation file of `image_id`. Any edit to its bytes changes the stamp.
    pub fn stamp(&self, image_id: &str) -> Result<AnnotationStamp> {
        let path = self.path_for(image_id);
        let bytes = std::fs::read(&path).map_err(|e| DatasetError::io(&path, e))?;
        let mut hasher = DefaultHasher::new();
        hasher.write(&bytes);
        Ok(AnnotationStamp {
            image_id: image_id.to_string(),
            len: bytes.len() as u64,
            digest: hasher.finish(),
        })
    }

    pub fn fingerprint(&self, image_ids: &[String]) -> Result<AnnotationFingerprint> {
        image_ids
            .iter()
            .map(|id| self.stamp(id))
            .collect::<Result<Vec<_>>>()
            .map(AnnotationFingerprint)
    }

    /// Ground-truth boxes of one image, classes resolved through the class table.
    pub fn ground_truth(&self, image_id: &str) -> Result<Vec<GroundTruthObject>> {
        let doc = self.load(image_id)?;
        doc.objects
            .iter()
            .map(|obj| {
                let name = obj.class_name(image_id)?;
                let [xmin, ymin, xmax, ymax] = obj.bounds(image_id)?;
                Ok(GroundTruthObject {
                    class_name: self.classes.canonical_name(name).to_string(),
                    bbox: RoiBox::from_one_based(xmin, ymin, xmax, ymax),
                    difficult: obj.is_difficult(),
                })
            })
            .collect()
    }
}
