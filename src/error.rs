use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// A required file or directory is absent.
    #[error("Path does not exist: {}", path.display())]
    MissingFile { path: PathBuf },

    /// A required annotation field is absent or cannot be parsed.
    #[error("Malformed annotation for '{image_id}': field '{field}' {reason}")]
    MalformedAnnotation {
        image_id: String,
        field: String,
        reason: String,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse XML {}: {source}", path.display())]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::DeError,
    },

    #[error("Failed to (de)serialize JSON {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read image {}: {source}", path.display())]
    ImageRead {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Cache artifact {} could not be decoded: {reason}", path.display())]
    CacheDecode { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Detections do not match dataset: {0}")]
    DetectionShape(String),

    #[error("Invalid class table: {0}")]
    InvalidClassTable(String),

    #[error("Invalid roi record: {0}")]
    InvalidRecord(String),

    #[error("Image position {index} out of range (index has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Malformed results line '{line}': {reason}")]
    MalformedResultLine { line: String, reason: String },
}

impl DatasetError {
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        DatasetError::MissingFile { path: path.into() }
    }

    pub fn malformed(image_id: &str, field: &str, reason: impl Into<String>) -> Self {
        DatasetError::MalformedAnnotation {
            image_id: image_id.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Wraps an I/O error raised on `path`. `NotFound` becomes [`DatasetError::MissingFile`].
    pub fn io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => DatasetError::missing(path),
            _ => DatasetError::Io { path: path.to_path_buf(), source },
        }
    }

    pub fn json(path: &Path, source: serde_json::Error) -> Self {
        DatasetError::Json { path: path.to_path_buf(), source }
    }
}
