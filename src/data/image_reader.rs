use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;
use crate::Result;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDims {
    pub width: u32,
    pub height: u32,
}

impl ImageDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Supplies the pixel dimensions of an image file.
pub trait ImageReader {
    fn dimensions(&self, path: &Path) -> Result<ImageDims>;
}

/// Reads dimensions from the image header without decoding pixels.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderImageReader;

impl ImageReader for HeaderImageReader {
    fn dimensions(&self, path: &Path) -> Result<ImageDims> {
        if !path.exists() {
            return Err(DatasetError::missing(path));
        }
        let (width, height) = image::image_dimensions(path).map_err(|source| match source {
            image::ImageError::IoError(e) => DatasetError::io(path, e),
            source => DatasetError::ImageRead { path: path.to_path_buf(), source },
        })?;
        Ok(ImageDims { width, height })
    }
}

impl<R: ImageReader + ?Sized> ImageReader for &R {
    fn dimensions(&self, path: &Path) -> Result<ImageDims> {
        (**self).dimensions(path)
    }
}
