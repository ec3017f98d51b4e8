use std::path::Path;

use crate::data::AnnotationStore;
use crate::utils;
use crate::Result;

/// Reads an image-set list and keeps the ids whose annotation holds at least one object.
pub struct ImageIndexLoader;

impl ImageIndexLoader {
    /// Loads the filtered image index.
    ///
    /// # Arguments
    ///
    /// * `image_set_path` - Newline-delimited list of image ids.
    /// * `annotations` - Where each id's annotation file lives.
    ///
    /// # Returns
    ///
    /// The ids with at least one object, in file order.
    pub fn load(image_set_path: &Path, annotations: &AnnotationStore) -> Result<Vec<String>> {
        let image_index = utils::file_to_vec(image_set_path)?;
        log::info!("Files found in ImageSet: {}", image_index.len());

        let mut filtered = Vec::with_capacity(image_index.len());
        for id in image_index {
            if annotations.load(&id)?.has_objects() {
                filtered.push(id);
            } else {
                log::debug!("Dropping '{}': annotation has no objects", id);
            }
        }

        log::info!("Files left after filtering: {}", filtered.len());
        Ok(filtered)
    }
}
