mod annotation;
mod filesystem_access;
mod image_reader;

pub use annotation::*;
pub use filesystem_access::{create_dir, default_cache_dir};
pub use image_reader::*;
