mod class_table;
mod dataset_config;
mod detection_grid;
mod result_line;
mod roi_box;
mod roi_record;

pub use class_table::*;
pub use dataset_config::*;
pub use detection_grid::*;
pub use result_line::*;
pub use roi_box::*;
pub use roi_record::*;
