use crate::common::{ClassTable, RoiBox, RoiRecord, SparseOverlaps};
use crate::data::{AnnotationDoc, ImageDims};
use crate::Result;

/// Turns one annotation document into a zero-based, clamped [`RoiRecord`].
pub struct AnnotationParser;

impl AnnotationParser {
    /// # Arguments
    ///
    /// * `image_id` - Used in error messages only.
    /// * `doc` - The annotation, objects already in one ordered sequence.
    /// * `dims` - Pixel size of the image the boxes are clamped to.
    /// * `classes` - Name to index mapping; unknown names become the catch-all class.
    pub fn parse(image_id: &str, doc: &AnnotationDoc, dims: ImageDims, classes: &ClassTable) -> Result<RoiRecord> {
        let num_objs = doc.objects.len();
        let mut boxes = Vec::with_capacity(num_objs);
        let mut gt_classes = Vec::with_capacity(num_objs);
        let mut gt_overlaps = SparseOverlaps::empty(classes.len());
        let mut seg_areas = Vec::with_capacity(num_objs);

        for obj in &doc.objects {
            let cls = classes.index_of(obj.class_name(image_id)?);
            let [xmin, ymin, xmax, ymax] = obj.bounds(image_id)?;

            // Make pixel indexes 0-based
            let bbox = RoiBox::from_one_based(xmin, ymin, xmax, ymax)
                .clamp_to_image(dims.width, dims.height);
            if bbox.is_inverted() {
                log::warn!("'{}': box {:?} is inverted after clamping to {}x{}",
                           image_id, bbox.xy1_xy2(), dims.width, dims.height);
            }

            boxes.push(bbox);
            gt_classes.push(cls);
            gt_overlaps.push_one_hot(cls);
            seg_areas.push(bbox.area());
        }

        Ok(RoiRecord {
            boxes,
            gt_classes,
            gt_overlaps,
            seg_areas,
            flipped: false,
        })
    }
}
